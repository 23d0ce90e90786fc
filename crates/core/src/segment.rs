//! Offset segment model.
//!
//! Turns a page's plain text, its entities and an optional search term into
//! an ordered, gap-free, non-overlapping run of segments. All offsets are
//! character offsets.

use std::collections::BTreeMap;

use crate::{Entity, PageNumber};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegmentKind {
    Plain,
    Entity,
    Search,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub start: usize,
    pub end: usize,
    pub kind: SegmentKind,
    pub content: String,
    pub entity_type: Option<String>,
    pub icd_code: Option<String>,
}

impl Segment {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageHit {
    pub page: PageNumber,
    pub count: usize,
}

#[derive(Debug, Clone)]
struct Candidate<'a> {
    start: usize,
    end: usize,
    kind: SegmentKind,
    entity: Option<&'a Entity>,
}

/// Computes the render segments for one page.
///
/// Candidates are sorted by start with a stable sort, entity candidates
/// inserted before search candidates, so on equal starts the entity is
/// seen first. An overlapping candidate is only accepted when it is an
/// entity and the previously accepted segment is a search match; the
/// search match is then cut back to where the entity begins.
///
/// Zero-length entities are dropped and entity ends past the text are
/// clamped to the text length. The entities themselves are left untouched.
pub fn compute_segments(text: &str, entities: &[Entity], search_term: &str) -> Vec<Segment> {
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    if len == 0 {
        return Vec::new();
    }

    let mut candidates: Vec<Candidate<'_>> = entities
        .iter()
        .filter_map(|entity| {
            let end = entity.end.min(len);
            (entity.start < end).then_some(Candidate {
                start: entity.start,
                end,
                kind: SegmentKind::Entity,
                entity: Some(entity),
            })
        })
        .collect();

    candidates.extend(
        match_ranges(&chars, search_term)
            .into_iter()
            .map(|(start, end)| Candidate {
                start,
                end,
                kind: SegmentKind::Search,
                entity: None,
            }),
    );

    candidates.sort_by_key(|c| c.start);

    let mut accepted: Vec<Candidate<'_>> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let last = accepted.last().map(|last| (last.end, last.kind));
        match last {
            Some((last_end, last_kind)) if candidate.start < last_end => {
                if last_kind == SegmentKind::Search && candidate.kind == SegmentKind::Entity {
                    if let Some(search) = accepted.last_mut() {
                        search.end = candidate.start;
                        if search.start >= search.end {
                            accepted.pop();
                        }
                    }
                    accepted.push(candidate);
                }
            }
            _ => accepted.push(candidate),
        }
    }

    let mut out = Vec::with_capacity(accepted.len() * 2 + 1);
    let mut cursor = 0;
    for candidate in accepted {
        if candidate.start > cursor {
            out.push(plain(&chars, cursor, candidate.start));
        }
        out.push(Segment {
            start: candidate.start,
            end: candidate.end,
            kind: candidate.kind,
            content: collect(&chars, candidate.start, candidate.end),
            entity_type: candidate.entity.map(|e| e.entity_type.clone()),
            icd_code: candidate.entity.and_then(|e| e.icd_code.clone()),
        });
        cursor = candidate.end;
    }
    if cursor < len {
        out.push(plain(&chars, cursor, len));
    }
    out
}

pub fn find_matches(text: &str, term: &str) -> Vec<(usize, usize)> {
    let chars: Vec<char> = text.chars().collect();
    match_ranges(&chars, term)
}

pub fn page_hits(
    pages: &BTreeMap<PageNumber, String>,
    term: &str,
    min_chars: usize,
) -> Vec<PageHit> {
    let term = term.trim();
    if term.chars().count() < min_chars {
        return Vec::new();
    }

    let mut hits: Vec<PageHit> = pages
        .iter()
        .filter_map(|(page, content)| {
            let count = find_matches(content, term).len();
            (count > 0).then_some(PageHit { page: *page, count })
        })
        .collect();
    hits.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.page.cmp(&b.page)));
    hits
}

fn match_ranges(chars: &[char], term: &str) -> Vec<(usize, usize)> {
    let needle: Vec<char> = term.trim().chars().map(fold_char).collect();
    if needle.is_empty() || needle.len() > chars.len() {
        return Vec::new();
    }

    let folded: Vec<char> = chars.iter().copied().map(fold_char).collect();
    let mut out = Vec::new();
    let mut i = 0;
    while i + needle.len() <= folded.len() {
        if folded[i..i + needle.len()] == needle[..] {
            out.push((i, i + needle.len()));
            i += needle.len();
        } else {
            i += 1;
        }
    }
    out
}

// One char in, one char out, so folded offsets line up with the original.
fn fold_char(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

fn collect(chars: &[char], start: usize, end: usize) -> String {
    chars[start..end].iter().collect()
}

fn plain(chars: &[char], start: usize, end: usize) -> Segment {
    Segment {
        start,
        end,
        kind: SegmentKind::Plain,
        content: collect(chars, start, end),
        entity_type: None,
        icd_code: None,
    }
}

pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Slices `text` by character offsets, clamping both ends to the text.
pub fn slice_chars(text: &str, start: usize, end: usize) -> &str {
    let begin = byte_offset(text, start);
    let stop = byte_offset(text, end.max(start));
    &text[begin..stop]
}

fn byte_offset(text: &str, char_index: usize) -> usize {
    text.char_indices()
        .nth(char_index)
        .map(|(i, _)| i)
        .unwrap_or(text.len())
}
