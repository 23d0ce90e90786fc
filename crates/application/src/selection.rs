//! Turns a text selection over rendered chunks into an entity.
//!
//! A rendered page is an ordered list of text chunks (one per segment).
//! Concatenated they must equal the page text, so the absolute offset of a
//! point is the length of every chunk before it plus the offset inside its
//! own chunk.

use annotator_core::{Entity, segment::char_len, segment::slice_chars, split_type_display};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPoint {
    pub chunk: usize,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSelection {
    pub anchor: ChunkPoint,
    pub text: String,
}

impl TextSelection {
    pub fn is_collapsed(&self) -> bool {
        self.text.is_empty()
    }
}

pub fn absolute_offset(chunks: &[&str], point: ChunkPoint) -> Option<usize> {
    let own = chunks.get(point.chunk)?;
    if point.offset > char_len(own) {
        return None;
    }
    let before: usize = chunks[..point.chunk].iter().map(|c| char_len(c)).sum();
    Some(before + point.offset)
}

/// Inverse of [`absolute_offset`]: finds the chunk holding `offset`.
/// An offset on a boundary maps to the start of the following chunk.
pub fn chunk_point(chunks: &[&str], offset: usize) -> Option<ChunkPoint> {
    let mut before = 0;
    for (index, chunk) in chunks.iter().enumerate() {
        let len = char_len(chunk);
        if offset < before + len {
            return Some(ChunkPoint {
                chunk: index,
                offset: offset - before,
            });
        }
        before += len;
    }
    match chunks.len() {
        0 => None,
        n if offset == before => Some(ChunkPoint {
            chunk: n - 1,
            offset: char_len(chunks[n - 1]),
        }),
        _ => None,
    }
}

/// Builds a manual entity from `selection`.
///
/// Returns `None` (silently) when the selection is collapsed or blank,
/// when no type is selected, when `container` is missing, or when the
/// anchor does not fall inside it. Leading whitespace that is trimmed off
/// the selection also moves the start forward, so `text` always equals
/// `page_text[start..end]`.
pub fn resolve_selection(
    selection: &TextSelection,
    container: Option<&[&str]>,
    page_text: &str,
    selected_type: &str,
    stamp_millis: u128,
) -> Option<Entity> {
    if selection.is_collapsed() || selected_type.trim().is_empty() {
        return None;
    }
    let trimmed = selection.text.trim();
    if trimmed.is_empty() {
        return None;
    }
    let chunks = container?;
    let anchor = absolute_offset(chunks, selection.anchor)?;

    let leading = selection
        .text
        .chars()
        .take_while(|c| c.is_whitespace())
        .count();
    let start = anchor + leading;
    let end = start + char_len(trimmed);
    if end > char_len(page_text) {
        return None;
    }
    if slice_chars(page_text, start, end) != trimmed {
        warn!(start, end, "selection text does not match page text; ignoring");
        return None;
    }

    let (code, description) = split_type_display(selected_type);
    Some(Entity {
        id: Entity::manual_id(stamp_millis),
        text: trimmed.to_string(),
        entity_type: selected_type.to_string(),
        start,
        end,
        icd_code: description.map(|_| code.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = "Patient has anemia and diabetes";

    fn chunks() -> Vec<&'static str> {
        vec!["Patient has ", "anemia", " ", "and", " diabetes"]
    }

    fn select(chunk: usize, offset: usize, text: &str) -> TextSelection {
        TextSelection {
            anchor: ChunkPoint { chunk, offset },
            text: text.to_string(),
        }
    }

    #[test]
    fn walks_chunks_to_absolute_offset() {
        let chunks = chunks();
        let selection = select(4, 1, "diabetes");
        let entity =
            resolve_selection(&selection, Some(&chunks[..]), PAGE, "E11.9", 1_700_000_000_000).unwrap();
        assert_eq!(entity.start, 23);
        assert_eq!(entity.end, 31);
        assert_eq!(entity.text, "diabetes");
        assert_eq!(entity.id, "manual-1700000000000");
        assert_eq!(entity.icd_code, None);
    }

    #[test]
    fn selection_spanning_chunks_keeps_start_chunk() {
        let chunks = chunks();
        let selection = select(1, 0, "anemia and");
        let entity = resolve_selection(&selection, Some(&chunks[..]), PAGE, "Finding", 7).unwrap();
        assert_eq!((entity.start, entity.end), (12, 22));
        assert_eq!(entity.entity_type, "Finding");
    }

    #[test]
    fn empty_type_yields_nothing() {
        let chunks = chunks();
        let selection = select(1, 0, "anemia");
        assert!(resolve_selection(&selection, Some(&chunks[..]), PAGE, "", 1).is_none());
        assert!(resolve_selection(&selection, Some(&chunks[..]), PAGE, "  ", 1).is_none());
    }

    #[test]
    fn collapsed_or_blank_selection_yields_nothing() {
        let chunks = chunks();
        assert!(resolve_selection(&select(0, 3, ""), Some(&chunks[..]), PAGE, "X", 1).is_none());
        assert!(resolve_selection(&select(2, 0, " "), Some(&chunks[..]), PAGE, "X", 1).is_none());
    }

    #[test]
    fn missing_container_yields_nothing() {
        let selection = select(0, 0, "Patient");
        assert!(resolve_selection(&selection, None, PAGE, "X", 1).is_none());
        let chunks = chunks();
        assert!(resolve_selection(&select(9, 0, "Patient"), Some(&chunks[..]), PAGE, "X", 1).is_none());
        assert!(resolve_selection(&select(1, 7, "Patient"), Some(&chunks[..]), PAGE, "X", 1).is_none());
    }

    #[test]
    fn leading_whitespace_moves_start() {
        let chunks = chunks();
        let selection = select(2, 0, " and ");
        let entity = resolve_selection(&selection, Some(&chunks[..]), PAGE, "X", 1).unwrap();
        assert_eq!((entity.start, entity.end), (19, 22));
        assert_eq!(entity.text, "and");
    }

    #[test]
    fn lookup_type_carries_code() {
        let chunks = chunks();
        let selection = select(1, 0, "anemia");
        let entity = resolve_selection(
            &selection,
            Some(&chunks[..]),
            PAGE,
            "D50.9 - Iron deficiency anemia, unspecified",
            1,
        )
        .unwrap();
        assert_eq!(entity.icd_code.as_deref(), Some("D50.9"));
    }

    #[test]
    fn mismatched_text_is_ignored() {
        let chunks = chunks();
        let selection = select(1, 0, "anemix");
        assert!(resolve_selection(&selection, Some(&chunks[..]), PAGE, "X", 1).is_none());
    }

    #[test]
    fn chunk_point_inverts_absolute_offset() {
        let chunks = chunks();
        for offset in 0..PAGE.len() {
            let point = chunk_point(&chunks, offset).unwrap();
            assert_eq!(absolute_offset(&chunks, point), Some(offset));
        }
        assert_eq!(
            chunk_point(&chunks, PAGE.len()),
            Some(ChunkPoint { chunk: 4, offset: 9 })
        );
        assert_eq!(chunk_point(&chunks, PAGE.len() + 1), None);
        assert_eq!(chunk_point(&[], 0), None);
    }
}
