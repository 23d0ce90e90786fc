use annotator_application::selection::{ChunkPoint, TextSelection, chunk_point};
use annotator_core::segment::{char_len, slice_chars};
use unicode_width::UnicodeWidthChar;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Row {
    pub start: usize,
    pub end: usize,
}

/// Wraps `text` into rows no wider than `width` columns. Hard newlines
/// always end a row. Wide characters never straddle a row boundary.
pub fn wrap_rows(text: &str, width: usize) -> Vec<Row> {
    let width = width.max(1);
    let mut rows = Vec::new();
    let mut start = 0;
    let mut used = 0;
    for (index, ch) in text.chars().enumerate() {
        if ch == '\n' {
            rows.push(Row {
                start,
                end: index + 1,
            });
            start = index + 1;
            used = 0;
            continue;
        }
        let w = ch.width().unwrap_or(0);
        if used + w > width && index > start {
            rows.push(Row { start, end: index });
            start = index;
            used = 0;
        }
        used += w;
    }
    let len = char_len(text);
    if start < len || rows.is_empty() {
        rows.push(Row { start, end: len });
    }
    rows
}

pub fn row_of(rows: &[Row], offset: usize) -> usize {
    rows.iter()
        .position(|row| offset >= row.start && offset < row.end)
        .unwrap_or(rows.len().saturating_sub(1))
}

#[derive(Debug, Clone, Default)]
pub struct TextView {
    pub cursor: usize,
    pub anchor: Option<usize>,
    pub scroll: usize,
}

impl TextView {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn clamp(&mut self, len: usize) {
        let last = len.saturating_sub(1);
        self.cursor = self.cursor.min(last);
        if let Some(anchor) = self.anchor {
            self.anchor = Some(anchor.min(last));
        }
    }

    pub fn toggle_anchor(&mut self) {
        self.anchor = match self.anchor {
            Some(_) => None,
            None => Some(self.cursor),
        };
    }

    pub fn move_by(&mut self, delta: isize, len: usize) {
        let last = len.saturating_sub(1);
        self.cursor = self.cursor.saturating_add_signed(delta).min(last);
    }

    pub fn move_rows(&mut self, delta: isize, rows: &[Row]) {
        if rows.is_empty() {
            return;
        }
        let current = row_of(rows, self.cursor);
        let column = self.cursor - rows[current].start;
        let target = current
            .saturating_add_signed(delta)
            .min(rows.len() - 1);
        let row = rows[target];
        let last_in_row = row.end.saturating_sub(1).max(row.start);
        self.cursor = (row.start + column).min(last_in_row);
    }

    /// Selected characters as a half-open range, cursor inclusive.
    pub fn selection_range(&self) -> Option<(usize, usize)> {
        let anchor = self.anchor?;
        Some((anchor.min(self.cursor), anchor.max(self.cursor) + 1))
    }

    pub fn is_selected(&self, offset: usize) -> bool {
        self.selection_range()
            .is_some_and(|(start, end)| offset >= start && offset < end)
    }

    pub fn ensure_visible(&mut self, rows: &[Row], height: usize) {
        let height = height.max(1);
        let row = row_of(rows, self.cursor);
        if row < self.scroll {
            self.scroll = row;
        } else if row >= self.scroll + height {
            self.scroll = row + 1 - height;
        }
    }
}

pub fn build_selection(
    chunks: &[&str],
    page_text: &str,
    range: (usize, usize),
) -> Option<TextSelection> {
    let (start, end) = range;
    let end = end.min(char_len(page_text));
    if start >= end {
        return None;
    }
    let anchor: ChunkPoint = chunk_point(chunks, start)?;
    Some(TextSelection {
        anchor,
        text: slice_chars(page_text, start, end).to_string(),
    })
}
