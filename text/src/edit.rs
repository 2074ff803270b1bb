//! Edit records shared by every mark plane.
//!
//! An [`EditRecord`] is produced once per buffer edit, before the buffer is
//! mutated, and then fed to every plane ([`crate::MarkTree`], block chains,
//! the checkpoint store) so they all shift the same way.

use crate::mark_tree::Bias;
use ropey::Rope;
use std::ops::Range;

/// An absolute location: character offset plus the zero-based line containing it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    pub offset: usize,
    pub line: usize,
}

impl Position {
    pub const ZERO: Position = Position { offset: 0, line: 0 };

    pub fn new(offset: usize, line: usize) -> Self {
        Self { offset, line }
    }

    /// Resolve `offset` against `text`. The caller guarantees `offset <= len_chars`.
    pub fn in_rope(text: &Rope, offset: usize) -> Self {
        Self {
            offset,
            line: text.char_to_line(offset),
        }
    }
}

/// A replace of `removed_len` characters at `offset` by `inserted_len` characters.
///
/// Removal is applied before insertion. Line fields describe the buffer as it
/// was before the edit: `line` is the line containing `offset` and `line_start`
/// the offset where that line begins.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EditRecord {
    pub offset: usize,
    pub removed_len: usize,
    pub inserted_len: usize,
    pub line: usize,
    pub line_start: usize,
    pub removed_lines: usize,
    pub inserted_lines: usize,
}

impl EditRecord {
    /// Describe replacing `offset..offset + removed_len` of `text` with `inserted`.
    ///
    /// Must be called on the buffer before it is mutated. The range is assumed
    /// to be validated already.
    pub fn from_rope(text: &Rope, offset: usize, removed_len: usize, inserted: &str) -> Self {
        let line = text.char_to_line(offset);
        let removed_lines = text
            .slice(offset..offset + removed_len)
            .chars()
            .filter(|&ch| ch == '\n')
            .count();
        Self {
            offset,
            removed_len,
            inserted_len: inserted.chars().count(),
            line,
            line_start: text.line_to_char(line),
            removed_lines,
            inserted_lines: inserted.matches('\n').count(),
        }
    }

    /// A single-line insertion. Mostly useful for driving a bare tree.
    pub fn insertion(offset: usize, len: usize) -> Self {
        Self {
            offset,
            removed_len: 0,
            inserted_len: len,
            line: 0,
            line_start: 0,
            removed_lines: 0,
            inserted_lines: 0,
        }
    }

    /// A single-line removal. Mostly useful for driving a bare tree.
    pub fn removal(offset: usize, len: usize) -> Self {
        Self {
            offset,
            removed_len: len,
            inserted_len: 0,
            line: 0,
            line_start: 0,
            removed_lines: 0,
            inserted_lines: 0,
        }
    }

    pub fn len_delta(&self) -> isize {
        self.inserted_len as isize - self.removed_len as isize
    }

    pub fn line_delta(&self) -> isize {
        self.inserted_lines as isize - self.removed_lines as isize
    }

    /// Removed range in pre-edit coordinates.
    pub fn removed_range(&self) -> Range<usize> {
        self.offset..self.offset + self.removed_len
    }

    /// Inserted range in post-edit coordinates.
    pub fn inserted_range(&self) -> Range<usize> {
        self.offset..self.offset + self.inserted_len
    }

    /// Where a mark at `offset` with `bias` ends up after this edit.
    ///
    /// Offsets inside or at the end of the removed range collapse to the edit
    /// offset first, then the insertion moves right-biased marks past the new text.
    pub fn map_offset(&self, offset: usize, bias: Bias) -> usize {
        if offset < self.offset {
            offset
        } else if offset <= self.offset + self.removed_len {
            match bias {
                Bias::Left => self.offset,
                Bias::Right => self.offset + self.inserted_len,
            }
        } else {
            offset - self.removed_len + self.inserted_len
        }
    }

    /// Map a range recorded before this edit so it keeps covering the same text.
    pub fn map_range(&self, range: Range<usize>) -> Range<usize> {
        let start = self.map_offset(range.start, Bias::Left);
        let end = self.map_offset(range.end, Bias::Right).max(start);
        start..end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_counts_lines_on_both_sides() {
        let text = Rope::from_str("one\ntwo\nthree\n");
        let edit = EditRecord::from_rope(&text, 5, 6, "X\nY");

        assert_eq!(edit.line, 1);
        assert_eq!(edit.line_start, 4);
        assert_eq!(edit.removed_lines, 1);
        assert_eq!(edit.inserted_lines, 1);
        assert_eq!(edit.inserted_len, 3);
        assert_eq!(edit.len_delta(), -3);
        assert_eq!(edit.line_delta(), 0);
    }

    #[test]
    fn map_offset_follows_bias_at_the_edit_point() {
        let edit = EditRecord::insertion(5, 2);
        assert_eq!(edit.map_offset(4, Bias::Right), 4);
        assert_eq!(edit.map_offset(5, Bias::Left), 5);
        assert_eq!(edit.map_offset(5, Bias::Right), 7);
        assert_eq!(edit.map_offset(9, Bias::Left), 11);
    }

    #[test]
    fn map_offset_collapses_removed_text() {
        let edit = EditRecord {
            inserted_len: 1,
            ..EditRecord::removal(10, 5)
        };
        assert_eq!(edit.map_offset(12, Bias::Left), 10);
        assert_eq!(edit.map_offset(12, Bias::Right), 11);
        assert_eq!(edit.map_offset(15, Bias::Left), 10);
        assert_eq!(edit.map_offset(16, Bias::Left), 12);
    }

    #[test]
    fn map_range_keeps_pending_damage_covered() {
        let edit = EditRecord::removal(2, 4);
        assert_eq!(edit.map_range(3..10), 2..6);
        assert_eq!(edit.map_range(0..1), 0..1);
    }
}
