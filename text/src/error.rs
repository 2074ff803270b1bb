use crate::{block_chain::BlockRelation, document::LayerId, mark_tree::MarkHandle};
use snafu::Snafu;
use std::ops::Range;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Recoverable failures surfaced to the direct caller.
///
/// Broken internal invariants are not represented here: they panic with a
/// "corrupt mark tree" message instead of being returned.
#[derive(Debug, Snafu, PartialEq, Eq)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    /// The mark was removed, or belongs to a slot that has since been reused.
    #[snafu(display("Mark {handle:?} is not attached to this tree"))]
    InvalidMark { handle: MarkHandle },

    /// An offset or range end lies outside `0..=len`.
    #[snafu(display("Offset {offset} is outside the buffer (length {len})"))]
    OutOfRange { offset: usize, len: usize },

    /// The edit intersects a guarded block and guard breaking is not enabled.
    #[snafu(display(
        "Edit {start}..{end} intersects guarded block {}..{} ({relation:?})",
        block.start,
        block.end
    ))]
    GuardViolation {
        start: usize,
        end: usize,
        relation: BlockRelation,
        block: Range<usize>,
    },

    #[snafu(display("Layer {layer:?} does not exist on this document"))]
    UnknownLayer { layer: LayerId },
}

impl Error {
    /// Whether the caller should simply drop its reference to the mark.
    pub fn is_invalid_mark(&self) -> bool {
        matches!(self, Error::InvalidMark { .. })
    }
}

/// Abort on a broken tree invariant.
#[cold]
#[track_caller]
pub(crate) fn corrupt(message: &str) -> ! {
    panic!("corrupt mark tree: {message}")
}
