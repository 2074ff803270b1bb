//! Read-only regions and the check every edit passes before it mutates anything.

use crate::{
    block_chain::{BlockChain, BlockRelation},
    edit::{EditRecord, Position},
    error::{GuardViolationSnafu, Result},
};
use std::ops::Range;

#[derive(Debug)]
pub struct Guards {
    chain: BlockChain,
}

impl Guards {
    pub fn new(len: usize) -> Self {
        Self {
            chain: BlockChain::new(len),
        }
    }

    /// Guard `range`. Ranges that touch an existing guarded range join it.
    pub fn add(&mut self, range: Range<Position>) -> Result<()> {
        self.chain.add_block(range, true)
    }

    pub fn remove(&mut self, range: Range<Position>) -> Result<()> {
        self.chain.remove_block(range)
    }

    pub fn is_guarded(&self, offset: usize) -> bool {
        self.chain.is_inside(offset)
    }

    pub fn ranges(&self) -> Vec<Range<usize>> {
        self.chain.blocks().map(|block| block.range).collect()
    }

    /// Reject replacing `offset..offset + removed_len` if it touches guarded text.
    ///
    /// A pure insertion is rejected only strictly inside a guarded range; typing
    /// at either boundary is allowed.
    pub fn check(&self, offset: usize, removed_len: usize, break_guarded: bool) -> Result<()> {
        if break_guarded {
            return Ok(());
        }
        let end = offset + removed_len;
        match self.chain.intersecting(offset..end) {
            None | Some((BlockRelation::Outside, _)) => Ok(()),
            Some((relation, block)) => {
                tracing::debug!(offset, end, ?relation, ?block, "rejected guarded edit");
                GuardViolationSnafu {
                    start: offset,
                    end,
                    relation,
                    block,
                }
                .fail()
            },
        }
    }

    pub fn apply_edit(&mut self, edit: &EditRecord) -> Result<()> {
        self.chain.apply_edit(edit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    fn guards(range: Range<usize>, len: usize) -> Guards {
        let mut guards = Guards::new(len);
        guards
            .add(Position::new(range.start, 0)..Position::new(range.end, 0))
            .unwrap();
        guards
    }

    #[test]
    fn removal_across_a_guard_is_rejected() {
        let guards = guards(10..20, 30);
        let err = guards.check(15, 10, false).unwrap_err();
        assert_eq!(
            err,
            Error::GuardViolation {
                start: 15,
                end: 25,
                relation: BlockRelation::OverlapEnd,
                block: 10..20,
            }
        );
    }

    #[test]
    fn break_guarded_bypasses_the_check() {
        let guards = guards(10..20, 30);
        assert!(guards.check(15, 10, true).is_ok());
    }

    #[test]
    fn boundaries_accept_insertions() {
        let guards = guards(10..20, 30);
        assert!(guards.check(10, 0, false).is_ok());
        assert!(guards.check(20, 0, false).is_ok());
        assert!(guards.check(11, 0, false).is_err());
        assert!(guards.check(0, 10, false).is_ok());
        assert!(guards.check(20, 5, false).is_ok());
    }

    #[test]
    fn adjacent_guards_join() {
        let mut guards = guards(10..20, 30);
        guards
            .add(Position::new(20, 0)..Position::new(25, 0))
            .unwrap();
        assert_eq!(guards.ranges(), vec![10..25]);
        assert!(guards.is_guarded(22));

        guards
            .remove(Position::new(12, 0)..Position::new(14, 0))
            .unwrap();
        assert_eq!(guards.ranges(), vec![10..12, 14..25]);
        assert!(!guards.is_guarded(13));
    }
}
