//! Ordered, disjoint ranges held by pairs of marks.
//!
//! Block starts are [`Bias::Right`] and ends [`Bias::Left`], so text typed at
//! either boundary lands outside the block. Blocks that shrink to nothing
//! after an edit are pruned.

use crate::{
    edit::{EditRecord, Position},
    error::{corrupt, OutOfRangeSnafu, Result},
    mark_tree::{Bias, MarkHandle, MarkTree},
};
use snafu::ensure;
use std::ops::Range;

/// How a queried range relates to the first block it intersects.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlockRelation {
    /// No block intersects the range.
    Outside,
    /// The range starts before the block and ends inside it.
    OverlapBegin,
    /// The range lies within the block.
    Inner,
    /// The range starts inside the block and ends after it.
    OverlapEnd,
    /// The range covers the whole block.
    FullOverlap,
}

#[derive(Clone, Copy, Debug)]
struct Block {
    start: MarkHandle,
    end: MarkHandle,
    active: bool,
}

/// Snapshot of one block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockInfo {
    /// Position in the chain.
    pub index: usize,
    pub range: Range<usize>,
    pub active: bool,
}

#[derive(Debug)]
pub struct BlockChain {
    marks: MarkTree,
    blocks: Vec<Block>,
}

impl BlockChain {
    pub fn new(len: usize) -> Self {
        Self {
            marks: MarkTree::new(len),
            blocks: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Add `range` as an active block. A block produced by merging is active.
    ///
    /// Overlapping blocks are merged into it. Blocks that merely touch it are
    /// merged only with `concatenate_adjacent`. Empty ranges are ignored.
    pub fn add_block(&mut self, range: Range<Position>, concatenate_adjacent: bool) -> Result<()> {
        self.check_range(&range)?;
        if range.start.offset >= range.end.offset {
            return Ok(());
        }
        let (start, end) = (range.start.offset, range.end.offset);

        let first = if concatenate_adjacent {
            self.blocks.partition_point(|block| self.end_of(block) < start)
        } else {
            self.blocks.partition_point(|block| self.end_of(block) <= start)
        };
        let last = if concatenate_adjacent {
            self.blocks.partition_point(|block| self.start_of(block) <= end)
        } else {
            self.blocks.partition_point(|block| self.start_of(block) < end)
        };

        let mut merged = range;
        if first < last {
            let head = self.blocks[first];
            let tail = self.blocks[last - 1];
            let head_start = self.position_of(head.start);
            let tail_end = self.position_of(tail.end);
            if head_start.offset < merged.start.offset {
                merged.start = head_start;
            }
            if tail_end.offset > merged.end.offset {
                merged.end = tail_end;
            }
            for block in self.blocks.drain(first..last).collect::<Vec<_>>() {
                self.release(block);
            }
        }

        let block = self.make_block(merged, true)?;
        self.blocks.insert(first, block);
        Ok(())
    }

    /// Clear `range` from the chain, deleting, truncating or splitting the
    /// blocks it intersects.
    pub fn remove_block(&mut self, range: Range<Position>) -> Result<()> {
        self.check_range(&range)?;
        let (start, end) = (range.start.offset, range.end.offset);
        if start >= end {
            return Ok(());
        }

        let first = self
            .blocks
            .partition_point(|block| self.end_of(block) <= start);
        let mut ix = first;
        while ix < self.blocks.len() {
            let block = self.blocks[ix];
            let (block_start, block_end) = (self.start_of(&block), self.end_of(&block));
            if block_start >= end {
                break;
            }

            if start <= block_start && block_end <= end {
                self.blocks.remove(ix);
                self.release(block);
                continue;
            }
            if block_start < start && block_end > end {
                let tail_end = self.position_of(block.end);
                self.replace_end(ix, range.start)?;
                let tail = self.make_block(range.end..tail_end, block.active)?;
                self.blocks.insert(ix + 1, tail);
                break;
            }
            if block_start < start {
                self.replace_end(ix, range.start)?;
            } else {
                self.replace_start(ix, range.end)?;
            }
            ix += 1;
        }
        Ok(())
    }

    /// Relation of `range` to the first block ending after `range.start`.
    pub fn compare_block(&self, range: Range<usize>) -> BlockRelation {
        self.intersecting(range)
            .map_or(BlockRelation::Outside, |(relation, _)| relation)
    }

    /// Like [`Self::compare_block`], also returning the intersected block.
    ///
    /// An empty range at `p` intersects a block only when `p` lies strictly
    /// inside it.
    pub fn intersecting(&self, range: Range<usize>) -> Option<(BlockRelation, Range<usize>)> {
        let (start, end) = (range.start, range.end);
        let ix = self
            .blocks
            .partition_point(|block| self.end_of(block) <= start);
        let block = self.blocks.get(ix)?;
        let (block_start, block_end) = (self.start_of(block), self.end_of(block));
        if block_start >= end {
            return None;
        }

        let relation = if start >= block_start && end <= block_end {
            BlockRelation::Inner
        } else if start <= block_start && end >= block_end {
            BlockRelation::FullOverlap
        } else if start < block_start {
            BlockRelation::OverlapBegin
        } else {
            BlockRelation::OverlapEnd
        };
        Some((relation, block_start..block_end))
    }

    /// Whether `offset` lies in `start..end` of some block.
    pub fn is_inside(&self, offset: usize) -> bool {
        let ix = self
            .blocks
            .partition_point(|block| self.end_of(block) <= offset);
        self.blocks
            .get(ix)
            .is_some_and(|block| self.start_of(block) <= offset)
    }

    pub fn set_active(&mut self, index: usize, active: bool) -> bool {
        match self.blocks.get_mut(index) {
            Some(block) => {
                block.active = active;
                true
            },
            None => false,
        }
    }

    pub fn blocks(&self) -> impl Iterator<Item = BlockInfo> + '_ {
        self.blocks.iter().enumerate().map(|(index, block)| BlockInfo {
            index,
            range: self.start_of(block)..self.end_of(block),
            active: block.active,
        })
    }

    pub fn apply_edit(&mut self, edit: &EditRecord) -> Result<()> {
        self.marks.apply_edit(edit)?;
        let mut pruned = Vec::new();
        self.blocks.retain(|block| {
            let keep = match (self.marks.offset_of(block.start), self.marks.offset_of(block.end)) {
                (Ok(start), Ok(end)) => start < end,
                _ => false,
            };
            if !keep {
                pruned.push(*block);
            }
            keep
        });
        for block in pruned {
            self.release(block);
        }
        Ok(())
    }

    fn check_range(&self, range: &Range<Position>) -> Result<()> {
        let len = self.marks.len();
        ensure!(
            range.end.offset <= len,
            OutOfRangeSnafu {
                offset: range.end.offset,
                len,
            }
        );
        Ok(())
    }

    fn make_block(&mut self, range: Range<Position>, active: bool) -> Result<Block> {
        Ok(Block {
            start: self.marks.insert(range.start, Bias::Right)?,
            end: self.marks.insert(range.end, Bias::Left)?,
            active,
        })
    }

    fn replace_start(&mut self, ix: usize, start: Position) -> Result<()> {
        let old = self.blocks[ix].start;
        self.blocks[ix].start = self.marks.insert(start, Bias::Right)?;
        self.marks.remove(old)?;
        Ok(())
    }

    fn replace_end(&mut self, ix: usize, end: Position) -> Result<()> {
        let old = self.blocks[ix].end;
        self.blocks[ix].end = self.marks.insert(end, Bias::Left)?;
        self.marks.remove(old)?;
        Ok(())
    }

    fn release(&mut self, block: Block) {
        for handle in [block.start, block.end] {
            if self.marks.remove(handle).is_err() {
                corrupt("block mark detached");
            }
        }
    }

    fn position_of(&self, handle: MarkHandle) -> Position {
        self.marks
            .position(handle)
            .unwrap_or_else(|_| corrupt("block mark detached"))
    }

    fn start_of(&self, block: &Block) -> usize {
        self.position_of(block.start).offset
    }

    fn end_of(&self, block: &Block) -> usize {
        self.position_of(block.end).offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(start: usize, end: usize) -> Range<Position> {
        Position::new(start, 0)..Position::new(end, 0)
    }

    fn ranges(chain: &BlockChain) -> Vec<Range<usize>> {
        chain.blocks().map(|block| block.range).collect()
    }

    #[test]
    fn overlapping_blocks_merge() {
        let mut chain = BlockChain::new(100);
        chain.add_block(span(10, 20), false).unwrap();
        chain.add_block(span(30, 40), false).unwrap();
        chain.add_block(span(15, 35), false).unwrap();
        assert_eq!(ranges(&chain), vec![10..40]);
    }

    #[test]
    fn touching_blocks_merge_only_when_asked() {
        let mut chain = BlockChain::new(100);
        chain.add_block(span(10, 20), false).unwrap();
        chain.add_block(span(20, 30), false).unwrap();
        assert_eq!(ranges(&chain), vec![10..20, 20..30]);

        let mut chain = BlockChain::new(100);
        chain.add_block(span(10, 20), true).unwrap();
        chain.add_block(span(20, 30), true).unwrap();
        chain.add_block(span(0, 10), true).unwrap();
        assert_eq!(ranges(&chain), vec![0..30]);
    }

    #[test]
    fn remove_truncates_splits_and_deletes() {
        let mut chain = BlockChain::new(100);
        chain.add_block(span(0, 10), false).unwrap();
        chain.add_block(span(20, 30), false).unwrap();
        chain.add_block(span(40, 60), false).unwrap();

        chain.remove_block(span(5, 25)).unwrap();
        assert_eq!(ranges(&chain), vec![0..5, 25..30, 40..60]);

        chain.remove_block(span(45, 50)).unwrap();
        assert_eq!(ranges(&chain), vec![0..5, 25..30, 40..45, 50..60]);

        chain.remove_block(span(20, 35)).unwrap();
        assert_eq!(ranges(&chain), vec![0..5, 40..45, 50..60]);
    }

    #[test]
    fn compare_block_classifies_ranges() {
        let mut chain = BlockChain::new(100);
        chain.add_block(span(10, 20), false).unwrap();

        assert_eq!(chain.compare_block(0..5), BlockRelation::Outside);
        assert_eq!(chain.compare_block(0..10), BlockRelation::Outside);
        assert_eq!(chain.compare_block(20..25), BlockRelation::Outside);
        assert_eq!(chain.compare_block(5..15), BlockRelation::OverlapBegin);
        assert_eq!(chain.compare_block(12..18), BlockRelation::Inner);
        assert_eq!(chain.compare_block(15..25), BlockRelation::OverlapEnd);
        assert_eq!(chain.compare_block(5..25), BlockRelation::FullOverlap);
        assert_eq!(chain.compare_block(10..20), BlockRelation::Inner);
    }

    #[test]
    fn empty_ranges_only_hit_block_interiors() {
        let mut chain = BlockChain::new(100);
        chain.add_block(span(10, 20), false).unwrap();

        assert_eq!(chain.compare_block(10..10), BlockRelation::Outside);
        assert_eq!(chain.compare_block(15..15), BlockRelation::Inner);
        assert_eq!(chain.compare_block(20..20), BlockRelation::Outside);
        assert!(chain.is_inside(10));
        assert!(!chain.is_inside(20));
    }

    #[test]
    fn edits_shift_blocks_and_prune_empty_ones() {
        let mut chain = BlockChain::new(100);
        chain.add_block(span(10, 20), false).unwrap();
        chain.add_block(span(30, 35), false).unwrap();

        chain.apply_edit(&EditRecord::insertion(10, 3)).unwrap();
        assert_eq!(ranges(&chain), vec![13..23, 33..38]);

        chain.apply_edit(&EditRecord::insertion(23, 2)).unwrap();
        assert_eq!(ranges(&chain), vec![13..23, 35..40]);

        chain.apply_edit(&EditRecord::removal(30, 15)).unwrap();
        assert_eq!(ranges(&chain), vec![13..23]);
    }

    #[test]
    fn merged_block_is_active() {
        let mut chain = BlockChain::new(50);
        chain.add_block(span(0, 5), false).unwrap();
        chain.add_block(span(10, 15), false).unwrap();
        assert!(chain.set_active(0, false));
        assert!(chain.set_active(1, false));
        assert!(!chain.set_active(2, false));

        chain.add_block(span(3, 12), false).unwrap();
        assert_eq!(ranges(&chain), vec![0..15]);
        assert!(chain.blocks().all(|block| block.active));
    }

    #[test]
    fn released_blocks_give_back_their_marks() {
        let mut chain = BlockChain::new(60);
        chain.add_block(span(0, 10), false).unwrap();
        chain.add_block(span(20, 30), false).unwrap();
        chain.add_block(span(40, 50), false).unwrap();
        chain.add_block(span(5, 25), false).unwrap();
        assert_eq!(chain.marks.mark_count(), 2 * chain.len());

        chain.remove_block(span(38, 52)).unwrap();
        assert_eq!(chain.marks.mark_count(), 2 * chain.len());

        chain.apply_edit(&EditRecord::removal(0, 30)).unwrap();
        assert!(chain.is_empty());
        assert!(chain.marks.is_empty());
        chain.marks.check_invariants();
    }
}
