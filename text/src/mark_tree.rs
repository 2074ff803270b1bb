//! Marks: buffer positions that survive edits.
//!
//! A [`MarkTree`] stores an ordered sequence of marks in a B-tree whose nodes
//! live in slot arrays owned by the tree. Each mark stores only the offset and
//! line distance from its in-order predecessor, and every node caches the sum
//! of the deltas below it. An absolute position is therefore the sum of the
//! cached spans to the left of the root-to-mark path, and an edit only rewrites
//! the deltas of the marks inside the edited span plus the first mark after it.
//!
//! ```text
//! offsets:  0    5    5    10
//! deltas:   0    5    0    5      (bias tie-break: Left marks precede Right marks)
//! ```
//!
//! Handles are an index plus a generation counter. Removing a mark bumps the
//! slot generation, so a stale handle is rejected with
//! [`Error::InvalidMark`](crate::Error::InvalidMark) instead of aliasing a
//! newer mark.
//!
//! A tree is one *plane*. Several planes can track the same buffer; each must
//! be fed every [`EditRecord`].

use crate::{
    edit::{EditRecord, Position},
    error::{corrupt, InvalidMarkSnafu, OutOfRangeSnafu, Result},
};
use smallvec::{smallvec, SmallVec};
use snafu::{ensure, OptionExt};
use std::fmt;

const TREE_BASE: usize = 6;
const MAX_ENTRIES: usize = 2 * TREE_BASE;
const MIN_ENTRIES: usize = TREE_BASE / 2;

/// Which side of inserted text a mark sticks to when the insertion happens
/// exactly at the mark.
///
/// A `Left` mark keeps its offset and ends up before the new text, like an
/// anchor that must not swallow text typed at its own position. A `Right`
/// mark moves past the new text, like an insertion cursor.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Bias {
    #[default]
    Left,
    Right,
}

/// Stable reference to a mark in one [`MarkTree`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MarkHandle {
    index: u32,
    generation: u32,
}

/// What happens to a mark when the text around it is deleted.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum OnRemoved {
    /// Move to the start of the deleted range and stay attached.
    #[default]
    Collapse,
    /// Leave the tree; the handle becomes invalid after the callback runs.
    Detach,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct MarkOptions {
    pub bias: Bias,
    /// Snap to the start of the line when collapsed by a deletion.
    pub stay_at_line_start: bool,
    pub on_removed: OnRemoved,
}

impl MarkOptions {
    pub fn new(bias: Bias) -> Self {
        Self {
            bias,
            ..Self::default()
        }
    }

    pub fn stay_at_line_start(mut self) -> Self {
        self.stay_at_line_start = true;
        self
    }

    pub fn detach_on_removal(mut self) -> Self {
        self.on_removed = OnRemoved::Detach;
        self
    }
}

/// Notification for a mark whose text was deleted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MarkRemoved {
    pub handle: MarkHandle,
    /// Offset of the mark before the edit.
    pub offset: usize,
    /// Where the mark ended up, or `None` if it was detached.
    pub position: Option<Position>,
}

pub type RemovalCallback = Box<dyn FnMut(&MarkRemoved) + Send + Sync>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct Span {
    offset: usize,
    lines: usize,
    count: usize,
}

impl Span {
    fn add(&mut self, other: &Span) {
        self.offset += other.offset;
        self.lines += other.lines;
        self.count += other.count;
    }

    fn position(&self) -> Position {
        Position::new(self.offset, self.lines)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct NodeId(u32);

type Entries = SmallVec<[u32; MAX_ENTRIES + 1]>;

/// A leaf holds mark indices, an internal node holds child node ids.
struct Node {
    parent: Option<NodeId>,
    leaf: bool,
    entries: Entries,
    span: Span,
}

struct Mark<T> {
    leaf: NodeId,
    delta_offset: usize,
    delta_lines: usize,
    options: MarkOptions,
    callback: Option<RemovalCallback>,
    data: T,
}

struct MarkSlot<T> {
    generation: u32,
    mark: Option<Mark<T>>,
}

/// Insertion point found by descending the tree.
#[derive(Clone, Copy, Debug)]
struct Seek {
    leaf: NodeId,
    index: usize,
    /// Absolute position of the mark just before `index`.
    before: Position,
}

pub struct MarkTree<T = ()> {
    marks: Vec<MarkSlot<T>>,
    free_marks: Vec<u32>,
    nodes: Vec<Option<Node>>,
    free_nodes: Vec<u32>,
    root: NodeId,
    len: usize,
}

impl<T> fmt::Debug for MarkTree<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MarkTree")
            .field("len", &self.len)
            .field("marks", &self.mark_count())
            .finish()
    }
}

impl<T> MarkTree<T> {
    /// An empty plane over a buffer of `len` characters.
    pub fn new(len: usize) -> Self {
        Self {
            marks: Vec::new(),
            free_marks: Vec::new(),
            nodes: vec![Some(Node {
                parent: None,
                leaf: true,
                entries: Entries::new(),
                span: Span::default(),
            })],
            free_nodes: Vec::new(),
            root: NodeId(0),
            len,
        }
    }

    /// Length of the tracked buffer.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn mark_count(&self) -> usize {
        self.node(self.root).span.count
    }

    pub fn is_empty(&self) -> bool {
        self.mark_count() == 0
    }

    pub fn insert(&mut self, position: Position, bias: Bias) -> Result<MarkHandle>
    where
        T: Default,
    {
        self.insert_with(position, MarkOptions::new(bias), T::default())
    }

    /// Attach a new mark at `position`.
    ///
    /// `position.line` must be the line containing `position.offset`.
    pub fn insert_with(
        &mut self,
        position: Position,
        options: MarkOptions,
        data: T,
    ) -> Result<MarkHandle> {
        ensure!(
            position.offset <= self.len,
            OutOfRangeSnafu {
                offset: position.offset,
                len: self.len,
            }
        );
        let index = self.alloc_mark(Mark {
            leaf: self.root,
            delta_offset: 0,
            delta_lines: 0,
            options,
            callback: None,
            data,
        });
        self.link(index, position);
        Ok(self.handle_of(index))
    }

    /// Detach a mark and hand back its payload.
    pub fn remove(&mut self, handle: MarkHandle) -> Result<T> {
        let index = self.resolve(handle)?;
        self.unlink(index);
        Ok(self.free_mark(index))
    }

    pub fn contains(&self, handle: MarkHandle) -> bool {
        self.resolve(handle).is_ok()
    }

    pub fn position(&self, handle: MarkHandle) -> Result<Position> {
        let index = self.resolve(handle)?;
        Ok(self.position_of(index))
    }

    pub fn offset_of(&self, handle: MarkHandle) -> Result<usize> {
        self.position(handle).map(|position| position.offset)
    }

    pub fn line_of(&self, handle: MarkHandle) -> Result<usize> {
        self.position(handle).map(|position| position.line)
    }

    pub fn options(&self, handle: MarkHandle) -> Result<MarkOptions> {
        let index = self.resolve(handle)?;
        Ok(self.mark(index).options)
    }

    pub fn data(&self, handle: MarkHandle) -> Result<&T> {
        let index = self.resolve(handle)?;
        Ok(&self.mark(index).data)
    }

    pub fn data_mut(&mut self, handle: MarkHandle) -> Result<&mut T> {
        let index = self.resolve(handle)?;
        Ok(&mut self.mark_mut(index).data)
    }

    /// Run `callback` once each time this mark's text is deleted.
    pub fn set_removal_callback(
        &mut self,
        handle: MarkHandle,
        callback: RemovalCallback,
    ) -> Result<()> {
        let index = self.resolve(handle)?;
        self.mark_mut(index).callback = Some(callback);
        Ok(())
    }

    pub fn first(&self) -> Option<MarkHandle> {
        let seek = self.seek(|_| true);
        self.mark_at(seek).map(|index| self.handle_of(index))
    }

    pub fn next(&self, handle: MarkHandle) -> Result<Option<MarkHandle>> {
        let index = self.resolve(handle)?;
        Ok(self.next_mark(index).map(|next| self.handle_of(next)))
    }

    pub fn prev(&self, handle: MarkHandle) -> Result<Option<MarkHandle>> {
        let index = self.resolve(handle)?;
        Ok(self.prev_mark(index).map(|prev| self.handle_of(prev)))
    }

    /// First mark at `offset` or later.
    pub fn first_at_or_after(&self, offset: usize) -> Option<MarkHandle> {
        let seek = self.seek(|at| at >= offset);
        self.mark_at(seek).map(|index| self.handle_of(index))
    }

    /// Last mark strictly before `offset`.
    pub fn last_before(&self, offset: usize) -> Option<MarkHandle> {
        let seek = self.seek(|at| at >= offset);
        self.mark_before(seek).map(|index| self.handle_of(index))
    }

    /// Last mark at `offset` or earlier.
    pub fn last_at_or_before(&self, offset: usize) -> Option<MarkHandle> {
        let seek = self.seek(|at| at > offset);
        self.mark_before(seek).map(|index| self.handle_of(index))
    }

    /// All marks in buffer order.
    pub fn iter(&self) -> Iter<'_, T> {
        let seek = self.seek(|_| true);
        Iter {
            tree: self,
            next: self.mark_at(seek),
            at: Position::ZERO,
        }
    }

    /// Marks at `offset` or later, in buffer order.
    pub fn iter_from(&self, offset: usize) -> Iter<'_, T> {
        let seek = self.seek(|at| at >= offset);
        Iter {
            tree: self,
            next: self.mark_at(seek),
            at: seek.before,
        }
    }

    /// Shift every mark for one buffer edit.
    ///
    /// Marks in `offset..offset + removed_len` are reported in ascending order,
    /// after their removal policy ran and their callback fired exactly once.
    /// Marks exactly at the end of the removed range collapse too but are not
    /// reported, since their text survives.
    pub fn apply_edit(&mut self, edit: &EditRecord) -> Result<Vec<MarkRemoved>> {
        let end = edit.offset + edit.removed_len;
        ensure!(
            end <= self.len,
            OutOfRangeSnafu {
                offset: end,
                len: self.len,
            }
        );

        let mut removed = Vec::new();
        if edit.removed_len > 0 {
            removed = self.collapse_removed(edit);
        }
        self.len -= edit.removed_len;
        if edit.inserted_len > 0 {
            self.shift_inserted(edit);
        }
        self.len += edit.inserted_len;

        if !removed.is_empty() {
            self.settle_removed(edit, &mut removed);
        }
        tracing::trace!(
            offset = edit.offset,
            removed = edit.removed_len,
            inserted = edit.inserted_len,
            notified = removed.len(),
            "applied edit to mark plane"
        );
        Ok(removed)
    }

    /// Panic if any structural invariant is broken.
    pub fn check_invariants(&self) {
        let root = self.node(self.root);
        if root.parent.is_some() {
            corrupt("root has a parent");
        }
        self.check_node(self.root);

        let mut at = Position::ZERO;
        let mut previous_bias = None;
        let mut seen = 0;
        let mut next = self.mark_at(self.seek(|_| true));
        while let Some(index) = next {
            let mark = self.mark(index);
            if mark.delta_offset == 0
                && previous_bias == Some(Bias::Right)
                && mark.options.bias == Bias::Left
            {
                corrupt("left-biased mark follows a right-biased mark at the same offset");
            }
            at = Position::new(at.offset + mark.delta_offset, at.line + mark.delta_lines);
            previous_bias = Some(mark.options.bias);
            seen += 1;
            next = self.next_mark(index);
        }
        if at.offset > self.len {
            corrupt("mark beyond end of buffer");
        }
        let live = self.marks.iter().filter(|slot| slot.mark.is_some()).count();
        if seen != live || seen != self.mark_count() {
            corrupt("live marks are not all reachable");
        }
    }

    fn check_node(&self, id: NodeId) -> Span {
        let node = self.node(id);
        if node.entries.len() > MAX_ENTRIES {
            corrupt("node over capacity");
        }
        if !node.leaf && node.entries.is_empty() {
            corrupt("empty internal node");
        }
        let mut span = Span::default();
        for &entry in &node.entries {
            if node.leaf {
                if self.mark(entry).leaf != id {
                    corrupt("mark points at the wrong leaf");
                }
            } else {
                let child = NodeId(entry);
                if self.node(child).parent != Some(id) {
                    corrupt("child points at the wrong parent");
                }
                self.check_node(child);
            }
            span.add(&self.entry_span(node.leaf, entry));
        }
        if span != node.span {
            corrupt("cached span is stale");
        }
        span
    }

    // -- edits --

    /// Collapse marks in `offset..=offset + removed_len` onto `offset` and pull the
    /// follower back. Returns notices for the marks strictly inside the removed text.
    fn collapse_removed(&mut self, edit: &EditRecord) -> Vec<MarkRemoved> {
        let start = edit.offset;
        let end = start + edit.removed_len;
        let seek = self.seek(|at| at >= start);

        let mut group: Vec<(u32, usize)> = Vec::new();
        let mut follower = None;
        let mut at = seek.before;
        let mut next = self.mark_at(seek);
        while let Some(index) = next {
            let mark = self.mark(index);
            let here = Position::new(at.offset + mark.delta_offset, at.line + mark.delta_lines);
            if here.offset > end {
                follower = Some((index, here));
                break;
            }
            group.push((index, here.offset));
            at = here;
            next = self.next_mark(index);
        }

        let mut touched: SmallVec<[NodeId; 4]> = SmallVec::new();
        let collapsed = Position::new(start, edit.line);
        let predecessor = if group.is_empty() {
            seek.before
        } else {
            let (leaf, slot) = self.locate(group[0].0);
            self.order_by_bias(&group);
            let head = self.node(leaf).entries[slot];
            let first_delta = (
                checked_delta(start, seek.before.offset),
                checked_delta(edit.line, seek.before.line),
            );
            let entries: Vec<u32> = self.run_from(head, group.len());
            for (ix, &index) in entries.iter().enumerate() {
                let mark = self.mark_mut(index);
                (mark.delta_offset, mark.delta_lines) = if ix == 0 { first_delta } else { (0, 0) };
                let leaf = mark.leaf;
                if !touched.contains(&leaf) {
                    touched.push(leaf);
                }
            }
            collapsed
        };

        if let Some((index, here)) = follower {
            let offset = here.offset - edit.removed_len;
            let line = checked_delta(here.line, edit.removed_lines);
            let mark = self.mark_mut(index);
            mark.delta_offset = checked_delta(offset, predecessor.offset);
            mark.delta_lines = checked_delta(line, predecessor.line);
            let leaf = mark.leaf;
            if !touched.contains(&leaf) {
                touched.push(leaf);
            }
        }
        for leaf in touched {
            self.refresh_upward(leaf);
        }

        group
            .into_iter()
            .filter(|&(_, offset)| offset < end)
            .map(|(index, offset)| MarkRemoved {
                handle: self.handle_of(index),
                offset,
                position: Some(collapsed),
            })
            .collect()
    }

    /// Stable-partition a run of marks that now share one offset so left-biased
    /// marks come first.
    fn order_by_bias(&mut self, group: &[(u32, usize)]) {
        let lefts = group
            .iter()
            .filter(|&&(index, _)| self.mark(index).options.bias == Bias::Left);
        let rights = group
            .iter()
            .filter(|&&(index, _)| self.mark(index).options.bias == Bias::Right);
        let ordered: Vec<u32> = lefts.chain(rights).map(|&(index, _)| index).collect();
        if ordered.iter().zip(group).all(|(a, (b, _))| a == b) {
            return;
        }

        let slots: Vec<(NodeId, usize)> = group
            .iter()
            .map(|&(index, _)| self.locate(index))
            .collect();
        for ((leaf, slot), index) in slots.into_iter().zip(ordered) {
            self.node_mut(leaf).entries[slot] = index;
            self.mark_mut(index).leaf = leaf;
        }
    }

    /// Collect `count` consecutive marks starting at `head`.
    fn run_from(&self, head: u32, count: usize) -> Vec<u32> {
        let mut run = Vec::with_capacity(count);
        let mut next = Some(head);
        while let Some(index) = next {
            if run.len() == count {
                break;
            }
            run.push(index);
            next = self.next_mark(index);
        }
        run
    }

    /// Push the first mark that must move past the inserted text; every later
    /// mark follows through its relative delta.
    fn shift_inserted(&mut self, edit: &EditRecord) {
        let start = edit.offset;
        let seek = self.seek(|at| at >= start);
        let mut at = seek.before.offset;
        let mut next = self.mark_at(seek);
        while let Some(index) = next {
            let mark = self.mark(index);
            let here = at + mark.delta_offset;
            if here > start || mark.options.bias == Bias::Right {
                let mark = self.mark_mut(index);
                mark.delta_offset += edit.inserted_len;
                mark.delta_lines += edit.inserted_lines;
                let leaf = mark.leaf;
                self.refresh_upward(leaf);
                return;
            }
            at = here;
            next = self.next_mark(index);
        }
    }

    /// Apply removal policies and fire callbacks, in ascending original order.
    fn settle_removed(&mut self, edit: &EditRecord, removed: &mut [MarkRemoved]) {
        for notice in removed.iter_mut() {
            let index = notice.handle.index;
            let options = self.mark(index).options;
            match options.on_removed {
                OnRemoved::Collapse => {
                    if options.stay_at_line_start && edit.line_start < edit.offset {
                        self.unlink(index);
                        self.link(index, Position::new(edit.line_start, edit.line));
                    }
                    notice.position = Some(self.position_of(index));
                },
                OnRemoved::Detach => notice.position = None,
            }
            if let Some(callback) = self.mark_mut(index).callback.as_mut() {
                callback(notice);
            }
            if options.on_removed == OnRemoved::Detach {
                self.unlink(index);
                self.free_mark(index);
            }
        }
    }

    // -- structure --

    /// Place an allocated, unlinked mark at `position`.
    fn link(&mut self, index: u32, position: Position) {
        let seek = match self.mark(index).options.bias {
            Bias::Left => self.seek(|at| at >= position.offset),
            Bias::Right => self.seek(|at| at > position.offset),
        };
        let delta_offset = checked_delta(position.offset, seek.before.offset);
        let delta_lines = checked_delta(position.line, seek.before.line);

        if let Some(successor) = self.mark_at(seek) {
            let mark = self.mark_mut(successor);
            mark.delta_offset = checked_delta(mark.delta_offset, delta_offset);
            mark.delta_lines = checked_delta(mark.delta_lines, delta_lines);
            let leaf = mark.leaf;
            if leaf != seek.leaf {
                self.refresh_upward(leaf);
            }
        }

        let mark = self.mark_mut(index);
        mark.leaf = seek.leaf;
        mark.delta_offset = delta_offset;
        mark.delta_lines = delta_lines;
        self.node_mut(seek.leaf).entries.insert(seek.index, index);
        self.refresh_upward(seek.leaf);
        self.split_if_needed(seek.leaf);
    }

    /// Take a mark out of the sequence, keeping its slot alive.
    fn unlink(&mut self, index: u32) {
        let (leaf, slot) = self.locate(index);
        let (delta_offset, delta_lines) = {
            let mark = self.mark(index);
            (mark.delta_offset, mark.delta_lines)
        };
        if let Some(successor) = self.next_mark(index) {
            let mark = self.mark_mut(successor);
            mark.delta_offset += delta_offset;
            mark.delta_lines += delta_lines;
            let successor_leaf = mark.leaf;
            if successor_leaf != leaf {
                self.refresh_upward(successor_leaf);
            }
        }
        self.node_mut(leaf).entries.remove(slot);
        self.refresh_upward(leaf);
        self.rebalance(leaf);
    }

    fn split_if_needed(&mut self, mut id: NodeId) {
        loop {
            let len = self.node(id).entries.len();
            if len <= MAX_ENTRIES {
                return;
            }
            let node = self.node_mut(id);
            let right: Entries = node.entries.drain(len / 2..).collect();
            let (leaf, parent) = (node.leaf, node.parent);
            let right_id = self.alloc_node(Node {
                parent,
                leaf,
                entries: right,
                span: Span::default(),
            });
            self.adopt(right_id);
            self.recompute(id);
            self.recompute(right_id);

            match parent {
                Some(parent) => {
                    let slot = self.child_slot(parent, id);
                    self.node_mut(parent).entries.insert(slot + 1, right_id.0);
                    id = parent;
                },
                None => {
                    let root = self.alloc_node(Node {
                        parent: None,
                        leaf: false,
                        entries: smallvec![id.0, right_id.0],
                        span: Span::default(),
                    });
                    self.node_mut(id).parent = Some(root);
                    self.node_mut(right_id).parent = Some(root);
                    self.recompute(root);
                    self.root = root;
                    return;
                },
            }
        }
    }

    fn rebalance(&mut self, mut id: NodeId) {
        loop {
            let node = self.node(id);
            let len = node.entries.len();
            let Some(parent) = node.parent else {
                if !node.leaf && len == 1 {
                    let child = NodeId(node.entries[0]);
                    self.free_node(id);
                    self.node_mut(child).parent = None;
                    self.root = child;
                    id = child;
                    continue;
                }
                return;
            };
            if len >= MIN_ENTRIES {
                return;
            }

            let slot = self.child_slot(parent, id);
            if len == 0 {
                self.node_mut(parent).entries.remove(slot);
                self.free_node(id);
                self.recompute(parent);
                id = parent;
                continue;
            }
            let siblings = self.node(parent).entries.len();
            if siblings == 1 {
                id = parent;
                continue;
            }

            let (left, right, right_slot) = if slot + 1 < siblings {
                (id, NodeId(self.node(parent).entries[slot + 1]), slot + 1)
            } else {
                (NodeId(self.node(parent).entries[slot - 1]), id, slot)
            };
            let left_len = self.node(left).entries.len();
            let right_len = self.node(right).entries.len();

            if left_len + right_len <= MAX_ENTRIES {
                let moved = std::mem::take(&mut self.node_mut(right).entries);
                self.node_mut(left).entries.extend(moved);
                self.adopt(left);
                self.node_mut(parent).entries.remove(right_slot);
                self.free_node(right);
                self.recompute(left);
                self.recompute(parent);
                id = parent;
                continue;
            }

            let target = (left_len + right_len) / 2;
            if left_len < target {
                let moved: Entries = self
                    .node_mut(right)
                    .entries
                    .drain(..target - left_len)
                    .collect();
                self.node_mut(left).entries.extend(moved);
            } else {
                let moved: Entries = self.node_mut(left).entries.drain(target..).collect();
                let right_node = self.node_mut(right);
                let rest = std::mem::take(&mut right_node.entries);
                right_node.entries = moved;
                right_node.entries.extend(rest);
            }
            self.adopt(left);
            self.adopt(right);
            self.recompute(left);
            self.recompute(right);
            return;
        }
    }

    /// Point every entry of `id` back at it.
    fn adopt(&mut self, id: NodeId) {
        let node = self.node(id);
        let leaf = node.leaf;
        let entries = node.entries.clone();
        for entry in entries {
            if leaf {
                self.mark_mut(entry).leaf = id;
            } else {
                self.node_mut(NodeId(entry)).parent = Some(id);
            }
        }
    }

    fn recompute(&mut self, id: NodeId) {
        let node = self.node(id);
        let mut span = Span::default();
        for &entry in &node.entries {
            span.add(&self.entry_span(node.leaf, entry));
        }
        self.node_mut(id).span = span;
    }

    fn refresh_upward(&mut self, mut id: NodeId) {
        loop {
            self.recompute(id);
            match self.node(id).parent {
                Some(parent) => id = parent,
                None => return,
            }
        }
    }

    fn entry_span(&self, leaf: bool, entry: u32) -> Span {
        if leaf {
            let mark = self.mark(entry);
            Span {
                offset: mark.delta_offset,
                lines: mark.delta_lines,
                count: 1,
            }
        } else {
            self.node(NodeId(entry)).span
        }
    }

    // -- navigation --

    /// Descend to the first mark whose absolute offset satisfies `hits`.
    ///
    /// `hits` must be monotone over the mark sequence. When no mark qualifies the
    /// seek lands after the last mark.
    fn seek(&self, hits: impl Fn(usize) -> bool) -> Seek {
        let mut id = self.root;
        let mut before = Span::default();
        loop {
            let node = self.node(id);
            if node.leaf {
                for (index, &entry) in node.entries.iter().enumerate() {
                    let mut end = before;
                    end.add(&self.entry_span(true, entry));
                    if hits(end.offset) {
                        return Seek {
                            leaf: id,
                            index,
                            before: before.position(),
                        };
                    }
                    before = end;
                }
                return Seek {
                    leaf: id,
                    index: node.entries.len(),
                    before: before.position(),
                };
            }

            let last = node.entries.len() - 1;
            for (slot, &entry) in node.entries.iter().enumerate() {
                let child = NodeId(entry);
                let mut end = before;
                end.add(&self.node(child).span);
                if hits(end.offset) || slot == last {
                    id = child;
                    break;
                }
                before = end;
            }
        }
    }

    fn mark_at(&self, seek: Seek) -> Option<u32> {
        let node = self.node(seek.leaf);
        match node.entries.get(seek.index) {
            Some(&index) => Some(index),
            None => self
                .next_leaf(seek.leaf)
                .map(|leaf| self.node(leaf).entries[0]),
        }
    }

    fn mark_before(&self, seek: Seek) -> Option<u32> {
        if seek.index > 0 {
            return Some(self.node(seek.leaf).entries[seek.index - 1]);
        }
        self.prev_leaf(seek.leaf)
            .and_then(|leaf| self.node(leaf).entries.last().copied())
    }

    fn next_mark(&self, index: u32) -> Option<u32> {
        let (leaf, slot) = self.locate(index);
        let node = self.node(leaf);
        match node.entries.get(slot + 1) {
            Some(&next) => Some(next),
            None => self.next_leaf(leaf).map(|leaf| self.node(leaf).entries[0]),
        }
    }

    fn prev_mark(&self, index: u32) -> Option<u32> {
        let (leaf, slot) = self.locate(index);
        if slot > 0 {
            return Some(self.node(leaf).entries[slot - 1]);
        }
        self.prev_leaf(leaf)
            .and_then(|leaf| self.node(leaf).entries.last().copied())
    }

    fn next_leaf(&self, leaf: NodeId) -> Option<NodeId> {
        let mut child = leaf;
        while let Some(parent) = self.node(child).parent {
            let slot = self.child_slot(parent, child);
            if let Some(&sibling) = self.node(parent).entries.get(slot + 1) {
                let mut id = NodeId(sibling);
                while !self.node(id).leaf {
                    id = NodeId(self.node(id).entries[0]);
                }
                return Some(id);
            }
            child = parent;
        }
        None
    }

    fn prev_leaf(&self, leaf: NodeId) -> Option<NodeId> {
        let mut child = leaf;
        while let Some(parent) = self.node(child).parent {
            let slot = self.child_slot(parent, child);
            if slot > 0 {
                let mut id = NodeId(self.node(parent).entries[slot - 1]);
                while !self.node(id).leaf {
                    let entries = &self.node(id).entries;
                    id = NodeId(entries[entries.len() - 1]);
                }
                return Some(id);
            }
            child = parent;
        }
        None
    }

    fn position_of(&self, index: u32) -> Position {
        let (leaf, slot) = self.locate(index);
        let mut span = Span::default();
        for &entry in &self.node(leaf).entries[..=slot] {
            span.add(&self.entry_span(true, entry));
        }
        let mut child = leaf;
        while let Some(parent) = self.node(child).parent {
            for &entry in &self.node(parent).entries {
                if entry == child.0 {
                    break;
                }
                span.add(&self.node(NodeId(entry)).span);
            }
            child = parent;
        }
        span.position()
    }

    fn locate(&self, index: u32) -> (NodeId, usize) {
        let leaf = self.mark(index).leaf;
        let slot = self
            .node(leaf)
            .entries
            .iter()
            .position(|&entry| entry == index)
            .unwrap_or_else(|| corrupt("mark missing from its leaf"));
        (leaf, slot)
    }

    fn child_slot(&self, parent: NodeId, child: NodeId) -> usize {
        self.node(parent)
            .entries
            .iter()
            .position(|&entry| entry == child.0)
            .unwrap_or_else(|| corrupt("node missing from its parent"))
    }

    // -- arenas --

    fn resolve(&self, handle: MarkHandle) -> Result<u32> {
        let live = self
            .marks
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation && slot.mark.is_some());
        live.map(|_| handle.index).context(InvalidMarkSnafu { handle })
    }

    fn handle_of(&self, index: u32) -> MarkHandle {
        MarkHandle {
            index,
            generation: self.marks[index as usize].generation,
        }
    }

    fn mark(&self, index: u32) -> &Mark<T> {
        self.marks
            .get(index as usize)
            .and_then(|slot| slot.mark.as_ref())
            .unwrap_or_else(|| corrupt("dangling mark index"))
    }

    fn mark_mut(&mut self, index: u32) -> &mut Mark<T> {
        self.marks
            .get_mut(index as usize)
            .and_then(|slot| slot.mark.as_mut())
            .unwrap_or_else(|| corrupt("dangling mark index"))
    }

    fn alloc_mark(&mut self, mark: Mark<T>) -> u32 {
        match self.free_marks.pop() {
            Some(index) => {
                self.marks[index as usize].mark = Some(mark);
                index
            },
            None => {
                self.marks.push(MarkSlot {
                    generation: 0,
                    mark: Some(mark),
                });
                (self.marks.len() - 1) as u32
            },
        }
    }

    fn free_mark(&mut self, index: u32) -> T {
        let slot = &mut self.marks[index as usize];
        let mark = slot
            .mark
            .take()
            .unwrap_or_else(|| corrupt("freeing an empty mark slot"));
        slot.generation = slot.generation.wrapping_add(1);
        self.free_marks.push(index);
        mark.data
    }

    fn node(&self, id: NodeId) -> &Node {
        self.nodes
            .get(id.0 as usize)
            .and_then(Option::as_ref)
            .unwrap_or_else(|| corrupt("dangling node id"))
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        self.nodes
            .get_mut(id.0 as usize)
            .and_then(Option::as_mut)
            .unwrap_or_else(|| corrupt("dangling node id"))
    }

    fn alloc_node(&mut self, node: Node) -> NodeId {
        match self.free_nodes.pop() {
            Some(id) => {
                self.nodes[id as usize] = Some(node);
                NodeId(id)
            },
            None => {
                self.nodes.push(Some(node));
                NodeId((self.nodes.len() - 1) as u32)
            },
        }
    }

    fn free_node(&mut self, id: NodeId) {
        self.nodes[id.0 as usize] = None;
        self.free_nodes.push(id.0);
    }
}

fn checked_delta(to: usize, from: usize) -> usize {
    to.checked_sub(from)
        .unwrap_or_else(|| corrupt("negative delta between consecutive marks"))
}

/// In-order traversal yielding each mark with its absolute position.
pub struct Iter<'a, T> {
    tree: &'a MarkTree<T>,
    next: Option<u32>,
    at: Position,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = (MarkHandle, Position, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.next?;
        let mark = self.tree.mark(index);
        self.at = Position::new(
            self.at.offset + mark.delta_offset,
            self.at.line + mark.delta_lines,
        );
        self.next = self.tree.next_mark(index);
        Some((self.tree.handle_of(index), self.at, &mark.data))
    }
}
