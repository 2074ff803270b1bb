use crate::{
    edit::{EditRecord, Position},
    error::Result,
    mark_tree::{Bias, MarkHandle, MarkOptions, MarkTree},
};

/// Tokenizer state captured at a token boundary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Checkpoint<S> {
    pub state: S,
    /// The checkpoint that sits at the end of the buffer.
    pub terminal: bool,
}

/// Checkpoints held as a mark plane.
///
/// Checkpoints are right-biased and detach when the text around them is
/// deleted, so a surviving checkpoint always sits at the boundary it was taken
/// at, followed by the text it was taken before.
#[derive(Debug)]
pub struct CheckpointStore<S> {
    marks: MarkTree<Checkpoint<S>>,
}

impl<S> CheckpointStore<S> {
    pub fn new(len: usize) -> Self {
        Self {
            marks: MarkTree::new(len),
        }
    }

    pub fn len(&self) -> usize {
        self.marks.mark_count()
    }

    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }

    pub fn insert(&mut self, position: Position, state: S, terminal: bool) -> Result<MarkHandle> {
        let options = MarkOptions::new(Bias::Right).detach_on_removal();
        self.marks
            .insert_with(position, options, Checkpoint { state, terminal })
    }

    pub fn remove(&mut self, handle: MarkHandle) -> Result<Checkpoint<S>> {
        self.marks.remove(handle)
    }

    pub fn get(&self, handle: MarkHandle) -> Result<(usize, &Checkpoint<S>)> {
        Ok((self.marks.offset_of(handle)?, self.marks.data(handle)?))
    }

    pub fn get_mut(&mut self, handle: MarkHandle) -> Result<&mut Checkpoint<S>> {
        self.marks.data_mut(handle)
    }

    /// Last checkpoint strictly before `offset`.
    pub fn last_before(&self, offset: usize) -> Option<MarkHandle> {
        self.marks.last_before(offset)
    }

    pub fn last_at_or_before(&self, offset: usize) -> Option<MarkHandle> {
        self.marks.last_at_or_before(offset)
    }

    pub fn first_at_or_after(&self, offset: usize) -> Option<MarkHandle> {
        self.marks.first_at_or_after(offset)
    }

    /// Checkpoints in `offset..`, in buffer order.
    pub fn iter_from(
        &self,
        offset: usize,
    ) -> impl Iterator<Item = (MarkHandle, usize, &Checkpoint<S>)> {
        self.marks
            .iter_from(offset)
            .map(|(handle, position, checkpoint)| (handle, position.offset, checkpoint))
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &Checkpoint<S>)> {
        self.marks
            .iter()
            .map(|(_, position, checkpoint)| (position.offset, checkpoint))
    }

    /// Handles of the checkpoints with offsets in `range`.
    pub fn handles_in(&self, range: std::ops::Range<usize>) -> Vec<MarkHandle> {
        self.iter_from(range.start)
            .take_while(|&(_, offset, _)| offset < range.end)
            .map(|(handle, _, _)| handle)
            .collect()
    }

    pub fn terminal(&self) -> Option<MarkHandle> {
        let last = self.marks.last_at_or_before(self.marks.len())?;
        self.marks
            .data(last)
            .is_ok_and(|checkpoint| checkpoint.terminal)
            .then_some(last)
    }

    /// Shift checkpoints for an edit. Returns how many were dropped.
    pub fn apply_edit(&mut self, edit: &EditRecord) -> Result<usize> {
        Ok(self.marks.apply_edit(edit)?.len())
    }

    #[cfg(test)]
    pub(crate) fn check_invariants(&self) {
        self.marks.check_invariants();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkpoints_inside_deleted_text_are_dropped() {
        let mut store = CheckpointStore::new(30);
        store.insert(Position::new(5, 0), 'a', false).unwrap();
        store.insert(Position::new(10, 0), 'b', false).unwrap();
        store.insert(Position::new(20, 0), 'c', false).unwrap();
        store.insert(Position::new(30, 0), 'z', true).unwrap();

        let dropped = store.apply_edit(&EditRecord::removal(8, 4)).unwrap();

        assert_eq!(dropped, 1);
        let states: Vec<_> = store.iter().map(|(offset, cp)| (offset, cp.state)).collect();
        assert_eq!(states, vec![(5, 'a'), (16, 'c'), (26, 'z')]);
        store.check_invariants();
    }

    #[test]
    fn terminal_follows_the_end_of_text() {
        let mut store = CheckpointStore::new(10);
        store.insert(Position::new(4, 0), 1, false).unwrap();
        let terminal = store.insert(Position::new(10, 0), 2, true).unwrap();

        store.apply_edit(&EditRecord::insertion(10, 5)).unwrap();
        assert_eq!(store.terminal(), Some(terminal));
        assert_eq!(store.get(terminal).unwrap().0, 15);

        store.apply_edit(&EditRecord::removal(3, 12)).unwrap();
        assert_eq!(store.terminal(), Some(terminal));
        assert_eq!(store.get(terminal).unwrap().0, 3);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn range_queries() {
        let mut store = CheckpointStore::new(50);
        let handles: Vec<_> = [10, 20, 30]
            .into_iter()
            .map(|offset| store.insert(Position::new(offset, 0), (), false).unwrap())
            .collect();

        assert_eq!(store.last_before(20), Some(handles[0]));
        assert_eq!(store.last_at_or_before(20), Some(handles[1]));
        assert_eq!(store.first_at_or_after(21), Some(handles[2]));
        assert_eq!(store.handles_in(10..30), handles[..2].to_vec());
        assert_eq!(store.terminal(), None);
    }
}
