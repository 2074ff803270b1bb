//! A text buffer with every mark plane and the relexer attached.
//!
//! Readers take [`Document::read`]. Writers take [`Document::atomic`], which
//! holds the write lock for the whole section: edits are applied immediately
//! to the rope and all planes, while relexing is deferred to
//! [`AtomicSection::commit`] or to the section's drop.
//!
//! # Edit pipeline
//!
//! 1. bounds check
//! 2. guard check (nothing has changed if it fails)
//! 3. [`EditRecord`] built from the unmodified rope
//! 4. rope mutation
//! 5. every plane shifted by the record
//! 6. pending damage widened to cover the inserted text

use crate::{
    block_chain::BlockChain,
    edit::{EditRecord, Position},
    error::{corrupt, OutOfRangeSnafu, Result, UnknownLayerSnafu},
    guard::Guards,
    mark_tree::{Bias, MarkHandle, MarkOptions, MarkRemoved, MarkTree},
    pool::ScratchPool,
    settings::Settings,
    syntax::{
        checkpoint::CheckpointStore,
        relexer::{RelexReport, Relexer},
        scanner::Token,
        tokenizer::Tokenizer,
    },
};
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use ropey::Rope;
use snafu::{ensure, OptionExt};
use std::{
    fmt,
    ops::{Deref, Range},
};

/// Identifies an extra [`BlockChain`] created with [`AtomicSection::add_layer`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LayerId(usize);

pub struct Document<T: Tokenizer> {
    state: RwLock<DocumentState<T>>,
    pool: Mutex<ScratchPool>,
}

pub struct DocumentState<T: Tokenizer> {
    text: Rope,
    marks: MarkTree,
    guards: Guards,
    layers: Vec<BlockChain>,
    checkpoints: CheckpointStore<T::State>,
    tokenizer: T,
    relexer: Relexer,
    break_guarded: bool,
    pending: Option<Range<usize>>,
}

impl<T: Tokenizer> fmt::Debug for Document<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("Document")
            .field("len", &state.len())
            .field("marks", &state.marks.mark_count())
            .field("checkpoints", &state.checkpoints.len())
            .finish()
    }
}

impl<T: Tokenizer> Document<T> {
    /// Create a document over `text` and tokenize it fully.
    pub fn new(text: &str, tokenizer: T, settings: &Settings) -> Self {
        let text = Rope::from_str(text);
        let len = text.len_chars();
        let document = Self {
            state: RwLock::new(DocumentState {
                marks: MarkTree::new(len),
                guards: Guards::new(len),
                layers: Vec::new(),
                checkpoints: CheckpointStore::new(len),
                tokenizer,
                relexer: Relexer::new(settings.relex.clone()),
                break_guarded: false,
                pending: Some(0..len),
                text,
            }),
            pool: Mutex::new(ScratchPool::new(settings.pool.max_retained)),
        };
        let report = document.atomic().commit();
        tracing::debug!(len, tokens = report.tokens_scanned, "opened document");
        document
    }

    pub fn read(&self) -> DocumentRead<'_, T> {
        DocumentRead {
            state: self.state.read(),
            pool: &self.pool,
        }
    }

    /// Start an atomic section. Blocks until no reader or writer holds the document.
    pub fn atomic(&self) -> AtomicSection<'_, T> {
        let state = self.state.write();
        let prior_break_guarded = state.break_guarded;
        AtomicSection {
            state,
            pool: &self.pool,
            prior_break_guarded,
        }
    }
}

impl<T: Tokenizer> DocumentState<T> {
    pub fn text(&self) -> &Rope {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.text.len_chars()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn marks(&self) -> &MarkTree {
        &self.marks
    }

    pub fn offset_of(&self, handle: MarkHandle) -> Result<usize> {
        self.marks.offset_of(handle)
    }

    pub fn line_of(&self, handle: MarkHandle) -> Result<usize> {
        self.marks.line_of(handle)
    }

    pub fn position_of(&self, handle: MarkHandle) -> Result<Position> {
        self.marks.position(handle)
    }

    pub fn is_guarded(&self, offset: usize) -> bool {
        self.guards.is_guarded(offset)
    }

    pub fn guarded_ranges(&self) -> Vec<Range<usize>> {
        self.guards.ranges()
    }

    pub fn break_guarded(&self) -> bool {
        self.break_guarded
    }

    pub fn layer(&self, layer: LayerId) -> Result<&BlockChain> {
        self.layers.get(layer.0).context(UnknownLayerSnafu { layer })
    }

    pub fn checkpoints(&self) -> &CheckpointStore<T::State> {
        &self.checkpoints
    }

    /// Damage not yet relexed. Only set after a section was unwound by a panic.
    pub fn pending_damage(&self) -> Option<Range<usize>> {
        self.pending.clone()
    }

    fn position(&self, offset: usize) -> Result<Position> {
        let len = self.len();
        ensure!(offset <= len, OutOfRangeSnafu { offset, len });
        Ok(Position::in_rope(&self.text, offset))
    }

    fn span(&self, range: Range<usize>) -> Result<Range<Position>> {
        let end = self.position(range.end)?;
        let start = self.position(range.start.min(range.end))?;
        Ok(start..end)
    }
}

/// Shared read access to a document.
pub struct DocumentRead<'a, T: Tokenizer> {
    state: RwLockReadGuard<'a, DocumentState<T>>,
    pool: &'a Mutex<ScratchPool>,
}

impl<T: Tokenizer> Deref for DocumentRead<'_, T> {
    type Target = DocumentState<T>;

    fn deref(&self) -> &Self::Target {
        &self.state
    }
}

impl<T: Tokenizer + Clone> DocumentRead<'_, T> {
    /// Tokens intersecting `range`, rescanned from the nearest checkpoint.
    pub fn tokens(&self, range: Range<usize>) -> Result<Vec<Token<T::Kind>>> {
        let len = self.state.len();
        ensure!(range.end <= len, OutOfRangeSnafu { offset: range.end, len });
        let mut tokenizer = self.state.tokenizer.clone();
        let mut pool = self.pool.lock();
        Ok(self.state.relexer.tokens(
            &self.state.text,
            &mut tokenizer,
            &self.state.checkpoints,
            range,
            &mut pool,
        ))
    }
}

/// Exclusive write access to a document.
///
/// Dropping the section relexes any pending damage and restores the
/// break-guarded flag to its value when the section began. Both happen on
/// early returns; on a panic only the flag is restored and the damage is
/// carried to the next section.
pub struct AtomicSection<'a, T: Tokenizer> {
    state: RwLockWriteGuard<'a, DocumentState<T>>,
    pool: &'a Mutex<ScratchPool>,
    prior_break_guarded: bool,
}

impl<T: Tokenizer> Deref for AtomicSection<'_, T> {
    type Target = DocumentState<T>;

    fn deref(&self) -> &Self::Target {
        &self.state
    }
}

impl<T: Tokenizer> AtomicSection<'_, T> {
    /// Replace `removed_len` characters at `offset` with `inserted`.
    pub fn edit(
        &mut self,
        offset: usize,
        removed_len: usize,
        inserted: &str,
    ) -> Result<EditRecord> {
        let state = &mut *self.state;
        let len = state.len();
        ensure!(offset <= len, OutOfRangeSnafu { offset, len });
        let end = offset.saturating_add(removed_len);
        ensure!(end <= len, OutOfRangeSnafu { offset: end, len });

        let record = EditRecord::from_rope(&state.text, offset, removed_len, inserted);
        if removed_len == 0 && record.inserted_len == 0 {
            return Ok(record);
        }
        state.guards.check(offset, removed_len, state.break_guarded)?;

        state.text.remove(offset..end);
        state.text.insert(offset, inserted);
        if let Err(err) = state.apply_to_planes(&record) {
            corrupt(&format!("plane out of sync with the buffer: {err}"));
        }

        let inserted_range = record.inserted_range();
        state.pending = Some(match state.pending.take() {
            Some(pending) => {
                let pending = record.map_range(pending);
                pending.start.min(inserted_range.start)..pending.end.max(inserted_range.end)
            },
            None => inserted_range,
        });
        tracing::trace!(
            offset,
            removed = removed_len,
            inserted = record.inserted_len,
            pending = ?state.pending,
            "applied edit"
        );
        Ok(record)
    }

    pub fn insert(&mut self, offset: usize, text: &str) -> Result<EditRecord> {
        self.edit(offset, 0, text)
    }

    /// Remove `range`. An inverted range is rejected as its start lying past its end.
    pub fn remove(&mut self, range: Range<usize>) -> Result<EditRecord> {
        ensure!(
            range.start <= range.end,
            OutOfRangeSnafu {
                offset: range.start,
                len: range.end,
            }
        );
        self.edit(range.start, range.end - range.start, "")
    }

    pub fn create_mark(&mut self, offset: usize, bias: Bias) -> Result<MarkHandle> {
        self.create_mark_with(offset, MarkOptions::new(bias))
    }

    pub fn create_mark_with(&mut self, offset: usize, options: MarkOptions) -> Result<MarkHandle> {
        let position = self.state.position(offset)?;
        self.state.marks.insert_with(position, options, ())
    }

    pub fn remove_mark(&mut self, handle: MarkHandle) -> Result<()> {
        self.state.marks.remove(handle)
    }

    pub fn register_removal_callback(
        &mut self,
        handle: MarkHandle,
        callback: impl FnMut(&MarkRemoved) + Send + Sync + 'static,
    ) -> Result<()> {
        self.state
            .marks
            .set_removal_callback(handle, Box::new(callback))
    }

    pub fn add_guarded_range(&mut self, range: Range<usize>) -> Result<()> {
        let span = self.state.span(range)?;
        self.state.guards.add(span)
    }

    pub fn remove_guarded_range(&mut self, range: Range<usize>) -> Result<()> {
        let span = self.state.span(range)?;
        self.state.guards.remove(span)
    }

    /// Allow edits inside guarded ranges until this section ends.
    pub fn set_break_guarded(&mut self, break_guarded: bool) {
        self.state.break_guarded = break_guarded;
    }

    pub fn add_layer(&mut self) -> LayerId {
        let len = self.state.len();
        self.state.layers.push(BlockChain::new(len));
        LayerId(self.state.layers.len() - 1)
    }

    pub fn add_layer_block(
        &mut self,
        layer: LayerId,
        range: Range<usize>,
        concatenate_adjacent: bool,
    ) -> Result<()> {
        let span = self.state.span(range)?;
        self.layer_mut(layer)?.add_block(span, concatenate_adjacent)
    }

    pub fn remove_layer_block(&mut self, layer: LayerId, range: Range<usize>) -> Result<()> {
        let span = self.state.span(range)?;
        self.layer_mut(layer)?.remove_block(span)
    }

    pub fn set_layer_block_active(
        &mut self,
        layer: LayerId,
        index: usize,
        active: bool,
    ) -> Result<bool> {
        Ok(self.layer_mut(layer)?.set_active(index, active))
    }

    /// Relex now and report what it took.
    pub fn commit(mut self) -> RelexReport {
        self.relex()
    }

    fn layer_mut(&mut self, layer: LayerId) -> Result<&mut BlockChain> {
        self.state
            .layers
            .get_mut(layer.0)
            .context(UnknownLayerSnafu { layer })
    }

    fn relex(&mut self) -> RelexReport {
        let state = &mut *self.state;
        let damage = state.pending.take();
        let mut pool = self.pool.lock();
        state.relexer.relex(
            &state.text,
            &mut state.tokenizer,
            &mut state.checkpoints,
            damage,
            &mut pool,
        )
    }
}

impl<T: Tokenizer> Drop for AtomicSection<'_, T> {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            self.relex();
        }
        self.state.break_guarded = self.prior_break_guarded;
    }
}

impl<T: Tokenizer> DocumentState<T> {
    fn apply_to_planes(&mut self, record: &EditRecord) -> Result<()> {
        self.marks.apply_edit(record)?;
        self.guards.apply_edit(record)?;
        for layer in &mut self.layers {
            layer.apply_edit(record)?;
        }
        let dropped = self.checkpoints.apply_edit(record)?;
        if dropped > 0 {
            tracing::trace!(dropped, "dropped checkpoints inside removed text");
        }
        Ok(())
    }
}
