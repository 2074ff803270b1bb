//! Incremental relexing against a [`CheckpointStore`].
//!
//! A pass seeks the closest checkpoint the edit cannot have influenced, scans
//! forward from it, and stops as soon as it reaches an existing checkpoint
//! whose recorded state equals the live state, past the edited text. Between
//! the seek point and the stop, stale checkpoints are rewritten or dropped and
//! new ones are placed at the configured spacing.

use crate::{
    edit::Position,
    mark_tree::MarkHandle,
    pool::ScratchPool,
    settings::RelexSettings,
    syntax::{
        checkpoint::CheckpointStore,
        scanner::{Scanner, Token},
        tokenizer::Tokenizer,
    },
};
use ropey::Rope;
use std::ops::Range;

/// How a relex pass ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelexOutcome {
    /// Nothing was damaged; no scanning happened.
    Idle,
    /// The live state matched the checkpoint at `at`.
    Matched { at: usize },
    /// Scanning ran to the end of the buffer.
    Exhausted,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelexReport {
    pub outcome: RelexOutcome,
    /// Characters between the seek point and where scanning stopped.
    pub rescanned: Range<usize>,
    pub tokens_scanned: usize,
    pub checkpoints_added: usize,
    pub checkpoints_updated: usize,
    pub checkpoints_removed: usize,
}

impl RelexReport {
    pub fn idle() -> Self {
        Self {
            outcome: RelexOutcome::Idle,
            rescanned: 0..0,
            tokens_scanned: 0,
            checkpoints_added: 0,
            checkpoints_updated: 0,
            checkpoints_removed: 0,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.outcome == RelexOutcome::Idle
    }
}

#[derive(Clone, Debug)]
pub struct Relexer {
    settings: RelexSettings,
}

impl Relexer {
    pub fn new(settings: RelexSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &RelexSettings {
        &self.settings
    }

    /// Bring the checkpoints in `store` up to date with `text` after the
    /// characters in `damage` changed.
    ///
    /// `damage` is in current buffer coordinates. `None` means nothing changed
    /// and the pass is idle.
    pub fn relex<T: Tokenizer>(
        &self,
        text: &Rope,
        tokenizer: &mut T,
        store: &mut CheckpointStore<T::State>,
        damage: Option<Range<usize>>,
        pool: &mut ScratchPool,
    ) -> RelexReport {
        let Some(damage) = damage else {
            return RelexReport::idle();
        };
        let len = text.len_chars();
        let damage_start = damage.start.min(len);
        let damage = damage_start..damage.end.clamp(damage_start, len);
        let pre_scan = tokenizer.pre_scan();

        let seek = damage
            .start
            .checked_sub(pre_scan)
            .and_then(|limit| store.last_before(limit))
            .and_then(|handle| {
                store
                    .get(handle)
                    .ok()
                    .map(|(offset, checkpoint)| (handle, offset, checkpoint.state.clone()))
            });
        let (seeked, start, state) = match seek {
            Some((handle, offset, state)) => (Some(handle), offset, state),
            None => (None, 0, tokenizer.initial_state()),
        };
        tokenizer.set_state(state);
        tracing::trace!(?damage, start, seeked = seeked.is_some(), "relex seek");

        let mut report = RelexReport {
            outcome: RelexOutcome::Exhausted,
            ..RelexReport::idle()
        };

        // Anything else at the seek offset is a duplicate or a collapsed leftover.
        if start < len {
            let shared: Vec<_> = store
                .handles_in(start..start + 1)
                .into_iter()
                .filter(|&handle| Some(handle) != seeked)
                .collect();
            report.checkpoints_removed += remove_all(store, shared);
        }

        let mut scanner = Scanner::new(text, start, self.settings.chunk_size, pool.acquire());
        let mut previous = start;
        let mut last_checkpoint = start;
        let mut tokens_since = 0;

        loop {
            let pos = scanner.pos();
            if pos > start && pos < len {
                let skipped = store.handles_in(previous + 1..pos);
                report.checkpoints_removed += remove_all(store, skipped);
                previous = pos;

                let existing = store.handles_in(pos..pos + 1);
                if let Some((&first, duplicates)) = existing.split_first() {
                    report.checkpoints_removed += remove_all(store, duplicates.to_vec());
                    let live = tokenizer.state();
                    if let Ok(checkpoint) = store.get_mut(first) {
                        if checkpoint.state == live && pos >= damage.end + pre_scan {
                            report.outcome = RelexOutcome::Matched { at: pos };
                            break;
                        }
                        if checkpoint.state != live {
                            checkpoint.state = live;
                            report.checkpoints_updated += 1;
                        }
                        checkpoint.terminal = false;
                    }
                    last_checkpoint = pos;
                    tokens_since = 0;
                } else if self.wants_checkpoint(tokens_since, pos - last_checkpoint) {
                    let position = Position::in_rope(text, pos);
                    if store.insert(position, tokenizer.state(), false).is_ok() {
                        report.checkpoints_added += 1;
                    }
                    last_checkpoint = pos;
                    tokens_since = 0;
                }
            }

            match scanner.next(tokenizer) {
                Some(_) => {
                    report.tokens_scanned += 1;
                    tokens_since += 1;
                },
                None => break,
            }
        }

        let stop = scanner.pos();
        pool.release(scanner.into_buffer());

        if report.outcome == RelexOutcome::Exhausted {
            let skipped = store.handles_in(previous + 1..len);
            report.checkpoints_removed += remove_all(store, skipped);
            let at_end = store.handles_in(len..len + 1);
            let terminal = at_end.first().copied();
            report.checkpoints_removed += remove_all(store, at_end.into_iter().skip(1).collect());

            let live = tokenizer.state();
            match terminal.and_then(|handle| store.get_mut(handle).ok()) {
                Some(checkpoint) => {
                    if checkpoint.state != live || !checkpoint.terminal {
                        checkpoint.state = live;
                        checkpoint.terminal = true;
                        report.checkpoints_updated += 1;
                    }
                },
                None => {
                    if store.insert(Position::in_rope(text, len), live, true).is_ok() {
                        report.checkpoints_added += 1;
                    }
                },
            }
        }

        report.rescanned = start..stop;
        tracing::debug!(
            outcome = ?report.outcome,
            rescanned = ?report.rescanned,
            tokens = report.tokens_scanned,
            added = report.checkpoints_added,
            updated = report.checkpoints_updated,
            removed = report.checkpoints_removed,
            "relex finished"
        );
        report
    }

    /// Tokens intersecting `range`, scanned from the nearest checkpoint at or
    /// before `range.start`. An empty range yields the token starting at or
    /// spanning its offset.
    pub fn tokens<T: Tokenizer>(
        &self,
        text: &Rope,
        tokenizer: &mut T,
        store: &CheckpointStore<T::State>,
        range: Range<usize>,
        pool: &mut ScratchPool,
    ) -> Vec<Token<T::Kind>> {
        if range.start >= text.len_chars() {
            return Vec::new();
        }
        let resume = store
            .last_at_or_before(range.start)
            .and_then(|handle| store.get(handle).ok())
            .filter(|(_, checkpoint)| !checkpoint.terminal)
            .map(|(offset, checkpoint)| (offset, checkpoint.state.clone()));
        let (start, state) = resume.unwrap_or_else(|| (0, tokenizer.initial_state()));
        tokenizer.set_state(state);

        let mut scanner = Scanner::new(text, start, self.settings.chunk_size, pool.acquire());
        let end = range.end.max(range.start + 1);
        let mut tokens = Vec::new();
        while scanner.pos() < end {
            let Some(token) = scanner.next(tokenizer) else {
                break;
            };
            if token.range.end > range.start {
                tokens.push(token);
            }
        }
        pool.release(scanner.into_buffer());
        tokens
    }

    fn wants_checkpoint(&self, tokens_since: usize, distance: usize) -> bool {
        let settings = &self.settings;
        (tokens_since >= settings.checkpoint_interval
            && distance >= settings.min_checkpoint_distance)
            || distance >= settings.max_checkpoint_distance
    }
}

fn remove_all<S>(store: &mut CheckpointStore<S>, handles: Vec<MarkHandle>) -> usize {
    handles
        .into_iter()
        .filter(|&handle| store.remove(handle).is_ok())
        .count()
}
