//! Feeds a [`Tokenizer`] from a rope in bounded chunks.

use crate::{
    pool::ScratchPool,
    syntax::tokenizer::{Chunk, Scan, Tokenizer},
};
use ropey::Rope;
use std::ops::Range;

/// A token with its absolute character range.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token<K> {
    pub kind: K,
    pub range: Range<usize>,
}

/// Walks tokens forward from a resume position.
///
/// The scanner owns one scratch buffer holding the current chunk. When the
/// tokenizer reports [`Scan::EndOfChunk`] the chunk is reloaded from the
/// current position, doubling in size if the previous load made no progress.
pub(crate) struct Scanner<'t> {
    text: &'t Rope,
    buffer: Vec<char>,
    chunk_start: usize,
    loaded_from: Option<usize>,
    is_last: bool,
    chunk_size: usize,
    pos: usize,
}

impl<'t> Scanner<'t> {
    pub(crate) fn new(text: &'t Rope, pos: usize, chunk_size: usize, buffer: Vec<char>) -> Self {
        Self {
            text,
            buffer,
            chunk_start: pos,
            loaded_from: None,
            is_last: false,
            chunk_size: chunk_size.max(1),
            pos,
        }
    }

    /// Offset of the next token.
    pub(crate) fn pos(&self) -> usize {
        self.pos
    }

    pub(crate) fn next<T: Tokenizer>(&mut self, tokenizer: &mut T) -> Option<Token<T::Kind>> {
        loop {
            if self.loaded_from.is_none() {
                self.load(tokenizer);
            }
            let chunk = self.chunk();
            let chunk_end = chunk.end();
            match tokenizer.next_token(&chunk) {
                Scan::Token { kind, len } => {
                    assert!(len > 0, "tokenizer produced an empty token at {}", self.pos);
                    let start = self.pos;
                    self.pos += len;
                    assert!(
                        self.pos <= chunk_end,
                        "tokenizer produced a token past its chunk at {start}"
                    );
                    return Some(Token {
                        kind,
                        range: start..self.pos,
                    });
                },
                Scan::EndOfText => return None,
                Scan::EndOfChunk => {
                    assert!(!self.is_last, "tokenizer asked for text past the end of the buffer");
                    if self.loaded_from == Some(self.pos) {
                        self.chunk_size *= 2;
                    }
                    self.loaded_from = None;
                },
            }
        }
    }

    pub(crate) fn into_buffer(self) -> Vec<char> {
        self.buffer
    }

    fn load<T: Tokenizer>(&mut self, tokenizer: &mut T) {
        let len = self.text.len_chars();
        let start = self.pos.saturating_sub(tokenizer.pre_scan());
        let end = (self.pos + self.chunk_size).min(len);
        self.buffer.clear();
        self.buffer.extend(self.text.slice(start..end).chars());
        self.chunk_start = start;
        self.is_last = end == len;
        self.loaded_from = Some(self.pos);
        tracing::trace!(start, resume = self.pos, end, "loaded tokenizer chunk");
        tokenizer.load(&self.chunk());
    }

    fn chunk(&self) -> Chunk<'_> {
        Chunk {
            text: &self.buffer,
            start: self.chunk_start,
            resume: self.pos,
            is_last: self.is_last,
        }
    }
}

/// Tokenize all of `text` from the tokenizer's initial state.
pub fn tokenize<T: Tokenizer>(
    text: &Rope,
    tokenizer: &mut T,
    chunk_size: usize,
    pool: &mut ScratchPool,
) -> Vec<Token<T::Kind>> {
    tokenizer.set_state(tokenizer.initial_state());
    let mut scanner = Scanner::new(text, 0, chunk_size, pool.acquire());
    let mut tokens = Vec::new();
    while let Some(token) = scanner.next(tokenizer) {
        tokens.push(token);
    }
    pool.release(scanner.into_buffer());
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::c_like::{CLikeKind, CLikeTokenizer};

    #[test]
    fn tokens_that_straddle_chunks_are_reloaded() {
        let text = Rope::from_str("alpha beta_gamma_delta 42");
        let mut pool = ScratchPool::new(1);
        let tokens = tokenize(&text, &mut CLikeTokenizer::default(), 3, &mut pool);

        let kinds: Vec<_> = tokens.iter().map(|token| token.kind).collect();
        assert_eq!(
            kinds,
            vec![
                CLikeKind::Identifier,
                CLikeKind::Whitespace,
                CLikeKind::Identifier,
                CLikeKind::Whitespace,
                CLikeKind::Number,
            ]
        );
        assert_eq!(tokens[2].range, 6..22);
        assert_eq!(pool.retained(), 1);
    }

    #[test]
    fn empty_text_has_no_tokens() {
        let mut pool = ScratchPool::new(1);
        let tokens = tokenize(&Rope::new(), &mut CLikeTokenizer::default(), 16, &mut pool);
        assert!(tokens.is_empty());
    }
}
