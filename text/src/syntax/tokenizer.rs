use std::fmt;

/// A window of the buffer handed to a [`Tokenizer`].
///
/// `text` holds the characters `start..start + text.len()`. Scanning resumes
/// at `resume`; anything between `start` and `resume` is lookback for
/// tokenizers that declare a [`Tokenizer::pre_scan`] margin.
#[derive(Clone, Copy, Debug)]
pub struct Chunk<'a> {
    pub text: &'a [char],
    pub start: usize,
    pub resume: usize,
    /// The chunk reaches the end of the buffer.
    pub is_last: bool,
}

impl Chunk<'_> {
    pub fn end(&self) -> usize {
        self.start + self.text.len()
    }
}

/// Result of one [`Tokenizer::next_token`] call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scan<K> {
    /// A token of `len` characters starting at the tokenizer's cursor.
    Token { kind: K, len: usize },
    /// The next token does not fit in this chunk. Nothing was consumed.
    EndOfChunk,
    /// The cursor is at the end of the last chunk.
    EndOfText,
}

/// A resumable lexer driven chunk by chunk.
///
/// The lexer state must only change when a [`Scan::Token`] is returned, so the
/// state observed between two tokens fully describes where scanning stands.
/// States are compared by value to decide whether a relex has reconverged.
pub trait Tokenizer {
    type Kind: Copy + PartialEq + fmt::Debug;
    type State: Clone + Eq + fmt::Debug;

    fn initial_state(&self) -> Self::State;

    fn state(&self) -> Self::State;

    fn set_state(&mut self, state: Self::State);

    /// Start scanning `chunk` at `chunk.resume`.
    fn load(&mut self, chunk: &Chunk<'_>);

    fn next_token(&mut self, chunk: &Chunk<'_>) -> Scan<Self::Kind>;

    /// Characters of lookback the tokenizer needs before the resume point.
    fn pre_scan(&self) -> usize {
        0
    }
}
