//! A small tokenizer for C-family text.
//!
//! Block comments are emitted one line at a time; while a comment is open the
//! tokenizer carries [`CLikeState::InBlockComment`] across newlines.

use crate::syntax::tokenizer::{Chunk, Scan, Tokenizer};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CLikeKind {
    Identifier,
    Number,
    Whitespace,
    Newline,
    String,
    LineComment,
    BlockComment,
    Punctuation,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CLikeState {
    #[default]
    Normal,
    InBlockComment,
}

#[derive(Clone, Debug, Default)]
pub struct CLikeTokenizer {
    state: CLikeState,
    cursor: usize,
}

impl Tokenizer for CLikeTokenizer {
    type Kind = CLikeKind;
    type State = CLikeState;

    fn initial_state(&self) -> CLikeState {
        CLikeState::Normal
    }

    fn state(&self) -> CLikeState {
        self.state
    }

    fn set_state(&mut self, state: CLikeState) {
        self.state = state;
    }

    fn load(&mut self, chunk: &Chunk<'_>) {
        self.cursor = chunk.resume - chunk.start;
    }

    fn next_token(&mut self, chunk: &Chunk<'_>) -> Scan<CLikeKind> {
        let text = chunk.text;
        let at = self.cursor;
        let Some(&ch) = text.get(at) else {
            return if chunk.is_last {
                Scan::EndOfText
            } else {
                Scan::EndOfChunk
            };
        };

        let scanned = match self.state {
            CLikeState::InBlockComment if ch == '\n' => {
                Some((CLikeKind::Newline, at + 1, CLikeState::InBlockComment))
            },
            CLikeState::InBlockComment => comment_body(text, at, chunk.is_last)
                .map(|(end, closed)| (CLikeKind::BlockComment, end, after_comment(closed))),
            CLikeState::Normal => scan_normal(text, at, chunk.is_last),
        };

        match scanned {
            Some((kind, end, state)) => {
                self.cursor = end;
                self.state = state;
                Scan::Token {
                    kind,
                    len: end - at,
                }
            },
            None => Scan::EndOfChunk,
        }
    }
}

fn scan_normal(text: &[char], at: usize, is_last: bool) -> Option<(CLikeKind, usize, CLikeState)> {
    let normal = |kind, end| (kind, end, CLikeState::Normal);
    let ch = text[at];
    match ch {
        '\n' => Some(normal(CLikeKind::Newline, at + 1)),
        '/' => match text.get(at + 1) {
            Some(&'/') => run(text, at + 2, is_last, |ch| ch != '\n')
                .map(|end| normal(CLikeKind::LineComment, end)),
            Some(&'*') => comment_body(text, at + 2, is_last)
                .map(|(end, closed)| (CLikeKind::BlockComment, end, after_comment(closed))),
            None if !is_last => None,
            _ => Some(normal(CLikeKind::Punctuation, at + 1)),
        },
        '"' => string(text, at + 1, is_last).map(|end| normal(CLikeKind::String, end)),
        ch if ch.is_whitespace() => {
            run(text, at + 1, is_last, |ch| ch != '\n' && ch.is_whitespace())
                .map(|end| normal(CLikeKind::Whitespace, end))
        },
        ch if ch.is_alphabetic() || ch == '_' => run(text, at + 1, is_last, is_word)
            .map(|end| normal(CLikeKind::Identifier, end)),
        ch if ch.is_ascii_digit() => run(text, at + 1, is_last, |ch| is_word(ch) || ch == '.')
            .map(|end| normal(CLikeKind::Number, end)),
        _ => Some(normal(CLikeKind::Punctuation, at + 1)),
    }
}

fn is_word(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}

fn after_comment(closed: bool) -> CLikeState {
    if closed {
        CLikeState::Normal
    } else {
        CLikeState::InBlockComment
    }
}

/// End of the run of characters matching `pred`, or `None` if the run may
/// continue past the chunk.
fn run(text: &[char], from: usize, is_last: bool, pred: impl Fn(char) -> bool) -> Option<usize> {
    match text[from.min(text.len())..].iter().position(|&ch| !pred(ch)) {
        Some(len) => Some(from + len),
        None if is_last => Some(text.len()),
        None => None,
    }
}

/// Scan comment text up to the end of the line or past `*/`.
fn comment_body(text: &[char], from: usize, is_last: bool) -> Option<(usize, bool)> {
    let mut ix = from;
    while ix < text.len() {
        match text[ix] {
            '\n' => return Some((ix, false)),
            '*' => match text.get(ix + 1) {
                Some(&'/') => return Some((ix + 2, true)),
                None if !is_last => return None,
                _ => {},
            },
            _ => {},
        }
        ix += 1;
    }
    is_last.then_some((text.len(), false))
}

/// Scan a string literal body. Unterminated strings end at the line break.
fn string(text: &[char], from: usize, is_last: bool) -> Option<usize> {
    let mut ix = from;
    while ix < text.len() {
        match text[ix] {
            '"' => return Some(ix + 1),
            '\n' => return Some(ix),
            '\\' if ix + 1 < text.len() => ix += 2,
            '\\' if !is_last => return None,
            _ => ix += 1,
        }
    }
    is_last.then_some(text.len())
}
