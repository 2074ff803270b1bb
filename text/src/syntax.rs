//! Resumable tokenizing with checkpoints that survive edits.

pub mod c_like;
pub mod checkpoint;
pub mod relexer;
pub mod scanner;
pub mod tokenizer;

pub use c_like::{CLikeKind, CLikeState, CLikeTokenizer};
pub use checkpoint::{Checkpoint, CheckpointStore};
pub use relexer::{RelexOutcome, RelexReport, Relexer};
pub use scanner::{tokenize, Token};
pub use tokenizer::{Chunk, Scan, Tokenizer};
