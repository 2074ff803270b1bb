//! Position tracking and incremental relexing for a mutable text buffer.
//!
//! Many observers need to follow logical positions in a buffer while it is
//! edited: carets, selection bounds, read-only regions, search highlights and
//! lexer checkpoints. This crate keeps them all in [`MarkTree`] planes, where an
//! edit costs O(log n + k) instead of touching every observer, and re-tokenizes
//! only the text between an edit and the point where the lexer state
//! reconverges.
//!
//! The key components are:
//! - [`MarkTree`] - relative-delta B-tree of marks, one per plane
//! - [`BlockChain`] - sorted, disjoint ranges held by pairs of marks
//! - [`guard::Guards`] - read-only ranges checked before every edit
//! - [`syntax::CheckpointStore`] and [`syntax::Relexer`] - incremental relexing
//!   against any [`syntax::Tokenizer`]
//! - [`Document`] - a `ropey` buffer with all of the above behind a read/write lock

pub mod block_chain;
pub mod document;
pub mod edit;
pub mod error;
pub mod guard;
pub mod mark_tree;
pub mod pool;
pub mod settings;
pub mod syntax;

pub use block_chain::{BlockChain, BlockInfo, BlockRelation};
pub use document::{AtomicSection, Document, DocumentRead, DocumentState, LayerId};
pub use edit::{EditRecord, Position};
pub use error::{Error, Result};
pub use mark_tree::{
    Bias, MarkHandle, MarkOptions, MarkRemoved, MarkTree, OnRemoved, RemovalCallback,
};
pub use settings::{PoolSettings, RelexSettings, Settings};
