//! SQL statement splitting

mod splitter;

pub use splitter::{split, CommentBlock, StatementBlock};
