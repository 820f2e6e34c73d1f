//! Error types for `element_btree`.

use thiserror::Error;

/// Convenient Result type alias.
pub type Result<T> = core::result::Result<T, Error>;

/// Errors reported by a [`BTree`](crate::BTree).
///
/// A missing key is never an error: `find` returns `None` and `delete` returns `false`.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The requested order cannot form a B-tree.
    #[error("invalid order {0}: a B-tree needs an order of at least 3")]
    InvalidOrder(usize),

    /// The tree's structure is broken.
    ///
    /// This indicates a bug: the operation in progress was abandoned and the tree should be
    /// considered corrupt.
    #[error("tree invariant violated: {0}")]
    TreeInvariantViolation(&'static str),
}
