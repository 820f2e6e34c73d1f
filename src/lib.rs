//! An order-parameterized B-tree for Rust.
//!
//! This crate provides [`BTree`], an in-memory ordered key/value index whose order (the
//! maximum number of children per node) is chosen at construction time.
//!
//! # Example
//!
//! ```
//! use element_btree::BTree;
//!
//! let mut index = BTree::new(4)?;
//! assert!(index.insert("carol", 92)?);
//! assert!(index.insert("alice", 100)?);
//! assert!(!index.insert("alice", 85)?); // replaced, not inserted
//!
//! assert_eq!(index.find("alice"), Some(&85));
//! assert!(index.delete("carol")?);
//! assert_eq!(index.find("carol"), None);
//! # Ok::<(), element_btree::Error>(())
//! ```
//!
//! # Features
//!
//! - **`no_std` compatible** - Only requires `alloc`, no standard library dependency
//! - **Any order from 3 up** - A 2-3 tree at order 3, wide nodes at larger orders
//! - **Checked structure** - Broken invariants surface as [`Error::TreeInvariantViolation`]
//!   instead of being mistaken for a missing key
//!
//! # Implementation
//!
//! Keys live in elements; each element links to the subtree of smaller keys on its left and
//! larger keys on its right, and neighbouring elements share the subtree between them. Nodes
//! and elements are stored in arenas and linked by handles, so a node can reach its parent
//! and, through the parent elements that bound it, its siblings without re-descending from
//! the root.

#![no_std]
#![forbid(unsafe_code)]
#![forbid(keyword_idents)]
#![forbid(non_ascii_idents)]
#![forbid(unreachable_pub)]
#![warn(clippy::all)]
#![warn(clippy::cargo)]
#![warn(clippy::pedantic)]
// Enable coverage attributes for nightly builds.
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

extern crate alloc;

mod error;
mod order;
mod raw;

pub mod btree;

pub use btree::BTree;
pub use error::{Error, Result};
pub use order::Order;
