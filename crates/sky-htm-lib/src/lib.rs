//! Sky HTM Library - Hierarchical Triangular Mesh indexing for sky catalogs
//!
//! This library partitions the celestial sphere into a recursively subdivided set of
//! spherical triangles ("trixels"), gives every trixel a compact path-based identity,
//! and indexes catalog segments by that identity with an ordered skip list. Query
//! regions (constraints, convex regions and domains) are read from and written to a
//! plain-text descriptor format.
//!
//! # Architecture
//!
//! - **[`trixel`]**: Conversion between directions, trixel names and packed 64-bit IDs
//! - **[`SkipList`]**: Probabilistic ordered map from `i64` keys to `i32` values
//! - **[`TrixelRanges`]**: Disjoint ID ranges kept in a pair of skip lists
//! - **[`region`]**: Constraints, convex regions and domains plus their text format
//! - **[`CatalogIndex`]**: High-level manager mapping trixel IDs to catalog segments
//!
//! # Performance Characteristics
//!
//! - **Encoding**: O(D) per point where D = mesh depth
//! - **Index lookups**: O(log N) expected, N = indexed segments
//! - **Memory**: one arena slot per indexed key, links stored as indices

mod catalog;
pub mod command;
pub mod range;
pub mod region;
pub mod skiplist;
pub mod trixel;
pub mod vector;

// Public API exports
pub use catalog::{CatalogIndex, Config, IndexInfo};
pub use command::{Command, Lookup};
pub use range::{Inclusion, TrixelRanges};
pub use region::{Constraint, ConvexRegion, Coverage, Domain, Sign};
pub use skiplist::{Key, SkipList, SkipListStats, Value};
pub use trixel::TrixelId;
pub use vector::Vector3;

/// Error types for the HTM library
#[derive(Debug, thiserror::Error)]
pub enum HtmError {
    #[error("Invalid trixel name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },

    #[error("Invalid trixel ID: {0}")]
    InvalidId(u64),

    #[error("Depth {depth} too large (max is {max})")]
    DepthTooLarge { depth: usize, max: usize },

    #[error("Direction vector must be finite and non-zero")]
    InvalidVector,

    #[error("Trixel ID {0} does not fit in a signed index key")]
    KeyOutOfRange(u64),

    #[error("Promotion probability {0} must lie strictly between 0 and 1")]
    InvalidProbability(f64),

    #[error("Trixel depth mismatch: expected {expected}, found {found}")]
    DepthMismatch { expected: usize, found: usize },

    #[error("Line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Line {line}: Premature end-of-file while reading {context}")]
    UnexpectedEof { line: usize, context: &'static str },

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HtmError>;
