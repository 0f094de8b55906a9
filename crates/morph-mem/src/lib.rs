//! Memory infrastructure for the `morph` type engine.
//!
//! - [`arena`]: the pooled bump allocator with two-fragment reuse that backs
//!   type-graph side tables, AST nodes and IR nodes
//! - [`names`]: the append-only name index (string ↔ dense id)
//! - [`name_id`]: the [`NameId`] handle returned by the index

pub mod arena;
pub mod name_id;
pub mod names;

pub use arena::{AllocError, ArenaStats, PoolArena};
pub use name_id::NameId;
pub use names::NameIndex;
