//! Lineage Module
//!
//! Everything about "what feeds what":
//! - Graph model (arena of nodes and edges keyed by deterministic ids)
//! - Lineage fact store contract and its Postgres implementation
//! - Bounded traversal shared by the builder and the impact analyzer
//! - Graph builder and read-only graph queries (filter, path)

pub mod model;
pub mod source;
pub mod queries;
pub mod pg_store;
pub mod traversal;
pub mod builder;
pub mod query;

#[cfg(test)]
pub mod memory;

pub use builder::LineageGraphBuilder;
pub use model::{EdgeKind, Graph, NodeType};
pub use pg_store::PgLineageStore;
pub use source::LineageSource;
pub use traversal::{Direction, TraversalLimits, DEFAULT_MAX_DEPTH};
