//! Application state management
//!
//! Contains shared state accessible across all handlers.
//! Every component reads from the same lineage source; none keeps
//! per-request state.

use crate::config::LineageConfig;
use crate::impact::{ImpactAnalyzer, ImpactHistoryRepository};
use crate::lineage::{LineageGraphBuilder, LineageSource, PgLineageStore, TraversalLimits};
use deadpool_postgres::Pool;
use std::sync::Arc;

/// Application state shared across all handlers
pub struct AppState {
    /// Lineage store connection pool
    pub db_pool: Pool,

    /// Builds lineage graphs
    pub builder: LineageGraphBuilder,

    /// Answers impact questions
    pub analyzer: ImpactAnalyzer,

    /// Stored impact analyses
    pub history: ImpactHistoryRepository,

    pub lineage: LineageConfig,
}

impl AppState {
    /// Create application state over the lineage store pool
    pub fn new(pool: Pool, lineage: LineageConfig) -> Self {
        let source: Arc<dyn LineageSource> =
            Arc::new(PgLineageStore::new(pool.clone(), lineage.engines.clone()));
        Self::with_source(pool, source, lineage)
    }

    /// Create application state over any lineage source
    pub fn with_source(pool: Pool, source: Arc<dyn LineageSource>, lineage: LineageConfig) -> Self {
        Self {
            builder: LineageGraphBuilder::new(source.clone())
                .with_default_engines(lineage.engines.clone()),
            analyzer: ImpactAnalyzer::new(source).with_query_timeout(lineage.query_timeout),
            history: ImpactHistoryRepository::new(pool.clone()),
            db_pool: pool,
            lineage,
        }
    }

    /// Traversal limits for one request, `max_depth` defaulting to the configured depth
    pub fn traversal_limits(&self, max_depth: Option<usize>) -> TraversalLimits {
        TraversalLimits::new(max_depth.unwrap_or(self.lineage.max_depth))
            .with_timeout(self.lineage.query_timeout)
    }
}

/// Type alias for shared state
pub type SharedState = Arc<AppState>;
