//! Impact Analyzer
//!
//! "What is affected if this changes, and what does it depend on?"
//! Answers straight from the lineage fact store: a bounded lineage walk
//! plus workflow, transformation and column lookups. A lookup that fails
//! contributes nothing; the result is partial rather than an error.

use crate::impact::model::{
    AnalysisConfig, ChangeType, DependencyDetail, DependencyKind, ImpactDirection, ImpactResult,
    ResourceType,
};
use crate::lineage::source::{LineageSource, Reference, SourceError, TransformationRole};
use crate::lineage::traversal::{self, Direction, Hop, TraversalLimits};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Answers impact questions against a lineage source
#[derive(Clone)]
pub struct ImpactAnalyzer {
    source: Arc<dyn LineageSource>,
    /// Per-call bound on the lineage walk
    query_timeout: Option<Duration>,
}

impl ImpactAnalyzer {
    pub fn new(source: Arc<dyn LineageSource>) -> Self {
        Self {
            source,
            query_timeout: None,
        }
    }

    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = Some(timeout);
        self
    }

    /// Limits for one public call; every lookup of the call shares its deadline
    fn limits(&self, max_depth: usize) -> TraversalLimits {
        let limits = TraversalLimits::new(max_depth);
        match self.query_timeout {
            Some(timeout) => limits.with_timeout(timeout),
            None => limits,
        }
    }

    /// Everything fed by `schema.table[.column]`
    pub async fn analyze_downstream_impact(
        &self,
        schema: &str,
        table: &str,
        column: &str,
        config: &AnalysisConfig,
    ) -> ImpactResult {
        let limits = self.limits(config.max_depth);
        self.downstream_within(schema, table, column, config, limits).await
    }

    /// Everything `schema.table[.column]` depends on
    pub async fn analyze_upstream_impact(
        &self,
        schema: &str,
        table: &str,
        column: &str,
        config: &AnalysisConfig,
    ) -> ImpactResult {
        let limits = self.limits(config.max_depth);
        self.upstream_within(schema, table, column, config, limits).await
    }

    /// Downstream and upstream impact in one result
    pub async fn analyze_full_impact(
        &self,
        schema: &str,
        table: &str,
        column: &str,
        config: &AnalysisConfig,
    ) -> ImpactResult {
        let limits = self.limits(config.max_depth);
        self.full_within(schema, table, column, config, limits).await
    }

    /// Impact of a planned schema change.
    ///
    /// Table drops and renames get a full table-level analysis; column drops
    /// and alterations a full column-level one. A new column has no existing
    /// consumers, so only its upstream side is analyzed. Unknown change types
    /// give an empty `schema_change` result.
    pub async fn analyze_schema_change_impact(
        &self,
        schema: &str,
        change_type: &str,
        table: &str,
        column: &str,
        config: &AnalysisConfig,
    ) -> ImpactResult {
        let limits = self.limits(config.max_depth);
        match ChangeType::parse(change_type) {
            Some(ChangeType::DropTable | ChangeType::RenameTable) => {
                self.full_within(schema, table, "", config, limits).await
            }
            Some(ChangeType::AlterColumn | ChangeType::DropColumn) => {
                self.full_within(schema, table, column, config, limits).await
            }
            Some(ChangeType::AddColumn) => {
                self.upstream_within(schema, table, column, config, limits).await
            }
            None => {
                debug!("No impact policy for change type '{}'", change_type);
                ImpactResult::empty(ResourceType::SchemaChange, schema, table, column)
            }
        }
    }

    async fn downstream_within(
        &self,
        schema: &str,
        table: &str,
        column: &str,
        config: &AnalysisConfig,
        limits: TraversalLimits,
    ) -> ImpactResult {
        let mut result = ImpactResult::for_resource(schema, table, column);
        let direction = ImpactDirection::Downstream;

        if config.include_lineage {
            result.affected_tables = self
                .lineage_tables(schema, table, Direction::Downstream, limits, &mut result)
                .await;
        }

        if config.include_workflows {
            let found = traversal::bounded(&limits, self.source.workflow_references(schema, table)).await;
            let references = found_or_empty(&mut result, "workflow references", found);
            result.affected_workflows =
                record_references(&mut result, direction, DependencyKind::Workflow, references);
        }

        if config.include_transformations {
            let found = traversal::bounded(
                &limits,
                self.source
                    .transformation_references(schema, table, column, TransformationRole::Consumer),
            )
            .await;
            let references = found_or_empty(&mut result, "transformation references", found);
            result.affected_transformations =
                record_references(&mut result, direction, DependencyKind::Transformation, references);
        }

        if config.include_columns && !column.is_empty() {
            let found = traversal::bounded(&limits, self.source.column_targets(schema, table, column)).await;
            let columns = found_or_empty(&mut result, "affected columns", found);
            for name in &columns {
                result.record(DependencyDetail {
                    direction,
                    kind: DependencyKind::Column,
                    name: name.clone(),
                    depth: Some(1),
                    source: "lineage".to_string(),
                    confidence: 1.0,
                });
            }
            result.affected_columns = columns.into_iter().collect();
        }

        result.recount();
        debug!(
            "Downstream impact of {}: {} resources",
            result.resource_name, result.total_downstream_impact
        );
        result
    }

    async fn upstream_within(
        &self,
        schema: &str,
        table: &str,
        column: &str,
        config: &AnalysisConfig,
        limits: TraversalLimits,
    ) -> ImpactResult {
        let mut result = ImpactResult::for_resource(schema, table, column);
        let direction = ImpactDirection::Upstream;

        if config.include_lineage {
            result.dependent_tables = self
                .lineage_tables(schema, table, Direction::Upstream, limits, &mut result)
                .await;
        }

        // a workflow touching the table may feed it as well as read it
        if config.include_workflows {
            let found = traversal::bounded(&limits, self.source.workflow_references(schema, table)).await;
            let references = found_or_empty(&mut result, "workflow references", found);
            result.dependent_workflows =
                record_references(&mut result, direction, DependencyKind::Workflow, references);
        }

        if config.include_transformations {
            let found = traversal::bounded(
                &limits,
                self.source
                    .transformation_references(schema, table, column, TransformationRole::Producer),
            )
            .await;
            let references = found_or_empty(&mut result, "transformation references", found);
            result.dependent_transformations =
                record_references(&mut result, direction, DependencyKind::Transformation, references);
        }

        result.recount();
        debug!(
            "Upstream impact of {}: {} resources",
            result.resource_name, result.total_upstream_impact
        );
        result
    }

    async fn full_within(
        &self,
        schema: &str,
        table: &str,
        column: &str,
        config: &AnalysisConfig,
        limits: TraversalLimits,
    ) -> ImpactResult {
        let mut result = self
            .downstream_within(schema, table, column, config, limits)
            .await;
        let upstream = self
            .upstream_within(schema, table, column, config, limits)
            .await;
        result.merge_upstream(upstream);

        info!(
            "Impact of {}: {} downstream, {} upstream (confidence {:.2})",
            result.resource_name,
            result.total_downstream_impact,
            result.total_upstream_impact,
            result.confidence_score
        );
        result
    }

    /// Tables reached by walking lineage; a walk cut short marks the result truncated
    async fn lineage_tables(
        &self,
        schema: &str,
        table: &str,
        direction: Direction,
        limits: TraversalLimits,
        result: &mut ImpactResult,
    ) -> BTreeSet<String> {
        let impact_direction = match direction {
            Direction::Upstream => ImpactDirection::Upstream,
            _ => ImpactDirection::Downstream,
        };
        let mut tables = BTreeSet::new();

        let outcome = traversal::walk(
            self.source.as_ref(),
            schema,
            table,
            direction,
            limits,
            &mut |hop: &Hop<'_>| {
                if hop.first_visit {
                    let name = hop.far_key();
                    tables.insert(name.clone());
                    result.record(DependencyDetail::lineage(
                        impact_direction,
                        name,
                        hop.depth,
                        &hop.row.engine,
                    ));
                }
            },
        )
        .await;

        result.truncated |= outcome.truncated;
        tables
    }
}

/// Unwrap a lookup, logging a failure and treating it as empty.
/// A lookup stopped by the deadline marks the result truncated.
fn found_or_empty<T>(result: &mut ImpactResult, what: &str, found: Result<Vec<T>, SourceError>) -> Vec<T> {
    match found {
        Ok(found) => found,
        Err(SourceError::Timeout) => {
            warn!("Lookup of {} for {} ran past the deadline", what, result.resource_name);
            result.truncated = true;
            Vec::new()
        }
        Err(e) => {
            error!("Error finding {} of {}: {}", what, result.resource_name, e);
            Vec::new()
        }
    }
}

fn record_references(
    result: &mut ImpactResult,
    direction: ImpactDirection,
    kind: DependencyKind,
    references: Vec<Reference>,
) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    for reference in references {
        if names.insert(reference.name.clone()) {
            result.record(DependencyDetail::reference(direction, kind, &reference));
        }
    }
    names
}
