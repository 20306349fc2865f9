//! Impact report documents
//!
//! The report is the exported and persisted form of an [`ImpactResult`]:
//! snake_case keys, sets as sorted arrays and a `total_count` per direction.

use crate::impact::model::{DependencyDetail, ImpactResult, ResourceType};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeSet;

/// Serialize a result into its report document
pub fn generate_impact_report(result: &ImpactResult) -> Value {
    json!({
        "resource_type": result.resource_type.as_str(),
        "resource_name": result.resource_name,
        "schema_name": result.schema_name,
        "table_name": result.table_name,
        "column_name": result.column_name,
        "downstream_impact": {
            "affected_tables": result.affected_tables,
            "affected_workflows": result.affected_workflows,
            "affected_transformations": result.affected_transformations,
            "affected_columns": result.affected_columns,
            "total_count": result.total_downstream_impact,
        },
        "upstream_impact": {
            "dependent_tables": result.dependent_tables,
            "dependent_workflows": result.dependent_workflows,
            "dependent_transformations": result.dependent_transformations,
            "total_count": result.total_upstream_impact,
        },
        "confidence_score": result.confidence_score,
        "dependency_details": result.dependency_details,
        "truncated": result.truncated,
        "generated_at": chrono::Utc::now().to_rfc3339(),
    })
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct ReportDocument {
    resource_type: String,
    schema_name: String,
    table_name: String,
    column_name: String,
    downstream_impact: DownstreamSection,
    upstream_impact: UpstreamSection,
    confidence_score: Option<f64>,
    dependency_details: Vec<DependencyDetail>,
    truncated: bool,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct DownstreamSection {
    affected_tables: BTreeSet<String>,
    affected_workflows: BTreeSet<String>,
    affected_transformations: BTreeSet<String>,
    affected_columns: BTreeSet<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct UpstreamSection {
    dependent_tables: BTreeSet<String>,
    dependent_workflows: BTreeSet<String>,
    dependent_transformations: BTreeSet<String>,
}

/// Rebuild a result from a stored report document.
///
/// Totals are recomputed from the restored sets.
pub fn result_from_report(report: Value) -> Result<ImpactResult, serde_json::Error> {
    let document: ReportDocument = serde_json::from_value(report)?;

    let resource_type = ResourceType::parse(&document.resource_type).unwrap_or_default();
    let mut result = ImpactResult::empty(
        resource_type,
        &document.schema_name,
        &document.table_name,
        &document.column_name,
    );

    result.affected_tables = document.downstream_impact.affected_tables;
    result.affected_workflows = document.downstream_impact.affected_workflows;
    result.affected_transformations = document.downstream_impact.affected_transformations;
    result.affected_columns = document.downstream_impact.affected_columns;
    result.dependent_tables = document.upstream_impact.dependent_tables;
    result.dependent_workflows = document.upstream_impact.dependent_workflows;
    result.dependent_transformations = document.upstream_impact.dependent_transformations;
    result.confidence_score = document.confidence_score.unwrap_or(1.0);
    result.dependency_details = document.dependency_details;
    result.truncated = document.truncated;
    result.recount();

    Ok(result)
}
