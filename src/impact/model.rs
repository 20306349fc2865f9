//! Impact analysis data types

use crate::lineage::source::{MatchKind, Reference};
use crate::lineage::traversal::DEFAULT_MAX_DEPTH;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// What an analysis was run on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    #[default]
    Table,
    Column,
    Workflow,
    Transformation,
    /// Result of a schema change whose type is not recognised
    SchemaChange,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Table => "table",
            ResourceType::Column => "column",
            ResourceType::Workflow => "workflow",
            ResourceType::Transformation => "transformation",
            ResourceType::SchemaChange => "schema_change",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "table" => Some(ResourceType::Table),
            "column" => Some(ResourceType::Column),
            "workflow" => Some(ResourceType::Workflow),
            "transformation" => Some(ResourceType::Transformation),
            "schema_change" => Some(ResourceType::SchemaChange),
            _ => None,
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Schema changes with a known impact policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    DropTable,
    RenameTable,
    AlterColumn,
    DropColumn,
    AddColumn,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::DropTable => "drop_table",
            ChangeType::RenameTable => "rename_table",
            ChangeType::AlterColumn => "alter_column",
            ChangeType::DropColumn => "drop_column",
            ChangeType::AddColumn => "add_column",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "drop_table" => Some(ChangeType::DropTable),
            "rename_table" => Some(ChangeType::RenameTable),
            "alter_column" => Some(ChangeType::AlterColumn),
            "drop_column" => Some(ChangeType::DropColumn),
            "add_column" => Some(ChangeType::AddColumn),
            _ => None,
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options of one analysis call
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalysisConfig {
    /// Also search workflow task definitions
    pub include_workflows: bool,
    /// Also search transformation definitions
    pub include_transformations: bool,
    /// Also list downstream columns when a column is given
    pub include_columns: bool,
    /// Also walk the per-engine lineage tables
    pub include_lineage: bool,
    pub max_depth: usize,
    /// Advisory only; caching lives outside the analyzer
    pub use_cache: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            include_workflows: true,
            include_transformations: true,
            include_columns: true,
            include_lineage: true,
            max_depth: DEFAULT_MAX_DEPTH,
            use_cache: true,
        }
    }
}

/// Which way a dependency points from the analyzed resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImpactDirection {
    Downstream,
    Upstream,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyKind {
    Table,
    Workflow,
    Transformation,
    Column,
}

/// One hit recorded while analyzing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyDetail {
    pub direction: ImpactDirection,
    pub kind: DependencyKind,
    pub name: String,
    /// Hops from the analyzed table, for lineage hits
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth: Option<usize>,
    /// Engine of a lineage hit, or how a reference was matched
    pub source: String,
    pub confidence: f64,
}

impl DependencyDetail {
    pub fn lineage(direction: ImpactDirection, name: String, depth: usize, engine: &str) -> Self {
        Self {
            direction,
            kind: DependencyKind::Table,
            name,
            depth: Some(depth),
            source: engine.to_string(),
            confidence: MatchKind::Declared.confidence(),
        }
    }

    pub fn reference(direction: ImpactDirection, kind: DependencyKind, reference: &Reference) -> Self {
        let source = match reference.matched_by {
            MatchKind::Declared => "declared",
            MatchKind::TextSearch => "text_search",
        };
        Self {
            direction,
            kind,
            name: reference.name.clone(),
            depth: None,
            source: source.to_string(),
            confidence: reference.matched_by.confidence(),
        }
    }
}

/// Everything found to depend on, or be depended on by, one resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpactResult {
    pub resource_type: ResourceType,
    /// Qualified name of the analyzed resource
    pub resource_name: String,
    pub schema_name: String,
    pub table_name: String,
    #[serde(default)]
    pub column_name: String,

    pub affected_tables: BTreeSet<String>,
    pub affected_workflows: BTreeSet<String>,
    pub affected_transformations: BTreeSet<String>,
    pub affected_columns: BTreeSet<String>,

    pub dependent_tables: BTreeSet<String>,
    pub dependent_workflows: BTreeSet<String>,
    pub dependent_transformations: BTreeSet<String>,

    pub total_downstream_impact: usize,
    pub total_upstream_impact: usize,
    /// Lowest confidence among the recorded hits
    pub confidence_score: f64,
    pub dependency_details: Vec<DependencyDetail>,
    /// A traversal deadline cut the lineage walk short
    #[serde(default)]
    pub truncated: bool,
}

impl ImpactResult {
    /// Empty result identifying `schema.table[.column]`
    pub fn for_resource(schema: &str, table: &str, column: &str) -> Self {
        let resource_type = if column.is_empty() {
            ResourceType::Table
        } else {
            ResourceType::Column
        };
        Self::empty(resource_type, schema, table, column)
    }

    pub fn empty(resource_type: ResourceType, schema: &str, table: &str, column: &str) -> Self {
        Self {
            resource_type,
            resource_name: crate::lineage::model::qualified_name(schema, table, column),
            schema_name: schema.to_string(),
            table_name: table.to_string(),
            column_name: column.to_string(),
            affected_tables: BTreeSet::new(),
            affected_workflows: BTreeSet::new(),
            affected_transformations: BTreeSet::new(),
            affected_columns: BTreeSet::new(),
            dependent_tables: BTreeSet::new(),
            dependent_workflows: BTreeSet::new(),
            dependent_transformations: BTreeSet::new(),
            total_downstream_impact: 0,
            total_upstream_impact: 0,
            confidence_score: 1.0,
            dependency_details: Vec::new(),
            truncated: false,
        }
    }

    /// Record a hit, lowering the confidence score when it is heuristic
    pub fn record(&mut self, detail: DependencyDetail) {
        self.confidence_score = self.confidence_score.min(detail.confidence);
        self.dependency_details.push(detail);
    }

    /// Recompute both totals from the set sizes
    pub fn recount(&mut self) {
        self.total_downstream_impact = self.affected_tables.len()
            + self.affected_workflows.len()
            + self.affected_transformations.len()
            + self.affected_columns.len();
        self.total_upstream_impact = self.dependent_tables.len()
            + self.dependent_workflows.len()
            + self.dependent_transformations.len();
    }

    /// Take the upstream half of `upstream`, keeping the downstream half of self
    pub fn merge_upstream(&mut self, upstream: ImpactResult) {
        self.dependent_tables = upstream.dependent_tables;
        self.dependent_workflows = upstream.dependent_workflows;
        self.dependent_transformations = upstream.dependent_transformations;
        self.confidence_score = self.confidence_score.min(upstream.confidence_score);
        self.dependency_details.extend(upstream.dependency_details);
        self.truncated |= upstream.truncated;
        self.recount();
    }
}
