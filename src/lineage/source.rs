//! Lineage fact store read contract
//!
//! The engine never owns lineage facts. Recorders append them to per-engine
//! lineage tables, a transformation table and the workflow tables; this
//! module describes the rows it reads back and the trait every store
//! implements.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Source database engines whose lineage tables are read by default
pub const KNOWN_ENGINES: &[&str] = &["mssql", "mariadb", "mongodb", "oracle", "postgres"];

/// Errors raised while reading one lineage source
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Lineage query failed: {0}")]
    Query(#[from] tokio_postgres::Error),

    #[error("Lineage pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    #[error("Unknown lineage engine: {0}")]
    UnknownEngine(String),

    #[error("Lineage source unavailable: {0}")]
    Unavailable(String),

    #[error("Lineage query timed out")]
    Timeout,
}

/// One per-engine lineage fact: `schema.object` feeds `target_schema.target_object`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineageRow {
    /// Engine whose lineage table produced this row
    pub engine: String,
    pub schema_name: String,
    pub object_name: String,
    pub object_type: String,
    pub target_schema_name: String,
    pub target_object_name: String,
    pub target_object_type: String,
    pub relationship_type: String,
    pub column_name: Option<String>,
    pub target_column_name: Option<String>,
}

impl LineageRow {
    pub fn source_key(&self) -> String {
        format!("{}.{}", self.schema_name, self.object_name)
    }

    pub fn target_key(&self) -> String {
        format!("{}.{}", self.target_schema_name, self.target_object_name)
    }

    /// Column pair, when both ends of a column-level fact are recorded
    pub fn column_pair(&self) -> Option<(&str, &str)> {
        match (self.column_name.as_deref(), self.target_column_name.as_deref()) {
            (Some(src), Some(dst)) if !src.is_empty() && !dst.is_empty() => Some((src, dst)),
            _ => None,
        }
    }
}

/// One transformation: the tables it reads and the tables it writes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformationRow {
    pub transformation_type: String,
    pub workflow_name: String,
    pub input_schemas: Vec<String>,
    pub input_tables: Vec<String>,
    pub output_schemas: Vec<String>,
    pub output_tables: Vec<String>,
}

impl TransformationRow {
    /// Stable display name, `workflow.type`
    pub fn name(&self) -> String {
        if self.workflow_name.is_empty() {
            self.transformation_type.clone()
        } else {
            format!("{}.{}", self.workflow_name, self.transformation_type)
        }
    }

    /// Inputs resolved to `(schema, table)` pairs
    pub fn inputs(&self) -> Vec<(String, String)> {
        resolve_tables(&self.input_schemas, &self.input_tables)
    }

    /// Outputs resolved to `(schema, table)` pairs
    pub fn outputs(&self) -> Vec<(String, String)> {
        resolve_tables(&self.output_schemas, &self.output_tables)
    }
}

/// Pair table entries with their schema.
///
/// An entry may already be qualified (`schema.table`). Otherwise it takes
/// the schema at the same position, or the only schema when a single one
/// is listed.
fn resolve_tables(schemas: &[String], tables: &[String]) -> Vec<(String, String)> {
    tables
        .iter()
        .enumerate()
        .filter(|(_, table)| !table.trim().is_empty())
        .map(|(i, table)| {
            let table = table.trim();
            if let Some((schema, name)) = table.split_once('.') {
                return (schema.to_string(), name.to_string());
            }
            let schema = schemas
                .get(i)
                .or_else(|| if schemas.len() == 1 { schemas.first() } else { None })
                .map(|s| s.trim().to_string())
                .unwrap_or_default();
            (schema, table.to_string())
        })
        .collect()
}

/// One task of one workflow
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowTaskRow {
    pub workflow_name: String,
    pub task_name: String,
    pub task_type: String,
    /// Free-form configuration text
    pub task_config: String,
    /// Names of tasks in the same workflow this task waits on
    pub dependencies: Vec<String>,
    /// Qualified table names the task declares it reads or writes
    pub table_refs: Vec<String>,
}

/// How a workflow or transformation was tied to a table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    /// Found in a structured list of table references
    Declared,
    /// Found by substring search over configuration text
    TextSearch,
}

impl MatchKind {
    /// Confidence attached to results found this way
    pub fn confidence(&self) -> f64 {
        match self {
            MatchKind::Declared => 1.0,
            MatchKind::TextSearch => TEXT_SEARCH_CONFIDENCE,
        }
    }
}

/// Confidence given to anything found by substring search
pub const TEXT_SEARCH_CONFIDENCE: f64 = 0.6;

/// A workflow or transformation referencing a table
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference {
    pub name: String,
    pub matched_by: MatchKind,
}

impl Reference {
    pub fn declared(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            matched_by: MatchKind::Declared,
        }
    }

    pub fn text_search(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            matched_by: MatchKind::TextSearch,
        }
    }
}

/// Which side of a transformation a table sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformationRole {
    /// The transformation reads the table
    Consumer,
    /// The transformation writes the table
    Producer,
}

/// Read-only access to recorded lineage facts
#[async_trait::async_trait]
pub trait LineageSource: Send + Sync {
    /// Every lineage row recorded for one engine
    async fn engine_lineage(&self, engine: &str) -> Result<Vec<LineageRow>, SourceError>;

    /// Rows across all engines whose source is `schema.table`
    async fn lineage_from(&self, schema: &str, table: &str) -> Result<Vec<LineageRow>, SourceError>;

    /// Rows across all engines whose target is `schema.table`
    async fn lineage_into(&self, schema: &str, table: &str) -> Result<Vec<LineageRow>, SourceError>;

    /// Every transformation lineage row
    async fn transformation_lineage(&self) -> Result<Vec<TransformationRow>, SourceError>;

    /// Workflow tasks, limited to `workflow_names` unless it is empty
    async fn workflow_tasks(&self, workflow_names: &[String]) -> Result<Vec<WorkflowTaskRow>, SourceError>;

    /// Workflows referencing `schema.table`
    async fn workflow_references(&self, schema: &str, table: &str) -> Result<Vec<Reference>, SourceError>;

    /// Transformations on the given side of `schema.table`.
    ///
    /// Consumers also include substring matches on configuration text,
    /// narrowed by `column` when one is given.
    async fn transformation_references(
        &self,
        schema: &str,
        table: &str,
        column: &str,
        role: TransformationRole,
    ) -> Result<Vec<Reference>, SourceError>;

    /// Qualified target columns fed by one source column
    async fn column_targets(&self, schema: &str, table: &str, column: &str) -> Result<Vec<String>, SourceError>;
}

/// Parse a text array literal such as `{a,"b c"}` into its items
pub fn parse_array_literal(literal: &str) -> Vec<String> {
    let content = literal.trim();
    let content = content
        .strip_prefix('{')
        .and_then(|c| c.strip_suffix('}'))
        .unwrap_or(content);

    content
        .split(',')
        .map(|item| item.trim().trim_matches('"').trim())
        .filter(|item| !item.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_array_literal() {
        assert_eq!(parse_array_literal("{}"), Vec::<String>::new());
        assert_eq!(parse_array_literal(""), Vec::<String>::new());
        assert_eq!(
            parse_array_literal(r#"{orders,"sales.customers", }"#),
            vec!["orders".to_string(), "sales.customers".to_string()]
        );
    }

    #[test]
    fn test_transformation_resolves_positional_schemas() {
        let row = TransformationRow {
            transformation_type: "join".into(),
            workflow_name: "nightly".into(),
            input_schemas: vec!["sales".into(), "crm".into()],
            input_tables: vec!["orders".into(), "accounts".into()],
            output_schemas: vec!["dw".into()],
            output_tables: vec!["fact_orders".into(), "staging.tmp".into()],
        };

        assert_eq!(
            row.inputs(),
            vec![
                ("sales".to_string(), "orders".to_string()),
                ("crm".to_string(), "accounts".to_string()),
            ]
        );
        assert_eq!(
            row.outputs(),
            vec![
                ("dw".to_string(), "fact_orders".to_string()),
                ("staging".to_string(), "tmp".to_string()),
            ]
        );
        assert_eq!(row.name(), "nightly.join");
    }

    #[test]
    fn test_column_pair_requires_both_ends() {
        let mut row = LineageRow {
            engine: "mssql".into(),
            schema_name: "s".into(),
            object_name: "a".into(),
            object_type: "table".into(),
            target_schema_name: "s".into(),
            target_object_name: "b".into(),
            target_object_type: "table".into(),
            relationship_type: "sync".into(),
            column_name: Some("id".into()),
            target_column_name: None,
        };
        assert_eq!(row.column_pair(), None);

        row.target_column_name = Some("a_id".into());
        assert_eq!(row.column_pair(), Some(("id", "a_id")));
    }
}
