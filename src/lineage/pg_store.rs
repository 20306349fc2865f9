//! PostgreSQL-backed lineage fact store

use crate::lineage::queries::{self, like_pattern};
use crate::lineage::source::{
    parse_array_literal, LineageRow, LineageSource, Reference, SourceError, TransformationRole,
    TransformationRow, WorkflowTaskRow, KNOWN_ENGINES,
};
use deadpool_postgres::Pool;
use serde_json::Value;
use std::collections::HashSet;
use tokio_postgres::Row;
use tracing::{debug, error, warn};

/// Reads lineage facts from the `metadata` schema of a Postgres database
pub struct PgLineageStore {
    pool: Pool,
    /// Engines whose lineage tables take part in cross-engine queries
    engines: Vec<String>,
}

impl PgLineageStore {
    pub fn new(pool: Pool, engines: Vec<String>) -> Self {
        let engines = engines
            .into_iter()
            .filter(|engine| {
                let known = is_known_engine(engine);
                if !known {
                    warn!("Ignoring unknown lineage engine '{}'", engine);
                }
                known
            })
            .collect();

        Self { pool, engines }
    }

    /// Run one per-engine query against every configured engine.
    ///
    /// An engine that fails is logged and skipped; the call only fails when
    /// every engine failed.
    async fn across_engines<F>(
        &self,
        params: &[&(dyn tokio_postgres::types::ToSql + Sync)],
        sql_for: F,
    ) -> Result<Vec<(String, Row)>, SourceError>
    where
        F: Fn(&str) -> String,
    {
        if self.engines.is_empty() {
            return Err(SourceError::Unavailable(
                "no lineage engines are configured".to_string(),
            ));
        }

        let client = self.pool.get().await?;
        let mut rows = Vec::new();
        let mut last_error = None;
        let mut answered = 0usize;

        for engine in &self.engines {
            match client.query(sql_for(engine).as_str(), params).await {
                Ok(result) => {
                    answered += 1;
                    rows.extend(result.into_iter().map(|row| (engine.clone(), row)));
                }
                Err(e) => {
                    error!("Lineage query against engine '{}' failed: {}", engine, e);
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if answered == 0 => Err(SourceError::Query(e)),
            _ => Ok(rows),
        }
    }

    async fn declared_workflows(&self, qualified: &str) -> Result<Vec<String>, SourceError> {
        let client = self.pool.get().await?;
        let rows = client
            .query(queries::SELECT_WORKFLOWS_DECLARING, &[&qualified])
            .await?;
        Ok(rows.iter().filter_map(|r| r.text_column("workflow_name")).collect())
    }

    async fn workflows_mentioning(&self, qualified: &str) -> Result<Vec<String>, SourceError> {
        let client = self.pool.get().await?;
        let rows = client
            .query(queries::SELECT_WORKFLOWS_MENTIONING, &[&like_pattern(qualified)])
            .await?;
        Ok(rows.iter().filter_map(|r| r.text_column("workflow_name")).collect())
    }

    async fn transformations_mentioning(
        &self,
        qualified: &str,
        column: &str,
    ) -> Result<Vec<String>, SourceError> {
        let client = self.pool.get().await?;
        let table_pattern = like_pattern(qualified);
        let rows = if column.is_empty() {
            client
                .query(queries::SELECT_TRANSFORMATIONS_MENTIONING, &[&table_pattern])
                .await?
        } else {
            client
                .query(
                    queries::SELECT_TRANSFORMATIONS_MENTIONING_COLUMN,
                    &[&table_pattern, &like_pattern(column)],
                )
                .await?
        };
        Ok(rows
            .iter()
            .filter_map(|r| r.text_column("transformation_name"))
            .collect())
    }
}

#[async_trait::async_trait]
impl LineageSource for PgLineageStore {
    async fn engine_lineage(&self, engine: &str) -> Result<Vec<LineageRow>, SourceError> {
        if !is_known_engine(engine) {
            return Err(SourceError::UnknownEngine(engine.to_string()));
        }

        let client = self.pool.get().await?;
        let rows = client
            .query(queries::select_engine_lineage(engine).as_str(), &[])
            .await?;

        debug!("Read {} lineage rows from engine '{}'", rows.len(), engine);
        Ok(lineage_rows(engine, &rows))
    }

    async fn lineage_from(&self, schema: &str, table: &str) -> Result<Vec<LineageRow>, SourceError> {
        let rows = self
            .across_engines(&[&schema, &table], queries::select_lineage_from)
            .await?;
        Ok(rows
            .iter()
            .filter_map(|(engine, row)| lineage_row(engine, row))
            .collect())
    }

    async fn lineage_into(&self, schema: &str, table: &str) -> Result<Vec<LineageRow>, SourceError> {
        let rows = self
            .across_engines(&[&schema, &table], queries::select_lineage_into)
            .await?;
        Ok(rows
            .iter()
            .filter_map(|(engine, row)| lineage_row(engine, row))
            .collect())
    }

    async fn transformation_lineage(&self) -> Result<Vec<TransformationRow>, SourceError> {
        let client = self.pool.get().await?;
        let rows = client
            .query(queries::SELECT_TRANSFORMATION_LINEAGE, &[])
            .await?;

        Ok(rows.iter().filter_map(|row| transformation_row(row)).collect())
    }

    async fn workflow_tasks(&self, workflow_names: &[String]) -> Result<Vec<WorkflowTaskRow>, SourceError> {
        let client = self.pool.get().await?;
        let rows = if workflow_names.is_empty() {
            client.query(queries::SELECT_WORKFLOW_TASKS, &[]).await?
        } else {
            let names = workflow_names.to_vec();
            client
                .query(queries::SELECT_WORKFLOW_TASKS_BY_NAME, &[&names])
                .await?
        };

        Ok(rows.iter().filter_map(|row| workflow_task_row(row)).collect())
    }

    async fn workflow_references(&self, schema: &str, table: &str) -> Result<Vec<Reference>, SourceError> {
        let qualified = format!("{}.{}", schema, table);

        let declared = self.declared_workflows(&qualified).await;
        let mentioned = self.workflows_mentioning(&qualified).await;

        merge_references(declared, mentioned, "workflow")
    }

    async fn transformation_references(
        &self,
        schema: &str,
        table: &str,
        column: &str,
        role: TransformationRole,
    ) -> Result<Vec<Reference>, SourceError> {
        let declared = self.transformation_lineage().await.map(|rows| {
            rows.iter()
                .filter(|row| {
                    let tables = match role {
                        TransformationRole::Consumer => row.inputs(),
                        TransformationRole::Producer => row.outputs(),
                    };
                    tables.iter().any(|(s, t)| s == schema && t == table)
                })
                .map(|row| row.name())
                .collect::<Vec<_>>()
        });

        match role {
            TransformationRole::Consumer => {
                let qualified = format!("{}.{}", schema, table);
                let mentioned = self.transformations_mentioning(&qualified, column).await;
                merge_references(declared, mentioned, "transformation")
            }
            TransformationRole::Producer => {
                Ok(declared?.into_iter().map(Reference::declared).collect())
            }
        }
    }

    async fn column_targets(&self, schema: &str, table: &str, column: &str) -> Result<Vec<String>, SourceError> {
        let rows = self
            .across_engines(&[&schema, &table, &column], queries::select_column_targets)
            .await?;

        let mut seen = HashSet::new();
        Ok(rows
            .iter()
            .filter_map(|(_, row)| {
                let target_schema = row.text_column("target_schema_name")?;
                let target_table = row.text_column("target_object_name")?;
                let target_column = row.text_column("target_column_name")?;
                Some(format!("{}.{}.{}", target_schema, target_table, target_column))
            })
            .filter(|qualified| seen.insert(qualified.clone()))
            .collect())
    }
}

fn is_known_engine(engine: &str) -> bool {
    KNOWN_ENGINES.contains(&engine)
}

/// Combine structured and substring matches, keeping the structured match
/// when a name is found both ways. Fails only when both lookups failed.
fn merge_references(
    declared: Result<Vec<String>, SourceError>,
    mentioned: Result<Vec<String>, SourceError>,
    what: &str,
) -> Result<Vec<Reference>, SourceError> {
    let (declared, mentioned) = match (declared, mentioned) {
        (Err(declared_err), Err(mentioned_err)) => {
            warn!(
                "Both {} lookups failed (declared: {}; text search: {})",
                what, declared_err, mentioned_err
            );
            return Err(mentioned_err);
        }
        (declared, mentioned) => (
            declared.unwrap_or_else(|e| {
                warn!("Declared {} lookup failed: {}", what, e);
                Vec::new()
            }),
            mentioned.unwrap_or_else(|e| {
                warn!("Text search {} lookup failed: {}", what, e);
                Vec::new()
            }),
        ),
    };

    let mut seen = HashSet::new();
    let mut references = Vec::new();
    for name in declared {
        if seen.insert(name.clone()) {
            references.push(Reference::declared(name));
        }
    }
    for name in mentioned {
        if seen.insert(name.clone()) {
            references.push(Reference::text_search(name));
        }
    }
    Ok(references)
}

/// Column access the row parsers need
pub(crate) trait FactRow {
    /// Non-null text value; a missing column or another type counts as absent
    fn text_column(&self, column: &str) -> Option<String>;

    /// Non-null JSON value; a missing column or another type counts as absent
    fn json_column(&self, column: &str) -> Option<Value>;
}

impl FactRow for Row {
    fn text_column(&self, column: &str) -> Option<String> {
        self.try_get::<_, Option<String>>(column).ok().flatten()
    }

    fn json_column(&self, column: &str) -> Option<Value> {
        self.try_get::<_, Option<Value>>(column).ok().flatten()
    }
}

/// Read an array-valued column stored either as JSON or as an array literal
fn string_list<R: FactRow + ?Sized>(row: &R, column: &str) -> Vec<String> {
    if let Some(value) = row.json_column(column) {
        return match value {
            Value::Array(items) => items
                .into_iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect(),
            Value::String(literal) => parse_array_literal(&literal),
            _ => Vec::new(),
        };
    }
    row.text_column(column)
        .map(|literal| parse_array_literal(&literal))
        .unwrap_or_default()
}

/// Parse one engine's rows, skipping the malformed ones
fn lineage_rows<R: FactRow>(engine: &str, rows: &[R]) -> Vec<LineageRow> {
    let parsed: Vec<LineageRow> = rows.iter().filter_map(|row| lineage_row(engine, row)).collect();
    if parsed.len() < rows.len() {
        warn!(
            "Skipped {} of {} lineage rows from engine '{}'",
            rows.len() - parsed.len(),
            rows.len(),
            engine
        );
    }
    parsed
}

fn lineage_row<R: FactRow + ?Sized>(engine: &str, row: &R) -> Option<LineageRow> {
    let parsed = parse_lineage_row(engine, row);
    if parsed.is_none() {
        warn!("Skipping malformed lineage row from engine '{}'", engine);
    }
    parsed
}

fn parse_lineage_row<R: FactRow + ?Sized>(engine: &str, row: &R) -> Option<LineageRow> {
    Some(LineageRow {
        engine: engine.to_string(),
        schema_name: row.text_column("schema_name")?,
        object_name: row.text_column("object_name")?,
        object_type: row.text_column("object_type").unwrap_or_default(),
        target_schema_name: row.text_column("target_schema_name")?,
        target_object_name: row.text_column("target_object_name")?,
        target_object_type: row.text_column("target_object_type").unwrap_or_default(),
        relationship_type: row.text_column("relationship_type")?,
        column_name: row.text_column("column_name"),
        target_column_name: row.text_column("target_column_name"),
    })
}

fn transformation_row<R: FactRow + ?Sized>(row: &R) -> Option<TransformationRow> {
    let Some(transformation_type) = row.text_column("transformation_type") else {
        warn!("Skipping transformation lineage row without a type");
        return None;
    };

    Some(TransformationRow {
        transformation_type,
        workflow_name: row.text_column("workflow_name").unwrap_or_default(),
        input_schemas: string_list(row, "input_schemas"),
        input_tables: string_list(row, "input_tables"),
        output_schemas: string_list(row, "output_schemas"),
        output_tables: string_list(row, "output_tables"),
    })
}

fn workflow_task_row<R: FactRow + ?Sized>(row: &R) -> Option<WorkflowTaskRow> {
    let (Some(workflow_name), Some(task_name)) =
        (row.text_column("workflow_name"), row.text_column("task_name"))
    else {
        warn!("Skipping workflow task row without workflow or task name");
        return None;
    };

    Some(WorkflowTaskRow {
        workflow_name,
        task_name,
        task_type: row.text_column("task_type").unwrap_or_default(),
        task_config: row.text_column("task_config").unwrap_or_default(),
        dependencies: string_list(row, "dependencies"),
        table_refs: string_list(row, "table_refs"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Map};

    /// Stand-in for a result row: strings are text columns, arrays and
    /// objects are JSON columns, nulls and other values read as absent text
    impl FactRow for Map<String, Value> {
        fn text_column(&self, column: &str) -> Option<String> {
            self.get(column).and_then(Value::as_str).map(String::from)
        }

        fn json_column(&self, column: &str) -> Option<Value> {
            self.get(column)
                .filter(|value| value.is_array() || value.is_object())
                .cloned()
        }
    }

    fn row(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected an object, got {}", other),
        }
    }

    fn lineage(source: &str, target: &str) -> Value {
        json!({
            "schema_name": "sales",
            "object_name": source,
            "object_type": "table",
            "target_schema_name": "dw",
            "target_object_name": target,
            "target_object_type": "table",
            "relationship_type": "sync",
            "column_name": null,
            "target_column_name": null,
        })
    }

    #[test]
    fn test_lineage_row_parses_complete_row() {
        let parsed = lineage_row("mssql", &row(lineage("orders", "fact_orders")));

        assert_eq!(
            parsed,
            Some(LineageRow {
                engine: "mssql".into(),
                schema_name: "sales".into(),
                object_name: "orders".into(),
                object_type: "table".into(),
                target_schema_name: "dw".into(),
                target_object_name: "fact_orders".into(),
                target_object_type: "table".into(),
                relationship_type: "sync".into(),
                column_name: None,
                target_column_name: None,
            })
        );
    }

    #[test]
    fn test_lineage_row_without_schema_is_skipped() {
        let mut missing = row(lineage("orders", "fact_orders"));
        missing.remove("schema_name");
        assert_eq!(lineage_row("mssql", &missing), None);

        let mut null = row(lineage("orders", "fact_orders"));
        null.insert("schema_name".into(), Value::Null);
        assert_eq!(lineage_row("mssql", &null), None);
    }

    #[test]
    fn test_lineage_row_with_non_text_relationship_is_skipped() {
        let mut bad = row(lineage("orders", "fact_orders"));
        bad.insert("relationship_type".into(), json!(42));

        assert_eq!(lineage_row("mssql", &bad), None);
    }

    #[test]
    fn test_bad_row_does_not_abort_the_batch() {
        let mut bad = row(lineage("customers", "dim_customers"));
        bad.insert("target_object_name".into(), json!(["not", "text"]));
        let rows = vec![
            row(lineage("orders", "fact_orders")),
            bad,
            row(lineage("returns", "fact_returns")),
        ];

        let parsed = lineage_rows("oracle", &rows);

        let targets: Vec<&str> = parsed.iter().map(|r| r.target_object_name.as_str()).collect();
        assert_eq!(targets, vec!["fact_orders", "fact_returns"]);
        assert!(parsed.iter().all(|r| r.engine == "oracle"));
    }

    #[test]
    fn test_transformation_lists_accept_json_and_array_literals() {
        let parsed = transformation_row(&row(json!({
            "transformation_type": "aggregate",
            "workflow_name": "nightly",
            "input_schemas": ["sales"],
            "input_tables": ["orders", "customers"],
            "output_schemas": "{dw}",
            "output_tables": r#"{"daily_orders", fact_orders}"#,
        })));

        let parsed = parsed.expect("transformation row parses");
        assert_eq!(parsed.input_tables, vec!["orders", "customers"]);
        assert_eq!(parsed.output_schemas, vec!["dw"]);
        assert_eq!(parsed.output_tables, vec!["daily_orders", "fact_orders"]);
    }

    #[test]
    fn test_empty_or_unreadable_lists_become_empty() {
        let parsed = transformation_row(&row(json!({
            "transformation_type": "copy",
            "input_schemas": "{}",
            "input_tables": 7,
            "output_schemas": { "not": "a list" },
        })))
        .expect("transformation row parses");

        assert!(parsed.input_schemas.is_empty());
        assert!(parsed.input_tables.is_empty());
        assert!(parsed.output_schemas.is_empty());
        assert!(parsed.output_tables.is_empty());
        assert_eq!(parsed.workflow_name, "");
    }

    #[test]
    fn test_transformation_without_type_is_skipped() {
        let parsed = transformation_row(&row(json!({ "workflow_name": "nightly" })));
        assert_eq!(parsed, None);
    }

    #[test]
    fn test_workflow_task_row_needs_both_names() {
        assert_eq!(workflow_task_row(&row(json!({ "workflow_name": "nightly" }))), None);

        let parsed = workflow_task_row(&row(json!({
            "workflow_name": "nightly",
            "task_name": "load",
            "dependencies": "{extract,\"clean up\"}",
            "table_refs": ["sales.orders"],
        })))
        .expect("task row parses");

        assert_eq!(parsed.dependencies, vec!["extract", "clean up"]);
        assert_eq!(parsed.table_refs, vec!["sales.orders"]);
        assert_eq!(parsed.task_config, "");
    }
}
