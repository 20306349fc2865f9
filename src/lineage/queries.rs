//! SQL used to read the lineage fact store
//!
//! Per-engine lineage tables share one layout, so their queries are built
//! from templates once the engine name has been checked against the known
//! list. Everything else is a constant.

/// Columns read from every per-engine lineage table
const LINEAGE_COLUMNS: &str = "schema_name, object_name, object_type, \
     target_schema_name, target_object_name, target_object_type, \
     relationship_type, column_name, target_column_name";

/// Table holding one engine's lineage facts
pub fn lineage_table(engine: &str) -> String {
    format!("metadata.{}_lineage", engine)
}

/// Every row of one engine's lineage table
pub fn select_engine_lineage(engine: &str) -> String {
    format!("SELECT {} FROM {}", LINEAGE_COLUMNS, lineage_table(engine))
}

/// Rows whose source is `$1.$2`
pub fn select_lineage_from(engine: &str) -> String {
    format!(
        "SELECT DISTINCT {} FROM {} WHERE schema_name = $1 AND object_name = $2",
        LINEAGE_COLUMNS,
        lineage_table(engine)
    )
}

/// Rows whose target is `$1.$2`
pub fn select_lineage_into(engine: &str) -> String {
    format!(
        "SELECT DISTINCT {} FROM {} WHERE target_schema_name = $1 AND target_object_name = $2",
        LINEAGE_COLUMNS,
        lineage_table(engine)
    )
}

/// Target columns fed by the source column `$1.$2.$3`
pub fn select_column_targets(engine: &str) -> String {
    format!(
        "SELECT DISTINCT target_schema_name, target_object_name, target_column_name \
         FROM {} \
         WHERE schema_name = $1 AND object_name = $2 AND column_name = $3 \
           AND target_column_name IS NOT NULL",
        lineage_table(engine)
    )
}

/// All transformation lineage; arrays are read as text so both array and
/// literal-text columns parse the same way
pub const SELECT_TRANSFORMATION_LINEAGE: &str = r#"
    SELECT
        transformation_type,
        workflow_name,
        input_schemas::text AS input_schemas,
        input_tables::text AS input_tables,
        output_schemas::text AS output_schemas,
        output_tables::text AS output_tables
    FROM metadata.transformation_lineage
"#;

/// Workflow tasks. Optional columns are read through `to_jsonb` so stores
/// without them still answer.
pub const SELECT_WORKFLOW_TASKS: &str = r#"
    SELECT
        w.workflow_name,
        wt.task_name,
        COALESCE(wt.task_type, '') AS task_type,
        COALESCE(wt.task_config::text, '') AS task_config,
        to_jsonb(wt) -> 'dependencies' AS dependencies,
        to_jsonb(wt) -> 'table_refs' AS table_refs
    FROM metadata.workflows w
    JOIN metadata.workflow_tasks wt ON w.workflow_name = wt.workflow_name
"#;

/// Same as [`SELECT_WORKFLOW_TASKS`] limited to the workflows in `$1`
pub const SELECT_WORKFLOW_TASKS_BY_NAME: &str = r#"
    SELECT
        w.workflow_name,
        wt.task_name,
        COALESCE(wt.task_type, '') AS task_type,
        COALESCE(wt.task_config::text, '') AS task_config,
        to_jsonb(wt) -> 'dependencies' AS dependencies,
        to_jsonb(wt) -> 'table_refs' AS table_refs
    FROM metadata.workflows w
    JOIN metadata.workflow_tasks wt ON w.workflow_name = wt.workflow_name
    WHERE w.workflow_name = ANY($1)
"#;

/// Workflows whose tasks declare `$1` (a qualified table name)
pub const SELECT_WORKFLOWS_DECLARING: &str = r#"
    SELECT DISTINCT wt.workflow_name
    FROM metadata.workflow_tasks wt
    WHERE jsonb_typeof(to_jsonb(wt) -> 'table_refs') = 'array'
      AND (to_jsonb(wt) -> 'table_refs') ? $1
"#;

/// Workflows whose task configuration text contains the pattern `$1`
pub const SELECT_WORKFLOWS_MENTIONING: &str = r#"
    SELECT DISTINCT w.workflow_name
    FROM metadata.workflows w
    JOIN metadata.workflow_tasks wt ON w.workflow_name = wt.workflow_name
    WHERE wt.task_config::text LIKE $1
"#;

/// Transformations whose configuration text contains the pattern `$1`
pub const SELECT_TRANSFORMATIONS_MENTIONING: &str = r#"
    SELECT DISTINCT transformation_name
    FROM metadata.transformations
    WHERE transformation_config::text LIKE $1
"#;

/// Transformations whose configuration text contains both `$1` and `$2`
pub const SELECT_TRANSFORMATIONS_MENTIONING_COLUMN: &str = r#"
    SELECT DISTINCT transformation_name
    FROM metadata.transformations
    WHERE transformation_config::text LIKE $1
      AND transformation_config::text LIKE $2
"#;

/// Escape LIKE metacharacters and wrap the term for a substring match
pub fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for ch in term.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_escapes_metacharacters() {
        assert_eq!(like_pattern("sales.orders"), "%sales.orders%");
        assert_eq!(like_pattern("dim_customer"), "%dim\\_customer%");
        assert_eq!(like_pattern("100%"), "%100\\%%");
    }

    #[test]
    fn test_engine_queries_target_engine_table() {
        assert!(select_engine_lineage("oracle").contains("FROM metadata.oracle_lineage"));
        assert!(select_lineage_into("mssql").contains("target_schema_name = $1"));
    }
}
