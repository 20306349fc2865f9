//! Impact analysis history
//!
//! Stores analysis results in `metadata.impact_analysis` so earlier answers
//! can be listed and reopened. Unlike lineage reads, failures here are
//! returned to the caller.

use crate::error::AppError;
use crate::impact::model::{ChangeType, ImpactResult};
use crate::impact::report::{generate_impact_report, result_from_report};
use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use serde::Serialize;
use serde_json::Value;
use tokio_postgres::Row;
use tracing::info;

/// Most rows a single history listing returns
pub const MAX_HISTORY_LIMIT: i64 = 500;

const CREATE_IMPACT_ANALYSIS: &str = r#"
    CREATE SCHEMA IF NOT EXISTS metadata;

    CREATE TABLE IF NOT EXISTS metadata.impact_analysis (
        id SERIAL PRIMARY KEY,
        schema_name VARCHAR(255) NOT NULL,
        table_name VARCHAR(255) NOT NULL,
        column_name VARCHAR(255),
        resource_type VARCHAR(50) NOT NULL,
        change_type VARCHAR(50),
        analysis_result JSONB NOT NULL,
        downstream_count INTEGER DEFAULT 0,
        upstream_count INTEGER DEFAULT 0,
        confidence_score DOUBLE PRECISION DEFAULT 1.0,
        created_by VARCHAR(255),
        created_at TIMESTAMPTZ DEFAULT NOW()
    );

    CREATE INDEX IF NOT EXISTS idx_impact_analysis_table
        ON metadata.impact_analysis(schema_name, table_name);
    CREATE INDEX IF NOT EXISTS idx_impact_analysis_column
        ON metadata.impact_analysis(schema_name, table_name, column_name);
    CREATE INDEX IF NOT EXISTS idx_impact_analysis_created
        ON metadata.impact_analysis(created_at);
"#;

const INSERT_ANALYSIS: &str = r#"
    INSERT INTO metadata.impact_analysis
        (schema_name, table_name, column_name, resource_type, change_type,
         analysis_result, downstream_count, upstream_count, confidence_score,
         created_by, created_at)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW())
    RETURNING id
"#;

const SELECT_ANALYSIS: &str = r#"
    SELECT id, change_type, analysis_result, created_by, created_at
    FROM metadata.impact_analysis
    WHERE id = $1
"#;

const SELECT_HISTORY: &str = r#"
    SELECT id, schema_name, table_name, column_name, resource_type, change_type,
           downstream_count, upstream_count, confidence_score, created_by, created_at
    FROM metadata.impact_analysis
    WHERE schema_name = $1
      AND table_name = $2
      AND ($3::text IS NULL OR column_name = $3)
    ORDER BY created_at DESC, id DESC
    LIMIT $4
"#;

const DELETE_OLDER_THAN: &str = r#"
    DELETE FROM metadata.impact_analysis
    WHERE created_at < NOW() - make_interval(days => $1)
"#;

/// A stored analysis, reopened
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredAnalysis {
    pub id: i32,
    pub change_type: Option<String>,
    pub created_by: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub result: ImpactResult,
    /// The document as it was stored
    pub report: Value,
}

/// One line of an analysis history listing
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: i32,
    pub schema_name: String,
    pub table_name: String,
    pub column_name: Option<String>,
    pub resource_type: String,
    pub change_type: Option<String>,
    pub downstream_count: i32,
    pub upstream_count: i32,
    pub confidence_score: f64,
    pub created_by: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl From<&Row> for HistoryEntry {
    fn from(row: &Row) -> Self {
        Self {
            id: row.get("id"),
            schema_name: row.get("schema_name"),
            table_name: row.get("table_name"),
            column_name: row.get("column_name"),
            resource_type: row.get("resource_type"),
            change_type: row.get("change_type"),
            downstream_count: row.get::<_, Option<i32>>("downstream_count").unwrap_or(0),
            upstream_count: row.get::<_, Option<i32>>("upstream_count").unwrap_or(0),
            confidence_score: row.get::<_, Option<f64>>("confidence_score").unwrap_or(1.0),
            created_by: row.get("created_by"),
            created_at: row.get("created_at"),
        }
    }
}

/// Impact analysis history backed by PostgreSQL
#[derive(Clone)]
pub struct ImpactHistoryRepository {
    pool: Pool,
}

impl ImpactHistoryRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Create the history table and its indexes if they do not exist
    pub async fn initialize_tables(&self) -> Result<(), AppError> {
        let client = self.pool.get().await?;
        client.batch_execute(CREATE_IMPACT_ANALYSIS).await?;
        info!("Impact analysis tables initialized");
        Ok(())
    }

    /// Store one result; returns its id
    pub async fn save(
        &self,
        result: &ImpactResult,
        change_type: Option<ChangeType>,
        created_by: Option<&str>,
    ) -> Result<i32, AppError> {
        let client = self.pool.get().await?;
        let report = generate_impact_report(result);
        let column = non_empty(&result.column_name);
        let change_type = change_type.map(|c| c.as_str());

        let row = client
            .query_one(
                INSERT_ANALYSIS,
                &[
                    &result.schema_name,
                    &result.table_name,
                    &column,
                    &result.resource_type.as_str(),
                    &change_type,
                    &report,
                    &count(result.total_downstream_impact),
                    &count(result.total_upstream_impact),
                    &result.confidence_score,
                    &created_by,
                ],
            )
            .await?;

        let id: i32 = row.get("id");
        info!("Saved impact analysis {} for {}", id, result.resource_name);
        Ok(id)
    }

    /// Reopen one stored analysis
    pub async fn get(&self, id: i32) -> Result<StoredAnalysis, AppError> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(SELECT_ANALYSIS, &[&id])
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Impact analysis {} not found", id)))?;

        let report: Value = row.get("analysis_result");
        let result = result_from_report(report.clone())
            .map_err(|e| AppError::Internal(format!("Stored impact analysis {} is unreadable: {}", id, e)))?;

        Ok(StoredAnalysis {
            id,
            change_type: row.get("change_type"),
            created_by: row.get("created_by"),
            created_at: row.get("created_at"),
            result,
            report,
        })
    }

    /// Analyses of one table (or column), newest first
    pub async fn history(
        &self,
        schema: &str,
        table: &str,
        column: &str,
        limit: i64,
    ) -> Result<Vec<HistoryEntry>, AppError> {
        let client = self.pool.get().await?;
        let column = non_empty(column);
        let limit = clamp_limit(limit);

        let rows = client
            .query(SELECT_HISTORY, &[&schema, &table, &column, &limit])
            .await?;

        Ok(rows.iter().map(HistoryEntry::from).collect())
    }

    /// Delete analyses older than `days_to_keep` days; returns how many went
    pub async fn cleanup(&self, days_to_keep: i32) -> Result<u64, AppError> {
        if days_to_keep < 0 {
            return Err(AppError::Validation(
                "days to keep must not be negative".to_string(),
            ));
        }

        let client = self.pool.get().await?;
        let deleted = client.execute(DELETE_OLDER_THAN, &[&days_to_keep]).await?;

        if deleted > 0 {
            info!("Cleaned up {} old impact analyses", deleted);
        }
        Ok(deleted)
    }
}

fn non_empty(value: &str) -> Option<&str> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

fn count(total: usize) -> i32 {
    i32::try_from(total).unwrap_or(i32::MAX)
}

fn clamp_limit(limit: i64) -> i64 {
    limit.clamp(1, MAX_HISTORY_LIMIT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optional_column_binds_as_null() {
        assert_eq!(non_empty(""), None);
        assert_eq!(non_empty("amount"), Some("amount"));
    }

    #[test]
    fn test_history_limit_is_clamped() {
        assert_eq!(clamp_limit(0), 1);
        assert_eq!(clamp_limit(25), 25);
        assert_eq!(clamp_limit(10_000), MAX_HISTORY_LIMIT);
    }

    #[test]
    fn test_counts_saturate() {
        assert_eq!(count(7), 7);
        assert_eq!(count(usize::MAX), i32::MAX);
    }
}
