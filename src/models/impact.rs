//! Impact analysis request and response DTOs

use crate::impact::history::{HistoryEntry, StoredAnalysis};
use crate::impact::{AnalysisConfig, ImpactResult};
use crate::models::validation::{validate_analysis_config, validate_identifier};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

/// Resource to analyze plus analysis options
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ImpactRequest {
    #[validate(custom(function = "validate_identifier"))]
    pub schema: String,

    #[validate(custom(function = "validate_identifier"))]
    pub table: String,

    #[validate(custom(function = "validate_identifier"))]
    pub column: Option<String>,

    #[serde(default)]
    #[validate(custom(function = "validate_analysis_config"))]
    pub config: AnalysisConfig,
}

impl ImpactRequest {
    pub fn column(&self) -> &str {
        self.column.as_deref().unwrap_or_default()
    }
}

/// Planned schema change to assess
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SchemaChangeRequest {
    #[validate(custom(function = "validate_identifier"))]
    pub schema: String,

    /// drop_table, rename_table, alter_column, drop_column or add_column;
    /// anything else yields an empty result
    #[validate(length(min = 1, max = 50, message = "changeType is required"))]
    pub change_type: String,

    #[validate(custom(function = "validate_identifier"))]
    pub table: String,

    #[validate(custom(function = "validate_identifier"))]
    pub column: Option<String>,

    #[serde(default)]
    #[validate(custom(function = "validate_analysis_config"))]
    pub config: AnalysisConfig,
}

/// Full analysis rendered as a report document
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReportRequest {
    #[validate(custom(function = "validate_identifier"))]
    pub schema: String,

    #[validate(custom(function = "validate_identifier"))]
    pub table: String,

    #[validate(custom(function = "validate_identifier"))]
    pub column: Option<String>,

    #[serde(default)]
    #[validate(custom(function = "validate_analysis_config"))]
    pub config: AnalysisConfig,

    /// Store the result in the analysis history
    #[serde(default)]
    pub save: bool,

    /// Change the analysis was made for, stored with the result
    pub change_type: Option<String>,

    #[validate(length(max = 255))]
    pub created_by: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    #[validate(custom(function = "validate_identifier"))]
    pub schema: String,

    #[validate(custom(function = "validate_identifier"))]
    pub table: String,

    #[validate(custom(function = "validate_identifier"))]
    pub column: Option<String>,

    #[validate(range(min = 1, max = 500, message = "limit must be between 1 and 500"))]
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CleanupQuery {
    #[validate(range(min = 0, max = 36500, message = "olderThanDays must not be negative"))]
    pub older_than_days: i32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpactResponse {
    pub success: bool,
    pub result: ImpactResult,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportResponse {
    pub success: bool,
    pub report: Value,
    /// Id of the stored analysis when saving was requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_id: Option<i32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub success: bool,
    pub count: usize,
    pub entries: Vec<HistoryEntry>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredAnalysisResponse {
    pub success: bool,
    pub analysis: StoredAnalysis,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupResponse {
    pub success: bool,
    pub message: String,
    pub deleted: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_impact_request_defaults_config() {
        let request: ImpactRequest =
            serde_json::from_str(r#"{"schema": "sales", "table": "orders"}"#).unwrap();

        assert!(request.validate().is_ok());
        assert_eq!(request.column(), "");
        assert_eq!(request.config.max_depth, 10);
    }

    #[test]
    fn test_impact_request_rejects_depth_out_of_range() {
        let request: ImpactRequest = serde_json::from_str(
            r#"{"schema": "sales", "table": "orders", "config": {"maxDepth": 0}}"#,
        )
        .unwrap();

        assert!(request.validate().is_err());
    }

    #[test]
    fn test_schema_change_request_accepts_unknown_change_type() {
        let request: SchemaChangeRequest = serde_json::from_str(
            r#"{"schema": "sales", "changeType": "truncate_table", "table": "orders"}"#,
        )
        .unwrap();

        assert!(request.validate().is_ok());
    }
}
