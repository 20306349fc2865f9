//! Shared request validators

use crate::impact::AnalysisConfig;
use once_cell::sync::Lazy;
use regex::Regex;
use validator::ValidationError;

/// Deepest walk a request may ask for
pub const MAX_REQUEST_DEPTH: usize = 50;

/// Schema, table and column names as recorded by the supported engines.
/// Dashes are allowed for document store collections.
static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_$\-]{0,127}$").expect("identifier pattern compiles"));

/// Validate a schema, table or column name
pub fn validate_identifier(name: &str) -> Result<(), ValidationError> {
    if !IDENTIFIER.is_match(name) {
        let mut err = ValidationError::new("invalid_identifier");
        err.message = Some(
            "Must start with a letter or underscore and contain only letters, digits, underscores, dollar signs or dashes".into(),
        );
        return Err(err);
    }
    Ok(())
}

/// Validate the options of an impact analysis
pub fn validate_analysis_config(config: &AnalysisConfig) -> Result<(), ValidationError> {
    if config.max_depth == 0 || config.max_depth > MAX_REQUEST_DEPTH {
        let mut err = ValidationError::new("invalid_depth");
        err.message = Some(format!("maxDepth must be between 1 and {}", MAX_REQUEST_DEPTH).into());
        return Err(err);
    }
    Ok(())
}

/// Split a comma separated query parameter, dropping empty items
pub fn split_list(value: Option<&str>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifiers() {
        assert!(validate_identifier("sales").is_ok());
        assert!(validate_identifier("_tmp$1").is_ok());
        assert!(validate_identifier("event-log").is_ok());
        assert!(validate_identifier("1orders").is_err());
        assert!(validate_identifier("orders; drop table x").is_err());
        assert!(validate_identifier("").is_err());
    }

    #[test]
    fn test_analysis_depth_range() {
        let mut config = AnalysisConfig::default();
        assert!(validate_analysis_config(&config).is_ok());

        config.max_depth = 0;
        assert!(validate_analysis_config(&config).is_err());
        config.max_depth = 51;
        assert!(validate_analysis_config(&config).is_err());
    }

    #[test]
    fn test_split_list() {
        assert_eq!(split_list(Some("mssql, oracle,,")), vec!["mssql", "oracle"]);
        assert!(split_list(None).is_empty());
    }
}
