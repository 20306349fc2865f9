//! Lineage graph request and response DTOs

use crate::lineage::Graph;
use crate::models::validation::validate_identifier;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Query for the complete lineage graph
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CompleteGraphQuery {
    /// Comma separated engine names; all configured engines when absent
    pub engines: Option<String>,
    /// Comma separated schema names
    pub schemas: Option<String>,
}

/// Query for the lineage graph around one table or column
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ResourceGraphQuery {
    #[validate(custom(function = "validate_identifier"))]
    pub schema: String,

    #[validate(custom(function = "validate_identifier"))]
    pub table: String,

    #[validate(custom(function = "validate_identifier"))]
    pub column: Option<String>,

    #[validate(range(min = 1, max = 50, message = "maxDepth must be between 1 and 50"))]
    pub max_depth: Option<usize>,

    /// downstream (default), upstream or both
    pub direction: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowGraphQuery {
    /// Comma separated workflow names; every workflow when absent
    pub names: Option<String>,
}

/// Request to filter the complete graph
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct FilterGraphRequest {
    /// Engines to build the graph from; all configured engines when empty
    #[serde(default)]
    pub engines: Vec<String>,

    #[serde(default)]
    pub node_types: Vec<String>,

    #[serde(default)]
    pub edge_types: Vec<String>,

    #[serde(default)]
    #[validate(length(max = 100, message = "At most 100 schemas may be listed"))]
    pub schemas: Vec<String>,
}

/// Query for a path between two nodes of the complete graph
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PathQuery {
    #[validate(length(min = 1, message = "Source node id is required"))]
    pub from: String,

    #[validate(length(min = 1, message = "Target node id is required"))]
    pub to: String,

    pub engines: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphResponse {
    pub success: bool,
    pub node_count: usize,
    pub edge_count: usize,
    pub graph: Graph,
}

impl GraphResponse {
    pub fn new(graph: Graph) -> Self {
        Self {
            success: true,
            node_count: graph.node_count(),
            edge_count: graph.edge_count(),
            graph,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PathResponse {
    pub success: bool,
    pub found: bool,
    /// Number of hops, zero when no path exists
    pub length: usize,
    pub path: Vec<String>,
}

impl PathResponse {
    pub fn new(path: Vec<String>) -> Self {
        Self {
            success: true,
            found: !path.is_empty(),
            length: path.len().saturating_sub(1),
            path,
        }
    }
}
