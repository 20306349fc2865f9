//! Lineage graph model
//!
//! Nodes and edges live in flat collections keyed by deterministic string ids.
//! The same logical entity always produces the same id, so merging facts from
//! several recorders never duplicates a node or an edge.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fmt;

/// Open key/value mapping attached to nodes, edges and graphs
pub type Metadata = Map<String, Value>;

/// Kind of entity a node stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Table,
    Column,
    Transformation,
    Workflow,
    Task,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Table => "table",
            NodeType::Column => "column",
            NodeType::Transformation => "transformation",
            NodeType::Workflow => "workflow",
            NodeType::Task => "task",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "table" => Some(NodeType::Table),
            "column" => Some(NodeType::Column),
            "transformation" => Some(NodeType::Transformation),
            "workflow" => Some(NodeType::Workflow),
            "task" => Some(NodeType::Task),
            _ => None,
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Relationship carried by an edge.
///
/// Recorders write free-form relationship names, so anything outside the
/// well-known set is kept verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EdgeKind {
    Sync,
    Transform,
    Join,
    Aggregate,
    Contains,
    Input,
    Output,
    DependsOn,
    Other(String),
}

impl EdgeKind {
    pub fn as_str(&self) -> &str {
        match self {
            EdgeKind::Sync => "sync",
            EdgeKind::Transform => "transform",
            EdgeKind::Join => "join",
            EdgeKind::Aggregate => "aggregate",
            EdgeKind::Contains => "contains",
            EdgeKind::Input => "input",
            EdgeKind::Output => "output",
            EdgeKind::DependsOn => "depends_on",
            EdgeKind::Other(name) => name,
        }
    }
}

impl From<&str> for EdgeKind {
    fn from(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "sync" => EdgeKind::Sync,
            "transform" => EdgeKind::Transform,
            "join" => EdgeKind::Join,
            "aggregate" => EdgeKind::Aggregate,
            "contains" => EdgeKind::Contains,
            "input" => EdgeKind::Input,
            "output" => EdgeKind::Output,
            "depends_on" => EdgeKind::DependsOn,
            _ => EdgeKind::Other(value.trim().to_string()),
        }
    }
}

impl From<String> for EdgeKind {
    fn from(value: String) -> Self {
        EdgeKind::from(value.as_str())
    }
}

impl From<EdgeKind> for String {
    fn from(kind: EdgeKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build the id of a node from its qualifiers.
///
/// Each qualifier is length-prefixed (`table:5:sales:6:orders`), so names
/// holding separators never make two entities share an id. Nodes without a
/// schema pass their owner and name as `table` and `column`.
pub fn node_id(node_type: NodeType, schema: &str, table: &str, column: &str) -> String {
    let mut id = String::from(node_type.as_str());
    push_qualifier(&mut id, schema);
    push_qualifier(&mut id, table);
    if !column.is_empty() {
        push_qualifier(&mut id, column);
    }
    id
}

/// Build the id of an edge from its endpoints and relationship
pub fn edge_id(source_id: &str, kind: &EdgeKind, target_id: &str) -> String {
    let kind = kind.as_str();
    format!("{}|{}:{}|{}", source_id, kind.len(), kind, target_id)
}

fn push_qualifier(id: &mut String, qualifier: &str) {
    id.push_str(&format!(":{}:{}", qualifier.len(), qualifier));
}

/// Join non-empty qualifiers with dots (`schema.table.column`)
pub fn qualified_name(schema: &str, table: &str, column: &str) -> String {
    [schema, table, column]
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(".")
}

/// A table, column, transformation, workflow or task in the lineage graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub label: String,
    #[serde(default)]
    pub schema: String,
    #[serde(default)]
    pub table: String,
    #[serde(default)]
    pub column: String,
    /// Source database engine the fact came from
    #[serde(default)]
    pub db_engine: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl GraphNode {
    pub fn new(node_type: NodeType, schema: &str, table: &str, column: &str) -> Self {
        Self {
            id: node_id(node_type, schema, table, column),
            node_type,
            label: qualified_name(schema, table, column),
            schema: schema.to_string(),
            table: table.to_string(),
            column: column.to_string(),
            db_engine: String::new(),
            metadata: Metadata::new(),
        }
    }

    pub fn table(schema: &str, table: &str) -> Self {
        Self::new(NodeType::Table, schema, table, "")
    }

    pub fn column(schema: &str, table: &str, column: &str) -> Self {
        Self::new(NodeType::Column, schema, table, column)
    }

    pub fn with_engine(mut self, engine: &str) -> Self {
        self.db_engine = engine.to_string();
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

/// A directed relationship between two nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphEdge {
    pub id: String,
    pub source_id: String,
    pub target_id: String,
    #[serde(rename = "type")]
    pub kind: EdgeKind,
    pub label: String,
    /// Certainty in `[0, 1]`; inferred edges sit below 1.0
    pub confidence: f64,
    #[serde(default)]
    pub metadata: Metadata,
}

impl GraphEdge {
    pub fn new(source_id: &str, kind: EdgeKind, target_id: &str) -> Self {
        Self {
            id: edge_id(source_id, &kind, target_id),
            source_id: source_id.to_string(),
            target_id: target_id.to_string(),
            label: kind.to_string(),
            kind,
            confidence: 1.0,
            metadata: Metadata::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

/// Deduplicating container of nodes and edges.
///
/// Insertion order is preserved; it only matters for tie-breaking in path
/// search.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Graph {
    nodes: Vec<GraphNode>,
    edges: Vec<GraphEdge>,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(skip)]
    node_ids: HashSet<String>,
    #[serde(skip)]
    edge_ids: HashSet<String>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node unless one with the same id is already present.
    ///
    /// Returns true when the node was inserted. An existing node is never
    /// overwritten.
    pub fn add_node_if_absent(&mut self, node: GraphNode) -> bool {
        if self.node_ids.contains(&node.id) {
            return false;
        }
        self.node_ids.insert(node.id.clone());
        self.nodes.push(node);
        true
    }

    /// Insert an edge unless one with the same id is already present.
    ///
    /// Endpoints are not checked; callers add both nodes first.
    pub fn add_edge_if_absent(&mut self, edge: GraphEdge) -> bool {
        if self.edge_ids.contains(&edge.id) {
            return false;
        }
        self.edge_ids.insert(edge.id.clone());
        self.edges.push(edge);
        true
    }

    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[GraphEdge] {
        &self.edges
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.node_ids.contains(id)
    }

    #[cfg(test)]
    pub fn contains_edge(&self, id: &str) -> bool {
        self.edge_ids.contains(id)
    }

    #[cfg(test)]
    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        if !self.contains_node(id) {
            return None;
        }
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Content fingerprint over the sorted node and edge ids
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();

        let mut node_ids: Vec<&str> = self.nodes.iter().map(|n| n.id.as_str()).collect();
        node_ids.sort_unstable();
        for id in node_ids {
            hasher.update(b"N:");
            hasher.update(id.as_bytes());
        }

        let mut edge_ids: Vec<&str> = self.edges.iter().map(|e| e.id.as_str()).collect();
        edge_ids.sort_unstable();
        for id in edge_ids {
            hasher.update(b"E:");
            hasher.update(id.as_bytes());
        }

        format!("{:x}", hasher.finalize())
    }

    /// Stamp the summary entries every built graph carries
    pub fn stamp_summary(&mut self) {
        self.metadata
            .insert("nodeCount".to_string(), Value::from(self.nodes.len()));
        self.metadata
            .insert("edgeCount".to_string(), Value::from(self.edges.len()));
        self.metadata
            .insert("fingerprint".to_string(), Value::from(self.fingerprint()));
        self.metadata.insert(
            "generatedAt".to_string(),
            Value::from(chrono::Utc::now().to_rfc3339()),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_node_ids_are_deterministic() {
        assert_eq!(node_id(NodeType::Table, "sales", "orders", ""), "table:5:sales:6:orders");
        assert_eq!(
            node_id(NodeType::Column, "sales", "orders", "id"),
            "column:5:sales:6:orders:2:id"
        );
        assert_ne!(
            node_id(NodeType::Table, "sales", "orders", ""),
            node_id(NodeType::Column, "sales", "orders", "")
        );
    }

    #[test]
    fn test_labels_follow_qualifiers() {
        assert_eq!(GraphNode::table("sales", "orders").label, "sales.orders");
        assert_eq!(GraphNode::column("sales", "orders", "id").label, "sales.orders.id");
        assert_eq!(GraphNode::table("", "orders").label, "orders");
    }

    #[test]
    fn test_add_node_is_idempotent() {
        let mut graph = Graph::new();
        let first = GraphNode::table("sales", "orders").with_engine("mssql");
        let second = GraphNode::table("sales", "orders").with_engine("oracle");

        assert!(graph.add_node_if_absent(first.clone()));
        assert!(!graph.add_node_if_absent(second));

        assert_eq!(graph.node_count(), 1);
        assert_eq!(graph.node(&first.id), Some(&first));
    }

    #[test]
    fn test_add_edge_is_idempotent() {
        let mut graph = Graph::new();
        let a = GraphNode::table("s", "a");
        let b = GraphNode::table("s", "b");
        graph.add_node_if_absent(a.clone());
        graph.add_node_if_absent(b.clone());

        let edge = GraphEdge::new(&a.id, EdgeKind::Sync, &b.id);
        assert!(graph.add_edge_if_absent(edge.clone()));
        assert!(!graph.add_edge_if_absent(edge.clone().with_metadata("engine", "oracle")));

        assert_eq!(graph.edge_count(), 1);
        assert!(graph.edges()[0].metadata.is_empty());
        assert_eq!(graph.edges()[0].label, "sync");
    }

    #[test]
    fn test_edge_kind_round_trips_through_strings() {
        assert_eq!(EdgeKind::from("SYNC"), EdgeKind::Sync);
        assert_eq!(EdgeKind::from("depends_on"), EdgeKind::DependsOn);
        assert_eq!(
            EdgeKind::from("replicate"),
            EdgeKind::Other("replicate".to_string())
        );
        assert_eq!(String::from(EdgeKind::Other("replicate".into())), "replicate");
    }

    #[test]
    fn test_fingerprint_ignores_insertion_order() {
        let mut left = Graph::new();
        left.add_node_if_absent(GraphNode::table("s", "a"));
        left.add_node_if_absent(GraphNode::table("s", "b"));

        let mut right = Graph::new();
        right.add_node_if_absent(GraphNode::table("s", "b"));
        right.add_node_if_absent(GraphNode::table("s", "a"));

        assert_eq!(left.fingerprint(), right.fingerprint());
    }

    #[test]
    fn test_underscores_and_dots_do_not_collide() {
        assert_ne!(
            node_id(NodeType::Table, "sales_eu", "orders", ""),
            node_id(NodeType::Table, "sales", "eu_orders", "")
        );
        assert_ne!(
            node_id(NodeType::Task, "", "a.b", "c"),
            node_id(NodeType::Task, "", "a", "b.c")
        );
        assert_ne!(
            node_id(NodeType::Column, "s", "a:1", "b"),
            node_id(NodeType::Column, "s", "a", "1:b")
        );

        let a = node_id(NodeType::Table, "s", "a", "");
        let b = node_id(NodeType::Table, "s", "b", "");
        assert_eq!(edge_id(&a, &EdgeKind::Sync, &b), "table:1:s:1:a|4:sync|table:1:s:1:b");
        assert_ne!(
            edge_id(&a, &EdgeKind::Other("x|4:sync".into()), &b),
            edge_id(&a, &EdgeKind::Other("x".into()), &format!("{}|4:sync|{}", b, b))
        );
    }
}
