//! Read-only queries over a built graph

use crate::lineage::model::{EdgeKind, Graph, NodeType};
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};

/// Induced subgraph of the nodes matching every non-empty filter.
///
/// Nodes without a schema (transformations, workflows, tasks) pass the
/// schema filter. Edges survive only when their kind matches and both of
/// their endpoints survived.
pub fn filter_graph(
    graph: &Graph,
    node_types: &[NodeType],
    edge_types: &[EdgeKind],
    schemas: &[String],
) -> Graph {
    let mut filtered = Graph::new();

    for node in graph.nodes() {
        let type_ok = node_types.is_empty() || node_types.contains(&node.node_type);
        let schema_ok = schemas.is_empty() || node.schema.is_empty() || schemas.contains(&node.schema);
        if type_ok && schema_ok {
            filtered.add_node_if_absent(node.clone());
        }
    }

    for edge in graph.edges() {
        let kind_ok = edge_types.is_empty() || edge_types.contains(&edge.kind);
        if kind_ok && filtered.contains_node(&edge.source_id) && filtered.contains_node(&edge.target_id) {
            filtered.add_edge_if_absent(edge.clone());
        }
    }

    filtered.metadata = graph.metadata.clone();
    filtered.metadata.insert(
        "filter".to_string(),
        serde_json::json!({
            "nodeTypes": node_types.iter().map(|t| t.as_str()).collect::<Vec<_>>(),
            "edgeTypes": edge_types.iter().map(|k| k.as_str()).collect::<Vec<_>>(),
            "schemas": schemas,
        }),
    );
    filtered.metadata.insert("truncated".to_string(), Value::from(false));
    filtered.stamp_summary();
    filtered
}

/// Shortest directed path from `source_id` to `target_id`, both included.
///
/// Empty when either end is missing or the target is unreachable. Among
/// equally short paths the one found first in edge insertion order wins.
pub fn find_path(graph: &Graph, source_id: &str, target_id: &str) -> Vec<String> {
    if !graph.contains_node(source_id) || !graph.contains_node(target_id) {
        return Vec::new();
    }
    if source_id == target_id {
        return vec![source_id.to_string()];
    }

    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in graph.edges() {
        adjacency
            .entry(edge.source_id.as_str())
            .or_default()
            .push(edge.target_id.as_str());
    }

    let mut parent: HashMap<&str, &str> = HashMap::new();
    let mut visited: HashSet<&str> = HashSet::from([source_id]);
    let mut queue: VecDeque<&str> = VecDeque::from([source_id]);

    while let Some(current) = queue.pop_front() {
        if current == target_id {
            break;
        }
        for &next in adjacency.get(current).map(Vec::as_slice).unwrap_or_default() {
            if visited.insert(next) {
                parent.insert(next, current);
                queue.push_back(next);
            }
        }
    }

    if !parent.contains_key(target_id) {
        return Vec::new();
    }

    let mut path = vec![target_id.to_string()];
    let mut current = target_id;
    while let Some(&previous) = parent.get(current) {
        path.push(previous.to_string());
        current = previous;
    }
    path.reverse();
    path
}
