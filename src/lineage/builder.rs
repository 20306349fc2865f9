//! Lineage Graph Builder
//!
//! Merges lineage facts from every source into one deduplicated [`Graph`]:
//! per-engine table lineage, transformation lineage and workflow tasks.
//! A source that cannot be read contributes nothing; the others still land
//! in the graph.

use crate::lineage::model::{EdgeKind, Graph, GraphEdge, GraphNode, NodeType};
use crate::lineage::source::{LineageRow, LineageSource, KNOWN_ENGINES};
use crate::lineage::traversal::{self, Direction, Hop, HopVisitor, TraversalLimits};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Builds lineage graphs from a lineage source
#[derive(Clone)]
pub struct LineageGraphBuilder {
    source: Arc<dyn LineageSource>,
    /// Engines merged when a caller does not name any
    default_engines: Vec<String>,
}

impl LineageGraphBuilder {
    pub fn new(source: Arc<dyn LineageSource>) -> Self {
        Self {
            source,
            default_engines: KNOWN_ENGINES.iter().map(|e| e.to_string()).collect(),
        }
    }

    pub fn with_default_engines(mut self, engines: Vec<String>) -> Self {
        if !engines.is_empty() {
            self.default_engines = engines;
        }
        self
    }

    /// Merge every source into one graph.
    ///
    /// `engines` defaults to every configured engine. When `schemas` is not
    /// empty, only engine rows touching one of those schemas are kept.
    pub async fn build_complete_graph(&self, engines: &[String], schemas: &[String]) -> Graph {
        let mut graph = Graph::new();
        let engines = if engines.is_empty() {
            self.default_engines.as_slice()
        } else {
            engines
        };

        for engine in engines {
            self.add_database_lineage(&mut graph, engine, schemas).await;
        }
        self.add_transformation_lineage(&mut graph).await;
        self.add_workflow_lineage(&mut graph, &[]).await;

        graph.metadata.insert("engines".to_string(), Value::from(engines.to_vec()));
        graph.metadata.insert("schemas".to_string(), Value::from(schemas.to_vec()));
        graph.stamp_summary();

        info!(
            "Built complete lineage graph with {} nodes and {} edges",
            graph.node_count(),
            graph.edge_count()
        );
        graph
    }

    /// Graph of everything reachable from one table or column.
    ///
    /// Lineage is walked in `direction` for at most `limits.max_depth` hops.
    /// Every observed relationship becomes an edge, including edges back to
    /// tables already in the graph, but each table is expanded only once.
    pub async fn build_graph_for_resource(
        &self,
        schema: &str,
        table: &str,
        column: &str,
        direction: Direction,
        limits: TraversalLimits,
    ) -> Graph {
        let seed = if column.is_empty() {
            GraphNode::table(schema, table)
        } else {
            GraphNode::column(schema, table, column)
        };

        let mut graph = Graph::new();
        let mut collector = ResourceGraphCollector {
            graph: &mut graph,
            seed_key: format!("{}.{}", schema, table),
            seed_id: seed.id.clone(),
        };
        collector.graph.add_node_if_absent(seed);

        let outcome = traversal::walk(
            self.source.as_ref(),
            schema,
            table,
            direction,
            limits,
            &mut collector,
        )
        .await;

        graph
            .metadata
            .insert("root".to_string(), Value::from(format!("{}.{}", schema, table)));
        graph
            .metadata
            .insert("direction".to_string(), serde_json::to_value(direction).unwrap_or_default());
        graph
            .metadata
            .insert("maxDepth".to_string(), Value::from(limits.max_depth));
        graph
            .metadata
            .insert("truncated".to_string(), Value::from(outcome.truncated));
        graph.stamp_summary();

        debug!(
            "Resource graph for {}.{}: {} nodes, {} edges ({} failed steps)",
            schema,
            table,
            graph.node_count(),
            graph.edge_count(),
            outcome.failed_steps
        );
        graph
    }

    /// Graph of workflows and their tasks only
    pub async fn build_graph_from_workflows(&self, workflow_names: &[String]) -> Graph {
        let mut graph = Graph::new();
        self.add_workflow_lineage(&mut graph, workflow_names).await;
        graph
            .metadata
            .insert("workflows".to_string(), Value::from(workflow_names.to_vec()));
        graph.stamp_summary();
        graph
    }

    /// Merge one engine's lineage rows
    pub async fn add_database_lineage(&self, graph: &mut Graph, engine: &str, schemas: &[String]) {
        let rows = match self.source.engine_lineage(engine).await {
            Ok(rows) => rows,
            Err(e) => {
                error!("Error adding database lineage for '{}': {}", engine, e);
                return;
            }
        };

        let mut merged = 0usize;
        for row in rows.iter().filter(|row| in_schemas(row, schemas)) {
            add_lineage_row(graph, row);
            merged += 1;
        }
        debug!("Merged {} lineage rows from engine '{}'", merged, engine);
    }

    /// Merge transformation lineage: inputs feed the transformation node,
    /// the transformation node feeds its outputs
    pub async fn add_transformation_lineage(&self, graph: &mut Graph) {
        let rows = match self.source.transformation_lineage().await {
            Ok(rows) => rows,
            Err(e) => {
                error!("Error adding transformation lineage: {}", e);
                return;
            }
        };

        for row in &rows {
            let transformation = GraphNode::new(
                NodeType::Transformation,
                "",
                &row.workflow_name,
                &row.transformation_type,
            )
            .with_label(row.transformation_type.clone())
                .with_metadata("workflow", row.workflow_name.clone())
                .with_metadata("transformationType", row.transformation_type.clone());
            let transformation_id = transformation.id.clone();
            graph.add_node_if_absent(transformation);

            for (schema, table) in row.inputs() {
                let input = GraphNode::table(&schema, &table);
                let edge = GraphEdge::new(&input.id, EdgeKind::Input, &transformation_id);
                graph.add_node_if_absent(input);
                graph.add_edge_if_absent(edge);
            }

            for (schema, table) in row.outputs() {
                let output = GraphNode::table(&schema, &table);
                let edge = GraphEdge::new(&transformation_id, EdgeKind::Output, &output.id);
                graph.add_node_if_absent(output);
                graph.add_edge_if_absent(edge);
            }
        }
    }

    /// Merge workflows and their tasks, limited to `workflow_names` unless empty
    pub async fn add_workflow_lineage(&self, graph: &mut Graph, workflow_names: &[String]) {
        let tasks = match self.source.workflow_tasks(workflow_names).await {
            Ok(tasks) => tasks,
            Err(e) => {
                error!("Error adding workflow lineage: {}", e);
                return;
            }
        };

        let mut task_ids: HashMap<(String, String), String> = HashMap::new();
        for task in &tasks {
            let workflow = GraphNode::new(NodeType::Workflow, "", &task.workflow_name, "");
            let task_node = task_node(&task.workflow_name, &task.task_name)
                .with_metadata("workflow", task.workflow_name.clone())
                .with_metadata("type", task.task_type.clone());

            let edge = GraphEdge::new(&workflow.id, EdgeKind::Contains, &task_node.id);
            task_ids.insert(
                (task.workflow_name.clone(), task.task_name.clone()),
                task_node.id.clone(),
            );
            graph.add_node_if_absent(workflow);
            graph.add_node_if_absent(task_node);
            graph.add_edge_if_absent(edge);
        }

        // dependency edges need both tasks present
        for task in &tasks {
            let Some(task_id) = task_ids.get(&(task.workflow_name.clone(), task.task_name.clone())) else {
                continue;
            };
            for dependency in &task.dependencies {
                if let Some(dependency_id) = task_ids.get(&(task.workflow_name.clone(), dependency.clone())) {
                    graph.add_edge_if_absent(GraphEdge::new(dependency_id, EdgeKind::DependsOn, task_id));
                } else {
                    debug!(
                        "Task {}.{} depends on unknown task '{}'",
                        task.workflow_name, task.task_name, dependency
                    );
                }
            }
        }
    }
}

fn task_node(workflow: &str, task: &str) -> GraphNode {
    GraphNode::new(NodeType::Task, "", workflow, task).with_label(task)
}

fn in_schemas(row: &LineageRow, schemas: &[String]) -> bool {
    schemas.is_empty()
        || schemas.contains(&row.schema_name)
        || schemas.contains(&row.target_schema_name)
}

/// Add both tables of a row and the edge between them; column-level rows
/// also add their columns
fn add_lineage_row(graph: &mut Graph, row: &LineageRow) {
    let kind = EdgeKind::from(row.relationship_type.as_str());
    let source = GraphNode::table(&row.schema_name, &row.object_name).with_engine(&row.engine);
    let target =
        GraphNode::table(&row.target_schema_name, &row.target_object_name).with_engine(&row.engine);
    let edge = GraphEdge::new(&source.id, kind.clone(), &target.id).with_metadata("engine", row.engine.clone());

    let (source_id, target_id) = (source.id.clone(), target.id.clone());
    graph.add_node_if_absent(source);
    graph.add_node_if_absent(target);
    graph.add_edge_if_absent(edge);

    if let Some((source_column, target_column)) = row.column_pair() {
        let source_col = GraphNode::column(&row.schema_name, &row.object_name, source_column)
            .with_engine(&row.engine);
        let target_col =
            GraphNode::column(&row.target_schema_name, &row.target_object_name, target_column)
                .with_engine(&row.engine);

        let edges = [
            GraphEdge::new(&source_id, EdgeKind::Contains, &source_col.id),
            GraphEdge::new(&target_id, EdgeKind::Contains, &target_col.id),
            GraphEdge::new(&source_col.id, kind, &target_col.id).with_metadata("engine", row.engine.clone()),
        ];
        graph.add_node_if_absent(source_col);
        graph.add_node_if_absent(target_col);
        for edge in edges {
            graph.add_edge_if_absent(edge);
        }
    }
}

/// Turns walk hops into graph nodes and edges
struct ResourceGraphCollector<'g> {
    graph: &'g mut Graph,
    /// `schema.table` of the resource the walk started from
    seed_key: String,
    /// Node standing for that resource (a column node when one was given)
    seed_id: String,
}

impl ResourceGraphCollector<'_> {
    fn node_for(&self, schema: &str, table: &str, engine: &str) -> GraphNode {
        let node = GraphNode::table(schema, table).with_engine(engine);
        if format!("{}.{}", schema, table) == self.seed_key {
            GraphNode { id: self.seed_id.clone(), ..node }
        } else {
            node
        }
    }
}

impl HopVisitor for ResourceGraphCollector<'_> {
    fn visit(&mut self, hop: &Hop<'_>) {
        let row = hop.row;
        let source = self.node_for(&row.schema_name, &row.object_name, &row.engine);
        let target = self.node_for(&row.target_schema_name, &row.target_object_name, &row.engine);
        let edge = GraphEdge::new(&source.id, EdgeKind::from(row.relationship_type.as_str()), &target.id)
            .with_metadata("engine", row.engine.clone())
            .with_metadata("depth", hop.depth);

        // the near end is already present; the far end is new on a first visit
        self.graph.add_node_if_absent(source);
        self.graph.add_node_if_absent(target);
        self.graph.add_edge_if_absent(edge);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lineage::memory::{FailingSource, MemoryLineageStore};
    use crate::lineage::model::node_id;
    use crate::lineage::source::{TransformationRow, WorkflowTaskRow};
    use pretty_assertions::assert_eq;

    fn builder(store: MemoryLineageStore) -> LineageGraphBuilder {
        LineageGraphBuilder::new(Arc::new(store))
    }

    fn edges_of(graph: &Graph) -> Vec<(String, String, String)> {
        graph
            .edges()
            .iter()
            .map(|e| (e.source_id.clone(), e.kind.to_string(), e.target_id.clone()))
            .collect()
    }

    fn orders_store() -> MemoryLineageStore {
        MemoryLineageStore::new()
            .with_edge("mssql", ("sales", "orders"), ("dw", "fact_orders"), "sync")
            .with_transformation(TransformationRow {
                transformation_type: "aggregate".into(),
                workflow_name: "nightly".into(),
                input_schemas: vec!["sales".into()],
                input_tables: vec!["orders".into()],
                output_schemas: vec!["dw".into()],
                output_tables: vec!["daily_orders".into()],
            })
            .with_task(WorkflowTaskRow {
                workflow_name: "nightly".into(),
                task_name: "extract".into(),
                task_type: "sql".into(),
                ..Default::default()
            })
            .with_task(WorkflowTaskRow {
                workflow_name: "nightly".into(),
                task_name: "load".into(),
                task_type: "sql".into(),
                dependencies: vec!["extract".into()],
                ..Default::default()
            })
    }

    #[tokio::test]
    async fn test_complete_graph_deduplicates_shared_tables() {
        let graph = builder(orders_store())
            .build_complete_graph(&[], &[])
            .await;

        let orders_id = node_id(NodeType::Table, "sales", "orders", "");
        let orders_nodes = graph.nodes().iter().filter(|n| n.id == orders_id).count();
        assert_eq!(orders_nodes, 1);

        let attached: Vec<String> = graph
            .edges()
            .iter()
            .filter(|e| e.source_id == orders_id || e.target_id == orders_id)
            .map(|e| e.kind.to_string())
            .collect();
        assert_eq!(attached, vec!["sync", "input"]);
        assert_eq!(graph.node(&orders_id).map(|n| n.db_engine.as_str()), Some("mssql"));
    }

    #[tokio::test]
    async fn test_complete_graph_survives_failing_transformation_source() {
        let store = orders_store().failing(FailingSource::Transformations);
        let graph = builder(store).build_complete_graph(&[], &[]).await;

        let kinds: Vec<String> = graph.edges().iter().map(|e| e.kind.to_string()).collect();
        assert_eq!(kinds, vec!["sync", "contains", "contains", "depends_on"]);
        assert!(graph.contains_node("table:2:dw:11:fact_orders"));
        assert!(graph.contains_node("workflow:0::7:nightly"));
        assert!(!graph.nodes().iter().any(|n| n.node_type == NodeType::Transformation));
    }

    #[tokio::test]
    async fn test_complete_graph_filters_engines_and_schemas() {
        let store = MemoryLineageStore::new()
            .with_edge("mssql", ("sales", "orders"), ("dw", "fact_orders"), "sync")
            .with_edge("oracle", ("hr", "people"), ("hr", "payroll"), "join");

        let only_oracle = builder(store)
            .build_complete_graph(&["oracle".to_string()], &[])
            .await;
        assert_eq!(only_oracle.edge_count(), 1);
        assert_eq!(only_oracle.edges()[0].kind, EdgeKind::Join);

        let store = MemoryLineageStore::new()
            .with_edge("mssql", ("sales", "orders"), ("dw", "fact_orders"), "sync")
            .with_edge("mssql", ("hr", "people"), ("hr", "payroll"), "join");
        let only_dw = builder(store)
            .build_complete_graph(&[], &["dw".to_string()])
            .await;
        assert_eq!(only_dw.edge_count(), 1);
        assert_eq!(only_dw.metadata["schemas"], serde_json::json!(["dw"]));
    }

    #[tokio::test]
    async fn test_column_level_rows_add_column_edges() {
        let store = MemoryLineageStore::new().with_row(LineageRow {
            engine: "mariadb".into(),
            schema_name: "s".into(),
            object_name: "a".into(),
            object_type: "table".into(),
            target_schema_name: "s".into(),
            target_object_name: "b".into(),
            target_object_type: "table".into(),
            relationship_type: "transform".into(),
            column_name: Some("amount".into()),
            target_column_name: Some("total".into()),
        });

        let graph = builder(store).build_complete_graph(&[], &[]).await;

        assert_eq!(graph.node_count(), 4);
        assert!(graph.contains_edge("column:1:s:1:a:6:amount|9:transform|column:1:s:1:b:5:total"));
        assert!(graph.contains_edge("table:1:s:1:a|8:contains|column:1:s:1:a:6:amount"));
    }

    #[tokio::test]
    async fn test_resource_graph_terminates_on_cycle() {
        let store = MemoryLineageStore::new()
            .with_edge("mssql", ("s", "A"), ("s", "B"), "sync")
            .with_edge("mssql", ("s", "B"), ("s", "A"), "sync");

        let graph = builder(store)
            .build_graph_for_resource("s", "A", "", Direction::Downstream, TraversalLimits::new(5))
            .await;

        assert_eq!(graph.node_count(), 2);
        assert_eq!(
            edges_of(&graph),
            vec![
                ("table:1:s:1:A".to_string(), "sync".to_string(), "table:1:s:1:B".to_string()),
                ("table:1:s:1:B".to_string(), "sync".to_string(), "table:1:s:1:A".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_resource_graph_is_depth_bounded() {
        let store = (0..19).fold(MemoryLineageStore::new(), |store, i| {
            store.with_edge(
                "mssql",
                ("s", &format!("table{}", i)),
                ("s", &format!("table{}", i + 1)),
                "sync",
            )
        });

        let graph = builder(store)
            .build_graph_for_resource("s", "table0", "", Direction::Downstream, TraversalLimits::new(3))
            .await;

        assert_eq!(graph.node_count(), 4);
        assert_eq!(graph.edge_count(), 3);
        let labels: Vec<&str> = graph.nodes().iter().map(|n| n.label.as_str()).collect();
        assert_eq!(labels, vec!["s.table0", "s.table1", "s.table2", "s.table3"]);
    }

    #[tokio::test]
    async fn test_resource_graph_upstream_keeps_edge_orientation() {
        let store = MemoryLineageStore::new()
            .with_edge("mssql", ("s", "raw"), ("s", "clean"), "transform")
            .with_edge("mssql", ("s", "clean"), ("s", "report"), "aggregate");

        let graph = builder(store)
            .build_graph_for_resource("s", "clean", "", Direction::Upstream, TraversalLimits::default())
            .await;

        assert_eq!(
            edges_of(&graph),
            vec![(
                "table:1:s:3:raw".to_string(),
                "transform".to_string(),
                "table:1:s:5:clean".to_string()
            )]
        );
        assert_eq!(graph.metadata["direction"], serde_json::json!("upstream"));
    }

    #[tokio::test]
    async fn test_resource_graph_for_column_uses_column_seed() {
        let store = MemoryLineageStore::new().with_edge("mssql", ("s", "a"), ("s", "b"), "sync");

        let graph = builder(store)
            .build_graph_for_resource("s", "a", "id", Direction::Downstream, TraversalLimits::default())
            .await;

        assert_eq!(graph.nodes()[0].node_type, NodeType::Column);
        assert_eq!(
            edges_of(&graph),
            vec![(
                "column:1:s:1:a:2:id".to_string(),
                "sync".to_string(),
                "table:1:s:1:b".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn test_workflow_graph_honours_name_filter() {
        let store = orders_store().with_task(WorkflowTaskRow {
            workflow_name: "hourly".into(),
            task_name: "extract".into(),
            ..Default::default()
        });
        let graph = builder(store)
            .build_graph_from_workflows(&["hourly".to_string()])
            .await;

        assert_eq!(graph.node_count(), 2);
        assert!(graph.contains_node("task:0::6:hourly:7:extract"));
        assert!(!graph.contains_node("task:0::7:nightly:7:extract"));
    }

    #[tokio::test]
    async fn test_tables_differing_only_in_separators_stay_apart() {
        let store = MemoryLineageStore::new()
            .with_edge("mssql", ("sales_eu", "orders"), ("dw", "a"), "sync")
            .with_edge("mssql", ("sales", "eu_orders"), ("dw", "b"), "sync");

        let graph = builder(store).build_complete_graph(&[], &[]).await;

        assert_eq!(graph.node_count(), 4);
        let labels: Vec<&str> = graph.nodes().iter().map(|n| n.label.as_str()).collect();
        assert_eq!(labels, vec!["sales_eu.orders", "dw.a", "sales.eu_orders", "dw.b"]);
        assert_eq!(
            edges_of(&graph),
            vec![
                ("table:8:sales_eu:6:orders".to_string(), "sync".to_string(), "table:2:dw:1:a".to_string()),
                ("table:5:sales:9:eu_orders".to_string(), "sync".to_string(), "table:2:dw:1:b".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_task_ids_keep_workflow_and_task_apart() {
        let store = MemoryLineageStore::new()
            .with_task(WorkflowTaskRow {
                workflow_name: "a.b".into(),
                task_name: "c".into(),
                ..Default::default()
            })
            .with_task(WorkflowTaskRow {
                workflow_name: "a".into(),
                task_name: "b.c".into(),
                ..Default::default()
            });

        let graph = builder(store).build_graph_from_workflows(&[]).await;

        let tasks = graph.nodes().iter().filter(|n| n.node_type == NodeType::Task).count();
        assert_eq!(tasks, 2);
    }
}
