//! Lineage graph route handlers

use crate::error::{validation_error, ApiResult, AppError};
use crate::lineage::query::{filter_graph, find_path};
use crate::lineage::{Direction, EdgeKind, NodeType};
use crate::models::validation::split_list;
use crate::models::{
    CompleteGraphQuery, FilterGraphRequest, GraphResponse, PathQuery, PathResponse,
    ResourceGraphQuery, WorkflowGraphQuery,
};
use crate::state::SharedState;
use axum::{
    extract::{Query, State},
    Json,
};
use tracing::{debug, info};
use validator::Validate;

/// Complete graph over the requested engines and schemas
pub async fn complete_graph(
    State(state): State<SharedState>,
    Query(query): Query<CompleteGraphQuery>,
) -> ApiResult<Json<GraphResponse>> {
    query.validate().map_err(|e| validation_error(e.to_string()))?;

    let engines = split_list(query.engines.as_deref());
    let schemas = split_list(query.schemas.as_deref());
    let graph = state.builder.build_complete_graph(&engines, &schemas).await;

    Ok(Json(GraphResponse::new(graph)))
}

/// Graph of the lineage around one table or column
pub async fn resource_graph(
    State(state): State<SharedState>,
    Query(query): Query<ResourceGraphQuery>,
) -> ApiResult<Json<GraphResponse>> {
    query.validate().map_err(|e| validation_error(e.to_string()))?;

    let direction = match query.direction.as_deref() {
        Some(value) => Direction::parse(value).ok_or_else(|| {
            AppError::BadRequest(format!(
                "Unknown direction '{}' (expected downstream, upstream or both)",
                value
            ))
        })?,
        None => Direction::default(),
    };

    let limits = state.traversal_limits(query.max_depth);
    debug!(
        "Building {:?} graph for {}.{} (max depth {})",
        direction, query.schema, query.table, limits.max_depth
    );

    let graph = state
        .builder
        .build_graph_for_resource(
            &query.schema,
            &query.table,
            query.column.as_deref().unwrap_or_default(),
            direction,
            limits,
        )
        .await;

    Ok(Json(GraphResponse::new(graph)))
}

/// Graph of workflows and their tasks
pub async fn workflow_graph(
    State(state): State<SharedState>,
    Query(query): Query<WorkflowGraphQuery>,
) -> ApiResult<Json<GraphResponse>> {
    query.validate().map_err(|e| validation_error(e.to_string()))?;

    let names = split_list(query.names.as_deref());
    let graph = state.builder.build_graph_from_workflows(&names).await;

    Ok(Json(GraphResponse::new(graph)))
}

/// Filter the complete graph by node type, edge type and schema
pub async fn filter(
    State(state): State<SharedState>,
    Json(payload): Json<FilterGraphRequest>,
) -> ApiResult<Json<GraphResponse>> {
    payload.validate().map_err(|e| validation_error(e.to_string()))?;

    let node_types = payload
        .node_types
        .iter()
        .map(|value| {
            NodeType::parse(value)
                .ok_or_else(|| AppError::BadRequest(format!("Unknown node type '{}'", value)))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let edge_types: Vec<EdgeKind> = payload
        .edge_types
        .iter()
        .map(|value| EdgeKind::from(value.as_str()))
        .collect();

    let graph = state.builder.build_complete_graph(&payload.engines, &[]).await;
    let filtered = filter_graph(&graph, &node_types, &edge_types, &payload.schemas);

    info!(
        "Filtered lineage graph from {} to {} nodes",
        graph.node_count(),
        filtered.node_count()
    );
    Ok(Json(GraphResponse::new(filtered)))
}

/// Shortest path between two nodes of the complete graph
pub async fn path(
    State(state): State<SharedState>,
    Query(query): Query<PathQuery>,
) -> ApiResult<Json<PathResponse>> {
    query.validate().map_err(|e| validation_error(e.to_string()))?;

    let engines = split_list(query.engines.as_deref());
    let graph = state.builder.build_complete_graph(&engines, &[]).await;
    let path = find_path(&graph, &query.from, &query.to);

    Ok(Json(PathResponse::new(path)))
}
