//! Impact analysis route handlers

use crate::error::{validation_error, ApiResult, AppError};
use crate::impact::{generate_impact_report, ChangeType};
use crate::models::{
    CleanupQuery, CleanupResponse, HistoryQuery, HistoryResponse, ImpactRequest, ImpactResponse,
    ReportRequest, ReportResponse, SchemaChangeRequest, StoredAnalysisResponse,
};
use crate::state::SharedState;
use axum::{
    extract::{Path, Query, State},
    Json,
};
use tracing::info;
use validator::Validate;

/// What is affected if the resource changes
pub async fn downstream(
    State(state): State<SharedState>,
    Json(payload): Json<ImpactRequest>,
) -> ApiResult<Json<ImpactResponse>> {
    payload.validate().map_err(|e| validation_error(e.to_string()))?;

    let result = state
        .analyzer
        .analyze_downstream_impact(&payload.schema, &payload.table, payload.column(), &payload.config)
        .await;

    Ok(Json(ImpactResponse {
        success: true,
        result,
    }))
}

/// What the resource depends on
pub async fn upstream(
    State(state): State<SharedState>,
    Json(payload): Json<ImpactRequest>,
) -> ApiResult<Json<ImpactResponse>> {
    payload.validate().map_err(|e| validation_error(e.to_string()))?;

    let result = state
        .analyzer
        .analyze_upstream_impact(&payload.schema, &payload.table, payload.column(), &payload.config)
        .await;

    Ok(Json(ImpactResponse {
        success: true,
        result,
    }))
}

/// Both directions in one result
pub async fn full(
    State(state): State<SharedState>,
    Json(payload): Json<ImpactRequest>,
) -> ApiResult<Json<ImpactResponse>> {
    payload.validate().map_err(|e| validation_error(e.to_string()))?;

    let result = state
        .analyzer
        .analyze_full_impact(&payload.schema, &payload.table, payload.column(), &payload.config)
        .await;

    Ok(Json(ImpactResponse {
        success: true,
        result,
    }))
}

/// Impact of a planned schema change
pub async fn schema_change(
    State(state): State<SharedState>,
    Json(payload): Json<SchemaChangeRequest>,
) -> ApiResult<Json<ImpactResponse>> {
    payload.validate().map_err(|e| validation_error(e.to_string()))?;

    let result = state
        .analyzer
        .analyze_schema_change_impact(
            &payload.schema,
            &payload.change_type,
            &payload.table,
            payload.column.as_deref().unwrap_or_default(),
            &payload.config,
        )
        .await;

    Ok(Json(ImpactResponse {
        success: true,
        result,
    }))
}

/// Full analysis as a report document, optionally stored
pub async fn report(
    State(state): State<SharedState>,
    Json(payload): Json<ReportRequest>,
) -> ApiResult<Json<ReportResponse>> {
    payload.validate().map_err(|e| validation_error(e.to_string()))?;

    let change_type = match payload.change_type.as_deref() {
        Some(value) => Some(ChangeType::parse(value).ok_or_else(|| {
            AppError::BadRequest(format!("Unknown change type '{}'", value))
        })?),
        None => None,
    };

    let result = state
        .analyzer
        .analyze_full_impact(
            &payload.schema,
            &payload.table,
            payload.column.as_deref().unwrap_or_default(),
            &payload.config,
        )
        .await;
    let report = generate_impact_report(&result);

    let analysis_id = if payload.save {
        let id = state
            .history
            .save(&result, change_type, payload.created_by.as_deref())
            .await?;
        Some(id)
    } else {
        None
    };

    Ok(Json(ReportResponse {
        success: true,
        report,
        analysis_id,
    }))
}

/// Stored analyses of one table or column, newest first
pub async fn history(
    State(state): State<SharedState>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<HistoryResponse>> {
    query.validate().map_err(|e| validation_error(e.to_string()))?;

    let entries = state
        .history
        .history(
            &query.schema,
            &query.table,
            query.column.as_deref().unwrap_or_default(),
            query.limit.unwrap_or(50),
        )
        .await?;

    Ok(Json(HistoryResponse {
        success: true,
        count: entries.len(),
        entries,
    }))
}

/// One stored analysis
pub async fn get_analysis(
    State(state): State<SharedState>,
    Path(id): Path<i32>,
) -> ApiResult<Json<StoredAnalysisResponse>> {
    let analysis = state.history.get(id).await?;

    Ok(Json(StoredAnalysisResponse {
        success: true,
        analysis,
    }))
}

/// Delete stored analyses older than the given number of days
pub async fn cleanup(
    State(state): State<SharedState>,
    Query(query): Query<CleanupQuery>,
) -> ApiResult<Json<CleanupResponse>> {
    query.validate().map_err(|e| validation_error(e.to_string()))?;

    let deleted = state.history.cleanup(query.older_than_days).await?;
    info!(
        "Removed {} impact analyses older than {} days",
        deleted, query.older_than_days
    );

    Ok(Json(CleanupResponse {
        success: true,
        message: format!("Removed {} stored analyses", deleted),
        deleted,
    }))
}
