use std::sync::Arc;

use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use serde_json::json;

use folio_core::{analytics::BreakdownDimension, reports};

use crate::{error::AppError, routes::query::ReportQuery, state::AppState};

/// `GET /analytics/overview` — totals, averages, and growth vs the
/// preceding range of equal length (`compare=false` omits growth).
#[tracing::instrument(skip(state))]
pub async fn overview(
    State(state): State<Arc<AppState>>,
    Query(q): Query<ReportQuery>,
) -> Result<impl IntoResponse, AppError> {
    let range = q.date_range(state.config.timezone)?;
    let result = reports::overview(state.store.as_ref(), &range, q.compare.unwrap_or(true)).await?;
    Ok(Json(json!({ "data": result })))
}

/// `GET /analytics/traffic-growth?groupBy=day|week|month`
#[tracing::instrument(skip(state))]
pub async fn traffic_growth(
    State(state): State<Arc<AppState>>,
    Query(q): Query<ReportQuery>,
) -> Result<impl IntoResponse, AppError> {
    let range = q.date_range(state.config.timezone)?;
    let group_by = q.group_by()?;
    let series = reports::traffic_growth(state.store.as_ref(), &range, group_by).await?;
    Ok(Json(json!({ "data": series })))
}

async fn breakdown(
    state: &AppState,
    q: &ReportQuery,
    dimension: BreakdownDimension,
) -> Result<Json<serde_json::Value>, AppError> {
    let range = q.date_range(state.config.timezone)?;
    let rows = reports::breakdown(state.store.as_ref(), &range, dimension).await?;
    Ok(Json(json!({ "data": rows })))
}

/// `GET /analytics/device-breakdown`
pub async fn device_breakdown(
    State(state): State<Arc<AppState>>,
    Query(q): Query<ReportQuery>,
) -> Result<impl IntoResponse, AppError> {
    breakdown(&state, &q, BreakdownDimension::Device).await
}

/// `GET /analytics/browser-stats`
pub async fn browser_stats(
    State(state): State<Arc<AppState>>,
    Query(q): Query<ReportQuery>,
) -> Result<impl IntoResponse, AppError> {
    breakdown(&state, &q, BreakdownDimension::Browser).await
}

/// `GET /analytics/operating-systems`
pub async fn operating_systems(
    State(state): State<Arc<AppState>>,
    Query(q): Query<ReportQuery>,
) -> Result<impl IntoResponse, AppError> {
    breakdown(&state, &q, BreakdownDimension::Os).await
}

/// `GET /analytics/traffic-sources`
#[tracing::instrument(skip(state))]
pub async fn traffic_sources(
    State(state): State<Arc<AppState>>,
    Query(q): Query<ReportQuery>,
) -> Result<impl IntoResponse, AppError> {
    let range = q.date_range(state.config.timezone)?;
    let rows = reports::traffic_sources(state.store.as_ref(), &range).await?;
    Ok(Json(json!({ "data": rows })))
}

/// `GET /analytics/top-pages?limit=N` (default 10, clamped to 1..=100).
#[tracing::instrument(skip(state))]
pub async fn top_pages(
    State(state): State<Arc<AppState>>,
    Query(q): Query<ReportQuery>,
) -> Result<impl IntoResponse, AppError> {
    let range = q.date_range(state.config.timezone)?;
    let rows = reports::top_pages(state.store.as_ref(), &range, q.limit).await?;
    Ok(Json(json!({ "data": rows })))
}

/// `GET /analytics/comprehensive` — every report for one range.
#[tracing::instrument(skip(state))]
pub async fn comprehensive(
    State(state): State<Arc<AppState>>,
    Query(q): Query<ReportQuery>,
) -> Result<impl IntoResponse, AppError> {
    let range = q.date_range(state.config.timezone)?;
    let snapshot = reports::comprehensive_snapshot(state.store.as_ref(), &range).await?;
    Ok(Json(json!({ "data": snapshot })))
}

/// `GET /analytics/live-visitors` — sockets currently connected.
pub async fn live_visitors(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({ "data": { "count": state.realtime.connected_clients() } }))
}
