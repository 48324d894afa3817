use std::{convert::Infallible, net::SocketAddr, sync::Arc};

use axum::{
    extract::{ConnectInfo, FromRequestParts, State},
    http::{request::Parts, HeaderMap},
    response::IntoResponse,
    Json,
};

use folio_core::event::{
    TrackInteractionPayload, TrackPageViewPayload, TrackResponse, TrackVisitPayload,
};

use crate::{
    error::AppError,
    ingest::{ClientInfo, Interaction, PageView},
    state::AppState,
};

/// `POST /analytics/track-visit` — record a visit for the calling browser.
///
/// Admin paths and repeats inside the dedup window answer
/// `{ "success": true, "id": null, "tracked": false }`.
#[tracing::instrument(skip(state, maybe_connect_info, headers, payload))]
pub async fn track_visit(
    State(state): State<Arc<AppState>>,
    maybe_connect_info: MaybeConnectInfo,
    headers: HeaderMap,
    Json(payload): Json<TrackVisitPayload>,
) -> Result<impl IntoResponse, AppError> {
    let client = client_info(&headers, maybe_connect_info.0);
    enforce_rate_limit(&state, &client).await?;
    let path = required(payload.path, "path")?;

    let event = state
        .ingestion
        .track_request_visit(path, payload.session_id, payload.referer, &client)
        .await?;

    Ok(Json(response(event.map(|e| e.id))))
}

/// `POST /analytics/track-page-view` — like track-visit, plus device
/// detection, duration, and bounce flag.
#[tracing::instrument(skip(state, maybe_connect_info, headers, payload))]
pub async fn track_page_view(
    State(state): State<Arc<AppState>>,
    maybe_connect_info: MaybeConnectInfo,
    headers: HeaderMap,
    Json(payload): Json<TrackPageViewPayload>,
) -> Result<impl IntoResponse, AppError> {
    let client = client_info(&headers, maybe_connect_info.0);
    enforce_rate_limit(&state, &client).await?;
    let path = required(payload.path, "path")?;

    let page_view = PageView {
        path,
        session_id: payload.session_id,
        referer: payload.referer,
        duration: payload.duration,
        is_bounce: payload.is_bounce.unwrap_or(false),
    };
    let event = state.ingestion.track_page_view(page_view, &client).await?;

    Ok(Json(response(event.map(|e| e.id))))
}

/// `POST /analytics/track-interaction` — clicks, downloads, form events.
#[tracing::instrument(skip(state, maybe_connect_info, headers, payload))]
pub async fn track_interaction(
    State(state): State<Arc<AppState>>,
    maybe_connect_info: MaybeConnectInfo,
    headers: HeaderMap,
    Json(payload): Json<TrackInteractionPayload>,
) -> Result<impl IntoResponse, AppError> {
    let client = client_info(&headers, maybe_connect_info.0);
    enforce_rate_limit(&state, &client).await?;
    let action = required(payload.interaction_type, "type")?;

    let interaction = Interaction {
        action,
        element: payload.element,
        value: payload.value,
        metadata: payload.metadata,
        session_id: payload.session_id,
        path: payload.path,
    };
    let stored = state.ingestion.track_interaction(interaction).await?;

    Ok(Json(response(stored.map(|i| i.id))))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// TCP peer address, when the server was started with connect info.
///
/// Routers driven without `into_make_service_with_connect_info` (tests,
/// embedding) yield `None` instead of rejecting the request.
#[derive(Debug, Clone, Copy, Default)]
pub struct MaybeConnectInfo(pub Option<SocketAddr>);

impl<S> FromRequestParts<S> for MaybeConnectInfo
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| *addr),
        ))
    }
}

fn response(id: Option<String>) -> TrackResponse {
    match id {
        Some(id) => TrackResponse::tracked(id),
        None => TrackResponse::skipped(),
    }
}

fn required(value: Option<String>, field: &str) -> Result<String, AppError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::BadRequest(format!("{field} is required")))
}

async fn enforce_rate_limit(state: &AppState, client: &ClientInfo) -> Result<(), AppError> {
    let key = client.ip.as_deref().unwrap_or("unknown");
    if state.check_rate_limit(key).await {
        Ok(())
    } else {
        Err(AppError::RateLimited)
    }
}

pub(crate) fn client_info(headers: &HeaderMap, peer: Option<SocketAddr>) -> ClientInfo {
    ClientInfo {
        ip: extract_client_ip(headers, peer),
        user_agent: headers
            .get(axum::http::header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .filter(|ua| !ua.is_empty()),
    }
}

/// Client IP from `X-Forwarded-For` (first entry), then `X-Real-IP`, then
/// the socket peer.
///
/// `None` only when none of those is known; such visits skip dedup.
pub(crate) fn extract_client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.split(',').next())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    };
    header("x-forwarded-for")
        .or_else(|| header("x-real-ip"))
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
}
