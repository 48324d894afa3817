use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, Utf8Bytes, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    Extension,
};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

use folio_core::reports;

use crate::{
    auth::middleware::AuthContext,
    realtime::{encode_frame, Audience, Frame, EVENT_ANALYTICS_ERROR, EVENT_ANALYTICS_UPDATE},
    routes::query::ReportQuery,
    state::AppState,
};

/// Inbound frame: `{"event": "...", "data": {...}}`.
#[derive(Debug, Deserialize)]
struct ClientFrame {
    event: String,
    #[serde(default)]
    data: Option<serde_json::Value>,
}

enum Command {
    Subscribe(ReportQuery),
    Unsubscribe,
    RequestUpdate(ReportQuery),
}

impl Command {
    fn parse(text: &str) -> Option<Self> {
        let frame: ClientFrame = serde_json::from_str(text).ok()?;
        let query = || {
            frame
                .data
                .clone()
                .and_then(|d| serde_json::from_value::<ReportQuery>(d).ok())
                .unwrap_or_default()
        };
        match frame.event.as_str() {
            "subscribeToAnalytics" => Some(Self::Subscribe(query())),
            "unsubscribeFromAnalytics" => Some(Self::Unsubscribe),
            "requestAnalyticsUpdate" => Some(Self::RequestUpdate(query())),
            _ => None,
        }
    }
}

/// `GET /analytics/ws` — dashboard realtime channel.
///
/// Client events:
///
/// - `subscribeToAnalytics {period?, startDate?, endDate?}` joins the
///   analytics room and replies with an `analyticsUpdate` for that range.
///   Snapshots pushed later, after new visits, always cover the default
///   `last30days` range; clients compare the payload's `period` against
///   their own view.
/// - `unsubscribeFromAnalytics` leaves the room. `liveVisitorCount` keeps
///   arriving.
/// - `requestAnalyticsUpdate {..}` replies with a one-off snapshot.
///
/// Range errors are answered with `analyticsError {message}`.
pub async fn analytics_ws(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
) -> Response {
    debug!(subject = %auth.subject, "Realtime socket upgrade");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>) {
    let (mut session, mut rx) = RealtimeSession::open(state);

    loop {
        tokio::select! {
            inbound = socket.recv() => {
                let text = match inbound {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        debug!(error = %e, "Realtime socket read failed");
                        break;
                    }
                };
                if let Some(reply) = session.handle_text(text.as_str()).await {
                    if socket.send(Message::Text(reply)).await.is_err() {
                        break;
                    }
                }
            }
            outbound = rx.recv() => {
                let frame = match outbound {
                    Ok(frame) => frame,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Realtime socket lagged; dropping missed frames");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };
                if !session.wants(&frame) {
                    continue;
                }
                if socket.send(Message::Text(frame.text)).await.is_err() {
                    break;
                }
            }
        }
    }
}

/// Per-socket protocol state. Dropping it leaves the room and releases the
/// connection count.
pub(crate) struct RealtimeSession {
    state: Arc<AppState>,
    subscribed: bool,
}

impl RealtimeSession {
    /// Register a connection. The receiver is created before the count is
    /// broadcast so the socket also sees its own `liveVisitorCount`.
    pub(crate) fn open(state: Arc<AppState>) -> (Self, broadcast::Receiver<Frame>) {
        let rx = state.realtime.receiver();
        state.realtime.client_connected();
        (
            Self {
                state,
                subscribed: false,
            },
            rx,
        )
    }

    /// Apply one inbound text frame; returns the direct reply, if any.
    pub(crate) async fn handle_text(&mut self, text: &str) -> Option<Utf8Bytes> {
        let Some(command) = Command::parse(text) else {
            debug!("Ignoring unknown realtime frame");
            return None;
        };
        match command {
            Command::Subscribe(query) => {
                if !self.subscribed {
                    self.subscribed = true;
                    self.state.realtime.join_room();
                }
                snapshot_frame(&self.state, &query).await
            }
            Command::Unsubscribe => {
                if self.subscribed {
                    self.subscribed = false;
                    self.state.realtime.leave_room();
                }
                None
            }
            Command::RequestUpdate(query) => snapshot_frame(&self.state, &query).await,
        }
    }

    /// Whether a broadcast frame should be forwarded to this socket.
    pub(crate) fn wants(&self, frame: &Frame) -> bool {
        frame.audience == Audience::All || self.subscribed
    }
}

impl Drop for RealtimeSession {
    fn drop(&mut self) {
        if self.subscribed {
            self.state.realtime.leave_room();
        }
        self.state.realtime.client_disconnected();
    }
}

/// `analyticsUpdate` for the requested range, or `analyticsError`.
async fn snapshot_frame(state: &AppState, query: &ReportQuery) -> Option<Utf8Bytes> {
    let result = match query.date_range(state.config.timezone) {
        Ok(range) => reports::comprehensive_snapshot(state.store.as_ref(), &range)
            .await
            .map_err(|e| {
                warn!(error = %e, "Realtime snapshot failed");
                "Failed to compute analytics".to_string()
            }),
        Err(e) => Err(e.to_string()),
    };
    let encoded = match result {
        Ok(snapshot) => encode_frame(EVENT_ANALYTICS_UPDATE, &snapshot),
        Err(message) => encode_frame(EVENT_ANALYTICS_ERROR, &json!({ "message": message })),
    };
    encoded
        .inspect_err(|e| warn!(error = %e, "Failed to encode realtime frame"))
        .ok()
}
