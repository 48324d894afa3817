//! Dashboard fan-out over WebSockets.
//!
//! Every socket receives `liveVisitorCount`. Sockets that sent
//! `subscribeToAnalytics` additionally receive the room traffic:
//! `visitorActivity` notices and `analyticsUpdate` snapshots.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use axum::extract::ws::Utf8Bytes;
use chrono::Utc;
use chrono_tz::Tz;
use serde::Serialize;
use serde_json::json;
use tokio::sync::{broadcast, Notify};
use tracing::{debug, error, warn};

use folio_core::{
    analytics::{AnalyticsStore, ComprehensiveSnapshot},
    event::VisitorActivity,
    period::{resolve_period, Period},
    reports,
};

use crate::ingest::RealtimeNotifier;

const CHANNEL_CAPACITY: usize = 256;

pub const EVENT_ANALYTICS_UPDATE: &str = "analyticsUpdate";
pub const EVENT_ANALYTICS_ERROR: &str = "analyticsError";
pub const EVENT_VISITOR_ACTIVITY: &str = "visitorActivity";
pub const EVENT_LIVE_VISITOR_COUNT: &str = "liveVisitorCount";

/// Who a broadcast frame is meant for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    /// Every connected socket.
    All,
    /// Only sockets subscribed to analytics.
    Room,
}

#[derive(Debug, Clone)]
pub struct Frame {
    pub audience: Audience,
    pub text: Utf8Bytes,
}

/// Encode a `{"event": .., "data": ..}` envelope.
pub fn encode_frame<T: Serialize>(event: &str, data: &T) -> Result<Utf8Bytes> {
    let text = serde_json::to_string(&json!({ "event": event, "data": data }))?;
    Ok(text.into())
}

pub struct RealtimeHub {
    tx: broadcast::Sender<Frame>,
    connected: AtomicUsize,
    subscribers: AtomicUsize,
    snapshot_requested: Notify,
}

impl Default for RealtimeHub {
    fn default() -> Self {
        Self::new()
    }
}

impl RealtimeHub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            tx,
            connected: AtomicUsize::new(0),
            subscribers: AtomicUsize::new(0),
            snapshot_requested: Notify::new(),
        }
    }

    pub fn receiver(&self) -> broadcast::Receiver<Frame> {
        self.tx.subscribe()
    }

    pub fn connected_clients(&self) -> usize {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.load(Ordering::SeqCst)
    }

    pub fn client_connected(&self) {
        let count = self.connected.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(count, "Realtime client connected");
        self.broadcast_count(count);
    }

    pub fn client_disconnected(&self) {
        let count = self
            .connected
            .fetch_sub(1, Ordering::SeqCst)
            .saturating_sub(1);
        debug!(count, "Realtime client disconnected");
        self.broadcast_count(count);
    }

    pub fn join_room(&self) {
        self.subscribers.fetch_add(1, Ordering::SeqCst);
    }

    pub fn leave_room(&self) {
        self.subscribers.fetch_sub(1, Ordering::SeqCst);
    }

    /// Encode and broadcast one frame. Having no receivers is not an error.
    pub fn publish<T: Serialize>(&self, audience: Audience, event: &str, data: &T) {
        match encode_frame(event, data) {
            Ok(text) => {
                let _ = self.tx.send(Frame { audience, text });
            }
            Err(e) => warn!(event, error = %e, "Failed to encode realtime frame"),
        }
    }

    fn broadcast_count(&self, count: usize) {
        self.publish(
            Audience::All,
            EVENT_LIVE_VISITOR_COUNT,
            &json!({ "count": count }),
        );
    }

    /// Background task: recompute and push the default snapshot whenever one
    /// was requested.
    ///
    /// Pushed snapshots always cover `last30days` regardless of the range a
    /// socket subscribed with; the payload's `period` identifies it.
    ///
    /// `Notify` keeps at most one pending permit, so a burst of accepted
    /// visits collapses into a single recompute.
    pub async fn run_snapshot_loop(self: Arc<Self>, store: Arc<dyn AnalyticsStore>, tz: Tz) {
        loop {
            self.snapshot_requested.notified().await;
            if self.subscriber_count() == 0 {
                continue;
            }
            match default_snapshot(store.as_ref(), tz).await {
                Ok(snapshot) => self.publish(Audience::Room, EVENT_ANALYTICS_UPDATE, &snapshot),
                Err(e) => error!(error = %e, "Realtime snapshot failed"),
            }
        }
    }
}

impl RealtimeNotifier for RealtimeHub {
    fn visitor_activity(&self, activity: VisitorActivity) {
        if self.subscriber_count() == 0 {
            return;
        }
        self.publish(Audience::Room, EVENT_VISITOR_ACTIVITY, &activity);
    }

    fn request_snapshot(&self) {
        self.snapshot_requested.notify_one();
    }
}

/// Snapshot for the default dashboard period ending today.
pub async fn default_snapshot(store: &dyn AnalyticsStore, tz: Tz) -> Result<ComprehensiveSnapshot> {
    let range = resolve_period(Period::default(), None, None, Utc::now(), tz)?;
    reports::comprehensive_snapshot(store, &range).await
}
