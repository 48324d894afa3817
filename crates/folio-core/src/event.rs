use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Body of `POST /analytics/track-visit`.
///
/// `path` is optional at the serde level so a missing value surfaces as a
/// validation error from the handler instead of a JSON rejection.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackVisitPayload {
    pub path: Option<String>,
    pub session_id: Option<String>,
    pub referer: Option<String>,
}

/// Body of `POST /analytics/track-page-view`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackPageViewPayload {
    pub path: Option<String>,
    pub session_id: Option<String>,
    pub referer: Option<String>,
    /// Seconds spent on the page, when the client reports it.
    pub duration: Option<f64>,
    pub is_bounce: Option<bool>,
}

/// Body of `POST /analytics/track-interaction`.
/// Wire field "type" maps to `action` in the database.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackInteractionPayload {
    #[serde(rename = "type")]
    pub interaction_type: Option<String>,
    pub element: Option<String>,
    pub value: Option<String>,
    /// Client sends a JSON object; server serializes to String before storage.
    pub metadata: Option<serde_json::Value>,
    pub session_id: Option<String>,
    pub path: Option<String>,
}

/// Response shared by all three tracking endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackResponse {
    pub success: bool,
    pub id: Option<String>,
    pub tracked: bool,
}

impl TrackResponse {
    pub fn tracked(id: String) -> Self {
        Self {
            success: true,
            id: Some(id),
            tracked: true,
        }
    }

    /// Admin path or duplicate visit: not an error, just not recorded.
    pub fn skipped() -> Self {
        Self {
            success: true,
            id: None,
            tracked: false,
        }
    }
}

/// An accepted visit, ready to be written. Produced by the ingestion layer
/// after admin filtering and enrichment.
#[derive(Debug, Clone, Default)]
pub struct NewVisit {
    pub path: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub referer: Option<String>,
    pub country: Option<String>,
    pub device: Option<String>,
    pub browser: Option<String>,
    pub os: Option<String>,
    pub session_id: Option<String>,
    pub duration: Option<f64>,
    pub is_bounce: bool,
}

/// The stored visit — mirrors the DuckDB `visit_events` table columns.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitEvent {
    pub id: String,
    pub path: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub referer: Option<String>,
    pub country: Option<String>,
    pub device: Option<String>,
    pub browser: Option<String>,
    pub os: Option<String>,
    pub session_id: Option<String>,
    pub duration: Option<f64>,
    /// Always true on write: duplicates are never stored.
    pub is_unique: bool,
    pub is_bounce: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct NewInteraction {
    pub session_id: Option<String>,
    pub path: String,
    pub action: String,
    pub element: Option<String>,
    pub value: Option<String>,
    pub metadata: Option<String>,
}

/// The stored interaction — mirrors the DuckDB `user_interactions` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInteraction {
    pub id: String,
    pub session_id: Option<String>,
    pub path: String,
    pub action: String,
    pub element: Option<String>,
    pub value: Option<String>,
    pub metadata: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Lightweight notice pushed to dashboard subscribers for each accepted visit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitorActivity {
    #[serde(rename = "type")]
    pub activity_type: String,
    pub page: String,
    pub timestamp: DateTime<Utc>,
    pub user_agent: Option<String>,
    /// ISO country code from GeoIP, when known.
    pub location: Option<String>,
}

impl VisitorActivity {
    pub fn from_visit(event: &VisitEvent) -> Self {
        Self {
            activity_type: "visit".to_string(),
            page: event.path.clone(),
            timestamp: event.timestamp,
            user_agent: event.user_agent.clone(),
            location: event.country.clone(),
        }
    }
}
