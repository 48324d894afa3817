use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use tracing::{debug, error};

use folio_core::{
    analytics::AnalyticsStore,
    config::Config,
    event::{NewInteraction, NewVisit, UserInteraction, VisitEvent, VisitorActivity},
    period::local_day,
    visitor::{is_admin_path, parse_user_agent},
};

use crate::geo::GeoLookup;

/// Push side of the realtime channel, as seen by ingestion.
///
/// Both calls are fire-and-forget. Implementations log their own failures;
/// nothing is reported back to the ingesting request.
pub trait RealtimeNotifier: Send + Sync {
    fn visitor_activity(&self, activity: VisitorActivity);

    /// Ask for a fresh comprehensive snapshot to be pushed to subscribers.
    fn request_snapshot(&self);
}

/// Request metadata attached to every tracking call.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PageView {
    pub path: String,
    pub session_id: Option<String>,
    pub referer: Option<String>,
    pub duration: Option<f64>,
    pub is_bounce: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Interaction {
    pub action: String,
    pub element: Option<String>,
    pub value: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub session_id: Option<String>,
    /// Page the interaction happened on; `/` when the client did not say.
    pub path: Option<String>,
}

pub struct IngestionService {
    store: Arc<dyn AnalyticsStore>,
    notifier: Option<Arc<dyn RealtimeNotifier>>,
    geo: Arc<GeoLookup>,
    admin_paths: Vec<String>,
    dedup_window: Duration,
    timezone: Tz,
}

impl IngestionService {
    pub fn new(
        store: Arc<dyn AnalyticsStore>,
        notifier: Option<Arc<dyn RealtimeNotifier>>,
        geo: Arc<GeoLookup>,
        config: &Config,
    ) -> Self {
        Self {
            store,
            notifier,
            geo,
            admin_paths: config.admin_paths.clone(),
            dedup_window: config.dedup_window(),
            timezone: config.timezone,
        }
    }

    pub fn is_admin_path(&self, path: &str) -> bool {
        is_admin_path(path, &self.admin_paths)
    }

    pub async fn track_visit(&self, visit: NewVisit) -> Result<Option<VisitEvent>> {
        self.track_visit_at(visit, Utc::now()).await
    }

    /// Admit a visit as of `now`.
    ///
    /// Returns `Ok(None)` for admin paths and for duplicates inside the
    /// dedup window. Storage errors propagate.
    pub async fn track_visit_at(
        &self,
        visit: NewVisit,
        now: DateTime<Utc>,
    ) -> Result<Option<VisitEvent>> {
        if self.is_admin_path(&visit.path) {
            debug!(path = %visit.path, "Skipping admin path");
            return Ok(None);
        }

        let day = local_day(now, self.timezone);
        let accepted = self
            .store
            .record_visit(&visit, now, day, self.dedup_window)
            .await
            .inspect_err(|e| error!(path = %visit.path, error = %e, "Visit write failed"))?;

        if let (Some(event), Some(notifier)) = (&accepted, &self.notifier) {
            notifier.visitor_activity(VisitorActivity::from_visit(event));
            notifier.request_snapshot();
        }
        Ok(accepted)
    }

    /// Record a visit coming straight from a browser request: the caller's
    /// IP and user agent are resolved to country and device fields first.
    pub async fn track_request_visit(
        &self,
        path: String,
        session_id: Option<String>,
        referer: Option<String>,
        client: &ClientInfo,
    ) -> Result<Option<VisitEvent>> {
        if self.is_admin_path(&path) {
            return Ok(None);
        }
        let visit = NewVisit {
            path,
            ip_address: client.ip.clone(),
            user_agent: client.user_agent.clone(),
            referer,
            country: self.country_of(client),
            session_id,
            ..Default::default()
        };
        self.track_visit(visit).await
    }

    pub async fn track_page_view(
        &self,
        page_view: PageView,
        client: &ClientInfo,
    ) -> Result<Option<VisitEvent>> {
        if self.is_admin_path(&page_view.path) {
            return Ok(None);
        }
        let info = parse_user_agent(client.user_agent.as_deref());
        let visit = NewVisit {
            path: page_view.path,
            ip_address: client.ip.clone(),
            user_agent: client.user_agent.clone(),
            referer: page_view.referer,
            country: self.country_of(client),
            device: Some(info.device),
            browser: Some(info.browser),
            os: Some(info.os),
            session_id: page_view.session_id,
            duration: page_view.duration,
            is_bounce: page_view.is_bounce,
        };
        self.track_visit(visit).await
    }

    /// Store an interaction. No dedup, no aggregates, no realtime push.
    pub async fn track_interaction(
        &self,
        interaction: Interaction,
    ) -> Result<Option<UserInteraction>> {
        let path = interaction
            .path
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| "/".to_string());
        if self.is_admin_path(&path) {
            debug!(path = %path, "Skipping admin path interaction");
            return Ok(None);
        }

        let record = NewInteraction {
            session_id: interaction.session_id,
            path,
            action: interaction.action,
            element: interaction.element,
            value: interaction.value,
            metadata: interaction.metadata.map(|m| m.to_string()),
        };
        let stored = self
            .store
            .record_interaction(&record, Utc::now())
            .await
            .inspect_err(|e| error!(action = %record.action, error = %e, "Interaction write failed"))?;
        Ok(Some(stored))
    }

    fn country_of(&self, client: &ClientInfo) -> Option<String> {
        client.ip.as_deref().and_then(|ip| self.geo.country(ip))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use folio_duckdb::DuckDbBackend;

    use super::*;

    #[derive(Default)]
    struct RecordingNotifier {
        activities: Mutex<Vec<VisitorActivity>>,
        snapshots: Mutex<usize>,
    }

    impl RealtimeNotifier for RecordingNotifier {
        fn visitor_activity(&self, activity: VisitorActivity) {
            self.activities.lock().expect("lock").push(activity);
        }

        fn request_snapshot(&self) {
            *self.snapshots.lock().expect("lock") += 1;
        }
    }

    fn config() -> Config {
        Config {
            port: 0,
            data_dir: "/tmp/folio-test".to_string(),
            geoip_path: "/nonexistent/GeoLite2-City.mmdb".to_string(),
            auth_mode: folio_core::config::AuthMode::None,
            jwt_secret: None,
            timezone: Tz::UTC,
            admin_paths: folio_core::config::default_admin_paths(),
            dedup_window_minutes: 60,
            cors_origins: vec![],
            rate_limit_disable: true,
            duckdb_memory_limit: "1GB".to_string(),
        }
    }

    fn service(notifier: Option<Arc<dyn RealtimeNotifier>>) -> IngestionService {
        let store: Arc<dyn AnalyticsStore> =
            Arc::new(DuckDbBackend::open_in_memory().expect("in-memory DuckDB"));
        IngestionService::new(store, notifier, Arc::new(GeoLookup::disabled()), &config())
    }

    fn at(raw: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(raw)
            .expect("valid instant")
            .with_timezone(&Utc)
    }

    fn visit(path: &str, ip: &str) -> NewVisit {
        NewVisit {
            path: path.to_string(),
            ip_address: Some(ip.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn admin_paths_are_never_recorded() {
        let svc = service(None);
        for path in ["/admin", "/admin/dashboard", "/login", "/analytics/overview"] {
            let result = svc
                .track_visit(visit(path, "1.1.1.1"))
                .await
                .expect("track");
            assert!(result.is_none(), "{path} must be skipped");
        }
        let kept = svc
            .track_visit(visit("/administrator", "1.1.1.1"))
            .await
            .expect("track");
        assert!(kept.is_some());
    }

    #[tokio::test]
    async fn dedup_window_is_sixty_minutes() {
        let svc = service(None);
        let t0 = at("2026-03-10T08:00:00Z");
        assert!(svc
            .track_visit_at(visit("/projects", "2.2.2.2"), t0)
            .await
            .expect("first")
            .is_some());
        assert!(svc
            .track_visit_at(visit("/projects", "2.2.2.2"), t0 + Duration::minutes(60))
            .await
            .expect("at boundary")
            .is_none());
        assert!(svc
            .track_visit_at(
                visit("/projects", "2.2.2.2"),
                t0 + Duration::minutes(60) + Duration::seconds(1)
            )
            .await
            .expect("after window")
            .is_some());
    }

    #[tokio::test]
    async fn accepted_visits_notify_realtime() {
        let notifier = Arc::new(RecordingNotifier::default());
        let svc = service(Some(notifier.clone()));

        svc.track_visit(visit("/projects", "3.3.3.3"))
            .await
            .expect("track")
            .expect("accepted");
        // Duplicate and admin visits stay silent.
        svc.track_visit(visit("/projects", "3.3.3.3"))
            .await
            .expect("track");
        svc.track_visit(visit("/admin", "3.3.3.3"))
            .await
            .expect("track");

        let activities = notifier.activities.lock().expect("lock");
        assert_eq!(activities.len(), 1);
        assert_eq!(activities[0].page, "/projects");
        assert_eq!(activities[0].activity_type, "visit");
        assert_eq!(*notifier.snapshots.lock().expect("lock"), 1);
    }

    #[tokio::test]
    async fn page_view_is_enriched_from_user_agent() {
        let svc = service(None);
        let client = ClientInfo {
            ip: Some("4.4.4.4".to_string()),
            user_agent: Some(
                "Mozilla/5.0 (iPad; CPU OS 17_0 like Mac OS X) Safari/604.1".to_string(),
            ),
        };
        let event = svc
            .track_page_view(
                PageView {
                    path: "/cv".to_string(),
                    duration: Some(12.5),
                    ..Default::default()
                },
                &client,
            )
            .await
            .expect("track")
            .expect("accepted");
        assert_eq!(event.device.as_deref(), Some("Tablet"));
        assert_eq!(event.os.as_deref(), Some("iOS"));
        assert_eq!(event.browser.as_deref(), Some("Safari"));
        assert_eq!(event.duration, Some(12.5));
        assert_eq!(event.country, None);
    }

    #[tokio::test]
    async fn interactions_fall_back_to_root_path() {
        let svc = service(None);
        let stored = svc
            .track_interaction(Interaction {
                action: "click".to_string(),
                metadata: Some(serde_json::json!({ "target": "github" })),
                ..Default::default()
            })
            .await
            .expect("track")
            .expect("stored");
        assert_eq!(stored.path, "/");
        assert_eq!(stored.metadata.as_deref(), Some(r#"{"target":"github"}"#));

        let skipped = svc
            .track_interaction(Interaction {
                action: "click".to_string(),
                path: Some("/admin/users".to_string()),
                ..Default::default()
            })
            .await
            .expect("track");
        assert!(skipped.is_none());
    }
}
