use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex;

use folio_core::{analytics::AnalyticsStore, config::Config};
use folio_duckdb::DuckDbBackend;

use crate::geo::GeoLookup;
use crate::ingest::{IngestionService, RealtimeNotifier};
use crate::realtime::RealtimeHub;

/// Requests per IP per minute on the public tracking endpoints.
pub const TRACK_RATE_LIMIT: usize = 120;

/// Shared application state injected into every Axum handler via
/// [`axum::extract::State`].
pub struct AppState {
    /// The DuckDB backend, kept concrete for health checks and settings.
    pub db: Arc<DuckDbBackend>,

    /// Same backend behind the storage trait used by ingestion and reports.
    pub store: Arc<dyn AnalyticsStore>,

    /// Parsed configuration, loaded once at startup from environment variables.
    pub config: Arc<Config>,

    pub ingestion: IngestionService,

    pub realtime: Arc<RealtimeHub>,

    /// Per-IP sliding-window rate limiter for the tracking endpoints.
    ///
    /// Key: IP address string. Value: deque of request timestamps within the
    /// last 60 seconds.
    rate_limiter: Arc<Mutex<HashMap<String, VecDeque<Instant>>>>,
}

impl AppState {
    /// Wire the backend, realtime hub, and ingestion service together.
    ///
    /// The hub is handed to ingestion as its notifier here and nowhere else.
    pub fn new(db: DuckDbBackend, config: Config) -> Self {
        let db = Arc::new(db);
        let store: Arc<dyn AnalyticsStore> = db.clone();
        let realtime = Arc::new(RealtimeHub::new());
        let notifier: Arc<dyn RealtimeNotifier> = realtime.clone();
        let geo = Arc::new(GeoLookup::open(&config.geoip_path));
        let ingestion = IngestionService::new(Arc::clone(&store), Some(notifier), geo, &config);

        Self {
            db,
            store,
            config: Arc::new(config),
            ingestion,
            realtime,
            rate_limiter: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Secret used to verify dashboard tokens. `None` until one is configured
    /// or generated at startup.
    pub fn jwt_secret(&self) -> Option<&str> {
        self.config.jwt_secret.as_deref()
    }

    /// Check whether `ip` is within the per-minute tracking limit.
    ///
    /// Returns `true` if the request should proceed, `false` if it should be
    /// rejected with 429. Slides the window on every call.
    pub async fn check_rate_limit(&self, ip: &str) -> bool {
        if self.config.rate_limit_disable {
            return true;
        }
        let mut map = self.rate_limiter.lock().await;
        let now = Instant::now();
        let window = map.entry(ip.to_string()).or_default();
        while window
            .front()
            .is_some_and(|t| now.duration_since(*t).as_secs() >= 60)
        {
            window.pop_front();
        }
        if window.len() >= TRACK_RATE_LIMIT {
            return false;
        }
        window.push_back(now);
        true
    }

    /// Background loop: drop rate-limit entries for IPs idle over a minute.
    pub async fn run_rate_limit_sweep_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(300));
        loop {
            ticker.tick().await;
            let mut map = self.rate_limiter.lock().await;
            map.retain(|_, window| {
                window
                    .back()
                    .is_some_and(|t| t.elapsed().as_secs() < 60)
            });
        }
    }
}
