use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use folio_core::{
    analytics::AnalyticsStore,
    event::{NewInteraction, NewVisit},
    period::DateRange,
};
use folio_duckdb::DuckDbBackend;

fn at(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .expect("valid instant")
        .with_timezone(&Utc)
}

fn day_of(now: DateTime<Utc>) -> NaiveDate {
    now.date_naive()
}

fn visit(path: &str, ip: Option<&str>) -> NewVisit {
    NewVisit {
        path: path.to_string(),
        ip_address: ip.map(str::to_string),
        user_agent: Some("Mozilla/5.0 Chrome/120".to_string()),
        ..Default::default()
    }
}

fn window() -> Duration {
    Duration::minutes(60)
}

async fn store() -> Arc<dyn AnalyticsStore> {
    Arc::new(DuckDbBackend::open_in_memory().expect("in-memory DuckDB"))
}

#[tokio::test]
async fn test_duplicate_within_window_is_rejected() {
    let store = store().await;
    let t0 = at("2026-03-10T12:00:00Z");

    let first = store
        .record_visit(&visit("/projects", Some("1.2.3.4")), t0, day_of(t0), window())
        .await
        .expect("first visit");
    assert!(first.is_some());

    let t1 = t0 + Duration::minutes(59);
    let second = store
        .record_visit(&visit("/projects", Some("1.2.3.4")), t1, day_of(t1), window())
        .await
        .expect("second visit");
    assert!(second.is_none(), "same ip + path inside 60 minutes must be dropped");
}

#[tokio::test]
async fn test_visit_after_window_is_accepted() {
    let store = store().await;
    let t0 = at("2026-03-10T12:00:00Z");

    store
        .record_visit(&visit("/projects", Some("1.2.3.4")), t0, day_of(t0), window())
        .await
        .expect("first visit")
        .expect("accepted");

    let t1 = t0 + Duration::minutes(60) + Duration::seconds(1);
    let later = store
        .record_visit(&visit("/projects", Some("1.2.3.4")), t1, day_of(t1), window())
        .await
        .expect("later visit");
    assert!(later.is_some());
}

#[tokio::test]
async fn test_dedup_is_per_ip_and_path() {
    let store = store().await;
    let now = at("2026-03-10T12:00:00Z");
    let day = day_of(now);

    for (path, ip) in [
        ("/projects", "1.2.3.4"),
        ("/about", "1.2.3.4"),
        ("/projects", "5.6.7.8"),
    ] {
        let accepted = store
            .record_visit(&visit(path, Some(ip)), now, day, window())
            .await
            .expect("visit");
        assert!(accepted.is_some(), "{path} from {ip} should be unique");
    }
}

#[tokio::test]
async fn test_absent_ip_is_always_unique() {
    let store = store().await;
    let now = at("2026-03-10T12:00:00Z");

    for ip in [None, Some(""), None] {
        let accepted = store
            .record_visit(&visit("/projects", ip), now, day_of(now), window())
            .await
            .expect("visit");
        let event = accepted.expect("visit without ip is always recorded");
        assert!(event.is_unique);
        assert_eq!(event.ip_address, None);
        assert_eq!(event.timestamp, now);
    }
}

#[tokio::test]
async fn test_n_visits_same_day_aggregate_counts() {
    let store = store().await;
    let now = at("2026-03-10T12:00:00Z");
    let day = day_of(now);

    for i in 0..5 {
        let ip = format!("10.0.0.{i}");
        store
            .record_visit(&visit("/blog", Some(&ip)), now, day, window())
            .await
            .expect("visit")
            .expect("accepted");
    }

    let range = DateRange::from_days(day, day, Tz::UTC).expect("range");
    let totals = store.aggregate_totals(&range).await.expect("totals");
    assert_eq!(totals.visitors, 5);
    assert_eq!(totals.page_views, 5);
    assert_eq!(totals.unique_visitors, 5);
}

#[tokio::test]
async fn test_duration_and_bounce_are_running_sums() {
    let store = store().await;
    let now = at("2026-03-10T12:00:00Z");
    let day = day_of(now);

    for (duration, bounce) in [(Some(10.0), false), (Some(30.0), true), (None, false)] {
        let mut v = visit("/cv", None);
        v.duration = duration;
        v.is_bounce = bounce;
        store
            .record_visit(&v, now, day, window())
            .await
            .expect("visit")
            .expect("accepted");
    }

    let range = DateRange::from_days(day, day, Tz::UTC).expect("range");
    let totals = store.aggregate_totals(&range).await.expect("totals");
    assert_eq!(totals.duration_count, 2);
    assert_eq!(totals.avg_duration(), 20.0);
    assert_eq!(totals.bounces, 1);
    assert_eq!(totals.bounce_rate(), 33.33);
}

#[tokio::test]
async fn test_device_and_source_aggregates_upsert() {
    let db = Arc::new(DuckDbBackend::open_in_memory().expect("in-memory DuckDB"));
    let store: Arc<dyn AnalyticsStore> = db.clone();
    let now = at("2026-03-10T12:00:00Z");
    let day = day_of(now);

    for i in 0..3 {
        let mut v = visit("/", Some(&format!("10.0.1.{i}")));
        v.device = Some("Mobile".to_string());
        v.browser = Some("Chrome".to_string());
        v.os = Some("Android".to_string());
        v.referer = Some("https://www.google.com/search?q=portfolio".to_string());
        store
            .record_visit(&v, now, day, window())
            .await
            .expect("visit")
            .expect("accepted");
    }
    // No device and no referer: neither table is touched.
    store
        .record_visit(&visit("/", Some("10.0.1.9")), now, day, window())
        .await
        .expect("visit")
        .expect("accepted");

    let devices = db.device_rows_for_day(day).await.expect("device rows");
    assert_eq!(
        devices,
        vec![(
            "Mobile".to_string(),
            "Chrome".to_string(),
            "Android".to_string(),
            3,
            3
        )]
    );

    let sources = db.traffic_source_rows_for_day(day).await.expect("source rows");
    assert_eq!(
        sources,
        vec![(
            "Google".to_string(),
            "organic".to_string(),
            "google-search".to_string(),
            3
        )]
    );
}

#[tokio::test]
async fn test_aggregates_are_keyed_by_day() {
    let store = store().await;
    let day1 = at("2026-03-09T23:30:00Z");
    let day2 = at("2026-03-10T00:30:00Z");

    store
        .record_visit(&visit("/", None), day1, day_of(day1), window())
        .await
        .expect("visit");
    store
        .record_visit(&visit("/", None), day2, day_of(day2), window())
        .await
        .expect("visit");

    let range = DateRange::from_days(day_of(day1), day_of(day2), Tz::UTC).expect("range");
    let days = store.daily_aggregates(&range).await.expect("days");
    assert_eq!(days.len(), 2);
    assert_eq!(days[0].date, day_of(day1));
    assert_eq!(days[1].page_views, 1);
}

#[tokio::test]
async fn test_interactions_are_never_deduplicated() {
    let db = Arc::new(DuckDbBackend::open_in_memory().expect("in-memory DuckDB"));
    let store: Arc<dyn AnalyticsStore> = db.clone();
    let now = at("2026-03-10T12:00:00Z");

    let click = NewInteraction {
        session_id: Some("sess_1".to_string()),
        path: "/projects".to_string(),
        action: "click".to_string(),
        element: Some("github-link".to_string()),
        value: None,
        metadata: Some(r#"{"project":"folio"}"#.to_string()),
    };
    let a = store.record_interaction(&click, now).await.expect("first");
    let b = store.record_interaction(&click, now).await.expect("second");
    assert_ne!(a.id, b.id);

    let conn = db.conn_for_test().await;
    let count: i64 = conn
        .prepare("SELECT COUNT(*) FROM user_interactions")
        .expect("prepare")
        .query_row([], |row| row.get(0))
        .expect("count");
    assert_eq!(count, 2);
    let visits: i64 = conn
        .prepare("SELECT COUNT(*) FROM visit_events")
        .expect("prepare")
        .query_row([], |row| row.get(0))
        .expect("count");
    assert_eq!(visits, 0, "interactions never create visits");
}

#[tokio::test]
async fn test_concurrent_identical_visits_admit_once() {
    let store = store().await;
    let now = at("2026-03-10T12:00:00Z");
    let day = day_of(now);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            store
                .record_visit(&visit("/projects", Some("9.9.9.9")), now, day, window())
                .await
                .expect("visit")
                .is_some()
        }));
    }
    let mut admitted = 0;
    for handle in handles {
        if handle.await.expect("join") {
            admitted += 1;
        }
    }
    assert_eq!(admitted, 1);
}

#[tokio::test]
async fn test_jwt_secret_is_generated_once() {
    let db = DuckDbBackend::open_in_memory().expect("in-memory DuckDB");
    assert_eq!(db.get_setting("jwt_secret").await.expect("get"), None);
    let first = db.ensure_jwt_secret().await.expect("secret");
    let second = db.ensure_jwt_secret().await.expect("secret");
    assert_eq!(first.len(), 64);
    assert_eq!(first, second);
}
