use anyhow::Result;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use tracing::debug;

use folio_core::event::{NewInteraction, NewVisit, UserInteraction, VisitEvent};
use folio_core::visitor::classify_traffic_source;

use crate::backend::sql_timestamp;
use crate::DuckDbBackend;

/// Admit one visit: dedup lookup, event insert, and aggregate upserts.
///
/// Runs under a single acquisition of the connection lock and inside one
/// transaction. Two identical concurrent requests therefore cannot both pass
/// the lookup, and an aggregate failure rolls the event back with it.
pub(crate) async fn record_visit_inner(
    db: &DuckDbBackend,
    visit: &NewVisit,
    now: DateTime<Utc>,
    day: NaiveDate,
    dedup_window: Duration,
) -> Result<Option<VisitEvent>> {
    let mut conn = db.conn.lock().await;
    let tx = conn.transaction()?;

    let ip = visit.ip_address.as_deref().filter(|ip| !ip.is_empty());

    // An absent IP cannot be attributed, so every such visit counts.
    if let Some(ip) = ip {
        let cutoff = sql_timestamp(now - dedup_window);
        let recent: i64 = tx
            .prepare(
                "SELECT COUNT(*) FROM visit_events \
                 WHERE ip_address = ?1 AND path = ?2 AND created_at >= CAST(?3 AS TIMESTAMP)",
            )?
            .query_row(duckdb::params![ip, visit.path, cutoff], |row| row.get(0))?;
        if recent > 0 {
            debug!(path = %visit.path, "Duplicate visit inside dedup window");
            return Ok(None);
        }
    }

    let event = VisitEvent {
        id: uuid::Uuid::new_v4().to_string(),
        path: visit.path.clone(),
        ip_address: ip.map(str::to_string),
        user_agent: visit.user_agent.clone(),
        referer: visit.referer.clone(),
        country: visit.country.clone(),
        device: visit.device.clone(),
        browser: visit.browser.clone(),
        os: visit.os.clone(),
        session_id: visit.session_id.clone(),
        duration: visit.duration,
        is_unique: true,
        is_bounce: visit.is_bounce,
        timestamp: now,
    };

    tx.execute(
        r#"INSERT INTO visit_events (
            id, path, ip_address, user_agent, referer,
            country, device, browser, os,
            session_id, duration, is_unique, is_bounce,
            created_at
        ) VALUES (
            ?1,  ?2,  ?3,  ?4,  ?5,
            ?6,  ?7,  ?8,  ?9,
            ?10, ?11, ?12, ?13,
            CAST(?14 AS TIMESTAMP)
        )"#,
        duckdb::params![
            event.id,
            event.path,
            event.ip_address,
            event.user_agent,
            event.referer,
            event.country,
            event.device,
            event.browser,
            event.os,
            event.session_id,
            event.duration,
            event.is_unique,
            event.is_bounce,
            sql_timestamp(now),
        ],
    )?;

    let day_str = day.format("%Y-%m-%d").to_string();
    let sample = Sample::from_event(&event);

    upsert_visit_aggregate(&tx, &day_str, &event.path, &sample)?;

    if let Some(device) = event.device.as_deref() {
        let browser = event.browser.as_deref().unwrap_or("Unknown");
        let os = event.os.as_deref().unwrap_or("Unknown");
        upsert_device_analytics(&tx, &day_str, device, browser, os, &sample)?;
    }

    if let Some(referer) = event.referer.as_deref().filter(|r| !r.trim().is_empty()) {
        upsert_traffic_source(&tx, &day_str, Some(referer))?;
    }

    tx.commit()?;
    Ok(Some(event))
}

/// Contribution of one visit to the running sums of an aggregate row.
struct Sample {
    unique: i64,
    duration_sum: f64,
    duration_count: i64,
    bounce: i64,
}

impl Sample {
    fn from_event(event: &VisitEvent) -> Self {
        let duration = event.duration.filter(|d| d.is_finite() && *d >= 0.0);
        Self {
            unique: i64::from(event.is_unique),
            duration_sum: duration.unwrap_or(0.0),
            duration_count: i64::from(duration.is_some()),
            bounce: i64::from(event.is_bounce),
        }
    }
}

fn upsert_visit_aggregate(
    conn: &duckdb::Connection,
    day: &str,
    path: &str,
    sample: &Sample,
) -> Result<()> {
    conn.execute(
        r#"INSERT INTO visit_aggregates (
            date, path, visitors, page_views, unique_visitors,
            duration_sum, duration_count, bounces
        ) VALUES (CAST(?1 AS DATE), ?2, 1, 1, ?3, ?4, ?5, ?6)
        ON CONFLICT (date, path) DO UPDATE SET
            visitors        = visit_aggregates.visitors + 1,
            page_views      = visit_aggregates.page_views + 1,
            unique_visitors = visit_aggregates.unique_visitors + EXCLUDED.unique_visitors,
            duration_sum    = visit_aggregates.duration_sum + EXCLUDED.duration_sum,
            duration_count  = visit_aggregates.duration_count + EXCLUDED.duration_count,
            bounces         = visit_aggregates.bounces + EXCLUDED.bounces"#,
        duckdb::params![
            day,
            path,
            sample.unique,
            sample.duration_sum,
            sample.duration_count,
            sample.bounce,
        ],
    )?;
    Ok(())
}

fn upsert_device_analytics(
    conn: &duckdb::Connection,
    day: &str,
    device: &str,
    browser: &str,
    os: &str,
    sample: &Sample,
) -> Result<()> {
    conn.execute(
        r#"INSERT INTO device_analytics (
            date, device_type, browser, os, visitors, sessions,
            duration_sum, duration_count, bounces
        ) VALUES (CAST(?1 AS DATE), ?2, ?3, ?4, 1, 1, ?5, ?6, ?7)
        ON CONFLICT (date, device_type, browser, os) DO UPDATE SET
            visitors       = device_analytics.visitors + 1,
            sessions       = device_analytics.sessions + 1,
            duration_sum   = device_analytics.duration_sum + EXCLUDED.duration_sum,
            duration_count = device_analytics.duration_count + EXCLUDED.duration_count,
            bounces        = device_analytics.bounces + EXCLUDED.bounces"#,
        duckdb::params![
            day,
            device,
            browser,
            os,
            sample.duration_sum,
            sample.duration_count,
            sample.bounce,
        ],
    )?;
    Ok(())
}

fn upsert_traffic_source(conn: &duckdb::Connection, day: &str, referer: Option<&str>) -> Result<()> {
    let class = classify_traffic_source(referer);
    conn.execute(
        r#"INSERT INTO traffic_sources (date, source, medium, campaign, visitors, sessions)
        VALUES (CAST(?1 AS DATE), ?2, ?3, ?4, 1, 1)
        ON CONFLICT (date, source, medium, campaign) DO UPDATE SET
            visitors = traffic_sources.visitors + 1,
            sessions = traffic_sources.sessions + 1"#,
        duckdb::params![day, class.source, class.medium, class.campaign],
    )?;
    Ok(())
}

pub(crate) async fn record_interaction_inner(
    db: &DuckDbBackend,
    interaction: &NewInteraction,
    now: DateTime<Utc>,
) -> Result<UserInteraction> {
    let stored = UserInteraction {
        id: uuid::Uuid::new_v4().to_string(),
        session_id: interaction.session_id.clone(),
        path: interaction.path.clone(),
        action: interaction.action.clone(),
        element: interaction.element.clone(),
        value: interaction.value.clone(),
        metadata: interaction.metadata.clone(),
        timestamp: now,
    };

    let conn = db.conn.lock().await;
    conn.execute(
        r#"INSERT INTO user_interactions (
            id, session_id, path, action, element, value, metadata, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, CAST(?8 AS TIMESTAMP))"#,
        duckdb::params![
            stored.id,
            stored.session_id,
            stored.path,
            stored.action,
            stored.element,
            stored.value,
            stored.metadata,
            sql_timestamp(now),
        ],
    )?;
    Ok(stored)
}
