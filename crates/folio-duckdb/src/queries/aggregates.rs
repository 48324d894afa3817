use anyhow::Result;
use chrono::NaiveDate;

use folio_core::analytics::{round2, AggregateDay, AggregateTotals, TopPageRow};
use folio_core::period::DateRange;

use crate::DuckDbBackend;

fn day_bounds(range: &DateRange) -> (String, String) {
    (
        range.first_day.format("%Y-%m-%d").to_string(),
        range.last_day.format("%Y-%m-%d").to_string(),
    )
}

pub async fn aggregate_totals_inner(
    db: &DuckDbBackend,
    range: &DateRange,
) -> Result<AggregateTotals> {
    let conn = db.conn.lock().await;
    let (first, last) = day_bounds(range);

    // SUM over BIGINT yields HUGEINT in DuckDB; cast back for i64 reads.
    let totals = conn
        .prepare(
            r#"SELECT
                CAST(COALESCE(SUM(visitors), 0) AS BIGINT),
                CAST(COALESCE(SUM(page_views), 0) AS BIGINT),
                CAST(COALESCE(SUM(unique_visitors), 0) AS BIGINT),
                CAST(COALESCE(SUM(duration_sum), 0) AS DOUBLE),
                CAST(COALESCE(SUM(duration_count), 0) AS BIGINT),
                CAST(COALESCE(SUM(bounces), 0) AS BIGINT)
            FROM visit_aggregates
            WHERE date >= CAST(?1 AS DATE) AND date <= CAST(?2 AS DATE)"#,
        )?
        .query_row(duckdb::params![first, last], |row| {
            Ok(AggregateTotals {
                visitors: row.get(0)?,
                page_views: row.get(1)?,
                unique_visitors: row.get(2)?,
                duration_sum: row.get(3)?,
                duration_count: row.get(4)?,
                bounces: row.get(5)?,
            })
        })?;

    Ok(totals)
}

pub async fn daily_aggregates_inner(
    db: &DuckDbBackend,
    range: &DateRange,
) -> Result<Vec<AggregateDay>> {
    let conn = db.conn.lock().await;
    let (first, last) = day_bounds(range);

    let mut stmt = conn.prepare(
        r#"SELECT
            CAST(date AS VARCHAR),
            CAST(SUM(visitors) AS BIGINT),
            CAST(SUM(page_views) AS BIGINT)
        FROM visit_aggregates
        WHERE date >= CAST(?1 AS DATE) AND date <= CAST(?2 AS DATE)
        GROUP BY date
        ORDER BY date ASC"#,
    )?;
    let rows = stmt.query_map(duckdb::params![first, last], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, i64>(2)?,
        ))
    })?;

    let mut days = Vec::new();
    for row in rows {
        let (date, visitors, page_views) = row?;
        days.push(AggregateDay {
            date: NaiveDate::parse_from_str(&date, "%Y-%m-%d")?,
            visitors,
            page_views,
        });
    }
    Ok(days)
}

/// Pages ranked by page views across the range, one row per path.
pub async fn top_pages_inner(
    db: &DuckDbBackend,
    range: &DateRange,
    limit: i64,
) -> Result<Vec<TopPageRow>> {
    let conn = db.conn.lock().await;
    let (first, last) = day_bounds(range);

    let mut stmt = conn.prepare(
        r#"SELECT
            path,
            CAST(SUM(page_views) AS BIGINT) AS total_page_views,
            CAST(SUM(visitors) AS BIGINT),
            CAST(SUM(unique_visitors) AS BIGINT),
            CAST(SUM(duration_sum) AS DOUBLE),
            CAST(SUM(duration_count) AS BIGINT)
        FROM visit_aggregates
        WHERE date >= CAST(?1 AS DATE) AND date <= CAST(?2 AS DATE)
        GROUP BY path
        ORDER BY total_page_views DESC, path ASC
        LIMIT ?3"#,
    )?;
    let rows = stmt.query_map(duckdb::params![first, last, limit], |row| {
        let duration_sum: f64 = row.get(4)?;
        let duration_count: i64 = row.get(5)?;
        Ok(TopPageRow {
            path: row.get(0)?,
            page_views: row.get(1)?,
            visitors: row.get(2)?,
            unique_visitors: row.get(3)?,
            avg_duration: if duration_count == 0 {
                0.0
            } else {
                round2(duration_sum / duration_count as f64)
            },
        })
    })?;

    let mut pages = Vec::new();
    for row in rows {
        pages.push(row?);
    }
    Ok(pages)
}

impl DuckDbBackend {
    /// Raw `device_analytics` rows for one day, for diagnostics and tests.
    ///
    /// Returns `(device_type, browser, os, visitors, sessions)` tuples.
    pub async fn device_rows_for_day(
        &self,
        day: NaiveDate,
    ) -> Result<Vec<(String, String, String, i64, i64)>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT device_type, browser, os, visitors, sessions FROM device_analytics \
             WHERE date = CAST(?1 AS DATE) ORDER BY visitors DESC, device_type, browser, os",
        )?;
        let rows = stmt.query_map(duckdb::params![day.format("%Y-%m-%d").to_string()], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Raw `traffic_sources` rows for one day.
    ///
    /// Returns `(source, medium, campaign, visitors)` tuples.
    pub async fn traffic_source_rows_for_day(
        &self,
        day: NaiveDate,
    ) -> Result<Vec<(String, String, String, i64)>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT source, medium, campaign, visitors FROM traffic_sources \
             WHERE date = CAST(?1 AS DATE) ORDER BY visitors DESC, source",
        )?;
        let rows = stmt.query_map(duckdb::params![day.format("%Y-%m-%d").to_string()], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}
