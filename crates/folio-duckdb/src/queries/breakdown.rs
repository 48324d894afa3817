use anyhow::Result;

use folio_core::analytics::{BreakdownDimension, ValueCount};
use folio_core::period::DateRange;

use crate::backend::sql_timestamp;
use crate::DuckDbBackend;

/// Count visits in the range per distinct value of `column`.
///
/// `column` must come from a fixed allowlist; it is interpolated into SQL.
async fn count_visits_grouped(
    db: &DuckDbBackend,
    range: &DateRange,
    column: &'static str,
) -> Result<Vec<ValueCount>> {
    let conn = db.conn.lock().await;

    let sql = format!(
        r#"SELECT {column}, COUNT(*) AS visits
        FROM visit_events
        WHERE created_at >= CAST(?1 AS TIMESTAMP)
          AND created_at < CAST(?2 AS TIMESTAMP)
        GROUP BY {column}
        ORDER BY visits DESC"#
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        duckdb::params![sql_timestamp(range.start), sql_timestamp(range.until)],
        |row| {
            Ok(ValueCount {
                value: row.get(0)?,
                count: row.get(1)?,
            })
        },
    )?;

    let mut counts = Vec::new();
    for row in rows {
        counts.push(row?);
    }
    Ok(counts)
}

pub async fn count_visits_by_inner(
    db: &DuckDbBackend,
    range: &DateRange,
    dimension: BreakdownDimension,
) -> Result<Vec<ValueCount>> {
    count_visits_grouped(db, range, dimension.column()).await
}

pub async fn count_visits_by_referer_inner(
    db: &DuckDbBackend,
    range: &DateRange,
) -> Result<Vec<ValueCount>> {
    count_visits_grouped(db, range, "referer").await
}
