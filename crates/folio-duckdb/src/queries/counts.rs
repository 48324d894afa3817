use anyhow::Result;

use folio_core::period::DateRange;

use crate::backend::sql_timestamp;
use crate::DuckDbBackend;

pub async fn count_contact_submissions_inner(db: &DuckDbBackend, range: &DateRange) -> Result<i64> {
    let conn = db.conn.lock().await;
    let count: i64 = conn
        .prepare(
            "SELECT COUNT(*) FROM contacts \
             WHERE created_at >= CAST(?1 AS TIMESTAMP) AND created_at < CAST(?2 AS TIMESTAMP)",
        )?
        .query_row(
            duckdb::params![sql_timestamp(range.start), sql_timestamp(range.until)],
            |row| row.get(0),
        )?;
    Ok(count)
}

/// Downloads whose element or value names a CV: `cv`, `resume`, or a PDF.
pub async fn count_cv_downloads_inner(db: &DuckDbBackend, range: &DateRange) -> Result<i64> {
    let conn = db.conn.lock().await;
    let count: i64 = conn
        .prepare(
            r#"SELECT COUNT(*) FROM user_interactions
            WHERE action = 'download'
              AND created_at >= CAST(?1 AS TIMESTAMP)
              AND created_at < CAST(?2 AS TIMESTAMP)
              AND (
                  lower(COALESCE(element, '')) LIKE '%cv%'
                  OR lower(COALESCE(element, '')) LIKE '%resume%'
                  OR lower(COALESCE(element, '')) LIKE '%.pdf%'
                  OR lower(COALESCE(value, '')) LIKE '%cv%'
                  OR lower(COALESCE(value, '')) LIKE '%resume%'
                  OR lower(COALESCE(value, '')) LIKE '%.pdf%'
              )"#,
        )?
        .query_row(
            duckdb::params![sql_timestamp(range.start), sql_timestamp(range.until)],
            |row| row.get(0),
        )?;
    Ok(count)
}
