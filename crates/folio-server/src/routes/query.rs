use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Deserialize;

use folio_core::{
    analytics::GroupBy,
    period::{resolve_period, DateRange, Period},
};

use crate::error::AppError;

/// Query string shared by every report endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportQuery {
    pub period: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub group_by: Option<String>,
    pub limit: Option<i64>,
    /// Overview only: include growth against the preceding range.
    pub compare: Option<bool>,
}

impl ReportQuery {
    pub fn date_range(&self, tz: Tz) -> Result<DateRange, AppError> {
        self.date_range_at(Utc::now(), tz)
    }

    pub fn date_range_at(&self, now: DateTime<Utc>, tz: Tz) -> Result<DateRange, AppError> {
        let period = Period::parse(self.period.as_deref())?;
        Ok(resolve_period(
            period,
            self.start_date.as_deref(),
            self.end_date.as_deref(),
            now,
            tz,
        )?)
    }

    pub fn group_by(&self) -> Result<GroupBy, AppError> {
        Ok(GroupBy::parse(self.group_by.as_deref())?)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-10T12:00:00Z")
            .expect("valid instant")
            .with_timezone(&Utc)
    }

    #[test]
    fn custom_without_bounds_is_bad_request() {
        let q = ReportQuery {
            period: Some("custom".to_string()),
            start_date: Some("2026-03-01".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            q.date_range_at(now(), Tz::UTC),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn custom_with_bounds_resolves() {
        let q = ReportQuery {
            period: Some("custom".to_string()),
            start_date: Some("2026-03-01".to_string()),
            end_date: Some("2026-03-05".to_string()),
            ..Default::default()
        };
        let range = q.date_range_at(now(), Tz::UTC).expect("range");
        assert_eq!(range.first_day, NaiveDate::from_ymd_opt(2026, 3, 1).expect("date"));
        assert_eq!(range.num_days(), 5);
    }

    #[test]
    fn unknown_group_by_is_bad_request() {
        let q = ReportQuery {
            group_by: Some("hour".to_string()),
            ..Default::default()
        };
        assert!(matches!(q.group_by(), Err(AppError::BadRequest(_))));
    }
}
