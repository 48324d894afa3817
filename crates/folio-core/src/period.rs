//! Named reporting periods and their resolution to concrete date ranges.

use chrono::{DateTime, Datelike, Days, Duration, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Period {
    Today,
    Yesterday,
    Last7Days,
    #[default]
    Last30Days,
    Last90Days,
    ThisMonth,
    LastMonth,
    ThisYear,
    Custom,
}

impl Period {
    /// Parse the `period` query parameter. Absent or empty means the default
    /// (`last30days`).
    pub fn parse(raw: Option<&str>) -> Result<Self, CoreError> {
        let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
            return Ok(Self::default());
        };
        let normalized: String = raw
            .chars()
            .filter(|c| !matches!(c, '_' | '-'))
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "today" => Ok(Self::Today),
            "yesterday" => Ok(Self::Yesterday),
            "last7days" | "7d" => Ok(Self::Last7Days),
            "last30days" | "30d" => Ok(Self::Last30Days),
            "last90days" | "90d" => Ok(Self::Last90Days),
            "thismonth" => Ok(Self::ThisMonth),
            "lastmonth" => Ok(Self::LastMonth),
            "thisyear" => Ok(Self::ThisYear),
            "custom" => Ok(Self::Custom),
            _ => Err(CoreError::UnknownPeriod(raw.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Today => "today",
            Self::Yesterday => "yesterday",
            Self::Last7Days => "last7days",
            Self::Last30Days => "last30days",
            Self::Last90Days => "last90days",
            Self::ThisMonth => "thisMonth",
            Self::LastMonth => "lastMonth",
            Self::ThisYear => "thisYear",
            Self::Custom => "custom",
        }
    }
}

/// An inclusive reporting range.
///
/// `start`/`until` bound raw visit timestamps as the half-open interval
/// `[start, until)`; `first_day`/`last_day` bound the daily aggregate rows.
/// Both describe the same calendar days in `timezone`. `end` is the last
/// representable microsecond before `until`, for display.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(skip_serializing)]
    pub until: DateTime<Utc>,
    pub first_day: NaiveDate,
    pub last_day: NaiveDate,
    #[serde(skip_serializing)]
    pub timezone: Tz,
}

impl DateRange {
    /// Build the range covering whole days `first_day..=last_day` in `tz`.
    ///
    /// Days outside [`min_day`]`..=`[`max_day`] are rejected.
    pub fn from_days(
        first_day: NaiveDate,
        last_day: NaiveDate,
        tz: Tz,
    ) -> Result<Self, CoreError> {
        if first_day < min_day() || last_day > max_day() {
            return Err(CoreError::RangeOutOfBounds);
        }
        let next_day = last_day
            .checked_add_days(Days::new(1))
            .ok_or(CoreError::RangeOutOfBounds)?;
        let start = local_midnight(first_day, tz);
        let until = local_midnight(next_day, tz);
        Ok(Self {
            start,
            end: until - Duration::microseconds(1),
            until,
            first_day,
            last_day,
            timezone: tz,
        })
    }

    pub fn num_days(&self) -> i64 {
        (self.last_day - self.first_day).num_days() + 1
    }

    /// The equal-length range ending the day before this one starts.
    ///
    /// Fails when that range would begin before [`min_day`].
    pub fn previous(&self) -> Result<Self, CoreError> {
        let last = self
            .first_day
            .checked_sub_days(Days::new(1))
            .ok_or(CoreError::RangeOutOfBounds)?;
        let span =
            u64::try_from(self.num_days() - 1).map_err(|_| CoreError::RangeOutOfBounds)?;
        let first = last
            .checked_sub_days(Days::new(span))
            .ok_or(CoreError::RangeOutOfBounds)?;
        Self::from_days(first, last, self.timezone)
    }
}

/// 0001-01-01.
pub fn min_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(1, 1, 1).unwrap_or(NaiveDate::MIN)
}

/// 9999-12-31.
pub fn max_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(9999, 12, 31).unwrap_or(NaiveDate::MAX)
}

/// The calendar day of `instant` in `tz`.
pub fn local_day(instant: DateTime<Utc>, tz: Tz) -> NaiveDate {
    instant.with_timezone(&tz).date_naive()
}

/// Start of `day` in `tz`, as a UTC instant.
///
/// Zones that skip midnight on a DST switch fall back to the UTC midnight.
fn local_midnight(day: NaiveDate, tz: Tz) -> DateTime<Utc> {
    let naive = day.and_hms_opt(0, 0, 0).unwrap_or_default();
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| naive.and_utc())
}

/// Resolve a period (plus optional custom bounds) against `now` in `tz`.
pub fn resolve_period(
    period: Period,
    start_date: Option<&str>,
    end_date: Option<&str>,
    now: DateTime<Utc>,
    tz: Tz,
) -> Result<DateRange, CoreError> {
    let today = local_day(now, tz);
    let (first, last) = match period {
        Period::Today => (today, today),
        Period::Yesterday => {
            let yesterday = today - Duration::days(1);
            (yesterday, yesterday)
        }
        Period::Last7Days => (today - Duration::days(6), today),
        Period::Last30Days => (today - Duration::days(29), today),
        Period::Last90Days => (today - Duration::days(89), today),
        Period::ThisMonth => (today.with_day(1).unwrap_or(today), today),
        Period::LastMonth => {
            let first_of_this = today.with_day(1).unwrap_or(today);
            let last_of_prev = first_of_this - Duration::days(1);
            (last_of_prev.with_day(1).unwrap_or(last_of_prev), last_of_prev)
        }
        Period::ThisYear => (
            NaiveDate::from_ymd_opt(today.year(), 1, 1).unwrap_or(today),
            today,
        ),
        Period::Custom => {
            let (Some(start_raw), Some(end_raw)) = (
                start_date.filter(|s| !s.trim().is_empty()),
                end_date.filter(|s| !s.trim().is_empty()),
            ) else {
                return Err(CoreError::MissingCustomBounds);
            };
            let first = parse_day(start_raw, "startDate", tz)?;
            let last = parse_day(end_raw, "endDate", tz)?;
            if last < first {
                return Err(CoreError::ReversedRange);
            }
            (first, last)
        }
    };
    DateRange::from_days(first, last, tz)
}

/// Accept `YYYY-MM-DD` or an RFC 3339 instant (mapped to its day in `tz`).
fn parse_day(raw: &str, field: &'static str, tz: Tz) -> Result<NaiveDate, CoreError> {
    let raw = raw.trim();
    let day = match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        Ok(day) => day,
        Err(_) => DateTime::parse_from_rfc3339(raw)
            .map(|dt| local_day(dt.with_timezone(&Utc), tz))
            .map_err(|_| CoreError::InvalidDate { field })?,
    };
    if day < min_day() || day > max_day() {
        return Err(CoreError::InvalidDate { field });
    }
    Ok(day)
}
