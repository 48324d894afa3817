//! Analytics storage abstraction and report shapes.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::Serialize;

use crate::error::CoreError;
use crate::event::{NewInteraction, NewVisit, UserInteraction, VisitEvent};
use crate::period::DateRange;
use crate::visitor::classify_traffic_source;

pub const DEFAULT_TOP_PAGES_LIMIT: i64 = 10;
pub const MAX_TOP_PAGES_LIMIT: i64 = 100;

/// Raw sums over the daily `visit_aggregates` rows of a range.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateTotals {
    pub visitors: i64,
    pub page_views: i64,
    pub unique_visitors: i64,
    pub duration_sum: f64,
    pub duration_count: i64,
    pub bounces: i64,
}

impl AggregateTotals {
    /// Mean of every reported duration sample, 0 when none were reported.
    pub fn avg_duration(&self) -> f64 {
        if self.duration_count == 0 {
            0.0
        } else {
            round2(self.duration_sum / self.duration_count as f64)
        }
    }

    /// Share of page views flagged as bounces, 0–100.
    pub fn bounce_rate(&self) -> f64 {
        percentage(self.bounces, self.page_views)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Growth {
    pub visitors: f64,
    pub page_views: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverviewResult {
    pub total_visitors: i64,
    pub total_page_views: i64,
    pub unique_visitors: i64,
    pub avg_duration: f64,
    pub bounce_rate: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub growth: Option<Growth>,
}

impl OverviewResult {
    pub fn from_totals(current: &AggregateTotals, previous: Option<&AggregateTotals>) -> Self {
        Self {
            total_visitors: current.visitors,
            total_page_views: current.page_views,
            unique_visitors: current.unique_visitors,
            avg_duration: current.avg_duration(),
            bounce_rate: current.bounce_rate(),
            growth: previous.map(|prev| Growth {
                visitors: calculate_growth(current.visitors, prev.visitors),
                page_views: calculate_growth(current.page_views, prev.page_views),
            }),
        }
    }
}

/// Percent change from `previous` to `current`.
///
/// `(0, 0)` is 0% and any rise from 0 is 100%.
pub fn calculate_growth(current: i64, previous: i64) -> f64 {
    if previous == 0 {
        return if current > 0 { 100.0 } else { 0.0 };
    }
    round2((current - previous) as f64 / previous as f64 * 100.0)
}

/// One `visit_aggregates` day, summed across paths.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateDay {
    pub date: NaiveDate,
    pub visitors: i64,
    pub page_views: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GroupBy {
    #[default]
    Day,
    Week,
    Month,
}

impl GroupBy {
    pub fn parse(raw: Option<&str>) -> Result<Self, CoreError> {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            None | Some("") | Some("day") => Ok(Self::Day),
            Some("week") => Ok(Self::Week),
            Some("month") => Ok(Self::Month),
            Some(_) => Err(CoreError::InvalidGroupBy),
        }
    }

    /// Bucket key for `date`: the day itself, the Sunday starting its week,
    /// or `YYYY-MM`.
    pub fn bucket_key(&self, date: NaiveDate) -> String {
        match self {
            Self::Day => date.format("%Y-%m-%d").to_string(),
            Self::Week => {
                let offset = date.weekday().num_days_from_sunday() as i64;
                (date - Duration::days(offset)).format("%Y-%m-%d").to_string()
            }
            Self::Month => format!("{:04}-{:02}", date.year(), date.month()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GrowthPoint {
    pub period: String,
    pub visitors: i64,
    pub page_views: i64,
}

/// Sum date-ascending `days` into buckets, in first-seen order.
pub fn group_traffic(days: &[AggregateDay], group_by: GroupBy) -> Vec<GrowthPoint> {
    let mut series: Vec<GrowthPoint> = Vec::new();
    for day in days {
        let key = group_by.bucket_key(day.date);
        match series.iter_mut().find(|p| p.period == key) {
            Some(point) => {
                point.visitors += day.visitors;
                point.page_views += day.page_views;
            }
            None => series.push(GrowthPoint {
                period: key,
                visitors: day.visitors,
                page_views: day.page_views,
            }),
        }
    }
    series
}

/// Visit-event column a breakdown report groups by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakdownDimension {
    Device,
    Browser,
    Os,
}

impl BreakdownDimension {
    pub fn column(&self) -> &'static str {
        match self {
            Self::Device => "device",
            Self::Browser => "browser",
            Self::Os => "os",
        }
    }
}

/// Visit count for one distinct value of a dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueCount {
    pub value: Option<String>,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakdownRow {
    pub name: String,
    pub count: i64,
    pub percentage: f64,
}

/// Turn raw per-value counts into a breakdown, merging NULLs into `Unknown`.
/// Rows are ordered by count descending, then name.
pub fn breakdown_rows(counts: &[ValueCount]) -> Vec<BreakdownRow> {
    let mut merged: Vec<(String, i64)> = Vec::new();
    for c in counts {
        let name = c
            .value
            .as_deref()
            .filter(|v| !v.is_empty())
            .unwrap_or("Unknown");
        match merged.iter_mut().find(|(n, _)| n == name) {
            Some((_, count)) => *count += c.count,
            None => merged.push((name.to_string(), c.count)),
        }
    }
    let total: i64 = merged.iter().map(|(_, c)| c).sum();
    let mut rows: Vec<BreakdownRow> = merged
        .into_iter()
        .map(|(name, count)| BreakdownRow {
            percentage: percentage(count, total),
            name,
            count,
        })
        .collect();
    rows.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
    rows
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrafficSourceRow {
    pub source: String,
    pub medium: String,
    pub visitors: i64,
    pub percentage: f64,
}

/// Classify raw referer groups and merge them by source.
pub fn traffic_source_rows(referers: &[ValueCount]) -> Vec<TrafficSourceRow> {
    let mut merged: Vec<TrafficSourceRow> = Vec::new();
    for group in referers {
        let class = classify_traffic_source(group.value.as_deref());
        match merged.iter_mut().find(|r| r.source == class.source) {
            Some(row) => row.visitors += group.count,
            None => merged.push(TrafficSourceRow {
                source: class.source.to_string(),
                medium: class.medium.to_string(),
                visitors: group.count,
                percentage: 0.0,
            }),
        }
    }
    let total: i64 = merged.iter().map(|r| r.visitors).sum();
    for row in &mut merged {
        row.percentage = percentage(row.visitors, total);
    }
    merged.sort_by(|a, b| {
        b.visitors
            .cmp(&a.visitors)
            .then_with(|| a.source.cmp(&b.source))
    });
    merged
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopPageRow {
    pub path: String,
    pub page_views: i64,
    pub visitors: i64,
    pub unique_visitors: i64,
    pub avg_duration: f64,
}

/// Everything the dashboard shows for one range, computed in one pass.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComprehensiveSnapshot {
    pub period: DateRange,
    pub overview: OverviewResult,
    pub traffic_growth: Vec<GrowthPoint>,
    pub devices: Vec<BreakdownRow>,
    pub browsers: Vec<BreakdownRow>,
    pub operating_systems: Vec<BreakdownRow>,
    pub traffic_sources: Vec<TrafficSourceRow>,
    pub top_pages: Vec<TopPageRow>,
    pub contact_submissions: i64,
    pub cv_downloads: i64,
    pub generated_at: DateTime<Utc>,
}

/// `count / total` as a percentage rounded to 2 decimals; 0 when `total` is 0.
pub fn percentage(count: i64, total: i64) -> f64 {
    if total == 0 {
        0.0
    } else {
        round2(count as f64 / total as f64 * 100.0)
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[async_trait::async_trait]
pub trait AnalyticsStore: Send + Sync + 'static {
    /// Admit and persist one visit.
    ///
    /// Returns `Ok(None)` when a visit with the same non-empty IP and path was
    /// recorded within `dedup_window` before `now`. On admission the event and
    /// every aggregate it touches (keyed by `day`) are written atomically.
    async fn record_visit(
        &self,
        visit: &NewVisit,
        now: DateTime<Utc>,
        day: NaiveDate,
        dedup_window: Duration,
    ) -> anyhow::Result<Option<VisitEvent>>;

    async fn record_interaction(
        &self,
        interaction: &NewInteraction,
        now: DateTime<Utc>,
    ) -> anyhow::Result<UserInteraction>;

    async fn aggregate_totals(&self, range: &DateRange) -> anyhow::Result<AggregateTotals>;

    /// Per-day sums over `visit_aggregates`, date ascending.
    async fn daily_aggregates(&self, range: &DateRange) -> anyhow::Result<Vec<AggregateDay>>;

    async fn count_visits_by(
        &self,
        range: &DateRange,
        dimension: BreakdownDimension,
    ) -> anyhow::Result<Vec<ValueCount>>;

    /// Visit counts grouped by raw referer (NULL for direct visits).
    async fn count_visits_by_referer(&self, range: &DateRange) -> anyhow::Result<Vec<ValueCount>>;

    async fn top_pages(&self, range: &DateRange, limit: i64) -> anyhow::Result<Vec<TopPageRow>>;

    async fn count_contact_submissions(&self, range: &DateRange) -> anyhow::Result<i64>;

    async fn count_cv_downloads(&self, range: &DateRange) -> anyhow::Result<i64>;

    async fn ping(&self) -> anyhow::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn growth_edge_cases() {
        assert_eq!(calculate_growth(0, 0), 0.0);
        assert_eq!(calculate_growth(5, 0), 100.0);
        assert_eq!(calculate_growth(150, 100), 50.0);
        assert_eq!(calculate_growth(50, 100), -50.0);
        assert_eq!(calculate_growth(1, 3), -66.67);
    }

    #[test]
    fn week_buckets_start_on_sunday() {
        // 2026-03-04 is a Wednesday; its week starts Sunday 2026-03-01.
        assert_eq!(GroupBy::Week.bucket_key(day(2026, 3, 4)), "2026-03-01");
        assert_eq!(GroupBy::Week.bucket_key(day(2026, 3, 1)), "2026-03-01");
        assert_eq!(GroupBy::Month.bucket_key(day(2026, 3, 4)), "2026-03");
        assert_eq!(GroupBy::Day.bucket_key(day(2026, 3, 4)), "2026-03-04");
    }

    #[test]
    fn group_traffic_sums_buckets_in_order() {
        let days = vec![
            AggregateDay {
                date: day(2026, 2, 27),
                visitors: 1,
                page_views: 2,
            },
            AggregateDay {
                date: day(2026, 3, 1),
                visitors: 3,
                page_views: 4,
            },
            AggregateDay {
                date: day(2026, 3, 2),
                visitors: 5,
                page_views: 6,
            },
        ];
        let by_month = group_traffic(&days, GroupBy::Month);
        assert_eq!(by_month.len(), 2);
        assert_eq!(by_month[0].period, "2026-02");
        assert_eq!(by_month[1].visitors, 8);
        assert_eq!(by_month[1].page_views, 10);

        let by_week = group_traffic(&days, GroupBy::Week);
        assert_eq!(by_week[0].period, "2026-02-22");
        assert_eq!(by_week[1].period, "2026-03-01");
    }

    #[test]
    fn group_by_parse_rejects_unknown() {
        assert_eq!(GroupBy::parse(None).expect("default"), GroupBy::Day);
        assert_eq!(GroupBy::parse(Some("WEEK")).expect("week"), GroupBy::Week);
        assert_eq!(GroupBy::parse(Some("year")), Err(CoreError::InvalidGroupBy));
    }

    #[test]
    fn breakdown_merges_nulls_and_computes_percentages() {
        let rows = breakdown_rows(&[
            ValueCount {
                value: Some("Desktop".to_string()),
                count: 3,
            },
            ValueCount {
                value: None,
                count: 1,
            },
            ValueCount {
                value: Some(String::new()),
                count: 1,
            },
            ValueCount {
                value: Some("Mobile".to_string()),
                count: 3,
            },
        ]);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].name, "Desktop");
        assert_eq!(rows[0].percentage, 37.5);
        assert_eq!(rows[2].name, "Unknown");
        assert_eq!(rows[2].count, 2);
        assert_eq!(rows[2].percentage, 25.0);
    }

    #[test]
    fn traffic_sources_merge_by_classified_source() {
        let rows = traffic_source_rows(&[
            ValueCount {
                value: Some("https://www.google.com/search".to_string()),
                count: 2,
            },
            ValueCount {
                value: Some("https://google.com/".to_string()),
                count: 2,
            },
            ValueCount {
                value: None,
                count: 4,
            },
            ValueCount {
                value: Some("https://unknown-blog.example".to_string()),
                count: 2,
            },
        ]);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].visitors, 4);
        assert_eq!(rows[0].source, "Direct");
        assert_eq!(rows[1].source, "Google");
        assert_eq!(rows[1].percentage, 40.0);
        assert_eq!(rows[2].source, "Referral");
    }

    #[test]
    fn overview_uses_running_averages() {
        let totals = AggregateTotals {
            visitors: 4,
            page_views: 4,
            unique_visitors: 4,
            duration_sum: 30.0,
            duration_count: 3,
            bounces: 1,
        };
        let prev = AggregateTotals {
            visitors: 2,
            page_views: 0,
            ..Default::default()
        };
        let overview = OverviewResult::from_totals(&totals, Some(&prev));
        assert_eq!(overview.avg_duration, 10.0);
        assert_eq!(overview.bounce_rate, 25.0);
        let growth = overview.growth.expect("growth");
        assert_eq!(growth.visitors, 100.0);
        assert_eq!(growth.page_views, 100.0);
    }
}
