//! Read-only report assembly over an [`AnalyticsStore`].
//!
//! Every function performs storage reads only. The comprehensive snapshot is
//! shared by the HTTP report endpoint and the realtime push.

use anyhow::Result;
use chrono::Utc;

use crate::analytics::{
    breakdown_rows, group_traffic, traffic_source_rows, AggregateTotals, AnalyticsStore,
    BreakdownDimension, BreakdownRow, ComprehensiveSnapshot, GroupBy, GrowthPoint,
    OverviewResult, TopPageRow, TrafficSourceRow, DEFAULT_TOP_PAGES_LIMIT, MAX_TOP_PAGES_LIMIT,
};
use crate::period::DateRange;

pub async fn overview(
    store: &dyn AnalyticsStore,
    range: &DateRange,
    with_growth: bool,
) -> Result<OverviewResult> {
    let current = store.aggregate_totals(range).await?;
    let previous = if with_growth {
        // No visits can predate the earliest supported day.
        Some(match range.previous() {
            Ok(prev) => store.aggregate_totals(&prev).await?,
            Err(_) => AggregateTotals::default(),
        })
    } else {
        None
    };
    Ok(OverviewResult::from_totals(&current, previous.as_ref()))
}

pub async fn traffic_growth(
    store: &dyn AnalyticsStore,
    range: &DateRange,
    group_by: GroupBy,
) -> Result<Vec<GrowthPoint>> {
    let days = store.daily_aggregates(range).await?;
    Ok(group_traffic(&days, group_by))
}

pub async fn breakdown(
    store: &dyn AnalyticsStore,
    range: &DateRange,
    dimension: BreakdownDimension,
) -> Result<Vec<BreakdownRow>> {
    let counts = store.count_visits_by(range, dimension).await?;
    Ok(breakdown_rows(&counts))
}

pub async fn traffic_sources(
    store: &dyn AnalyticsStore,
    range: &DateRange,
) -> Result<Vec<TrafficSourceRow>> {
    let referers = store.count_visits_by_referer(range).await?;
    Ok(traffic_source_rows(&referers))
}

pub async fn top_pages(
    store: &dyn AnalyticsStore,
    range: &DateRange,
    limit: Option<i64>,
) -> Result<Vec<TopPageRow>> {
    let limit = limit
        .unwrap_or(DEFAULT_TOP_PAGES_LIMIT)
        .clamp(1, MAX_TOP_PAGES_LIMIT);
    store.top_pages(range, limit).await
}

pub async fn comprehensive_snapshot(
    store: &dyn AnalyticsStore,
    range: &DateRange,
) -> Result<ComprehensiveSnapshot> {
    Ok(ComprehensiveSnapshot {
        period: *range,
        overview: overview(store, range, true).await?,
        traffic_growth: traffic_growth(store, range, GroupBy::Day).await?,
        devices: breakdown(store, range, BreakdownDimension::Device).await?,
        browsers: breakdown(store, range, BreakdownDimension::Browser).await?,
        operating_systems: breakdown(store, range, BreakdownDimension::Os).await?,
        traffic_sources: traffic_sources(store, range).await?,
        top_pages: top_pages(store, range, None).await?,
        contact_submissions: store.count_contact_submissions(range).await?,
        cv_downloads: store.count_cv_downloads(range).await?,
        generated_at: Utc::now(),
    })
}
