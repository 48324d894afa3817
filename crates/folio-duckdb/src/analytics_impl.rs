use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};

use folio_core::analytics::{
    AggregateDay, AggregateTotals, AnalyticsStore, BreakdownDimension, TopPageRow, ValueCount,
};
use folio_core::event::{NewInteraction, NewVisit, UserInteraction, VisitEvent};
use folio_core::period::DateRange;

use crate::DuckDbBackend;

#[async_trait]
impl AnalyticsStore for DuckDbBackend {
    async fn record_visit(
        &self,
        visit: &NewVisit,
        now: DateTime<Utc>,
        day: NaiveDate,
        dedup_window: Duration,
    ) -> anyhow::Result<Option<VisitEvent>> {
        crate::ingest::record_visit_inner(self, visit, now, day, dedup_window).await
    }

    async fn record_interaction(
        &self,
        interaction: &NewInteraction,
        now: DateTime<Utc>,
    ) -> anyhow::Result<UserInteraction> {
        crate::ingest::record_interaction_inner(self, interaction, now).await
    }

    async fn aggregate_totals(&self, range: &DateRange) -> anyhow::Result<AggregateTotals> {
        crate::queries::aggregates::aggregate_totals_inner(self, range).await
    }

    async fn daily_aggregates(&self, range: &DateRange) -> anyhow::Result<Vec<AggregateDay>> {
        crate::queries::aggregates::daily_aggregates_inner(self, range).await
    }

    async fn count_visits_by(
        &self,
        range: &DateRange,
        dimension: BreakdownDimension,
    ) -> anyhow::Result<Vec<ValueCount>> {
        crate::queries::breakdown::count_visits_by_inner(self, range, dimension).await
    }

    async fn count_visits_by_referer(&self, range: &DateRange) -> anyhow::Result<Vec<ValueCount>> {
        crate::queries::breakdown::count_visits_by_referer_inner(self, range).await
    }

    async fn top_pages(&self, range: &DateRange, limit: i64) -> anyhow::Result<Vec<TopPageRow>> {
        crate::queries::aggregates::top_pages_inner(self, range, limit).await
    }

    async fn count_contact_submissions(&self, range: &DateRange) -> anyhow::Result<i64> {
        crate::queries::counts::count_contact_submissions_inner(self, range).await
    }

    async fn count_cv_downloads(&self, range: &DateRange) -> anyhow::Result<i64> {
        crate::queries::counts::count_cv_downloads_inner(self, range).await
    }

    async fn ping(&self) -> anyhow::Result<()> {
        DuckDbBackend::ping(self).await
    }
}
