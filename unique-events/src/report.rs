//! Telemetry report: per-event counts, category totals and aggregated metrics.
//!
//! All windows end today (per the counter's time source). The weekly window starts 7 days
//! ago and the monthly window 28 days ago; for weekly events the in-progress week is not
//! counted, see [`crate::key::enumerate_period_starts`].

use std::collections::BTreeMap;

use chrono::{Days, NaiveDate};
use serde::Serialize;

use crate::{
    aggregator::{Aggregator, events_compatible},
    catalog::AggregationOperator,
    error::CounterError,
    store::CardinalityStore,
};

/// Days covered by the weekly window
pub const WEEKLY_WINDOW_DAYS: u64 = 7;
/// Days covered by the monthly window (4 weeks)
pub const MONTHLY_WINDOW_DAYS: u64 = 28;

/// Per-category counts: `category -> key -> count`
pub type UniqueEventsData = BTreeMap<String, BTreeMap<String, u64>>;

/// Everything exported by one telemetry run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsageReport {
    /// The date the windows end on
    pub reference_date: NaiveDate,
    /// Output of [`CombinedMetrics::unique_events_data`]
    pub unique_events: UniqueEventsData,
    /// Output of [`CombinedMetrics::aggregated_metrics_weekly_data`]
    pub aggregated_metrics_weekly: BTreeMap<String, u64>,
    /// Output of [`CombinedMetrics::aggregated_metrics_monthly_data`]
    pub aggregated_metrics_monthly: BTreeMap<String, u64>,
}

impl UsageReport {
    /// Serialize the report as JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[derive(Clone, Copy)]
struct Window {
    start: NaiveDate,
    end: NaiveDate,
}

/// Report queries over an [`Aggregator`].
#[derive(Debug)]
pub struct CombinedMetrics<'a, S> {
    counter: &'a Aggregator<S>,
}

impl<S: CardinalityStore> Aggregator<S> {
    /// Report queries over this counter
    pub fn combined_metrics(&self) -> CombinedMetrics<'_, S> {
        CombinedMetrics { counter: self }
    }
}

impl<S: CardinalityStore> CombinedMetrics<'_, S> {
    /// Aggregated metric counts over the trailing week
    pub fn aggregated_metrics_weekly_data(&self) -> Result<BTreeMap<String, u64>, CounterError> {
        self.aggregated_metrics_data(self.window(WEEKLY_WINDOW_DAYS))
    }

    /// Aggregated metric counts over the trailing 4 weeks
    pub fn aggregated_metrics_monthly_data(&self) -> Result<BTreeMap<String, u64>, CounterError> {
        self.aggregated_metrics_data(self.window(MONTHLY_WINDOW_DAYS))
    }

    fn aggregated_metrics_data(&self, window: Window) -> Result<BTreeMap<String, u64>, CounterError> {
        let config = self.counter.config();
        let mut data = BTreeMap::new();
        for metric in self.counter.catalog().aggregated_metrics() {
            if !config.feature_enabled(metric.feature_flag()) {
                tracing::debug!(metric = metric.name(), "feature disabled, skipping aggregated metric");
                continue;
            }
            let count = match metric.operator() {
                AggregationOperator::Any => self
                    .counter
                    .unique_events(metric.source_events(), window.start, window.end)
                    .inspect_err(|err| {
                        tracing::warn!(metric = metric.name(), %err, "failed to count aggregated metric");
                    })?,
            };
            data.insert(metric.name().to_owned(), count);
        }
        Ok(data)
    }

    /// Weekly and monthly counts of every event, grouped by category, plus category totals.
    ///
    /// Totals are a single union query over the category's events, so an actor who
    /// triggered several of them is counted once. They are only reported when the
    /// category's events can be unioned (same slot and aggregation).
    pub fn unique_events_data(&self) -> Result<UniqueEventsData, CounterError> {
        let catalog = self.counter.catalog();
        let weekly = self.window(WEEKLY_WINDOW_DAYS);
        let monthly = self.window(MONTHLY_WINDOW_DAYS);

        let mut data = UniqueEventsData::new();
        for category in catalog.categories() {
            let event_names = catalog.events_for_category(category);
            let mut results = BTreeMap::new();
            for &event in &event_names {
                results.insert(format!("{event}_weekly"), self.count(&[event], weekly)?);
                results.insert(format!("{event}_monthly"), self.count(&[event], monthly)?);
            }

            let events = event_names
                .iter()
                .map(|name| catalog.find_event(name))
                .collect::<Result<Vec<_>, _>>()?;
            if events_compatible(&events) {
                results.insert(
                    format!("{category}_total_unique_counts_weekly"),
                    self.count(&event_names, weekly)?,
                );
                results.insert(
                    format!("{category}_total_unique_counts_monthly"),
                    self.count(&event_names, monthly)?,
                );
            } else {
                tracing::warn!(category, "events cannot be unioned, skipping category totals");
            }
            data.insert(category.to_owned(), results);
        }
        Ok(data)
    }

    /// Assemble the full report
    pub fn usage_report(&self) -> Result<UsageReport, CounterError> {
        let report = UsageReport {
            reference_date: self.counter.today(),
            unique_events: self.unique_events_data()?,
            aggregated_metrics_weekly: self.aggregated_metrics_weekly_data()?,
            aggregated_metrics_monthly: self.aggregated_metrics_monthly_data()?,
        };
        tracing::info!(
            reference_date = %report.reference_date,
            categories = report.unique_events.len(),
            aggregated_metrics = report.aggregated_metrics_weekly.len(),
            "assembled usage report"
        );
        Ok(report)
    }

    fn count(&self, event_names: &[&str], window: Window) -> Result<u64, CounterError> {
        self.counter.unique_events(event_names, window.start, window.end)
    }

    fn window(&self, days: u64) -> Window {
        let end = self.counter.today();
        let start = end.checked_sub_days(Days::new(days)).unwrap_or(NaiveDate::MIN);
        Window { start, end }
    }
}
