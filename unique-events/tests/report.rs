//! Usage report assembled from the bundled catalog.

use std::sync::Arc;

use assert2::check;
use chrono::{Days, NaiveDate};
use unique_events::{Aggregator, CounterConfig, EventCatalog, MemoryStore};
use unique_events_timesource::{TimeSource, fakes::StaticTimeSource};

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 6, 1).unwrap()
}

fn days_ago(days: u64) -> NaiveDate {
    today().checked_sub_days(Days::new(days)).unwrap()
}

fn counter(config: CounterConfig) -> Aggregator<MemoryStore> {
    let clock = TimeSource::custom(StaticTimeSource::on_date(today()));
    Aggregator::new(
        Arc::new(EventCatalog::builtin().unwrap()),
        MemoryStore::new().with_time_source(clock.clone()),
        config,
    )
    .with_time_source(clock)
}

#[test]
fn every_event_and_category_is_reported() {
    let counter = counter(CounterConfig::default());
    let data = counter.combined_metrics().unique_events_data().unwrap();

    let catalog = counter.catalog();
    check!(data.keys().count() == catalog.categories().len());
    for event in catalog.known_events() {
        let counts = &data[event.category()];
        check!(counts[&format!("{}_weekly", event.name())] == 0);
        check!(counts[&format!("{}_monthly", event.name())] == 0);
    }
    for category in catalog.categories() {
        check!(data[category].contains_key(&format!("{category}_total_unique_counts_weekly")));
        check!(data[category].contains_key(&format!("{category}_total_unique_counts_monthly")));
    }
}

#[test]
fn category_totals_are_unions() {
    let counter = counter(CounterConfig::default());
    // last week
    counter.track_event_values(&["a", "b"], "g_compliance_dashboard", days_ago(3)).unwrap();
    counter.track_event_values(&["b", "c"], "g_compliance_audit_events", days_ago(3)).unwrap();
    // three weeks ago
    counter.track_event("d", "i_compliance_audit_events", days_ago(20)).unwrap();

    let data = counter.combined_metrics().unique_events_data().unwrap();
    let compliance = &data["compliance"];
    check!(compliance["g_compliance_dashboard_weekly"] == 2);
    check!(compliance["g_compliance_audit_events_weekly"] == 2);
    check!(compliance["i_compliance_audit_events_weekly"] == 0);
    check!(compliance["i_compliance_audit_events_monthly"] == 1);
    check!(compliance["compliance_total_unique_counts_weekly"] == 3);
    check!(compliance["compliance_total_unique_counts_monthly"] == 4);

    let singles_weekly: u64 = compliance
        .iter()
        .filter(|(key, _)| key.ends_with("_weekly") && !key.starts_with("compliance_total"))
        .map(|(_, count)| *count)
        .sum();
    check!(compliance["compliance_total_unique_counts_weekly"] <= singles_weekly);
}

#[test]
fn aggregated_metrics_cover_their_windows() {
    let counter = counter(CounterConfig::default());
    // same week, different events
    counter.track_event("X", "i_search_total", days_ago(6)).unwrap();
    counter.track_event("Y", "i_search_advanced", days_ago(5)).unwrap();
    // outside the weekly window, inside the monthly one
    counter.track_event("Z", "i_search_paid", days_ago(8)).unwrap();

    let metrics = counter.combined_metrics();
    let weekly = metrics.aggregated_metrics_weekly_data().unwrap();
    let monthly = metrics.aggregated_metrics_monthly_data().unwrap();
    check!(weekly["product_analytics_test_metrics_union"] == 2);
    check!(monthly["product_analytics_test_metrics_union"] == 3);
    check!(weekly["compliance_features_track_unique_visits_union"] == 0);
}

#[test]
fn flagged_aggregated_metrics_need_their_flag() {
    let flag = "usage_data_incident_management_alerts_total";

    let off = counter(CounterConfig::default());
    let weekly = off.combined_metrics().aggregated_metrics_weekly_data().unwrap();
    check!(!weekly.contains_key("incident_management_alerts_total"));

    let on = counter(CounterConfig::default().with_feature_flag(flag));
    on.track_event("a", "incident_management_alert_assigned", days_ago(4)).unwrap();
    on.track_event("a", "incident_management_alert_todo", days_ago(4)).unwrap();
    let monthly = on.combined_metrics().aggregated_metrics_monthly_data().unwrap();
    check!(monthly["incident_management_alerts_total"] == 1);
}

#[test]
fn usage_report_as_json() {
    let counter = counter(CounterConfig::default());
    counter.track_event("a", "g_edit_by_web_ide", days_ago(1)).unwrap();
    counter.track_event("a", "g_edit_by_sfe", days_ago(2)).unwrap();

    let report = counter.combined_metrics().usage_report().unwrap();
    let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();

    check!(json["reference_date"] == "2020-06-01");
    let ide_edit = &json["unique_events"]["ide_edit"];
    check!(ide_edit["g_edit_by_web_ide_weekly"] == 1);
    check!(ide_edit["g_edit_by_sfe_monthly"] == 1);
    check!(ide_edit["ide_edit_total_unique_counts_weekly"] == 1);
    check!(json["aggregated_metrics_weekly"]["product_analytics_test_metrics_union"] == 0);
    check!(json["aggregated_metrics_monthly"].is_object());
}
