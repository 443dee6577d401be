//! Example: track a few events against the bundled catalog and print the usage report.
//!
//! Run with `RUST_LOG=unique_events=debug` to see what is tracked and skipped.

use std::sync::Arc;

use chrono::Days;
use tracing_subscriber::EnvFilter;
use unique_events::{Aggregator, CounterConfig, EventCatalog, MemoryStore};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let catalog = Arc::new(EventCatalog::builtin()?);
    let config = CounterConfig::default().with_feature_flag("usage_data_incident_management_alerts_total");
    let counter = Aggregator::new(catalog, MemoryStore::new(), config);

    let today = counter.today();
    let days_ago = |days| today.checked_sub_days(Days::new(days)).unwrap_or(today);

    // a week's worth of activity from a handful of users
    for (user, offset) in [("alice", 1), ("bob", 3), ("carol", 5), ("alice", 9)] {
        counter.track_event(user, "i_search_total", days_ago(offset))?;
        counter.track_event(user, "g_edit_by_web_ide", days_ago(offset))?;
    }
    counter.track_event_values(&["bob", "dave"], "i_search_advanced", days_ago(2))?;
    counter.track_event_in_context(&["carol"], "g_compliance_dashboard", "premium", days_ago(4))?;
    counter.track_event("erin", "incident_management_alert_assigned", days_ago(6))?;
    // gated by a flag that is off: not recorded
    counter.track_event("frank", "quickaction_assign", days_ago(1))?;

    let searches = counter.unique_events(
        &["i_search_total", "i_search_advanced"],
        days_ago(28),
        today,
    )?;
    println!("searchers in the last 4 weeks: {searches}");

    let report = counter.combined_metrics().usage_report()?;
    println!("{}", report.to_json()?);
    Ok(())
}
