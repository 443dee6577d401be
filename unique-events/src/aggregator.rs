//! Tracking and counting of unique actors per event.
//!
//! [`Aggregator`] ties the [`EventCatalog`], the key scheme in [`crate::key`] and a
//! [`CardinalityStore`] together:
//!
//! - [`Aggregator::track_event`] records that an actor triggered an event on a date.
//! - [`Aggregator::unique_events`] estimates how many distinct actors triggered *any* of a
//!   set of events over a date range.
//!
//! Requests are validated against the catalog before the store is touched.
//!
//! ```
//! use std::sync::Arc;
//! use chrono::NaiveDate;
//! use unique_events::{Aggregator, CounterConfig, EventCatalog, MemoryStore};
//!
//! let catalog = EventCatalog::from_toml_str(r#"
//!     [[event]]
//!     name = "i_search_total"
//!     category = "search"
//!     redis_slot = "search"
//!     aggregation = "daily"
//!
//!     [[event]]
//!     name = "i_search_advanced"
//!     category = "search"
//!     redis_slot = "search"
//!     aggregation = "daily"
//! "#).unwrap();
//! let counter = Aggregator::new(Arc::new(catalog), MemoryStore::new(), CounterConfig::default());
//!
//! let day = NaiveDate::from_ymd_opt(2020, 6, 1).unwrap();
//! counter.track_event("alice", "i_search_total", day).unwrap();
//! counter.track_event("alice", "i_search_advanced", day).unwrap();
//! counter.track_event("bob", "i_search_advanced", day).unwrap();
//!
//! let both = counter.unique_events(&["i_search_total", "i_search_advanced"], day, day).unwrap();
//! assert_eq!(both, 2);
//! ```

use std::sync::Arc;

use chrono::{NaiveDate, TimeDelta};
use itertools::Itertools;
use unique_events_timesource::{TimeSource, get_time_source};

use crate::{
    catalog::{EventCatalog, EventDefinition},
    config::CounterConfig,
    error::CounterError,
    key::{build_key, enumerate_period_starts},
    store::CardinalityStore,
};

/// Unique-actor counter over an event catalog and a store.
#[derive(Debug)]
pub struct Aggregator<S> {
    catalog: Arc<EventCatalog>,
    store: S,
    config: CounterConfig,
    time_source: Option<TimeSource>,
}

impl<S: CardinalityStore> Aggregator<S> {
    /// Create a counter
    pub fn new(catalog: Arc<EventCatalog>, store: S, config: CounterConfig) -> Self {
        Self {
            catalog,
            store,
            config,
            time_source: None,
        }
    }

    /// Use `time_source` to decide what "today" is. Without one, the thread-local
    /// override or the system clock is used.
    pub fn with_time_source(mut self, time_source: TimeSource) -> Self {
        self.time_source = Some(time_source);
        self
    }

    /// The event catalog
    pub fn catalog(&self) -> &EventCatalog {
        &self.catalog
    }

    /// The backing store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Counter settings
    pub fn config(&self) -> &CounterConfig {
        &self.config
    }

    /// Current UTC date according to the time source
    pub fn today(&self) -> NaiveDate {
        get_time_source(self.time_source.clone()).today()
    }

    /// Record that `actor_id` triggered `event_name` on `at_date`.
    ///
    /// Unknown events are an error. When telemetry is disabled, or the event's feature flag
    /// is off, nothing is recorded and `Ok` is returned.
    pub fn track_event(
        &self,
        actor_id: &str,
        event_name: &str,
        at_date: NaiveDate,
    ) -> Result<(), CounterError> {
        self.track(&[actor_id], event_name, None, at_date)
    }

    /// [`Self::track_event`] dated today
    pub fn track_event_today(&self, actor_id: &str, event_name: &str) -> Result<(), CounterError> {
        self.track_event(actor_id, event_name, self.today())
    }

    /// Record several actors for one event in a single store write
    pub fn track_event_values(
        &self,
        actor_ids: &[&str],
        event_name: &str,
        at_date: NaiveDate,
    ) -> Result<(), CounterError> {
        self.track(actor_ids, event_name, None, at_date)
    }

    /// Record actors for an event within `context`, such as a plan name.
    ///
    /// Context-scoped buckets are separate from the context-free ones. An empty context is
    /// the same as [`Self::track_event_values`].
    pub fn track_event_in_context(
        &self,
        actor_ids: &[&str],
        event_name: &str,
        context: &str,
        at_date: NaiveDate,
    ) -> Result<(), CounterError> {
        self.track(actor_ids, event_name, Some(context), at_date)
    }

    fn track(
        &self,
        actor_ids: &[&str],
        event_name: &str,
        context: Option<&str>,
        at_date: NaiveDate,
    ) -> Result<(), CounterError> {
        let event = self.catalog.find_event(event_name)?;
        let context = self.validate_context(context)?;

        if !self.config.usage_ping_enabled {
            tracing::debug!(event = event_name, "usage ping disabled, not tracking");
            return Ok(());
        }
        if !self.config.feature_enabled(event.feature_flag()) {
            tracing::debug!(
                event = event_name,
                feature_flag = event.feature_flag(),
                "feature disabled, not tracking"
            );
            return Ok(());
        }

        let key = build_key(event, at_date, context).to_string();
        let ttl = TimeDelta::days(i64::from(event.expiry_days()));
        self.store.add(&key, actor_ids, ttl)?;
        Ok(())
    }

    /// Estimate the distinct actors who triggered any of `event_names` in
    /// `[start_date, end_date]`.
    ///
    /// The events must share a redis slot (or all have none), a category and an
    /// aggregation; these are checked in that order. For weekly events the current week is
    /// not counted, since it is still in progress. Every day or week of the range becomes
    /// one store key, so long daily ranges are proportionally expensive.
    pub fn unique_events<N: AsRef<str>>(
        &self,
        event_names: &[N],
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<u64, CounterError> {
        self.count(event_names, start_date, end_date, None)
    }

    /// [`Self::unique_events`] restricted to actors tracked within `context`
    pub fn unique_events_in_context<N: AsRef<str>>(
        &self,
        event_names: &[N],
        start_date: NaiveDate,
        end_date: NaiveDate,
        context: &str,
    ) -> Result<u64, CounterError> {
        self.count(event_names, start_date, end_date, Some(context))
    }

    fn count<N: AsRef<str>>(
        &self,
        event_names: &[N],
        start_date: NaiveDate,
        end_date: NaiveDate,
        context: Option<&str>,
    ) -> Result<u64, CounterError> {
        let events = self.resolve(event_names)?;
        validate_union(&events)?;
        let context = self.validate_context(context)?;

        // validate_union guarantees one shared aggregation
        let aggregation = events[0].aggregation();
        let today = self.today();
        let keys: Vec<String> = enumerate_period_starts(aggregation, start_date, end_date, today)
            .into_iter()
            .flat_map(|period| {
                events
                    .iter()
                    .map(move |event| build_key(event, period, context).to_string())
            })
            .unique()
            .collect();

        if keys.is_empty() {
            tracing::trace!(%start_date, %end_date, "no complete period in range");
            return Ok(0);
        }
        Ok(self.store.count(&keys)?)
    }

    fn resolve<N: AsRef<str>>(&self, event_names: &[N]) -> Result<Vec<&EventDefinition>, CounterError> {
        if event_names.is_empty() {
            return Err(CounterError::NoEvents);
        }
        event_names
            .iter()
            .map(|name| self.catalog.find_event(name.as_ref()))
            .collect()
    }

    fn validate_context<'c>(&self, context: Option<&'c str>) -> Result<Option<&'c str>, CounterError> {
        match context {
            None | Some("") => Ok(None),
            Some(context) if self.config.is_valid_context(context) => Ok(Some(context)),
            Some(context) => Err(CounterError::InvalidContext(context.to_owned())),
        }
    }
}

/// Whether `events` can be counted together: same slot and same aggregation.
///
/// A single event is always compatible with itself.
pub fn events_compatible(events: &[&EventDefinition]) -> bool {
    match events {
        [] => false,
        [first, rest @ ..] => rest.iter().all(|event| {
            event.redis_slot() == first.redis_slot() && event.aggregation() == first.aggregation()
        }),
    }
}

fn validate_union(events: &[&EventDefinition]) -> Result<(), CounterError> {
    let Some((first, rest)) = events.split_first() else {
        return Err(CounterError::NoEvents);
    };
    let names = || -> Vec<String> { events.iter().map(|e| e.name().to_owned()).collect() };

    if rest.iter().any(|e| e.redis_slot() != first.redis_slot()) {
        return Err(CounterError::SlotMismatch(names()));
    }
    if rest.iter().any(|e| e.category() != first.category()) {
        return Err(CounterError::CategoryMismatch(names()));
    }
    if rest.iter().any(|e| e.aggregation() != first.aggregation()) {
        return Err(CounterError::AggregationMismatch(names()));
    }
    Ok(())
}
