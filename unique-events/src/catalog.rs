//! The static registry of known events and aggregated metrics.
//!
//! An [`EventCatalog`] is built once at startup (usually from TOML, see [`crate::config`])
//! and then shared by reference. It is never mutated afterwards.
//!
//! ```
//! use unique_events::catalog::EventCatalog;
//!
//! let catalog = EventCatalog::from_toml_str(r#"
//!     [[event]]
//!     name = "g_analytics_contribution"
//!     category = "analytics"
//!     redis_slot = "analytics"
//!     aggregation = "weekly"
//! "#).unwrap();
//!
//! assert!(catalog.known_event("g_analytics_contribution"));
//! assert_eq!(catalog.events_for_category("analytics"), ["g_analytics_contribution"]);
//! ```

use std::{fmt, path::Path};

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::{
    config::CatalogFile,
    error::{ConfigError, CounterError, ValidationError},
};

const BUILTIN_EVENTS: &str = include_str!("../catalog/known_events.toml");
const BUILTIN_AGGREGATED_METRICS: &str = include_str!("../catalog/aggregated_metrics.toml");

/// Default expiry of daily bucket keys.
pub const DEFAULT_DAILY_EXPIRY_DAYS: u32 = 29;
/// Default expiry of weekly bucket keys (6 weeks).
pub const DEFAULT_WEEKLY_EXPIRY_DAYS: u32 = 42;
/// Longest expiry an event may configure (10 years).
pub const MAX_EXPIRY_DAYS: u32 = 3650;

/// Name of a redis slot. Events sharing a slot can be counted together.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(String);

impl SlotId {
    /// Create a slot id
    pub fn new(slot: impl Into<String>) -> Self {
        Self(slot.into())
    }

    /// The slot name
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Time bucket granularity of an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    /// One bucket per calendar day
    Daily,
    /// One bucket per Monday-anchored ISO week
    Weekly,
}

impl Aggregation {
    /// Expiry applied when an event does not configure its own.
    pub const fn default_expiry_days(self) -> u32 {
        match self {
            Self::Daily => DEFAULT_DAILY_EXPIRY_DAYS,
            Self::Weekly => DEFAULT_WEEKLY_EXPIRY_DAYS,
        }
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
        })
    }
}

/// How an aggregated metric combines its source events.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AggregationOperator {
    /// Actors who triggered any of the source events
    Any,
}

impl AggregationOperator {
    /// Parse the operator as written in configuration. `OR` and `ANY` are accepted.
    pub fn parse(operator: &str) -> Option<Self> {
        match operator.to_ascii_uppercase().as_str() {
            "OR" | "ANY" => Some(Self::Any),
            _ => None,
        }
    }
}

/// A known event.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EventDefinition {
    name: String,
    redis_slot: Option<SlotId>,
    category: String,
    aggregation: Aggregation,
    expiry_days: u32,
    feature_flag: Option<String>,
}

impl EventDefinition {
    /// Create an event without a slot, using the default expiry for `aggregation`.
    pub fn new(name: impl Into<String>, category: impl Into<String>, aggregation: Aggregation) -> Self {
        Self {
            name: name.into(),
            redis_slot: None,
            category: category.into(),
            aggregation,
            expiry_days: aggregation.default_expiry_days(),
            feature_flag: None,
        }
    }

    /// Put the event in a redis slot
    pub fn with_slot(mut self, slot: impl Into<String>) -> Self {
        self.redis_slot = Some(SlotId::new(slot));
        self
    }

    /// Override the key expiry
    pub fn with_expiry_days(mut self, days: u32) -> Self {
        self.expiry_days = days;
        self
    }

    /// Only track the event while `flag` is enabled
    pub fn with_feature_flag(mut self, flag: impl Into<String>) -> Self {
        self.feature_flag = Some(flag.into());
        self
    }

    /// Event name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Redis slot, if any
    pub fn redis_slot(&self) -> Option<&SlotId> {
        self.redis_slot.as_ref()
    }

    /// Category
    pub fn category(&self) -> &str {
        &self.category
    }

    /// Bucket granularity
    pub fn aggregation(&self) -> Aggregation {
        self.aggregation
    }

    /// Days a bucket key lives after its last write
    pub fn expiry_days(&self) -> u32 {
        self.expiry_days
    }

    /// Feature flag gating this event
    pub fn feature_flag(&self) -> Option<&str> {
        self.feature_flag.as_deref()
    }
}

/// A named OR-combination of events, reported as one unique-actor count.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AggregatedMetricDefinition {
    name: String,
    source_events: Vec<String>,
    operator: AggregationOperator,
    feature_flag: Option<String>,
}

impl AggregatedMetricDefinition {
    /// Create an aggregated metric over `source_events`
    pub fn new<I, E>(name: impl Into<String>, operator: AggregationOperator, source_events: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: Into<String>,
    {
        Self {
            name: name.into(),
            source_events: source_events.into_iter().map(Into::into).collect(),
            operator,
            feature_flag: None,
        }
    }

    /// Only report the metric while `flag` is enabled
    pub fn with_feature_flag(mut self, flag: impl Into<String>) -> Self {
        self.feature_flag = Some(flag.into());
        self
    }

    /// Metric name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Events combined by this metric
    pub fn source_events(&self) -> &[String] {
        &self.source_events
    }

    /// Combination operator
    pub fn operator(&self) -> AggregationOperator {
        self.operator
    }

    /// Feature flag gating this metric
    pub fn feature_flag(&self) -> Option<&str> {
        self.feature_flag.as_deref()
    }
}

/// Immutable registry of [`EventDefinition`]s and [`AggregatedMetricDefinition`]s.
#[derive(Debug, Clone)]
pub struct EventCatalog {
    events: Vec<EventDefinition>,
    event_index: HashMap<String, usize>,
    aggregated_metrics: Vec<AggregatedMetricDefinition>,
    metric_index: HashMap<String, usize>,
}

impl EventCatalog {
    /// Build a catalog, checking that names are unique and that aggregated metrics
    /// only reference known events. Every problem is reported in the returned error.
    pub fn new(
        events: Vec<EventDefinition>,
        aggregated_metrics: Vec<AggregatedMetricDefinition>,
    ) -> Result<Self, ValidationError> {
        let mut errors = ValidationError::builder();

        let mut event_index = HashMap::with_capacity(events.len());
        for (i, event) in events.iter().enumerate() {
            if event.name.is_empty() {
                errors.invalid_mut(format!("event #{i} has an empty name"));
            }
            if event.category.is_empty() {
                errors.invalid_mut(format!("event `{}` has an empty category", event.name));
            }
            if !(1..=MAX_EXPIRY_DAYS).contains(&event.expiry_days) {
                errors.invalid_mut(format!(
                    "event `{}` has expiry {} days, expected 1 to {MAX_EXPIRY_DAYS}",
                    event.name, event.expiry_days
                ));
            }
            if event_index.insert(event.name.clone(), i).is_some() {
                errors.invalid_mut(format!("event `{}` is defined more than once", event.name));
            }
        }

        let mut metric_index = HashMap::with_capacity(aggregated_metrics.len());
        for (i, metric) in aggregated_metrics.iter().enumerate() {
            if metric.source_events.is_empty() {
                errors.invalid_mut(format!("aggregated metric `{}` has no events", metric.name));
            }
            for source in &metric.source_events {
                if !event_index.contains_key(source) {
                    errors.invalid_mut(format!(
                        "aggregated metric `{}` references unknown event `{source}`",
                        metric.name
                    ));
                }
            }
            if metric_index.insert(metric.name.clone(), i).is_some() {
                errors.invalid_mut(format!(
                    "aggregated metric `{}` is defined more than once",
                    metric.name
                ));
            }
        }

        errors.build()?;
        Ok(Self {
            events,
            event_index,
            aggregated_metrics,
            metric_index,
        })
    }

    /// Catalog with no events
    pub fn empty() -> Self {
        Self {
            events: Vec::new(),
            event_index: HashMap::new(),
            aggregated_metrics: Vec::new(),
            metric_index: HashMap::new(),
        }
    }

    /// Parse a single TOML catalog document
    pub fn from_toml_str(document: &str) -> Result<Self, ConfigError> {
        Self::from_toml_strs([document])
    }

    /// Parse and merge several TOML catalog documents, in order
    pub fn from_toml_strs<'a>(documents: impl IntoIterator<Item = &'a str>) -> Result<Self, ConfigError> {
        let mut merged = CatalogFile::default();
        for document in documents {
            merged.extend(toml::from_str(document)?);
        }
        merged.into_catalog()
    }

    /// Load a catalog file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_paths([path])
    }

    /// Load and merge several catalog files, in order
    pub fn from_paths<P: AsRef<Path>>(paths: impl IntoIterator<Item = P>) -> Result<Self, ConfigError> {
        let mut merged = CatalogFile::default();
        for path in paths {
            let path = path.as_ref();
            let document = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.to_owned(),
                source,
            })?;
            tracing::debug!(path = %path.display(), "loading event catalog");
            merged.extend(toml::from_str(&document)?);
        }
        merged.into_catalog()
    }

    /// The catalog bundled with this crate
    pub fn builtin() -> Result<Self, ConfigError> {
        Self::from_toml_strs([BUILTIN_EVENTS, BUILTIN_AGGREGATED_METRICS])
    }

    /// All known events, in definition order
    pub fn known_events(&self) -> &[EventDefinition] {
        &self.events
    }

    /// Whether `name` is a known event
    pub fn known_event(&self, name: &str) -> bool {
        self.event_index.contains_key(name)
    }

    /// Look up an event
    pub fn find_event(&self, name: &str) -> Result<&EventDefinition, CounterError> {
        self.event_index
            .get(name)
            .map(|&i| &self.events[i])
            .ok_or_else(|| CounterError::UnknownEvent(name.to_owned()))
    }

    /// Distinct categories, in the order they first appear
    pub fn categories(&self) -> Vec<&str> {
        let mut categories: Vec<&str> = Vec::new();
        for event in &self.events {
            if !categories.contains(&event.category()) {
                categories.push(event.category());
            }
        }
        categories
    }

    /// Names of the events in `category`
    pub fn events_for_category(&self, category: &str) -> Vec<&str> {
        self.events
            .iter()
            .filter(|event| event.category == category)
            .map(EventDefinition::name)
            .collect()
    }

    /// All aggregated metrics, in definition order
    pub fn aggregated_metrics(&self) -> &[AggregatedMetricDefinition] {
        &self.aggregated_metrics
    }

    /// Look up an aggregated metric
    pub fn find_aggregated_metric(
        &self,
        name: &str,
    ) -> Result<&AggregatedMetricDefinition, CounterError> {
        self.metric_index
            .get(name)
            .map(|&i| &self.aggregated_metrics[i])
            .ok_or_else(|| CounterError::UnknownAggregatedMetric(name.to_owned()))
    }
}
