//! Configuration: catalog documents and runtime counter settings.
//!
//! Catalog documents are TOML with two arrays of tables:
//!
//! ```toml
//! [[event]]
//! name = "g_analytics_contribution"
//! category = "analytics"
//! redis_slot = "analytics"   # optional
//! aggregation = "weekly"     # or "daily"
//! expiry = 84                # optional, days
//! feature_flag = "my_flag"   # optional
//!
//! [[aggregated_metric]]
//! name = "analytics_union"
//! operator = "OR"
//! events = ["g_analytics_contribution"]
//! ```

use std::collections::BTreeSet;

use serde::Deserialize;

use crate::{
    catalog::{
        AggregatedMetricDefinition, Aggregation, AggregationOperator, EventCatalog,
        EventDefinition,
    },
    error::ConfigError,
};

/// Plan names accepted as tracking contexts by default.
pub const DEFAULT_VALID_CONTEXTS: &[&str] =
    &["free", "bronze", "silver", "gold", "premium", "ultimate"];

/// Runtime settings of the counter.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CounterConfig {
    /// When false, tracking is a silent no-op. Reporting still reads the store.
    pub usage_ping_enabled: bool,
    /// Contexts accepted by the `*_in_context` operations.
    pub valid_contexts: Vec<String>,
    /// Feature flags that are turned on. Events and aggregated metrics gated by
    /// any other flag are skipped.
    pub enabled_feature_flags: BTreeSet<String>,
}

impl Default for CounterConfig {
    fn default() -> Self {
        Self {
            usage_ping_enabled: true,
            valid_contexts: DEFAULT_VALID_CONTEXTS.iter().map(|c| c.to_string()).collect(),
            enabled_feature_flags: BTreeSet::new(),
        }
    }
}

impl CounterConfig {
    /// Parse counter settings from TOML. Missing keys take their default.
    pub fn from_toml_str(document: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(document)?)
    }

    /// Turn telemetry collection on or off
    pub fn with_usage_ping_enabled(mut self, enabled: bool) -> Self {
        self.usage_ping_enabled = enabled;
        self
    }

    /// Enable a feature flag
    pub fn with_feature_flag(mut self, flag: impl Into<String>) -> Self {
        self.enabled_feature_flags.insert(flag.into());
        self
    }

    /// Whether something gated by `flag` is active. Ungated things always are.
    pub fn feature_enabled(&self, flag: Option<&str>) -> bool {
        flag.is_none_or(|flag| self.enabled_feature_flags.contains(flag))
    }

    /// Whether `context` is an accepted tracking context
    pub fn is_valid_context(&self, context: &str) -> bool {
        self.valid_contexts.iter().any(|valid| valid == context)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct CatalogFile {
    #[serde(default)]
    event: Vec<EventEntry>,
    #[serde(default)]
    aggregated_metric: Vec<AggregatedMetricEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct EventEntry {
    name: String,
    category: String,
    aggregation: Aggregation,
    #[serde(default)]
    redis_slot: Option<String>,
    #[serde(default)]
    expiry: Option<u32>,
    #[serde(default)]
    feature_flag: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AggregatedMetricEntry {
    name: String,
    operator: String,
    events: Vec<String>,
    #[serde(default)]
    feature_flag: Option<String>,
}

impl CatalogFile {
    pub(crate) fn extend(&mut self, other: CatalogFile) {
        self.event.extend(other.event);
        self.aggregated_metric.extend(other.aggregated_metric);
    }

    pub(crate) fn into_catalog(self) -> Result<EventCatalog, ConfigError> {
        let events = self
            .event
            .into_iter()
            .map(|entry| {
                let mut event = EventDefinition::new(entry.name, entry.category, entry.aggregation);
                if let Some(slot) = entry.redis_slot {
                    event = event.with_slot(slot);
                }
                if let Some(expiry) = entry.expiry {
                    event = event.with_expiry_days(expiry);
                }
                if let Some(flag) = entry.feature_flag {
                    event = event.with_feature_flag(flag);
                }
                event
            })
            .collect();

        let metrics = self
            .aggregated_metric
            .into_iter()
            .map(|entry| {
                let operator = AggregationOperator::parse(&entry.operator).ok_or_else(|| {
                    ConfigError::UnknownAggregationOperator {
                        metric: entry.name.clone(),
                        operator: entry.operator.clone(),
                    }
                })?;
                let mut metric = AggregatedMetricDefinition::new(entry.name, operator, entry.events);
                if let Some(flag) = entry.feature_flag {
                    metric = metric.with_feature_flag(flag);
                }
                Ok(metric)
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(EventCatalog::new(events, metrics)?)
    }
}

#[cfg(test)]
mod tests {
    use assert2::{check, let_assert};

    use super::*;
    use crate::catalog::SlotId;

    #[test]
    fn parses_events_and_metrics() {
        let catalog = EventCatalog::from_toml_str(
            r#"
            [[event]]
            name = "i_search_total"
            category = "search"
            redis_slot = "search"
            aggregation = "weekly"

            [[event]]
            name = "g_edit_by_web_ide"
            category = "ide_edit"
            aggregation = "daily"
            expiry = 10
            feature_flag = "track_edits"

            [[aggregated_metric]]
            name = "search_union"
            operator = "OR"
            events = ["i_search_total"]
            "#,
        )
        .unwrap();

        let search = catalog.find_event("i_search_total").unwrap();
        check!(search.redis_slot() == Some(&SlotId::new("search")));
        check!(search.expiry_days() == 42);

        let edit = catalog.find_event("g_edit_by_web_ide").unwrap();
        check!(edit.redis_slot().is_none());
        check!(edit.expiry_days() == 10);
        check!(edit.feature_flag() == Some("track_edits"));

        check!(catalog.aggregated_metrics().len() == 1);
    }

    #[test]
    fn unknown_operator_is_rejected() {
        let result = EventCatalog::from_toml_str(
            r#"
            [[event]]
            name = "a"
            category = "c"
            aggregation = "daily"

            [[aggregated_metric]]
            name = "m"
            operator = "AND"
            events = ["a"]
            "#,
        );
        let_assert!(Err(ConfigError::UnknownAggregationOperator { metric, operator }) = result);
        check!(metric == "m");
        check!(operator == "AND");
    }

    #[test]
    fn unknown_aggregation_is_a_parse_error() {
        let result = EventCatalog::from_toml_str(
            r#"
            [[event]]
            name = "a"
            category = "c"
            aggregation = "monthly"
            "#,
        );
        let_assert!(Err(ConfigError::Parse(_)) = result);
    }

    #[test]
    fn inconsistent_catalog_is_invalid() {
        let result = EventCatalog::from_toml_str(
            r#"
            [[aggregated_metric]]
            name = "m"
            operator = "OR"
            events = ["missing"]
            "#,
        );
        let_assert!(Err(ConfigError::Invalid(err)) = result);
        check!(err.to_string().contains("unknown event `missing`"));
    }

    #[test]
    fn counter_config_defaults() {
        let config = CounterConfig::from_toml_str("").unwrap();
        check!(config == CounterConfig::default());
        check!(config.usage_ping_enabled);
        check!(config.is_valid_context("free"));
        check!(!config.is_valid_context("platinum"));
        check!(config.feature_enabled(None));
        check!(!config.feature_enabled(Some("flag")));
    }

    #[test]
    fn counter_config_from_toml() {
        let config = CounterConfig::from_toml_str(
            r#"
            usage_ping_enabled = false
            valid_contexts = ["free", "gold"]
            enabled_feature_flags = ["flag"]
            "#,
        )
        .unwrap();
        check!(!config.usage_ping_enabled);
        check!(config.valid_contexts == ["free", "gold"]);
        check!(config.feature_enabled(Some("flag")));
    }
}
