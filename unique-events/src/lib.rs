#![deny(missing_docs)]
#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod aggregator;
pub mod catalog;
pub mod config;
pub mod error;
pub mod key;
pub mod report;
pub mod sketch;
pub mod store;

pub use aggregator::{Aggregator, events_compatible};
pub use catalog::{
    AggregatedMetricDefinition, Aggregation, AggregationOperator, EventCatalog, EventDefinition,
    SlotId,
};
pub use config::CounterConfig;
pub use error::{ConfigError, CounterError, StoreError, ValidationError};
pub use report::{CombinedMetrics, UsageReport};
pub use store::{CardinalityStore, MemoryStore};
