//! Error types for the unique-events counter.
//!
//! Catalog and validation errors are raised before the store is touched, so a rejected
//! call never partially mutates store state. Store errors are passed through unchanged.

use std::{fmt, io, path::PathBuf};

use chrono::TimeDelta;

/// Errors raised while tracking or counting events.
#[derive(Debug)]
#[non_exhaustive]
pub enum CounterError {
    /// The event name is not in the catalog.
    UnknownEvent(String),
    /// The aggregated metric name is not in the catalog.
    UnknownAggregatedMetric(String),
    /// A count was requested for an empty list of events.
    NoEvents,
    /// The requested events do not share one redis slot.
    SlotMismatch(Vec<String>),
    /// The requested events do not share one category.
    CategoryMismatch(Vec<String>),
    /// The requested events do not share one aggregation granularity.
    AggregationMismatch(Vec<String>),
    /// The context is not one of the configured valid contexts.
    InvalidContext(String),
    /// The backing store failed.
    Store(StoreError),
}

impl fmt::Display for CounterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownEvent(name) => write!(f, "Unknown event {name}"),
            Self::UnknownAggregatedMetric(name) => write!(f, "Unknown aggregated metric {name}"),
            Self::NoEvents => f.write_str("no events requested"),
            Self::SlotMismatch(events) => {
                write!(f, "events should be in the same slot: {}", events.join(", "))
            }
            Self::CategoryMismatch(events) => {
                write!(f, "events should be in the same category: {}", events.join(", "))
            }
            Self::AggregationMismatch(events) => write!(
                f,
                "events should have the same aggregation: {}",
                events.join(", ")
            ),
            Self::InvalidContext(context) => write!(f, "invalid context `{context}`"),
            Self::Store(err) => write!(f, "store error: {err}"),
        }
    }
}

impl std::error::Error for CounterError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for CounterError {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

/// Errors raised by a [`crate::store::CardinalityStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum StoreError {
    /// The key carries no `{...}` hash tag, so it cannot be routed to a slot.
    KeyFormat(String),
    /// The time to live is not positive, or expires past the last representable instant.
    InvalidTtl(TimeDelta),
    /// The store could not serve the request.
    Unavailable(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KeyFormat(key) => write!(f, "invalid key format: `{key}` has no hash tag"),
            Self::InvalidTtl(ttl) => write!(f, "invalid time to live: {ttl}"),
            Self::Unavailable(reason) => write!(f, "store unavailable: {reason}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Errors raised while loading catalog or counter configuration.
#[derive(Debug)]
#[non_exhaustive]
pub enum ConfigError {
    /// A configuration file could not be read.
    Io {
        /// The file that failed to load
        path: PathBuf,
        /// The underlying I/O error
        source: io::Error,
    },
    /// A configuration document is not valid TOML for its schema.
    Parse(toml::de::Error),
    /// An aggregated metric names an operator other than `OR`.
    UnknownAggregationOperator {
        /// The aggregated metric
        metric: String,
        /// The operator as written
        operator: String,
    },
    /// The definitions parsed, but are inconsistent.
    Invalid(ValidationError),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "failed to read {}: {source}", path.display()),
            Self::Parse(err) => write!(f, "failed to parse configuration: {err}"),
            Self::UnknownAggregationOperator { metric, operator } => write!(
                f,
                "unknown aggregation operator `{operator}` for aggregated metric `{metric}`"
            ),
            Self::Invalid(err) => write!(f, "invalid configuration: {err}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::Invalid(err) => Some(err),
            Self::UnknownAggregationOperator { .. } => None,
        }
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        Self::Parse(err)
    }
}

impl From<ValidationError> for ConfigError {
    fn from(err: ValidationError) -> Self {
        Self::Invalid(err)
    }
}

/// Describes why a set of definitions is not a valid catalog. Every problem found is
/// recorded, so one load reports all of them.
#[derive(Clone, PartialEq, Eq)]
pub struct ValidationError(Vec<String>);

impl ValidationError {
    /// Create a builder that can be used to compose multiple validation failures into a single
    /// [`ValidationError`]. If no failures are added, [`ValidationErrorBuilder::build()`] returns [`Ok`].
    pub fn builder() -> ValidationErrorBuilder {
        ValidationErrorBuilder::default()
    }

    /// The individual failures, in the order they were recorded.
    pub fn reasons(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Debug for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(&self.0).finish()
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(", "))
    }
}

impl std::error::Error for ValidationError {}

/// Builder to record validation failures and bundle them into a single [`ValidationError`].
#[derive(Debug, Clone, Default)]
pub struct ValidationErrorBuilder(Vec<String>);

impl ValidationErrorBuilder {
    /// Returns [`Ok`] if no validation failures were recorded, otherwise [`Err`] with all of them.
    pub fn build(self) -> Result<(), ValidationError> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(ValidationError(self.0))
        }
    }

    /// Record a generic validation failure with a reason string.
    pub fn invalid(mut self, reason: impl Into<String>) -> Self {
        self.invalid_mut(reason);
        self
    }

    /// Record a generic validation failure, but only require `&mut Self`.
    pub fn invalid_mut(&mut self, reason: impl Into<String>) -> &mut Self {
        self.0.push(reason.into());
        self
    }
}
