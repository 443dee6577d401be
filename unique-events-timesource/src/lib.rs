// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

#![deny(missing_docs)]
#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

use std::{cell::RefCell, fmt};

use chrono::{DateTime, NaiveDate, Utc};

/// Fake clocks for tests. Requires the `test-util` feature.
#[cfg(feature = "test-util")]
pub mod fakes;

/// A source of "now", in UTC.
pub trait Time: Send + Sync + fmt::Debug {
    /// The current instant
    fn now(&self) -> DateTime<Utc>;
}

/// The clock a counter reads.
///
/// [`TimeSource::System`] reads the wall clock. With the `custom-timesource` feature any
/// [`Time`] implementation can be plugged in, which is how tests freeze the reference date.
#[derive(Clone, Default)]
pub enum TimeSource {
    /// The wall clock
    #[default]
    System,
    /// A caller-provided clock
    #[cfg(feature = "custom-timesource")]
    Custom(std::sync::Arc<dyn Time>),
}

impl fmt::Debug for TimeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System => f.write_str("System"),
            #[cfg(feature = "custom-timesource")]
            Self::Custom(clock) => f.debug_tuple("Custom").field(clock).finish(),
        }
    }
}

impl TimeSource {
    /// The current instant
    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Self::System => Utc::now(),
            #[cfg(feature = "custom-timesource")]
            Self::Custom(clock) => clock.now(),
        }
    }

    /// The current UTC calendar date
    ///
    /// ```
    /// use chrono::NaiveDate;
    /// use unique_events_timesource::{TimeSource, fakes::StaticTimeSource};
    ///
    /// let monday = NaiveDate::from_ymd_opt(2020, 6, 1).unwrap();
    /// let ts = TimeSource::custom(StaticTimeSource::on_date(monday));
    /// assert_eq!(ts.today(), monday);
    /// ```
    pub fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }

    /// Wrap a custom clock
    #[cfg(feature = "custom-timesource")]
    pub fn custom(clock: impl Time + 'static) -> TimeSource {
        Self::Custom(std::sync::Arc::new(clock))
    }
}

thread_local! {
    static OVERRIDE: RefCell<Option<TimeSource>> = const { RefCell::new(None) };
}

/// Restores the previous thread-local clock when dropped.
#[must_use = "the override is removed as soon as the guard is dropped"]
pub struct ThreadLocalTimeSourceGuard {
    previous: Option<TimeSource>,
}

impl Drop for ThreadLocalTimeSourceGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        OVERRIDE.with(|cell| *cell.borrow_mut() = previous);
    }
}

/// Make `time_source` the clock of the current thread until the guard is dropped.
///
/// Only code that does not carry its own [`TimeSource`] is affected.
///
/// ```
/// use chrono::DateTime;
/// use unique_events_timesource::{TimeSource, fakes::StaticTimeSource, set_time_source, time_source};
///
/// let _guard = set_time_source(TimeSource::custom(StaticTimeSource::at_time(DateTime::UNIX_EPOCH)));
/// assert_eq!(time_source().now(), DateTime::UNIX_EPOCH);
/// ```
#[cfg(feature = "custom-timesource")]
pub fn set_time_source(time_source: TimeSource) -> ThreadLocalTimeSourceGuard {
    let previous = OVERRIDE.with(|cell| cell.replace(Some(time_source)));
    ThreadLocalTimeSourceGuard { previous }
}

/// Run `f` with `time_source` as the thread's clock
#[cfg(feature = "custom-timesource")]
pub fn with_time_source<R>(time_source: TimeSource, f: impl FnOnce() -> R) -> R {
    let _guard = set_time_source(time_source);
    f()
}

/// Resolve the clock to use: `explicit` if given, else the thread-local override, else
/// the wall clock.
#[inline]
pub fn get_time_source(explicit: Option<TimeSource>) -> TimeSource {
    #[cfg(feature = "custom-timesource")]
    let explicit = explicit.or_else(|| OVERRIDE.with(|cell| cell.borrow().clone()));
    explicit.unwrap_or_default()
}

/// Shorthand for `get_time_source(None)`
#[inline]
pub fn time_source() -> TimeSource {
    get_time_source(None)
}

#[cfg(test)]
mod tests {
    use assert2::{check, let_assert};
    use chrono::{DateTime, NaiveDate};

    use super::*;
    use crate::fakes::StaticTimeSource;

    fn frozen(y: i32, m: u32, d: u32) -> TimeSource {
        TimeSource::custom(StaticTimeSource::on_date(NaiveDate::from_ymd_opt(y, m, d).unwrap()))
    }

    #[test]
    fn defaults_to_the_wall_clock() {
        let_assert!(TimeSource::System = time_source());
    }

    #[test]
    fn explicit_clock_beats_the_override() {
        let _guard = set_time_source(frozen(2021, 1, 4));
        let explicit = get_time_source(Some(frozen(2020, 6, 1)));
        check!(explicit.today() == NaiveDate::from_ymd_opt(2020, 6, 1).unwrap());
    }

    #[test]
    fn guards_nest_and_restore() {
        let outer = set_time_source(frozen(2020, 6, 1));
        {
            let _inner = set_time_source(frozen(2021, 1, 4));
            check!(time_source().today() == NaiveDate::from_ymd_opt(2021, 1, 4).unwrap());
        }
        check!(time_source().today() == NaiveDate::from_ymd_opt(2020, 6, 1).unwrap());
        drop(outer);
        let_assert!(TimeSource::System = time_source());
    }

    #[test]
    fn scoped_override() {
        let clock = TimeSource::custom(StaticTimeSource::at_time(DateTime::UNIX_EPOCH));
        let now = with_time_source(clock, || time_source().now());
        check!(now == DateTime::UNIX_EPOCH);
        let_assert!(TimeSource::System = time_source());
    }

    #[test]
    fn overrides_are_per_thread() {
        let _guard = set_time_source(frozen(2020, 6, 1));
        let other = std::thread::spawn(|| matches!(time_source(), TimeSource::System));
        check!(other.join().unwrap());
    }
}
