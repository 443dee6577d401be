// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, NaiveDate, NaiveTime, TimeDelta, Utc};

use crate::Time;

/// A clock that never moves.
///
/// ```
/// use chrono::NaiveDate;
/// use unique_events_timesource::{TimeSource, fakes::StaticTimeSource};
///
/// let monday = NaiveDate::from_ymd_opt(2020, 6, 1).unwrap();
/// let ts = TimeSource::custom(StaticTimeSource::on_date(monday));
/// assert_eq!(ts.now(), monday.and_hms_opt(0, 0, 0).unwrap().and_utc());
/// ```
#[derive(Debug, Clone, Copy)]
pub struct StaticTimeSource {
    now: DateTime<Utc>,
}

impl StaticTimeSource {
    /// Frozen at `time`
    pub fn at_time(time: DateTime<Utc>) -> Self {
        Self { now: time }
    }

    /// Frozen at midnight UTC of `date`
    pub fn on_date(date: NaiveDate) -> Self {
        Self::at_time(date.and_time(NaiveTime::MIN).and_utc())
    }
}

impl Time for StaticTimeSource {
    fn now(&self) -> DateTime<Utc> {
        self.now
    }
}

/// A clock moved by hand. Clones share the same time, so a test can keep one handle and
/// give the other to the code under test.
///
/// ```
/// use chrono::{DateTime, TimeDelta};
/// use unique_events_timesource::{TimeSource, fakes::ManuallyAdvancedTimeSource};
///
/// let clock = ManuallyAdvancedTimeSource::at_time(DateTime::UNIX_EPOCH);
/// let ts = TimeSource::custom(clock.clone());
///
/// clock.advance(TimeDelta::days(2));
/// assert_eq!(ts.now(), DateTime::UNIX_EPOCH + TimeDelta::days(2));
/// ```
#[derive(Debug, Clone)]
pub struct ManuallyAdvancedTimeSource(Arc<Mutex<DateTime<Utc>>>);

impl ManuallyAdvancedTimeSource {
    /// Start at `time`
    pub fn at_time(time: DateTime<Utc>) -> Self {
        Self(Arc::new(Mutex::new(time)))
    }

    /// Start at midnight UTC of `date`
    pub fn on_date(date: NaiveDate) -> Self {
        Self::at_time(StaticTimeSource::on_date(date).now)
    }

    /// Jump to `time`, which may be in the past
    pub fn update_time(&self, time: DateTime<Utc>) {
        *self.current() = time;
    }

    /// Move forward by `delta`
    pub fn advance(&self, delta: TimeDelta) {
        *self.current() += delta;
    }

    fn current(&self) -> MutexGuard<'_, DateTime<Utc>> {
        // a panicking test must not wedge every other handle
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Time for ManuallyAdvancedTimeSource {
    fn now(&self) -> DateTime<Utc> {
        *self.current()
    }
}
