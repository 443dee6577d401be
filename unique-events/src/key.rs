//! Time bucketing and storage key construction.
//!
//! Every key carries a `{...}` hash tag: the event's redis slot when it has one, otherwise
//! the event name. Events in one slot share the tag, so their keys can be counted in a
//! single union. The event name is always part of the key, so two events never collide.
//!
//! | aggregation | key                                                |
//! |-------------|----------------------------------------------------|
//! | daily       | `{i_search_total}-2020-153`                        |
//! | weekly      | `{analytics}:g_analytics_contribution-2020-W22`    |
//! | in context  | `free_{analytics}:g_analytics_contribution-2020-W22` |
//!
//! Daily buckets use the calendar year and day of year; weekly buckets use the ISO
//! week-year and week number of the Monday that starts the week.

use std::fmt;

use chrono::{Datelike, Days, NaiveDate};

use crate::catalog::{Aggregation, EventDefinition};

/// Storage key of one event for one period.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BucketKey<'a> {
    event: &'a EventDefinition,
    period_start: NaiveDate,
    context: Option<&'a str>,
}

impl<'a> BucketKey<'a> {
    /// The event this key belongs to
    pub fn event(&self) -> &'a EventDefinition {
        self.event
    }

    /// First day of the bucket's period
    pub fn period_start(&self) -> NaiveDate {
        self.period_start
    }

    /// Context prefix, if any
    pub fn context(&self) -> Option<&'a str> {
        self.context
    }
}

impl fmt::Display for BucketKey<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(context) = self.context {
            write!(f, "{context}_")?;
        }
        match self.event.redis_slot() {
            Some(slot) => write!(f, "{{{slot}}}:{}", self.event.name())?,
            None => write!(f, "{{{}}}", self.event.name())?,
        }
        match self.event.aggregation() {
            Aggregation::Daily => write!(
                f,
                "-{:04}-{:03}",
                self.period_start.year(),
                self.period_start.ordinal()
            ),
            Aggregation::Weekly => {
                let week = self.period_start.iso_week();
                write!(f, "-{:04}-W{:02}", week.year(), week.week())
            }
        }
    }
}

/// Key of `event` for the period containing `date`.
///
/// An empty context is the same as no context.
pub fn build_key<'a>(
    event: &'a EventDefinition,
    date: NaiveDate,
    context: Option<&'a str>,
) -> BucketKey<'a> {
    BucketKey {
        event,
        period_start: period_start(event.aggregation(), date),
        context: context.filter(|c| !c.is_empty()),
    }
}

/// First day of the period containing `date`: the day itself, or the Monday of its week.
pub fn period_start(aggregation: Aggregation, date: NaiveDate) -> NaiveDate {
    match aggregation {
        Aggregation::Daily => date,
        Aggregation::Weekly => {
            let offset = u64::from(date.weekday().num_days_from_monday());
            date.checked_sub_days(Days::new(offset)).unwrap_or(date)
        }
    }
}

/// Period starts to read for a query over `[start_date, end_date]`, evaluated on `today`.
///
/// Daily: every day of the range. Weekly: the Monday of every week overlapping the range,
/// except weeks that have not ended before `today`. The week containing `today` is still
/// in progress, so it is left out however the range is given; a range that lies entirely
/// in the past gets all of its weeks.
///
/// One period is produced per day or week of the range, and the caller builds a key for
/// each, so the cost of a query grows linearly with the length of its range.
pub fn enumerate_period_starts(
    aggregation: Aggregation,
    start_date: NaiveDate,
    end_date: NaiveDate,
    today: NaiveDate,
) -> Vec<NaiveDate> {
    match aggregation {
        Aggregation::Daily => std::iter::successors(Some(start_date), |day| day.succ_opt())
            .take_while(|day| *day <= end_date)
            .collect(),
        Aggregation::Weekly => {
            let in_progress = period_start(Aggregation::Weekly, today);
            std::iter::successors(Some(period_start(Aggregation::Weekly, start_date)), |monday| {
                monday.checked_add_days(Days::new(7))
            })
            .take_while(|monday| *monday <= end_date && *monday < in_progress)
            .collect()
        }
    }
}
