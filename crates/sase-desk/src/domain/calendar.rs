//! Business calendar
//!
//! Fixed weekly opening hours in one UTC offset, minus a holiday list.
//! Durations measured against the calendar only count open time.

use chrono::{
    DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset,
    TimeZone, Utc, Weekday,
};
use std::collections::BTreeSet;

use crate::error::{ConfigurationError, DeskError};

/// How far forward a deadline search walks before giving up.
pub const MAX_CALENDAR_DAYS: u32 = 3660;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BusinessCalendar {
    offset: FixedOffset,
    /// Opening window per weekday, indexed from Monday
    hours: [Option<(NaiveTime, NaiveTime)>; 7],
    holidays: BTreeSet<NaiveDate>,
}

impl BusinessCalendar {
    /// Calendar with no open hours; add windows with [`Self::with_window`].
    pub fn closed(offset: FixedOffset) -> Self {
        Self {
            offset,
            hours: [None; 7],
            holidays: BTreeSet::new(),
        }
    }

    /// Monday to Friday, 09:00 to 17:00 UTC.
    pub fn standard() -> Self {
        let open = NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN);
        let close = NaiveTime::from_hms_opt(17, 0, 0).unwrap_or(NaiveTime::MIN);
        let mut calendar = Self::closed(Utc.fix());
        for day in [Weekday::Mon, Weekday::Tue, Weekday::Wed, Weekday::Thu, Weekday::Fri] {
            calendar.hours[day.num_days_from_monday() as usize] = Some((open, close));
        }
        calendar
    }

    pub fn with_window(
        mut self,
        day: Weekday,
        open: NaiveTime,
        close: NaiveTime,
    ) -> Result<Self, ConfigurationError> {
        if open >= close {
            return Err(ConfigurationError::InvalidCalendar(format!(
                "{} opens at {} but closes at {}",
                day, open, close
            )));
        }
        self.hours[day.num_days_from_monday() as usize] = Some((open, close));
        Ok(self)
    }

    pub fn with_holidays(mut self, holidays: impl IntoIterator<Item = NaiveDate>) -> Self {
        self.holidays.extend(holidays);
        self
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Fails when no weekday has opening hours.
    pub fn ensure_open_somewhere(&self) -> Result<(), ConfigurationError> {
        if self.hours.iter().all(Option::is_none) {
            return Err(ConfigurationError::InvalidCalendar("no opening hours configured".into()));
        }
        Ok(())
    }

    fn window(&self, date: NaiveDate) -> Option<(NaiveDateTime, NaiveDateTime)> {
        if self.holidays.contains(&date) {
            return None;
        }
        self.hours[date.weekday().num_days_from_monday() as usize]
            .map(|(open, close)| (date.and_time(open), date.and_time(close)))
    }

    fn to_local(&self, at: DateTime<Utc>) -> NaiveDateTime {
        at.with_timezone(&self.offset).naive_local()
    }

    fn to_utc(&self, local: NaiveDateTime) -> DateTime<Utc> {
        let utc = local - Duration::seconds(i64::from(self.offset.local_minus_utc()));
        Utc.from_utc_datetime(&utc)
    }

    /// Whether `at` falls inside opening hours.
    pub fn is_open_at(&self, at: DateTime<Utc>) -> bool {
        let local = self.to_local(at);
        self.window(local.date())
            .is_some_and(|(open, close)| local >= open && local < close)
    }

    /// Walk forward from `start` until `amount` of open time has passed,
    /// carrying the remainder across closed periods.
    pub fn add_business_time(
        &self,
        start: DateTime<Utc>,
        amount: Duration,
    ) -> Result<DateTime<Utc>, DeskError> {
        if amount <= Duration::zero() {
            return Ok(start);
        }
        let mut remaining = amount;
        let mut cursor = self.to_local(start);

        for _ in 0..MAX_CALENDAR_DAYS {
            let date = cursor.date();
            if let Some((open, close)) = self.window(date) {
                if cursor < open {
                    cursor = open;
                }
                if cursor < close {
                    let available = close - cursor;
                    if remaining <= available {
                        return Ok(self.to_utc(cursor + remaining));
                    }
                    remaining = remaining - available;
                }
            }
            cursor = match date.succ_opt() {
                Some(next) => next.and_time(NaiveTime::MIN),
                None => break,
            };
        }
        Err(DeskError::CalendarExhausted { days: MAX_CALENDAR_DAYS })
    }

    /// Open time between `from` and `to`; zero when `to <= from`.
    pub fn business_time_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Duration {
        if to <= from {
            return Duration::zero();
        }
        let (from, to) = (self.to_local(from), self.to_local(to));
        let mut total = Duration::zero();
        let mut date = from.date();

        for _ in 0..MAX_CALENDAR_DAYS {
            if let Some((open, close)) = self.window(date) {
                let start = open.max(from);
                let end = close.min(to);
                if end > start {
                    total = total + (end - start);
                }
            }
            if date >= to.date() {
                break;
            }
            date = match date.succ_opt() {
                Some(next) => next,
                None => break,
            };
        }
        total
    }
}

impl Default for BusinessCalendar {
    fn default() -> Self {
        Self::standard()
    }
}
