use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};

/// Where one calendar day ends and the next begins.
///
/// Daily gates compare dates in this offset, so a claim at 23:59 and another
/// at 00:01 fall on different days even though only two minutes passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayBoundary {
    offset: FixedOffset,
}

impl Default for DayBoundary {
    fn default() -> Self {
        Self::utc()
    }
}

impl DayBoundary {
    pub fn utc() -> Self {
        Self { offset: Utc.fix() }
    }

    pub fn from_offset_minutes(minutes: i32) -> Option<Self> {
        FixedOffset::east_opt(minutes.checked_mul(60)?).map(|offset| Self { offset })
    }

    pub fn date_of(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.offset).date_naive()
    }

    pub fn same_day(&self, a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
        self.date_of(a) == self.date_of(b)
    }

    pub fn claimed_today(&self, last: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        last.is_some_and(|last| self.same_day(last, now))
    }

    /// Whole calendar days from `earlier` to `later`.
    pub fn days_between(&self, earlier: DateTime<Utc>, later: DateTime<Utc>) -> i64 {
        (self.date_of(later) - self.date_of(earlier)).num_days()
    }
}
