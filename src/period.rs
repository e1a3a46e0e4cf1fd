use chrono::{DateTime, Datelike, Days, Months, NaiveTime, Utc};

/// Granularity of a bucket.
///
/// Periods are calendar periods in UTC: a day starts at 00:00:00,
/// a month on its 1st day, a year on January 1st.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Period {
    /// One calendar day.
    Day,

    /// One calendar month.
    Month,

    /// One calendar year.
    Year,
}

impl Period {
    /// All periods, finest first.
    pub const ALL: [Self; 3] = [Self::Day, Self::Month, Self::Year];

    /// Returns the start of the period enclosing `instant` (inclusive).
    ///
    /// ```
    /// use chrono::{TimeZone, Utc};
    /// use tally::Period;
    ///
    /// let ts = Utc.with_ymd_and_hms(2024, 2, 15, 13, 37, 0).unwrap();
    ///
    /// assert_eq!(
    ///     Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap(),
    ///     Period::Month.begins_at(ts),
    /// );
    /// ```
    #[must_use]
    pub fn begins_at(self, instant: DateTime<Utc>) -> DateTime<Utc> {
        let date = instant.date_naive();

        let start = match self {
            Self::Day => date,
            Self::Month => date - Days::new(u64::from(date.day0())),
            Self::Year => date - Days::new(u64::from(date.ordinal0())),
        };

        start.and_time(NaiveTime::MIN).and_utc()
    }

    /// Returns the start of the period following the one enclosing `instant` (exclusive end).
    ///
    /// # Panics
    ///
    /// Panics if the next period lies beyond the range representable by `chrono`,
    /// see [`Period::checked_ends_at`].
    #[must_use]
    pub fn ends_at(self, instant: DateTime<Utc>) -> DateTime<Utc> {
        let start = self.begins_at(instant);

        match self {
            Self::Day => start + Days::new(1),
            Self::Month => start + Months::new(1),
            Self::Year => start + Months::new(12),
        }
    }

    /// Like [`Period::ends_at`], but returns `None` instead of leaving the range of `chrono`.
    #[must_use]
    pub fn checked_ends_at(self, instant: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let start = self.begins_at(instant);

        match self {
            Self::Day => start.checked_add_days(Days::new(1)),
            Self::Month => start.checked_add_months(Months::new(1)),
            Self::Year => start.checked_add_months(Months::new(12)),
        }
    }

    /// The period whose buckets are summed to derive this one.
    ///
    /// Days are the finest granularity and have none.
    #[must_use]
    pub fn finer(self) -> Option<Self> {
        match self {
            Self::Day => None,
            Self::Month => Some(Self::Day),
            Self::Year => Some(Self::Month),
        }
    }

    /// Returns `true` if `instant` is the canonical start of its period.
    #[must_use]
    pub fn is_aligned(self, instant: DateTime<Utc>) -> bool {
        self.begins_at(instant) == instant
    }

    pub(crate) fn tag(self) -> u8 {
        match self {
            Self::Day => 0,
            Self::Month => 1,
            Self::Year => 2,
        }
    }

    pub(crate) fn from_tag(tag: u8) -> crate::Result<Self> {
        match tag {
            0 => Ok(Self::Day),
            1 => Ok(Self::Month),
            2 => Ok(Self::Year),
            _ => Err(crate::Error::Decode),
        }
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Day => "DAY",
            Self::Month => "MONTH",
            Self::Year => "YEAR",
        };
        write!(f, "{s}")
    }
}
