use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Utc};

/// A calendar day in the user's offset, expressed as a half-open UTC range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayWindow {
    /// The calendar date of the day
    pub today: NaiveDate,
    /// The first instant of the day
    pub start: DateTime<Utc>,
    /// The first instant of the next day
    pub end: DateTime<Utc>,
}

impl DayWindow {
    /// Returns the day containing `now`, as seen from `offset`
    pub fn at(now: DateTime<Utc>, offset: FixedOffset) -> Self {
        let local = now.with_timezone(&offset);
        let since_midnight = local.time().signed_duration_since(NaiveTime::MIN);
        let start = now - since_midnight;

        Self {
            today: local.date_naive(),
            start,
            end: start + Duration::days(1),
        }
    }

    /// Returns true if the instant falls within this day
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant < self.end
    }

    pub fn next(&self) -> Self {
        self.shift(1)
    }

    pub fn previous(&self) -> Self {
        self.shift(-1)
    }

    fn shift(&self, days: i64) -> Self {
        let delta = Duration::days(days);

        Self {
            today: self.today + delta,
            start: self.start + delta,
            end: self.end + delta,
        }
    }
}
