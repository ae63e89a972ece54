use chrono::{DateTime, FixedOffset, Offset, Utc};

use crate::DayWindow;

/// The configuration of the U-Do domain rules
#[derive(Debug, Clone)]
pub struct Config {
    /// Offset from UTC, in minutes, used to decide where "today" begins and ends
    pub utc_offset_minutes: i32,
    /// How many users a username search returns at most
    pub search_limit: usize,
    /// Username searches shorter than this return nothing
    pub min_search_length: usize,
    /// How many archived tasks are in a page when none is requested
    pub archive_page_size: usize,
    /// The largest archive page a caller may ask for
    pub max_page_size: usize,
    /// How long a login session stays valid
    pub session_duration_in_days: i64,
    /// How long an emailed verification code can be used
    pub verification_code_ttl_in_minutes: i64,
    /// How many digits a verification code has
    pub verification_code_length: usize,
    /// Guesses allowed against one verification code before it is discarded
    pub max_verification_attempts: i32,
}

/// Whether `minutes` is an offset from UTC that a day can be placed at
pub fn is_valid_utc_offset(minutes: i32) -> bool {
    minutes
        .checked_mul(60)
        .and_then(FixedOffset::east_opt)
        .is_some()
}

impl Config {
    /// Returns the configured offset, falling back to UTC when out of range
    pub fn utc_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).unwrap_or_else(|| Utc.fix())
    }

    /// Returns the day that contains `now`
    pub fn day_window(&self, now: DateTime<Utc>) -> DayWindow {
        DayWindow::at(now, self.utc_offset())
    }

    /// Clamps a requested page size to the configured bounds
    pub fn page_size(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.archive_page_size)
            .clamp(1, self.max_page_size.max(1))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            utc_offset_minutes: 0,
            search_limit: 10,
            min_search_length: 2,
            archive_page_size: 20,
            max_page_size: 100,
            session_duration_in_days: 7,
            verification_code_ttl_in_minutes: 10,
            verification_code_length: 6,
            max_verification_attempts: 5,
        }
    }
}

#[cfg(test)]
mod test {
    use super::{is_valid_utc_offset, Config};

    #[test]
    fn page_size_is_clamped() {
        let config = Config::default();

        assert_eq!(config.page_size(None), 20);
        assert_eq!(config.page_size(Some(0)), 1);
        assert_eq!(config.page_size(Some(5000)), 100);
    }

    #[test]
    fn out_of_range_offset_falls_back_to_utc() {
        let config = Config {
            utc_offset_minutes: 60 * 48,
            ..Default::default()
        };

        assert_eq!(config.utc_offset().local_minus_utc(), 0);
    }

    #[test]
    fn offsets_must_stay_within_a_day() {
        assert!(is_valid_utc_offset(0));
        assert!(is_valid_utc_offset(-300));
        assert!(is_valid_utc_offset(14 * 60));
        assert!(!is_valid_utc_offset(24 * 60));
        assert!(!is_valid_utc_offset(5000));
        assert!(!is_valid_utc_offset(i32::MIN));
    }
}
