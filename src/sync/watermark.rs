use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};

use crate::state::LogEntry;

/// Lower bound used for a subject with no history; earlier than any real
/// registry data.
pub fn epoch_floor() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1900, 1, 1)
        .unwrap_or(NaiveDate::MIN)
        .and_time(NaiveTime::default())
}

/// Inclusive start of the next query for a subject: one second past the
/// latest `log_date` in its history, or [`epoch_floor`] if there is none.
///
/// The registry's start bound is inclusive, so without the extra second the
/// most recent batch would be returned again on every run.
pub fn next_query_start(history: &[LogEntry]) -> NaiveDateTime {
    history.iter().fold(epoch_floor(), |start, entry| {
        if entry.log_date >= start {
            entry
                .log_date
                .checked_add_signed(Duration::seconds(1))
                .unwrap_or(entry.log_date)
        } else {
            start
        }
    })
}
