//! Utility functions and clocks for the lobby service

use chrono::{DateTime, Duration, Local, NaiveTime, TimeZone, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Generate a new unique connection ID
pub fn generate_connection_id() -> u64 {
    NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed)
}

/// Get the current UTC timestamp
pub fn current_timestamp() -> DateTime<Utc> {
    Utc::now()
}

/// Source of wall-clock time, injectable so log dating and rotation can be tested
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

/// The real local clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// A clock that only moves when told to
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Local>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Local>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    /// Build a clock at a local wall-clock time
    pub fn at(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> Self {
        let start = Local
            .with_ymd_and_hms(year, month, day, hour, minute, 0)
            .earliest()
            .unwrap_or_else(Local::now);
        Self::new(start)
    }

    pub fn set(&self, to: DateTime<Local>) {
        if let Ok(mut now) = self.now.lock() {
            *now = to;
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += by;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Local> {
        self.now.lock().map(|now| *now).unwrap_or_else(|_| Local::now())
    }
}

/// Time left until the next local midnight after `now`
pub fn until_next_midnight(now: DateTime<Local>) -> std::time::Duration {
    let tomorrow = now.date_naive().succ_opt().unwrap_or(now.date_naive());
    let midnight = tomorrow
        .and_time(NaiveTime::MIN)
        .and_local_timezone(Local)
        .earliest();

    match midnight {
        Some(midnight) if midnight > now => (midnight - now)
            .to_std()
            .unwrap_or(std::time::Duration::from_secs(24 * 60 * 60)),
        _ => std::time::Duration::from_secs(24 * 60 * 60),
    }
}

/// Directory/file date label, e.g. `5-March-2016`
pub fn date_label(at: DateTime<Local>) -> String {
    at.format("%-d-%B-%Y").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_unique_ids() {
        let id1 = generate_connection_id();
        let id2 = generate_connection_id();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::at(2016, 3, 5, 23, 30);
        clock.advance(Duration::minutes(45));
        assert_eq!(date_label(clock.now()), "6-March-2016");
    }

    #[test]
    fn test_until_next_midnight() {
        let clock = ManualClock::at(2016, 3, 5, 23, 30);
        let wait = until_next_midnight(clock.now());
        assert_eq!(wait, std::time::Duration::from_secs(30 * 60));

        let clock = ManualClock::at(2016, 3, 5, 0, 0);
        let wait = until_next_midnight(clock.now());
        assert_eq!(wait, std::time::Duration::from_secs(24 * 60 * 60));
    }

    #[test]
    fn test_date_label() {
        let clock = ManualClock::at(2016, 11, 21, 12, 0);
        assert_eq!(date_label(clock.now()), "21-November-2016");
    }
}
