//! Session-monitor math: elapsed time against a configurable limit.
//!
//! Pure over an injected "now" so the watcher cadence stays out of the tests.

use chrono::{DateTime, Duration, Utc};

#[derive(Debug, Clone)]
pub struct MonitorSession {
    pub started_at: DateTime<Utc>,
    pub limit_seconds: f64,
    /// Latched by the watcher once the limit is crossed; at most one alert.
    pub limit_hit: bool,
}

impl MonitorSession {
    pub fn new(limit_hours: f64) -> Self {
        Self::starting_at(Utc::now(), limit_hours)
    }

    pub fn starting_at(started_at: DateTime<Utc>, limit_hours: f64) -> Self {
        Self {
            started_at,
            limit_seconds: limit_hours * 3600.0,
            limit_hit: false,
        }
    }

    pub fn elapsed_at(&self, now: DateTime<Utc>) -> Duration {
        (now - self.started_at).max(Duration::zero())
    }

    pub fn elapsed_seconds_at(&self, now: DateTime<Utc>) -> f64 {
        self.elapsed_at(now).num_milliseconds() as f64 / 1000.0
    }

    pub fn over_limit_at(&self, now: DateTime<Utc>) -> bool {
        self.elapsed_seconds_at(now) > self.limit_seconds
    }
}

/// `HH:MM:SS` wall-clock rendering of an elapsed duration.
pub fn format_clock(elapsed: Duration) -> String {
    let total = elapsed.num_seconds().max(0);
    format!(
        "{:02}:{:02}:{:02}",
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}
