use std::time::Duration;

use chrono::TimeDelta;

/// Runtime configuration for the controller.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub namespace: String,
    /// API server URL; `None` means infer from the environment.
    pub host: Option<String>,
    pub log_level: String,
    pub gc_enabled: bool,
    pub gc_interval_minutes: u64,
    pub gc_age_hours: f64,
    pub template_selector: String,
    pub watch_retry_max: u32,
    pub watch_retry_backoff_ms: u64,
    pub drain_timeout_secs: u64,
}

impl AppConfig {
    #[must_use]
    pub fn gc_interval(&self) -> Duration {
        Duration::from_secs(self.gc_interval_minutes.saturating_mul(60))
    }

    /// Retention threshold as a signed delta comparable with execution ages.
    ///
    /// `gc_age_hours` is validated at load time to be finite, non-negative
    /// and bounded, so the conversion cannot overflow.
    #[must_use]
    pub fn gc_max_age(&self) -> TimeDelta {
        #[allow(clippy::cast_possible_truncation)]
        let millis = (self.gc_age_hours * 3_600_000.0).round() as i64;
        TimeDelta::milliseconds(millis)
    }

    #[must_use]
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }
}
