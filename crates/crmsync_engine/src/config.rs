//! Configuration for the sync engine.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Commercial plan of a tenant; decides the pause between pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlanTier {
    /// Higher remote throughput allowance.
    Enterprise,
    /// Every other plan.
    #[default]
    Standard,
}

impl FromStr for PlanTier {
    type Err = std::convert::Infallible;

    /// Anything but `enterprise` (case-insensitive) is the standard tier.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("enterprise") {
            Ok(PlanTier::Enterprise)
        } else {
            Ok(PlanTier::Standard)
        }
    }
}

impl fmt::Display for PlanTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanTier::Enterprise => f.write_str("enterprise"),
            PlanTier::Standard => f.write_str("standard"),
        }
    }
}

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Records per remote page. The remote never returns more.
    pub page_size: usize,
    /// Maximum number of full passes before a divergence is terminal.
    pub full_attempts: u32,
    /// Largest count difference repaired by a single corrective pass.
    pub corrective_threshold: u64,
    /// Trailing window of an incremental pass, in hours.
    pub incremental_window_hours: u32,
    /// UTC offset used to render the incremental window bound.
    pub utc_offset_hours: i32,
    /// Progress is logged every this many records on filtered passes.
    pub progress_every: u64,
    /// Retry configuration.
    pub retry: RetryConfig,
    /// Rate-limit cooperation.
    pub pacing: PacingConfig,
}

impl SyncConfig {
    /// Creates a configuration with production defaults.
    pub fn new() -> Self {
        Self {
            page_size: 50,
            full_attempts: 2,
            corrective_threshold: 20,
            incremental_window_hours: 10,
            utc_offset_hours: -3,
            progress_every: 500,
            retry: RetryConfig::default(),
            pacing: PacingConfig::default(),
        }
    }

    /// Sets the full-pass attempt cap.
    pub fn with_full_attempts(mut self, attempts: u32) -> Self {
        self.full_attempts = attempts.max(1);
        self
    }

    /// Sets the corrective-pass threshold.
    pub fn with_corrective_threshold(mut self, threshold: u64) -> Self {
        self.corrective_threshold = threshold;
        self
    }

    /// Sets the incremental window.
    pub fn with_incremental_window(mut self, hours: u32) -> Self {
        self.incremental_window_hours = hours;
        self
    }

    /// Sets the UTC offset of rendered timestamps.
    pub fn with_utc_offset(mut self, hours: i32) -> Self {
        self.utc_offset_hours = hours;
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the pacing configuration.
    pub fn with_pacing(mut self, pacing: PacingConfig) -> Self {
        self.pacing = pacing;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for retry behavior.
///
/// Only time-limit failures are retried, with a fixed delay.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries of one call.
    pub max_retries: u32,
    /// Delay before each retry.
    pub delay: Duration,
}

impl RetryConfig {
    /// Creates a new retry configuration.
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            delay: Duration::from_secs(10),
        }
    }

    /// Creates a configuration with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            delay: Duration::ZERO,
        }
    }

    /// Sets the delay between retries.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}

/// How a pass cooperates with the remote rate limiter.
#[derive(Debug, Clone)]
pub struct PacingConfig {
    /// Pause between full pages for enterprise tenants.
    pub enterprise_pause: Duration,
    /// Pause between full pages for other tenants.
    pub standard_pause: Duration,
    /// Operating time above which the pass waits for the window to reset.
    pub operating_high_water: f64,
    /// Added to the reported reset time.
    pub reset_margin: Duration,
    /// Lower bound of any rate-limit wait.
    pub min_wait: Duration,
    /// Assumed time to reset when the remote does not report one.
    pub default_reset: Duration,
}

impl PacingConfig {
    /// Disables every pause and wait.
    pub fn none() -> Self {
        Self {
            enterprise_pause: Duration::ZERO,
            standard_pause: Duration::ZERO,
            operating_high_water: f64::INFINITY,
            reset_margin: Duration::ZERO,
            min_wait: Duration::ZERO,
            default_reset: Duration::ZERO,
        }
    }

    /// Sets the operating high-water mark.
    pub fn with_high_water(mut self, operating: f64) -> Self {
        self.operating_high_water = operating;
        self
    }

    /// Pause between pages for a plan.
    pub fn pause_for(&self, plan: PlanTier) -> Duration {
        match plan {
            PlanTier::Enterprise => self.enterprise_pause,
            PlanTier::Standard => self.standard_pause,
        }
    }

    /// How long to wait after a page reporting `operating` time, if at all.
    ///
    /// `now` and `reset_at` are Unix seconds.
    pub fn rate_limit_wait(
        &self,
        operating: Option<f64>,
        reset_at: Option<i64>,
        now: i64,
    ) -> Option<Duration> {
        let operating = operating?;
        if operating <= self.operating_high_water {
            return None;
        }
        let reset_at = reset_at.unwrap_or(now + self.default_reset.as_secs() as i64);
        let until_reset = reset_at - now + self.reset_margin.as_secs() as i64;
        let wait = Duration::from_secs(until_reset.max(0) as u64);
        Some(wait.max(self.min_wait))
    }
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            enterprise_pause: Duration::from_millis(200),
            standard_pause: Duration::from_millis(500),
            operating_high_water: 400.0,
            reset_margin: Duration::from_secs(5),
            min_wait: Duration::from_secs(10),
            default_reset: Duration::from_secs(60),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_config_builder() {
        let config = SyncConfig::new()
            .with_full_attempts(0)
            .with_corrective_threshold(5)
            .with_incremental_window(24)
            .with_utc_offset(0);

        assert_eq!(config.page_size, 50);
        assert_eq!(config.full_attempts, 1);
        assert_eq!(config.corrective_threshold, 5);
        assert_eq!(config.incremental_window_hours, 24);
        assert_eq!(config.utc_offset_hours, 0);
    }

    #[test]
    fn retry_config_no_retry() {
        let config = RetryConfig::no_retry();
        assert_eq!(config.max_retries, 0);
        assert_eq!(RetryConfig::default().delay, Duration::from_secs(10));
    }

    #[test]
    fn plan_parsing() {
        assert_eq!("Enterprise".parse::<PlanTier>(), Ok(PlanTier::Enterprise));
        assert_eq!("others".parse::<PlanTier>(), Ok(PlanTier::Standard));
        let pacing = PacingConfig::default();
        assert_eq!(pacing.pause_for(PlanTier::Enterprise), Duration::from_millis(200));
        assert_eq!(pacing.pause_for(PlanTier::Standard), Duration::from_millis(500));
    }

    #[test]
    fn rate_limit_wait_calculation() {
        let pacing = PacingConfig::default();
        let now = 1_700_000_000;

        assert_eq!(pacing.rate_limit_wait(None, None, now), None);
        assert_eq!(pacing.rate_limit_wait(Some(400.0), None, now), None);

        // Reset in 30 s plus the 5 s margin.
        assert_eq!(
            pacing.rate_limit_wait(Some(401.0), Some(now + 30), now),
            Some(Duration::from_secs(35))
        );
        // Never below the minimum wait.
        assert_eq!(
            pacing.rate_limit_wait(Some(450.0), Some(now - 100), now),
            Some(Duration::from_secs(10))
        );
        // Unknown reset assumes one minute.
        assert_eq!(
            pacing.rate_limit_wait(Some(450.0), None, now),
            Some(Duration::from_secs(65))
        );
        assert_eq!(PacingConfig::none().rate_limit_wait(Some(1e9), None, now), None);
    }
}
