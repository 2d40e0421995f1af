//! Remote backend configuration.

use std::time::Duration;

use anyhow::Context;

/// Environment variable overriding [`RemoteJobConfig::poll_interval`] (milliseconds).
pub const POLL_INTERVAL_ENV: &str = "JOBKIT_POLL_INTERVAL_MS";

/// Environment variable overriding [`RemoteJobConfig::max_wait`] (milliseconds, `0` = no limit).
pub const MAX_WAIT_ENV: &str = "JOBKIT_MAX_WAIT_MS";

/// Polling behaviour of a remote job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteJobConfig {
    /// Delay between two status polls while waiting.
    pub poll_interval: Duration,
    /// Give up waiting after this long (`None` waits forever).
    pub max_wait: Option<Duration>,
}

impl Default for RemoteJobConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(250),
            max_wait: None,
        }
    }
}

impl RemoteJobConfig {
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = Some(max_wait);
        self
    }

    /// Defaults overridden by `JOBKIT_POLL_INTERVAL_MS` / `JOBKIT_MAX_WAIT_MS`.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env), reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(POLL_INTERVAL_ENV) {
            let ms: u64 = raw
                .trim()
                .parse()
                .with_context(|| format!("{POLL_INTERVAL_ENV} must be a number of milliseconds"))?;
            anyhow::ensure!(ms > 0, "{POLL_INTERVAL_ENV} must be greater than zero");
            config.poll_interval = Duration::from_millis(ms);
        }

        if let Some(raw) = lookup(MAX_WAIT_ENV) {
            let ms: u64 = raw
                .trim()
                .parse()
                .with_context(|| format!("{MAX_WAIT_ENV} must be a number of milliseconds"))?;
            config.max_wait = (ms > 0).then(|| Duration::from_millis(ms));
        }

        Ok(config)
    }
}
