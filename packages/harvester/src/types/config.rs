//! Harvest configuration.

use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Browser user agents handed out to workers round-robin.
pub const DEFAULT_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/117.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.0 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/116.0.0.0 Safari/537.36",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 16_4 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.4 Mobile/15E148 Safari/604.1",
];

const MAX_WORKERS: usize = 64;

/// Configuration for a harvest run.
///
/// Every field has a default, so an empty environment is a valid config.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    /// Worker pool width. Default: 12.
    pub workers: usize,

    /// Per-request timeout. Default: 15s.
    pub request_timeout: Duration,

    /// Total fetch attempts per URL. Default: 5.
    pub max_retries: u32,

    /// First backoff interval; doubles per attempt. Default: 1s.
    pub backoff_base: Duration,

    /// Upper bound for a single backoff sleep. Default: 60s.
    pub backoff_max: Duration,

    /// Relative jitter applied to each backoff sleep (0.0 to 1.0). Default: 0.25.
    pub jitter: f64,

    /// Completions between reclamation checkpoints. Default: 1000.
    pub reclaim_interval: usize,

    /// Idle connections kept per host by each worker's client. Default: `workers`.
    pub pool_size: Option<usize>,

    /// User agents handed out to workers round-robin.
    pub user_agents: Vec<String>,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            workers: 12,
            request_timeout: Duration::from_secs(15),
            max_retries: 5,
            backoff_base: Duration::from_secs(1),
            backoff_max: Duration::from_secs(60),
            jitter: 0.25,
            reclaim_interval: 1000,
            pool_size: None,
            user_agents: DEFAULT_USER_AGENTS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl HarvestConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from process environment variables, falling back to defaults.
    ///
    /// Call `dotenvy::dotenv()` first if a `.env` file should be honored.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load using an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(v) = parse_var::<usize, _>(&lookup, "HARVEST_WORKERS")? {
            cfg.workers = v;
        }
        if let Some(v) = parse_var::<u64, _>(&lookup, "HARVEST_REQUEST_TIMEOUT_SECS")? {
            cfg.request_timeout = Duration::from_secs(v);
        }
        if let Some(v) = parse_var::<u32, _>(&lookup, "HARVEST_MAX_RETRIES")? {
            cfg.max_retries = v;
        }
        if let Some(v) = parse_var::<u64, _>(&lookup, "HARVEST_BACKOFF_BASE_MS")? {
            cfg.backoff_base = Duration::from_millis(v);
        }
        if let Some(v) = parse_var::<u64, _>(&lookup, "HARVEST_BACKOFF_MAX_MS")? {
            cfg.backoff_max = Duration::from_millis(v);
        }
        if let Some(v) = parse_var::<f64, _>(&lookup, "HARVEST_JITTER")? {
            cfg.jitter = v;
        }
        if let Some(v) = parse_var::<usize, _>(&lookup, "HARVEST_RECLAIM_INTERVAL")? {
            cfg.reclaim_interval = v;
        }
        if let Some(v) = parse_var::<usize, _>(&lookup, "HARVEST_POOL_SIZE")? {
            cfg.pool_size = Some(v);
        }

        cfg.validate()?;
        Ok(cfg)
    }

    /// Check ranges. Called by the loaders and by the runner before starting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 || self.workers > MAX_WORKERS {
            return Err(ConfigError::OutOfRange {
                field: "workers",
                reason: format!("{} not in 1..={}", self.workers, MAX_WORKERS),
            });
        }
        if self.max_retries == 0 {
            return Err(ConfigError::OutOfRange {
                field: "max_retries",
                reason: "at least one attempt is required".to_string(),
            });
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::OutOfRange {
                field: "request_timeout",
                reason: "must be positive".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(ConfigError::OutOfRange {
                field: "jitter",
                reason: format!("{} not in 0.0..=1.0", self.jitter),
            });
        }
        if self.backoff_max < self.backoff_base {
            return Err(ConfigError::OutOfRange {
                field: "backoff_max",
                reason: "must be >= backoff_base".to_string(),
            });
        }
        if self.reclaim_interval == 0 {
            return Err(ConfigError::OutOfRange {
                field: "reclaim_interval",
                reason: "must be positive".to_string(),
            });
        }
        if self.user_agents.is_empty() {
            return Err(ConfigError::OutOfRange {
                field: "user_agents",
                reason: "at least one user agent is required".to_string(),
            });
        }
        Ok(())
    }

    /// Set the worker pool width.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set the per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set total attempts per URL.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set backoff base and cap.
    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.backoff_base = base;
        self.backoff_max = max;
        self
    }

    /// Set backoff jitter.
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    /// Set the reclamation checkpoint interval.
    pub fn with_reclaim_interval(mut self, interval: usize) -> Self {
        self.reclaim_interval = interval;
        self
    }

    /// Set idle connections kept per host.
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = Some(pool_size);
        self
    }

    /// Replace the user agent rotation.
    pub fn with_user_agents(mut self, agents: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.user_agents = agents.into_iter().map(Into::into).collect();
        self
    }

    /// Effective idle pool size per host.
    pub fn effective_pool_size(&self) -> usize {
        self.pool_size.unwrap_or(self.workers)
    }

    /// User agent for a given worker.
    pub fn user_agent_for(&self, worker_index: usize) -> &str {
        &self.user_agents[worker_index % self.user_agents.len()]
    }
}

fn parse_var<T, F>(lookup: &F, name: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(name) else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse::<T>()
        .map(Some)
        .map_err(|e| ConfigError::InvalidEnv {
            name: name.to_string(),
            value: raw.clone(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let cfg = HarvestConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.workers, 12);
        assert_eq!(cfg.max_retries, 5);
        assert_eq!(cfg.effective_pool_size(), 12);
    }

    #[test]
    fn test_empty_environment_uses_defaults() {
        let cfg = HarvestConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(cfg.workers, 12);
        assert_eq!(cfg.request_timeout, Duration::from_secs(15));
    }

    #[test]
    fn test_env_overrides() {
        let cfg = HarvestConfig::from_lookup(lookup_from(&[
            ("HARVEST_WORKERS", "20"),
            ("HARVEST_REQUEST_TIMEOUT_SECS", "10"),
            ("HARVEST_MAX_RETRIES", "3"),
            ("HARVEST_BACKOFF_BASE_MS", "500"),
            ("HARVEST_JITTER", "0.1"),
            ("HARVEST_RECLAIM_INTERVAL", "250"),
            ("HARVEST_POOL_SIZE", "4"),
            ("HARVEST_BACKOFF_MAX_MS", ""),
        ]))
        .unwrap();

        assert_eq!(cfg.workers, 20);
        assert_eq!(cfg.request_timeout, Duration::from_secs(10));
        assert_eq!(cfg.max_retries, 3);
        assert_eq!(cfg.backoff_base, Duration::from_millis(500));
        assert_eq!(cfg.backoff_max, Duration::from_secs(60));
        assert_eq!(cfg.reclaim_interval, 250);
        assert_eq!(cfg.effective_pool_size(), 4);
    }

    #[test]
    fn test_invalid_env_value() {
        let err = HarvestConfig::from_lookup(lookup_from(&[("HARVEST_WORKERS", "many")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { ref name, .. } if name == "HARVEST_WORKERS"));
    }

    #[test]
    fn test_out_of_range() {
        assert!(HarvestConfig::new().with_workers(0).validate().is_err());
        assert!(HarvestConfig::new().with_max_retries(0).validate().is_err());
        assert!(HarvestConfig::new().with_jitter(1.5).validate().is_err());
        assert!(HarvestConfig::new()
            .with_backoff(Duration::from_secs(5), Duration::from_secs(1))
            .validate()
            .is_err());
    }

    #[test]
    fn test_user_agent_rotation() {
        let cfg = HarvestConfig::new().with_user_agents(["a", "b"]);
        assert_eq!(cfg.user_agent_for(0), "a");
        assert_eq!(cfg.user_agent_for(1), "b");
        assert_eq!(cfg.user_agent_for(2), "a");
    }
}
