use std::collections::{BTreeMap, HashMap};
use std::env;
use std::num::NonZeroUsize;
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::debug;

use crate::error::{BuildError, Result};

/// Opaque PEP 517 `config_settings`, flattened to strings.
pub type ConfigSettings = BTreeMap<String, String>;

/// 1980-01-01T00:00:00Z, the earliest timestamp a zip member can carry.
pub const DEFAULT_SOURCE_DATE_EPOCH: u64 = 315_532_800;

pub const SOURCE_DATE_EPOCH_ENV: &str = "SOURCE_DATE_EPOCH";
pub const JOBS_ENV: &str = "KILN_JOBS";
pub const TIMEOUT_ENV: &str = "KILN_BUILD_TIMEOUT";

#[derive(Debug, Clone)]
pub(crate) struct EnvSnapshot {
    vars: HashMap<String, String>,
}

impl EnvSnapshot {
    pub(crate) fn capture() -> Self {
        Self {
            vars: env::vars().collect(),
        }
    }

    pub(crate) fn var(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.trim().is_empty())
    }

    #[cfg(test)]
    pub(crate) fn testing(pairs: &[(&str, &str)]) -> Self {
        let vars = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Self { vars }
    }
}

/// Resolved knobs for a single build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildSettings {
    /// Size of the hashing worker pool.
    pub jobs: usize,
    /// Timestamp stamped on every archive member.
    pub source_date_epoch: u64,
    pub timeout: Option<Duration>,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            jobs: default_jobs(),
            source_date_epoch: DEFAULT_SOURCE_DATE_EPOCH,
            timeout: None,
        }
    }
}

impl BuildSettings {
    /// Resolves settings from `config_settings` first, then the process environment.
    pub fn from_config(config: &ConfigSettings) -> Result<Self> {
        Self::from_sources(config, &EnvSnapshot::capture())
    }

    pub(crate) fn from_sources(config: &ConfigSettings, env: &EnvSnapshot) -> Result<Self> {
        let mut settings = Self::default();
        for key in config.keys() {
            if !matches!(key.as_str(), "jobs" | "timeout") {
                debug!(key = %key, "ignoring unknown config setting");
            }
        }
        if let Some(epoch) = env.var(SOURCE_DATE_EPOCH_ENV) {
            settings.source_date_epoch = parse_number(SOURCE_DATE_EPOCH_ENV, epoch)?;
        }
        let jobs = config
            .get("jobs")
            .map(|value| ("jobs", value.as_str()))
            .or_else(|| env.var(JOBS_ENV).map(|value| (JOBS_ENV, value)));
        if let Some((key, value)) = jobs {
            let jobs: usize = parse_number(key, value)?;
            if jobs == 0 {
                return Err(BuildError::Configuration(format!(
                    "`{key}` must be at least 1"
                )));
            }
            settings.jobs = jobs;
        }
        let timeout = config
            .get("timeout")
            .map(|value| ("timeout", value.as_str()))
            .or_else(|| env.var(TIMEOUT_ENV).map(|value| (TIMEOUT_ENV, value)));
        if let Some((key, value)) = timeout {
            settings.timeout = Some(Duration::from_secs(parse_number(key, value)?));
        }
        Ok(settings)
    }

    #[must_use]
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    #[must_use]
    pub fn with_source_date_epoch(mut self, epoch: u64) -> Self {
        self.source_date_epoch = epoch;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Starts the build clock. A timeout past what `Instant` can represent never expires.
    pub fn deadline(&self) -> Deadline {
        let now = Instant::now();
        let at = self.timeout.and_then(|timeout| {
            let at = now.checked_add(timeout);
            if at.is_none() {
                debug!(secs = timeout.as_secs(), "timeout out of range; build has no deadline");
            }
            at
        });
        Deadline { at }
    }
}

/// Point in time after which a build must stop and discard its output.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    pub fn none() -> Self {
        Self { at: None }
    }

    pub fn check(&self, phase: &'static str) -> Result<()> {
        match self.at {
            Some(at) if Instant::now() >= at => Err(BuildError::DeadlineExceeded { phase }),
            _ => Ok(()),
        }
    }
}

fn default_jobs() -> usize {
    thread::available_parallelism().map_or(1, NonZeroUsize::get)
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        BuildError::Configuration(format!("`{key}` must be a non-negative integer (got `{value}`)"))
    })
}
