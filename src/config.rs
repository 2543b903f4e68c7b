//! Engine configuration: retry/backoff knobs, request timeout and log verbosity.
//!
//! Values can come from code, from a serialized document owned by the outer layers, or from
//! `PRTG_*` environment variables layered on top.

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Which parts of an exchange are logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogLevel(u8);

impl LogLevel {
    pub const NONE: LogLevel = LogLevel(0);
    pub const TRACE: LogLevel = LogLevel(1);
    pub const REQUEST: LogLevel = LogLevel(2);
    pub const RESPONSE: LogLevel = LogLevel(4);
    pub const ALL: LogLevel = LogLevel(1 | 2 | 4);

    pub fn contains(self, other: LogLevel) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    /// Parse a comma separated list such as `request,response`. Unknown names are ignored.
    pub fn parse_list(s: &str) -> LogLevel {
        s.split(',')
            .map(|part| part.trim().to_ascii_lowercase())
            .fold(LogLevel::NONE, |acc, name| match name.as_str() {
                "trace" => acc | LogLevel::TRACE,
                "request" => acc | LogLevel::REQUEST,
                "response" => acc | LogLevel::RESPONSE,
                "all" => acc | LogLevel::ALL,
                _ => acc,
            })
    }
}

impl std::ops::BitOr for LogLevel {
    type Output = LogLevel;

    fn bitor(self, rhs: LogLevel) -> LogLevel {
        LogLevel(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for LogLevel {
    fn bitor_assign(&mut self, rhs: LogLevel) {
        self.0 |= rhs.0;
    }
}

/// Configuration consumed by [`crate::RequestEngine`]. Read-only once the engine is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of retries after the first failed attempt
    pub retry_count: u32,
    /// Backoff unit; the wait before retry `k` is `retry_delay_secs * k`
    pub retry_delay_secs: u64,
    /// Per-attempt timeout
    pub timeout_secs: u64,
    pub log_level: LogLevel,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry_count: 1,
            retry_delay_secs: 3,
            timeout_secs: 100,
            log_level: LogLevel::NONE,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Apply `PRTG_RETRY_COUNT`, `PRTG_RETRY_DELAY_SECS`, `PRTG_TIMEOUT_SECS` and
    /// `PRTG_LOG_LEVEL`. Unparsable values are ignored.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(v) = env_parse::<u32>("PRTG_RETRY_COUNT") {
            self.retry_count = v;
        }
        if let Some(v) = env_parse::<u64>("PRTG_RETRY_DELAY_SECS") {
            self.retry_delay_secs = v;
        }
        if let Some(v) = env_parse::<u64>("PRTG_TIMEOUT_SECS") {
            self.timeout_secs = v;
        }
        if let Ok(v) = env::var("PRTG_LOG_LEVEL") {
            self.log_level = LogLevel::parse_list(&v);
        }
        self
    }

    pub fn with_retry_count(mut self, n: u32) -> Self {
        self.retry_count = n;
        self
    }

    pub fn with_retry_delay_secs(mut self, secs: u64) -> Self {
        self.retry_delay_secs = secs;
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.trim().parse::<T>().ok())
}
