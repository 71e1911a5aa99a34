use std::path::Path;
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::error::ConfigError;

/// Process settings, read once from the environment at startup.
#[derive(Clone)]
pub struct Config {
    pub slack_token: Option<String>,
    pub config_file: String,
    pub slack_api_base: String,
    pub event_channel_capacity: usize,
    pub keepalive_secs: u64,
    pub http_timeout_secs: u64,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("slack_token", &self.slack_token.as_ref().map(|_| "[REDACTED]"))
            .field("config_file", &self.config_file)
            .field("slack_api_base", &self.slack_api_base)
            .field("event_channel_capacity", &self.event_channel_capacity)
            .field("keepalive_secs", &self.keepalive_secs)
            .field("http_timeout_secs", &self.http_timeout_secs)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            slack_token: std::env::var("SLACK_TOKEN").ok().filter(|t| !t.trim().is_empty()),
            config_file: std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.yaml".to_string()),
            slack_api_base: std::env::var("SLACK_API_BASE").unwrap_or_else(|_| "https://slack.com/api".to_string()),
            event_channel_capacity: std::env::var("EVENT_CHANNEL_CAP").ok().and_then(|v| v.parse().ok()).unwrap_or(256),
            keepalive_secs: std::env::var("KEEPALIVE_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(30),
            http_timeout_secs: std::env::var("HTTP_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(10),
        }
    }

    /// Reject settings that would only fail later at the first remote call.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let base = url::Url::parse(&self.slack_api_base).map_err(|e| ConfigError::Setting {
            key: "SLACK_API_BASE",
            reason: e.to_string(),
        })?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(ConfigError::Setting {
                key: "SLACK_API_BASE",
                reason: format!("unsupported scheme {:?}", base.scheme()),
            });
        }
        if self.event_channel_capacity == 0 {
            return Err(ConfigError::Setting {
                key: "EVENT_CHANNEL_CAP",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// One compiled rule. Immutable after load.
#[derive(Debug, Clone)]
pub struct Rule {
    pub pattern: Regex,
    pub delay: Duration,
}

impl Rule {
    pub fn new(pattern: &str, delay: Duration) -> Result<Self, regex::Error> {
        Ok(Self { pattern: Regex::new(pattern)?, delay })
    }
}

/// Ordered, validated rules. Every rule is evaluated for every event.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
    /// Hex SHA-256 of the YAML the set was compiled from.
    fingerprint: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    rules: Vec<RawRule>,
}

#[derive(Debug, Deserialize)]
struct RawRule {
    pattern: String,
    remind_after: serde_yaml::Value,
}

impl RuleSet {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules, fingerprint: None }
    }

    /// Read and compile a YAML rule file. One bad entry rejects the whole file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&content, &path.display().to_string())
    }

    pub fn from_yaml(content: &str, origin: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_yaml::from_str(content).map_err(|source| ConfigError::Parse {
            path: origin.to_string(),
            source,
        })?;

        let mut rules = Vec::with_capacity(raw.rules.len());
        for (index, r) in raw.rules.into_iter().enumerate() {
            let pattern = Regex::new(&r.pattern).map_err(|source| ConfigError::Pattern {
                index,
                pattern: r.pattern.clone(),
                source,
            })?;
            let delay = delay_from_yaml(index, &r.remind_after)?;
            rules.push(Rule { pattern, delay });
        }
        Ok(Self { rules, fingerprint: Some(sha256_hex(content.as_bytes())) })
    }

    pub fn fingerprint(&self) -> Option<&str> {
        self.fingerprint.as_deref()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Rule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

fn delay_from_yaml(index: usize, value: &serde_yaml::Value) -> Result<Duration, ConfigError> {
    let text = match value {
        serde_yaml::Value::String(s) => s.clone(),
        serde_yaml::Value::Number(n) => n.to_string(),
        other => {
            return Err(ConfigError::Delay {
                index,
                value: format!("{:?}", other),
                reason: "expected a duration string such as \"1h30m\"".to_string(),
            })
        }
    };
    parse_delay(&text).map_err(|reason| ConfigError::Delay { index, value: text, reason })
}

/// Parse a duration written as a sequence of decimal numbers with unit
/// suffixes, e.g. "300ms", "1.5h", "2h45m". Units: ns, us, µs, ms, s, m, h.
/// A bare "0" is accepted. Negative durations are rejected.
pub fn parse_delay(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("empty duration".to_string());
    }
    if s.starts_with('-') {
        return Err("delay must not be negative".to_string());
    }
    let s = s.strip_prefix('+').unwrap_or(s);
    if s == "0" {
        return Ok(Duration::ZERO);
    }

    let mut total_nanos: f64 = 0.0;
    let mut rest = s;
    while !rest.is_empty() {
        let num_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if num_len == 0 {
            return Err(format!("expected number in {:?}", input));
        }
        let value: f64 = rest[..num_len]
            .parse()
            .map_err(|_| format!("invalid number in {:?}", input))?;
        rest = &rest[num_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let unit_nanos = match &rest[..unit_len] {
            "ns" => 1.0,
            "us" | "µs" | "μs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            "" => return Err(format!("missing unit in {:?}", input)),
            other => return Err(format!("unknown unit {:?} in {:?}", other, input)),
        };
        rest = &rest[unit_len..];
        total_nanos += value * unit_nanos;
    }

    if !total_nanos.is_finite() || total_nanos > u64::MAX as f64 {
        return Err(format!("duration out of range: {:?}", input));
    }
    Ok(Duration::from_nanos(total_nanos.round() as u64))
}

/// Render a delay the way the rule file writes it: "1h0m0s", "1m30s",
/// "45s", "1.5s", "250ms", "0s".
pub fn format_delay(d: Duration) -> String {
    if d.is_zero() {
        return "0s".to_string();
    }
    if d < Duration::from_secs(1) {
        let nanos = d.as_nanos();
        return if nanos < 1_000 {
            format!("{}ns", nanos)
        } else if nanos < 1_000_000 {
            format!("{}µs", trim_fraction(nanos as f64 / 1e3))
        } else {
            format!("{}ms", trim_fraction(nanos as f64 / 1e6))
        };
    }

    let total = d.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = (total % 60) as f64 + f64::from(d.subsec_nanos()) / 1e9;
    let secs = trim_fraction(secs);
    if hours > 0 {
        format!("{}h{}m{}s", hours, minutes, secs)
    } else if minutes > 0 {
        format!("{}m{}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}

fn trim_fraction(v: f64) -> String {
    let s = format!("{:.9}", v);
    let s = s.trim_end_matches('0');
    s.trim_end_matches('.').to_string()
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
