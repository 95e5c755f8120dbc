// src/config.rs
//! Configuration: tunables from a TOML file, credentials from the
//! environment. Missing credentials are the only fatal startup error;
//! every tunable has a default.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::breaker::RetryPolicy;
use crate::rate_limit::BudgetCfg;

const ENV_CONFIG_PATH: &str = "SENTRY_CONFIG_PATH";
const DEFAULT_CONFIG_PATH: &str = "config/sentry.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub limits: LimitsCfg,
    pub schedule: ScheduleCfg,
    pub retry: RetryCfg,
    pub dedup: DedupCfg,
    pub social: SocialCfg,
    pub news: NewsCfg,
    pub server: ServerCfg,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LimitsCfg {
    pub social: SourceLimit,
    pub news: SourceLimit,
    pub analysis: SourceLimit,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceLimit {
    pub window_secs: u64,
    pub max_requests: u32,
}

impl From<SourceLimit> for BudgetCfg {
    fn from(l: SourceLimit) -> Self {
        BudgetCfg {
            window: Duration::from_secs(l.window_secs),
            max_requests: l.max_requests,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScheduleCfg {
    /// Social sub-cycle interval; several sub-cycles cover one parent
    /// interval (staggering).
    pub social_poll_secs: u64,
    /// Parent interval inside which every tracked account is visited once.
    pub social_parent_interval_secs: u64,
    pub news_poll_secs: u64,
    pub min_inter_request_delay_ms: u64,
    pub misfire_grace_secs: Option<u64>,
    pub coalesce_missed_runs: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryCfg {
    pub max_retries: u32,
    pub base_backoff_ms: u64,
    pub circuit_breaker_threshold: u32,
}

impl From<RetryCfg> for RetryPolicy {
    fn from(r: RetryCfg) -> Self {
        RetryPolicy {
            base_backoff: Duration::from_millis(r.base_backoff_ms),
            max_retries: r.max_retries,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DedupCfg {
    pub cap: usize,
    pub path: PathBuf,
    pub handles_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SocialCfg {
    pub accounts: Vec<String>,
    pub lookback_minutes: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NewsCfg {
    pub categories: Vec<String>,
    pub lookback_minutes: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerCfg {
    pub port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            limits: LimitsCfg::default(),
            schedule: ScheduleCfg::default(),
            retry: RetryCfg::default(),
            dedup: DedupCfg::default(),
            social: SocialCfg::default(),
            news: NewsCfg::default(),
            server: ServerCfg::default(),
        }
    }
}

impl Default for LimitsCfg {
    fn default() -> Self {
        Self {
            social: SourceLimit {
                window_secs: 900,
                max_requests: 180,
            },
            news: SourceLimit {
                window_secs: 60,
                max_requests: 60,
            },
            analysis: SourceLimit {
                window_secs: 60,
                max_requests: 60,
            },
        }
    }
}

impl Default for ScheduleCfg {
    fn default() -> Self {
        Self {
            social_poll_secs: 300,
            social_parent_interval_secs: 1800,
            news_poll_secs: 300,
            min_inter_request_delay_ms: 1000,
            misfire_grace_secs: Some(60),
            coalesce_missed_runs: true,
        }
    }
}

impl Default for RetryCfg {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_backoff_ms: 500,
            circuit_breaker_threshold: 5,
        }
    }
}

impl Default for DedupCfg {
    fn default() -> Self {
        Self {
            cap: crate::dedup::DEFAULT_CAP,
            path: PathBuf::from("data/processed_ids.json"),
            handles_path: PathBuf::from("data/user_ids.json"),
        }
    }
}

impl Default for SocialCfg {
    fn default() -> Self {
        Self {
            accounts: [
                "elonmusk",
                "michaelsaylor",
                "CathieDWood",
                "brian_armstrong",
                "cz_binance",
                "VitalikButerin",
                "APompliano",
                "RaoulGMI",
                "chamath",
                "garyvee",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            lookback_minutes: 30,
        }
    }
}

impl Default for NewsCfg {
    fn default() -> Self {
        Self {
            categories: vec!["forex".into(), "crypto".into(), "merger".into()],
            lookback_minutes: 5,
        }
    }
}

impl Default for ServerCfg {
    fn default() -> Self {
        Self { port: 8080 }
    }
}

impl AppConfig {
    /// Load from $SENTRY_CONFIG_PATH, then `config/sentry.toml`, then
    /// defaults when no file exists.
    pub fn load() -> Result<Self> {
        let path = std::env::var(ENV_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        if !path.exists() {
            tracing::info!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        Self::load_from_str(
            &std::fs::read_to_string(&path)
                .with_context(|| format!("reading config from {}", path.display()))?,
        )
        .with_context(|| format!("parsing config from {}", path.display()))
    }

    pub fn load_from_str(s: &str) -> Result<Self> {
        let cfg: Self = toml::from_str(s)?;
        if cfg.schedule.social_poll_secs == 0 || cfg.schedule.news_poll_secs == 0 {
            bail!("poll intervals must be non-zero");
        }
        Ok(cfg)
    }

    /// Sub-cycles per parent interval for social staggering.
    pub fn social_sub_cycles(&self) -> u32 {
        (self.schedule.social_parent_interval_secs / self.schedule.social_poll_secs.max(1)).max(1)
            as u32
    }

    pub fn min_inter_request_delay(&self) -> Duration {
        Duration::from_millis(self.schedule.min_inter_request_delay_ms)
    }

    pub fn misfire_grace(&self) -> Option<Duration> {
        self.schedule.misfire_grace_secs.map(Duration::from_secs)
    }
}

/// Credentials pulled from the environment (.env in dev). All required
/// except the topic id; missing ones abort startup with the full list.
#[derive(Debug, Clone)]
pub struct Secrets {
    pub social_bearer_token: String,
    pub news_api_key: String,
    pub analysis_api_key: String,
    pub telegram_bot_token: String,
    pub telegram_chat_id: String,
    pub telegram_topic_id: Option<i64>,
}

impl Secrets {
    pub fn from_env() -> Result<Self> {
        let required = [
            "SOCIAL_BEARER_TOKEN",
            "NEWS_API_KEY",
            "ANALYSIS_API_KEY",
            "TELEGRAM_BOT_TOKEN",
            "TELEGRAM_CHAT_ID",
        ];
        let missing: Vec<&str> = required
            .iter()
            .copied()
            .filter(|v| std::env::var(v).map_or(true, |s| s.trim().is_empty()))
            .collect();
        if !missing.is_empty() {
            bail!("missing environment variables: {}", missing.join(", "));
        }
        let topic_id = std::env::var("TELEGRAM_TOPIC_ID")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(|s| {
                s.trim()
                    .parse::<i64>()
                    .context("TELEGRAM_TOPIC_ID must be an integer")
            })
            .transpose()?;
        Ok(Self {
            social_bearer_token: std::env::var("SOCIAL_BEARER_TOKEN")?,
            news_api_key: std::env::var("NEWS_API_KEY")?,
            analysis_api_key: std::env::var("ANALYSIS_API_KEY")?,
            telegram_bot_token: std::env::var("TELEGRAM_BOT_TOKEN")?,
            telegram_chat_id: std::env::var("TELEGRAM_CHAT_ID")?,
            telegram_topic_id: topic_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_sections_missing() {
        let cfg = AppConfig::load_from_str("").unwrap();
        assert_eq!(cfg.limits.social.max_requests, 180);
        assert_eq!(cfg.retry.circuit_breaker_threshold, 5);
        assert_eq!(cfg.dedup.cap, 1000);
        assert_eq!(cfg.social_sub_cycles(), 6);
    }

    #[test]
    fn partial_file_overrides_only_named_fields() {
        let cfg = AppConfig::load_from_str(
            r#"
            [limits.news]
            window_secs = 120
            max_requests = 10

            [schedule]
            social_poll_secs = 600
            "#,
        )
        .unwrap();
        assert_eq!(cfg.limits.news.max_requests, 10);
        assert_eq!(cfg.limits.social.max_requests, 180);
        assert_eq!(cfg.schedule.social_poll_secs, 600);
        assert_eq!(cfg.social_sub_cycles(), 3);
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        let err = AppConfig::load_from_str("[schedule]\nnews_poll_secs = 0\n");
        assert!(err.is_err());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(AppConfig::load_from_str("[schedule]\nnope = 1\n").is_err());
    }
}
