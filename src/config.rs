//! Configuration types, built from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{FixedOffset, Offset, Utc};
use secrecy::SecretString;

use crate::error::ConfigError;
use crate::llm::LlmBackend;

/// Default trial length in days.
pub const DEFAULT_TRIAL_DAYS: i64 = 7;
/// Default paid plan length in days.
pub const DEFAULT_SUBSCRIPTION_DAYS: i64 = 30;

/// Top-level service configuration.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Telegram Bot API token. `None` runs the CLI channel only.
    pub telegram_token: Option<String>,
    pub llm_backend: LlmBackend,
    pub llm_api_key: SecretString,
    pub llm_model: String,
    /// Upper bound on a single generation call.
    pub llm_timeout: Duration,
    pub db_path: PathBuf,
    /// Bearer token for the operator console. Console is disabled when unset.
    pub admin_token: Option<SecretString>,
    /// Chat user ids allowed to use the `/admin` command.
    pub admin_ids: Vec<String>,
    pub admin_port: u16,
    /// Telegram Payments provider token. Invoices are not offered when unset.
    pub payment_provider_token: Option<String>,
    pub plans: PlanConfig,
    /// Directory for a daily-rolling log file, in addition to stderr.
    pub log_dir: Option<PathBuf>,
}

/// Durations handed out by the entitlement engine.
#[derive(Debug, Clone, Copy)]
pub struct PlanConfig {
    pub trial_days: i64,
    pub subscription_days: i64,
}

impl Default for PlanConfig {
    fn default() -> Self {
        Self {
            trial_days: DEFAULT_TRIAL_DAYS,
            subscription_days: DEFAULT_SUBSCRIPTION_DAYS,
        }
    }
}

impl BotConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let llm_api_key = std::env::var("LLM_API_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("LLM_API_KEY".to_string()))?;

        let llm_backend = match std::env::var("LLM_BACKEND") {
            Ok(raw) => raw.parse().map_err(|message| ConfigError::InvalidValue {
                key: "LLM_BACKEND".to_string(),
                message,
            })?,
            Err(_) => LlmBackend::OpenRouter,
        };

        let llm_model = std::env::var("LLM_MODEL")
            .unwrap_or_else(|_| llm_backend.default_model().to_string());

        let admin_ids: Vec<String> = std::env::var("ADMIN_IDS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let plans = PlanConfig {
            trial_days: parse_positive("TRIAL_DAYS", DEFAULT_TRIAL_DAYS)?,
            subscription_days: parse_positive("SUBSCRIPTION_DAYS", DEFAULT_SUBSCRIPTION_DAYS)?,
        };

        Ok(Self {
            telegram_token: non_empty_var("TELEGRAM_BOT_TOKEN"),
            llm_backend,
            llm_api_key: SecretString::from(llm_api_key),
            llm_model,
            llm_timeout: Duration::from_secs(parse_positive("LLM_TIMEOUT_SECS", 60)? as u64),
            db_path: std::env::var("FIT_COACH_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data/fit-coach.db")),
            admin_token: non_empty_var("ADMIN_TOKEN").map(SecretString::from),
            admin_ids,
            admin_port: std::env::var("ADMIN_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(8001),
            payment_provider_token: non_empty_var("PAYMENT_PROVIDER_TOKEN"),
            plans,
            log_dir: non_empty_var("FIT_COACH_LOG_DIR").map(PathBuf::from),
        })
    }
}

/// Reminder scheduler configuration.
#[derive(Debug, Clone)]
pub struct ReminderConfig {
    pub enabled: bool,
    /// Cron expression for the reminder ticker (seconds resolution).
    pub tick_schedule: String,
    /// Cron expression for the missed-training sweep.
    pub missed_sweep_schedule: String,
    /// Pending records older than this become `missed`.
    pub staleness_window: chrono::Duration,
    /// Offset users' reminder times are read in.
    pub utc_offset: FixedOffset,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tick_schedule: "0 * * * * *".to_string(),
            missed_sweep_schedule: "0 5 0 * * *".to_string(),
            staleness_window: chrono::Duration::days(1),
            utc_offset: Utc.fix(),
        }
    }
}

impl ReminderConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let utc_offset = match non_empty_var("REMINDER_UTC_OFFSET") {
            Some(raw) => parse_offset(&raw)?,
            None => defaults.utc_offset,
        };
        Ok(Self {
            enabled: std::env::var("REMINDERS_ENABLED")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(defaults.enabled),
            utc_offset,
            ..defaults
        })
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_offset(raw: &str) -> Result<FixedOffset, ConfigError> {
    raw.trim()
        .parse::<FixedOffset>()
        .map_err(|e| ConfigError::InvalidValue {
            key: "REMINDER_UTC_OFFSET".to_string(),
            message: format!("expected an offset like +03:00, got {raw:?}: {e}"),
        })
}

fn parse_positive(key: &str, default: i64) -> Result<i64, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse::<i64>() {
            Ok(v) if v > 0 => Ok(v),
            _ => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("expected a positive integer, got {raw:?}"),
            }),
        },
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_defaults() {
        let plans = PlanConfig::default();
        assert_eq!(plans.trial_days, 7);
        assert_eq!(plans.subscription_days, 30);
    }

    #[test]
    fn reminder_defaults_parse_as_cron() {
        use std::str::FromStr;
        let config = ReminderConfig::default();
        assert!(cron::Schedule::from_str(&config.tick_schedule).is_ok());
        assert!(cron::Schedule::from_str(&config.missed_sweep_schedule).is_ok());
        assert_eq!(config.staleness_window, chrono::Duration::days(1));
        assert_eq!(config.utc_offset.local_minus_utc(), 0);
    }

    #[test]
    fn reminder_offset_parsing() {
        assert_eq!(parse_offset("+03:00").unwrap().local_minus_utc(), 3 * 3600);
        assert_eq!(parse_offset(" -05:30 ").unwrap().local_minus_utc(), -(5 * 3600 + 1800));
        assert!(matches!(
            parse_offset("Moscow"),
            Err(ConfigError::InvalidValue { .. })
        ));
    }
}
