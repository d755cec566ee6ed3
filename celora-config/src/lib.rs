//! Configuration management for Celora services

use chrono::{NaiveTime, Weekday};
use config::ConfigError;
use serde::Deserialize;
use std::env;
use std::str::FromStr;

/// Rotation policy knobs
#[derive(Debug, Clone, Deserialize)]
pub struct RotationPolicyConfig {
    pub daily_enabled: bool,
    pub daily_time: NaiveTime,
    pub weekly_enabled: bool,
    pub weekly_day: Weekday,
    pub weekly_time: NaiveTime,
    pub emergency_enabled: bool,
    pub emergency_triggers: Vec<String>,
}

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub master_key_id: String,
    pub key_storage_path: Option<String>,
    pub check_interval_ms: u64,
    pub server_context: bool,
    pub rotation: Option<RotationPolicyConfig>,
    pub log_level: Option<String>,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        let master_key_id =
            env::var("CELORA_MASTER_KEY_ID").unwrap_or_else(|_| "celora-master".to_string());

        let key_storage_path = env::var("KEY_STORAGE_PATH").ok();

        let check_interval_ms = env::var("KMS_CHECK_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(60_000);

        let server_context = env::var("CELORA_EXECUTION_CONTEXT")
            .map(|v| v.to_lowercase() != "client")
            .unwrap_or(true);

        let log_level = env::var("LOG_LEVEL").ok();

        let rotation = Self::rotation_from_env()?;

        Ok(Self {
            master_key_id,
            key_storage_path,
            check_interval_ms,
            server_context,
            rotation,
            log_level,
        })
    }

    // Build the rotation policy only when at least one enable flag is
    // present in the environment.
    fn rotation_from_env() -> Result<Option<RotationPolicyConfig>, ConfigError> {
        let daily_enabled = env_flag("CELORA_ROTATION_DAILY_ENABLED");
        let weekly_enabled = env_flag("CELORA_ROTATION_WEEKLY_ENABLED");
        let emergency_enabled = env_flag("CELORA_ROTATION_EMERGENCY_ENABLED");

        if daily_enabled.is_none() && weekly_enabled.is_none() && emergency_enabled.is_none() {
            return Ok(None);
        }

        let daily_time = parse_time("CELORA_ROTATION_DAILY_TIME", "02:00")?;
        let weekly_day = parse_weekday("CELORA_ROTATION_WEEKLY_DAY", "sunday")?;
        let weekly_time = parse_time("CELORA_ROTATION_WEEKLY_TIME", "03:00")?;

        let emergency_triggers = env::var("CELORA_ROTATION_EMERGENCY_TRIGGERS")
            .map(|v| {
                v.split(',')
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Some(RotationPolicyConfig {
            daily_enabled: daily_enabled.unwrap_or(false),
            daily_time,
            weekly_enabled: weekly_enabled.unwrap_or(false),
            weekly_day,
            weekly_time,
            emergency_enabled: emergency_enabled.unwrap_or(false),
            emergency_triggers,
        }))
    }

    /// Get master key identifier
    pub fn master_key_id(&self) -> &str {
        &self.master_key_id
    }

    /// Get log level, defaulting to "info"
    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or("info")
    }
}

fn env_flag(name: &str) -> Option<bool> {
    env::var(name)
        .ok()
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
}

fn parse_time(name: &str, default: &str) -> Result<NaiveTime, ConfigError> {
    let value = env::var(name).unwrap_or_else(|_| default.to_string());
    NaiveTime::parse_from_str(&value, "%H:%M")
        .map_err(|e| ConfigError::Message(format!("{} must be HH:MM: {}", name, e)))
}

fn parse_weekday(name: &str, default: &str) -> Result<Weekday, ConfigError> {
    let value = env::var(name).unwrap_or_else(|_| default.to_string());
    Weekday::from_str(&value)
        .map_err(|_| ConfigError::Message(format!("{} is not a weekday: {}", name, value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotation_policy_construction() {
        let policy = RotationPolicyConfig {
            daily_enabled: true,
            daily_time: NaiveTime::from_hms_opt(2, 30, 0).unwrap(),
            weekly_enabled: false,
            weekly_day: Weekday::Sun,
            weekly_time: NaiveTime::from_hms_opt(3, 0, 0).unwrap(),
            emergency_enabled: true,
            emergency_triggers: vec!["breach".to_string()],
        };
        assert!(policy.daily_enabled);
        assert_eq!(policy.emergency_triggers.len(), 1);
    }

    #[test]
    fn test_weekday_parsing_accepts_full_names() {
        assert_eq!(Weekday::from_str("sunday").unwrap(), Weekday::Sun);
        assert_eq!(Weekday::from_str("mon").unwrap(), Weekday::Mon);
        assert!(Weekday::from_str("someday").is_err());
    }
}
