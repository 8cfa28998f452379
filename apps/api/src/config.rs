use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub port: u16,
    pub rust_log: String,
    pub rules: EngineRules,
    /// Seconds between background expiry sweeps. 0 disables the task.
    pub expiry_sweep_interval_secs: u64,
}

/// Feature toggles consulted by the progression and challenge engine.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineRules {
    /// Users may revive a freshly failed challenge by completing the missed day.
    pub allow_challenge_grace_period: bool,
    pub grace_period_hours: i64,
    /// Users may log activities dated yesterday. Admins always may backfill.
    pub allow_previous_day_logging: bool,
}

impl Default for EngineRules {
    fn default() -> Self {
        Self {
            allow_challenge_grace_period: false,
            grace_period_hours: 24,
            allow_previous_day_logging: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let defaults = EngineRules::default();
        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            database_max_connections: env_number("DATABASE_MAX_CONNECTIONS", 10)?,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            rules: EngineRules {
                allow_challenge_grace_period: env_flag(
                    "ALLOW_CHALLENGE_GRACE_PERIOD",
                    defaults.allow_challenge_grace_period,
                ),
                grace_period_hours: env_number(
                    "CHALLENGE_GRACE_PERIOD_HOURS",
                    defaults.grace_period_hours,
                )?,
                allow_previous_day_logging: env_flag(
                    "ALLOW_PREVIOUS_DAY_LOGGING",
                    defaults.allow_previous_day_logging,
                ),
            },
            expiry_sweep_interval_secs: env_number("EXPIRY_SWEEP_INTERVAL_SECS", 0)?,
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| parse_flag(&v))
        .unwrap_or(default)
}

fn env_number<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} must be a number, got '{raw}'")),
        Err(_) => Ok(default),
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flag_accepts_common_truthy_values() {
        for v in ["true", "TRUE", "1", "yes", " on "] {
            assert!(parse_flag(v), "{v} should be truthy");
        }
        for v in ["false", "0", "no", "", "enabled"] {
            assert!(!parse_flag(v), "{v} should be falsy");
        }
    }

    #[test]
    fn test_default_rules() {
        let rules = EngineRules::default();
        assert!(!rules.allow_challenge_grace_period);
        assert!(!rules.allow_previous_day_logging);
        assert_eq!(rules.grace_period_hours, 24);
    }
}
