use anyhow::anyhow;
use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use crate::{
    models::{MatchRule, UserTier},
    selection::SelectionWeights,
    services::SessionPolicy,
};

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Analytics database. Outcomes stay in memory when unset.
    pub database_url: Option<String>,
    pub session_ttl_hours: i64,
    pub session_sweep_interval_minutes: u64,
    pub session_match_rule: MatchRule,
    pub session_auto_finish: bool,
    pub restaurant_limit_anonymous: usize,
    pub restaurant_limit_authenticated: usize,
    pub places_snapshot_path: Option<String>,
    pub google_maps_api_key: Option<String>,
    pub upstream_timeout_secs: u64,
    pub selection_weights_balanced: SelectionWeights,
    pub selection_weights_hidden_gem: SelectionWeights,
    /// Header the auth proxy sets to the signed-in user's id.
    pub auth_user_header: String,
    pub rate_limit_enabled: bool,
    /// Seconds to replenish one session-creation slot per IP.
    pub rate_limit_create_period_secs: u64,
    pub rate_limit_create_burst: u32,
    pub rate_limit_votes_anonymous_per_minute: u32,
    pub rate_limit_votes_authenticated_per_minute: u32,
    /// Empty or `*` allows any origin.
    pub cors_allow_origins: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            database_url: None,
            session_ttl_hours: 24,
            session_sweep_interval_minutes: 60,
            session_match_rule: MatchRule::Voters,
            session_auto_finish: true,
            restaurant_limit_anonymous: 5,
            restaurant_limit_authenticated: 10,
            places_snapshot_path: None,
            google_maps_api_key: None,
            upstream_timeout_secs: 5,
            selection_weights_balanced: SelectionWeights::balanced(),
            selection_weights_hidden_gem: SelectionWeights::hidden_gem(),
            auth_user_header: "x-auth-user-id".to_string(),
            rate_limit_enabled: true,
            rate_limit_create_period_secs: 6,
            rate_limit_create_burst: 10,
            rate_limit_votes_anonymous_per_minute: 30,
            rate_limit_votes_authenticated_per_minute: 60,
            cors_allow_origins: Vec::new(),
        }
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Config::default();

        let session_ttl_hours = parse_env("SESSION_TTL_HOURS", defaults.session_ttl_hours)?;
        if session_ttl_hours <= 0 {
            return Err(anyhow!("SESSION_TTL_HOURS must be positive"));
        }
        let session_sweep_interval_minutes = parse_env(
            "SESSION_SWEEP_INTERVAL_MINUTES",
            defaults.session_sweep_interval_minutes,
        )?
        .max(1);

        let session_match_rule = match optional_env("SESSION_MATCH_RULE") {
            Some(raw) => raw
                .parse::<MatchRule>()
                .map_err(|e| anyhow!("Invalid SESSION_MATCH_RULE value: {}", e))?,
            None => defaults.session_match_rule,
        };

        let selection_weights_balanced = weights_env(
            "SELECTION_WEIGHTS_BALANCED",
            defaults.selection_weights_balanced,
        )?;
        let selection_weights_hidden_gem = weights_env(
            "SELECTION_WEIGHTS_HIDDEN_GEM",
            defaults.selection_weights_hidden_gem,
        )?;

        let cors_allow_origins = optional_env("CORS_ALLOW_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(|origin| origin.trim().to_string())
                    .filter(|origin| !origin.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Config {
            host: optional_env("HOST").unwrap_or(defaults.host),
            port: parse_env("PORT", defaults.port)?,
            database_url: optional_env("DATABASE_URL"),
            session_ttl_hours,
            session_sweep_interval_minutes,
            session_match_rule,
            session_auto_finish: bool_env("SESSION_AUTO_FINISH", defaults.session_auto_finish)?,
            restaurant_limit_anonymous: parse_env(
                "RESTAURANT_LIMIT_ANONYMOUS",
                defaults.restaurant_limit_anonymous,
            )?
            .max(1),
            restaurant_limit_authenticated: parse_env(
                "RESTAURANT_LIMIT_AUTHENTICATED",
                defaults.restaurant_limit_authenticated,
            )?
            .max(1),
            places_snapshot_path: optional_env("PLACES_SNAPSHOT_PATH"),
            google_maps_api_key: optional_env("GOOGLE_MAPS_API_KEY")
                .filter(|key| key != "your_api_key_here"),
            upstream_timeout_secs: parse_env(
                "UPSTREAM_TIMEOUT_SECS",
                defaults.upstream_timeout_secs,
            )?
            .max(1),
            selection_weights_balanced,
            selection_weights_hidden_gem,
            auth_user_header: optional_env("AUTH_USER_HEADER")
                .map(|h| h.to_ascii_lowercase())
                .unwrap_or(defaults.auth_user_header),
            rate_limit_enabled: bool_env("RATE_LIMIT_ENABLED", defaults.rate_limit_enabled)?,
            rate_limit_create_period_secs: parse_env(
                "RATE_LIMIT_CREATE_PERIOD_SECS",
                defaults.rate_limit_create_period_secs,
            )?
            .max(1),
            rate_limit_create_burst: parse_env(
                "RATE_LIMIT_CREATE_BURST",
                defaults.rate_limit_create_burst,
            )?
            .max(1),
            rate_limit_votes_anonymous_per_minute: parse_env(
                "RATE_LIMIT_VOTES_ANONYMOUS_PER_MINUTE",
                defaults.rate_limit_votes_anonymous_per_minute,
            )?,
            rate_limit_votes_authenticated_per_minute: parse_env(
                "RATE_LIMIT_VOTES_AUTHENTICATED_PER_MINUTE",
                defaults.rate_limit_votes_authenticated_per_minute,
            )?,
            cors_allow_origins,
        })
    }

    pub fn session_policy(&self) -> SessionPolicy {
        SessionPolicy {
            ttl: chrono::Duration::hours(self.session_ttl_hours),
            match_rule: self.session_match_rule,
            auto_finish: self.session_auto_finish,
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.session_sweep_interval_minutes * 60)
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }

    pub fn restaurant_limit(&self, tier: UserTier) -> usize {
        match tier {
            UserTier::Anonymous => self.restaurant_limit_anonymous,
            UserTier::Authenticated => self.restaurant_limit_authenticated,
        }
    }

    pub fn votes_per_minute(&self, tier: UserTier) -> u32 {
        match tier {
            UserTier::Anonymous => self.rate_limit_votes_anonymous_per_minute,
            UserTier::Authenticated => self.rate_limit_votes_authenticated_per_minute,
        }
    }
}

fn optional_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_env<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match optional_env(key) {
        Some(raw) => raw
            .parse()
            .map_err(|e| anyhow!("Invalid {} value '{}': {}", key, raw, e)),
        None => Ok(default),
    }
}

fn bool_env(key: &str, default: bool) -> anyhow::Result<bool> {
    match optional_env(key).map(|raw| raw.to_ascii_lowercase()) {
        None => Ok(default),
        Some(raw) => match raw.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(anyhow!("Invalid {} value: {}", key, raw)),
        },
    }
}

fn weights_env(key: &str, base: SelectionWeights) -> anyhow::Result<SelectionWeights> {
    match optional_env(key) {
        Some(raw) => base
            .with_overrides(&raw)
            .map_err(|e| anyhow!("Invalid {} value: {}", key, e)),
        None => Ok(base),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.restaurant_limit(UserTier::Anonymous), 5);
        assert_eq!(config.restaurant_limit(UserTier::Authenticated), 10);
        assert_eq!(config.votes_per_minute(UserTier::Anonymous), 30);
        assert_eq!(config.session_policy().ttl, chrono::Duration::hours(24));
        assert_eq!(config.sweep_interval(), Duration::from_secs(3600));
    }

    #[test]
    fn parse_env_reports_invalid_values() {
        env::set_var("GROUPNOM_TEST_PORT", "not-a-port");
        let err = parse_env::<u16>("GROUPNOM_TEST_PORT", 1).unwrap_err();
        assert!(err.to_string().contains("GROUPNOM_TEST_PORT"));
        env::remove_var("GROUPNOM_TEST_PORT");
        assert_eq!(parse_env::<u16>("GROUPNOM_TEST_PORT", 7).unwrap(), 7);
    }

    #[test]
    fn bool_env_accepts_common_spellings() {
        env::set_var("GROUPNOM_TEST_FLAG", "off");
        assert!(!bool_env("GROUPNOM_TEST_FLAG", true).unwrap());
        env::set_var("GROUPNOM_TEST_FLAG", "maybe");
        assert!(bool_env("GROUPNOM_TEST_FLAG", true).is_err());
        env::remove_var("GROUPNOM_TEST_FLAG");
    }
}
