use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    pub giftcard_api_url: String,
    pub giftcard_api_key: Option<String>,
    pub withdraw: WithdrawConfig,
}

/// Knobs consumed by the eligibility pipeline and the withdrawal orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawConfig {
    /// Lifetime earnings required before any withdrawal. Also drives the
    /// explanatory message shown to the user.
    pub min_earned_to_withdraw: i64,
    pub fulfillment_timeout: Duration,
    pub record_write_attempts: u32,
    pub rollback_attempts: u32,
    pub retry_base_delay: Duration,
    /// Stored on Completed records issued without manual review.
    pub approver: String,
    /// Create a Pending record for out-of-stock cards instead of rejecting.
    pub defer_out_of_stock: bool,
}

impl Default for WithdrawConfig {
    fn default() -> Self {
        Self {
            min_earned_to_withdraw: 200,
            fulfillment_timeout: Duration::from_millis(10_000),
            record_write_attempts: 3,
            rollback_attempts: 10,
            retry_base_delay: Duration::from_millis(50),
            approver: "auto".to_string(),
            defer_out_of_stock: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let defaults = WithdrawConfig::default();

        let port = parse_or(&env_map, "PORT", 8080u16, "must be a valid u16")?;

        let database_path = env_map
            .get("DATABASE_PATH")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("DATABASE_PATH".to_string()))?;

        let giftcard_api_url = env_map
            .get("GIFTCARD_API_URL")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("GIFTCARD_API_URL".to_string()))?;

        let giftcard_api_key = env_map
            .get("GIFTCARD_API_KEY")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let min_earned_to_withdraw = parse_or(
            &env_map,
            "MIN_EARNED_TO_WITHDRAW",
            defaults.min_earned_to_withdraw,
            "must be a non-negative integer",
        )?;
        if min_earned_to_withdraw < 0 {
            return Err(ConfigError::InvalidValue(
                "MIN_EARNED_TO_WITHDRAW".to_string(),
                "must be a non-negative integer".to_string(),
            ));
        }

        let fulfillment_timeout_ms: u64 = parse_or(
            &env_map,
            "FULFILLMENT_TIMEOUT_MS",
            10_000,
            "must be a valid u64",
        )?;
        if fulfillment_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "FULFILLMENT_TIMEOUT_MS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        let record_write_attempts = parse_or(
            &env_map,
            "RECORD_WRITE_ATTEMPTS",
            defaults.record_write_attempts,
            "must be a valid u32",
        )?;
        let rollback_attempts = parse_or(
            &env_map,
            "ROLLBACK_ATTEMPTS",
            defaults.rollback_attempts,
            "must be a valid u32",
        )?;
        let retry_base_delay_ms: u64 =
            parse_or(&env_map, "RETRY_BASE_DELAY_MS", 50, "must be a valid u64")?;

        let approver = env_map
            .get("WITHDRAW_APPROVER")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults.approver);

        let defer_out_of_stock = match env_map
            .get("DEFER_OUT_OF_STOCK")
            .map(|s| s.as_str())
            .unwrap_or("false")
        {
            "true" | "1" => true,
            "false" | "0" => false,
            other => {
                return Err(ConfigError::InvalidValue(
                    "DEFER_OUT_OF_STOCK".to_string(),
                    format!("must be true or false, got {}", other),
                ))
            }
        };

        Ok(Config {
            port,
            database_path,
            giftcard_api_url,
            giftcard_api_key,
            withdraw: WithdrawConfig {
                min_earned_to_withdraw,
                fulfillment_timeout: Duration::from_millis(fulfillment_timeout_ms),
                record_write_attempts,
                rollback_attempts,
                retry_base_delay: Duration::from_millis(retry_base_delay_ms),
                approver,
                defer_out_of_stock,
            },
        })
    }
}

fn parse_or<T: FromStr>(
    env_map: &HashMap<String, String>,
    key: &str,
    default: T,
    expected: &str,
) -> Result<T, ConfigError> {
    match env_map.get(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue(key.to_string(), expected.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_required_env() -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert("DATABASE_PATH".to_string(), "/tmp/test.db".to_string());
        map.insert(
            "GIFTCARD_API_URL".to_string(),
            "https://giftcards.example".to_string(),
        );
        map
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_env_map(setup_required_env()).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.giftcard_api_key, None);
        assert_eq!(config.withdraw, WithdrawConfig::default());
        assert_eq!(config.withdraw.min_earned_to_withdraw, 200);
        assert_eq!(config.withdraw.approver, "auto");
    }

    #[test]
    fn test_missing_database_path() {
        let mut env_map = setup_required_env();
        env_map.remove("DATABASE_PATH");
        let result = Config::from_env_map(env_map);
        match result {
            Err(ConfigError::MissingEnv(s)) => assert_eq!(s, "DATABASE_PATH"),
            _ => panic!("Expected MissingEnv error"),
        }
    }

    #[test]
    fn test_missing_giftcard_api_url() {
        let mut env_map = setup_required_env();
        env_map.remove("GIFTCARD_API_URL");
        let result = Config::from_env_map(env_map);
        match result {
            Err(ConfigError::MissingEnv(s)) => assert_eq!(s, "GIFTCARD_API_URL"),
            _ => panic!("Expected MissingEnv error"),
        }
    }

    #[test]
    fn test_invalid_port() {
        let mut env_map = setup_required_env();
        env_map.insert("PORT".to_string(), "not_a_number".to_string());
        let result = Config::from_env_map(env_map);
        match result {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "PORT"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_negative_threshold_rejected() {
        let mut env_map = setup_required_env();
        env_map.insert("MIN_EARNED_TO_WITHDRAW".to_string(), "-1".to_string());
        let result = Config::from_env_map(env_map);
        match result {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "MIN_EARNED_TO_WITHDRAW"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut env_map = setup_required_env();
        env_map.insert("FULFILLMENT_TIMEOUT_MS".to_string(), "0".to_string());
        assert!(matches!(
            Config::from_env_map(env_map),
            Err(ConfigError::InvalidValue(_, _))
        ));
    }

    #[test]
    fn test_invalid_defer_flag() {
        let mut env_map = setup_required_env();
        env_map.insert("DEFER_OUT_OF_STOCK".to_string(), "maybe".to_string());
        let result = Config::from_env_map(env_map);
        match result {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "DEFER_OUT_OF_STOCK"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_overrides() {
        let mut env_map = setup_required_env();
        env_map.insert("GIFTCARD_API_KEY".to_string(), " secret ".to_string());
        env_map.insert("MIN_EARNED_TO_WITHDRAW".to_string(), "5000".to_string());
        env_map.insert("FULFILLMENT_TIMEOUT_MS".to_string(), "250".to_string());
        env_map.insert("ROLLBACK_ATTEMPTS".to_string(), "4".to_string());
        env_map.insert("WITHDRAW_APPROVER".to_string(), "staff-bot".to_string());
        env_map.insert("DEFER_OUT_OF_STOCK".to_string(), "true".to_string());

        let config = Config::from_env_map(env_map).unwrap();
        assert_eq!(config.giftcard_api_key.as_deref(), Some("secret"));
        assert_eq!(config.withdraw.min_earned_to_withdraw, 5000);
        assert_eq!(config.withdraw.fulfillment_timeout, Duration::from_millis(250));
        assert_eq!(config.withdraw.rollback_attempts, 4);
        assert_eq!(config.withdraw.approver, "staff-bot");
        assert!(config.withdraw.defer_out_of_stock);
    }
}
