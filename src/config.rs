//! Configuration
//! 環境変数 (.env) からの設定読み込み

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} environment variable not set")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

/// 実行環境。production では診断情報をレスポンスに含めない
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn is_production(self) -> bool {
        self == Environment::Production
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub database_url: String,
    pub database_max_connections: u32,
    pub razorpay_key_id: String,
    pub razorpay_key_secret: String,
    pub razorpay_api_base: String,
    pub shipping_fee: Decimal,
    pub environment: Environment,
    pub catalog_seed_path: Option<PathBuf>,
    pub cors_allow_origin: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:5001".to_string(),
            database_url: "sqlite:data/checkout.db?mode=rwc".to_string(),
            database_max_connections: 5,
            razorpay_key_id: String::new(),
            razorpay_key_secret: String::new(),
            razorpay_api_base: "https://api.razorpay.com/v1".to_string(),
            shipping_fee: Decimal::new(1000, 2),
            environment: Environment::Development,
            catalog_seed_path: None,
            cors_allow_origin: None,
        }
    }
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field("database_url", &self.database_url)
            .field("database_max_connections", &self.database_max_connections)
            .field("razorpay_key_id", &self.razorpay_key_id)
            .field("razorpay_key_secret", &"<redacted>")
            .field("razorpay_api_base", &self.razorpay_api_base)
            .field("shipping_fee", &self.shipping_fee)
            .field("environment", &self.environment)
            .field("catalog_seed_path", &self.catalog_seed_path)
            .field("cors_allow_origin", &self.cors_allow_origin)
            .finish()
    }
}

impl AppConfig {
    /// プロセス環境変数から読み込む（.env があれば先に読み込む）
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// 任意の lookup 関数から読み込む
    ///
    /// `RAZORPAY_KEY_SECRET` が無い場合は起動させない。署名検証ができないため。
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let razorpay_key_id =
            get("RAZORPAY_KEY_ID").ok_or(ConfigError::Missing("RAZORPAY_KEY_ID"))?;
        let razorpay_key_secret =
            get("RAZORPAY_KEY_SECRET").ok_or(ConfigError::Missing("RAZORPAY_KEY_SECRET"))?;

        let database_max_connections = match get("DATABASE_MAX_CONNECTIONS") {
            Some(v) => v.parse().map_err(|_| ConfigError::Invalid {
                name: "DATABASE_MAX_CONNECTIONS",
                value: v,
            })?,
            None => defaults.database_max_connections,
        };

        let shipping_fee = match get("SHIPPING_FEE") {
            Some(v) => Decimal::from_str(&v)
                .ok()
                .filter(|fee| !fee.is_sign_negative())
                .ok_or(ConfigError::Invalid {
                    name: "SHIPPING_FEE",
                    value: v,
                })?,
            None => defaults.shipping_fee,
        };

        let environment = match get("APP_ENV").as_deref().map(str::to_ascii_lowercase) {
            Some(v) if v == "production" || v == "prod" => Environment::Production,
            _ => Environment::Development,
        };

        Ok(Self {
            bind_addr: get("BIND_ADDR").unwrap_or(defaults.bind_addr),
            database_url: get("DATABASE_URL").unwrap_or(defaults.database_url),
            database_max_connections,
            razorpay_key_id,
            razorpay_key_secret,
            razorpay_api_base: get("RAZORPAY_API_BASE")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or(defaults.razorpay_api_base),
            shipping_fee,
            environment,
            catalog_seed_path: get("CATALOG_SEED_PATH").map(PathBuf::from),
            cors_allow_origin: get("CORS_ALLOW_ORIGIN"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn missing_secret_refuses_to_load() {
        let err = AppConfig::from_lookup(lookup(&[("RAZORPAY_KEY_ID", "rzp_test_1")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("RAZORPAY_KEY_SECRET")));

        let err = AppConfig::from_lookup(lookup(&[
            ("RAZORPAY_KEY_ID", "rzp_test_1"),
            ("RAZORPAY_KEY_SECRET", "   "),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Missing("RAZORPAY_KEY_SECRET")));
    }

    #[test]
    fn defaults_apply_when_optional_values_absent() {
        let config = AppConfig::from_lookup(lookup(&[
            ("RAZORPAY_KEY_ID", "rzp_test_1"),
            ("RAZORPAY_KEY_SECRET", "shh"),
        ]))
        .unwrap();

        assert_eq!(config.bind_addr, "0.0.0.0:5001");
        assert_eq!(config.shipping_fee, Decimal::new(1000, 2));
        assert_eq!(config.environment, Environment::Development);
        assert!(config.catalog_seed_path.is_none());
    }

    #[test]
    fn overrides_and_production_flag() {
        let config = AppConfig::from_lookup(lookup(&[
            ("RAZORPAY_KEY_ID", "rzp_live_1"),
            ("RAZORPAY_KEY_SECRET", "shh"),
            ("SHIPPING_FEE", "5.00"),
            ("APP_ENV", "Production"),
            ("RAZORPAY_API_BASE", "http://localhost:9000/v1/"),
        ]))
        .unwrap();

        assert_eq!(config.shipping_fee, Decimal::new(500, 2));
        assert!(config.environment.is_production());
        assert_eq!(config.razorpay_api_base, "http://localhost:9000/v1");
    }

    #[test]
    fn negative_shipping_fee_is_invalid() {
        let err = AppConfig::from_lookup(lookup(&[
            ("RAZORPAY_KEY_ID", "k"),
            ("RAZORPAY_KEY_SECRET", "s"),
            ("SHIPPING_FEE", "-3"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "SHIPPING_FEE", .. }));
    }

    #[test]
    fn debug_output_redacts_secret() {
        let config = AppConfig {
            razorpay_key_secret: "topsecret".to_string(),
            ..AppConfig::default()
        };
        assert!(!format!("{:?}", config).contains("topsecret"));
    }
}
