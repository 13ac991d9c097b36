// config.rs
use std::env;
use std::fmt::Display;
use std::str::FromStr;

use crate::errors::{AppError, Result};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub database_name: String,
    pub jwt_secret: String,
    pub jwt_expire_hours: i64,
    pub host: String,
    pub port: u16,
    pub base_url: String,
    pub frontend_url: String,
    pub meeting_base_url: String,
    pub cors_origins: Vec<String>,
    pub gateway: Option<GatewayConfig>,
    pub payment_rules: PaymentRules,
}

/// SSLCommerz store credentials. Present only when both id and password are set.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub store_id: String,
    pub store_password: String,
    pub is_live: bool,
}

impl GatewayConfig {
    pub fn base_url(&self) -> &'static str {
        if self.is_live {
            "https://securepay.sslcommerz.com"
        } else {
            "https://sandbox.sslcommerz.com"
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PaymentRules {
    pub commission_rate: f64,
    pub submission_window_hours: i64,
    pub verification_window_hours: i64,
    pub max_submissions: u32,
}

impl Default for PaymentRules {
    fn default() -> Self {
        PaymentRules {
            commission_rate: 0.10,
            submission_window_hours: 12,
            verification_window_hours: 24,
            max_submissions: 3,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let port: u16 = parse_or("PORT", 5000)?;
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let gateway = match (non_empty("SSL_STORE_ID"), non_empty("SSL_STORE_PASS")) {
            (Some(store_id), Some(store_password)) => Some(GatewayConfig {
                store_id,
                store_password,
                is_live: parse_or("SSL_IS_LIVE", false)?,
            }),
            _ => {
                tracing::warn!("SSL_STORE_ID or SSL_STORE_PASS not set, gateway payments disabled");
                None
            }
        };

        let defaults = PaymentRules::default();
        let payment_rules = PaymentRules {
            commission_rate: parse_or("PLATFORM_COMMISSION_RATE", defaults.commission_rate)?,
            submission_window_hours: parse_or(
                "PAYMENT_SUBMISSION_WINDOW_HOURS",
                defaults.submission_window_hours,
            )?,
            verification_window_hours: parse_or(
                "PAYMENT_VERIFICATION_WINDOW_HOURS",
                defaults.verification_window_hours,
            )?,
            max_submissions: parse_or("MAX_PAYMENT_SUBMISSIONS", defaults.max_submissions)?,
        };

        if !(0.0..1.0).contains(&payment_rules.commission_rate) {
            return Err(AppError::configuration(
                "PLATFORM_COMMISSION_RATE must be in [0, 1)",
            ));
        }

        Ok(AppConfig {
            database_url: required("DATABASE_URL")?,
            database_name: env::var("DATABASE_NAME")
                .unwrap_or_else(|_| "tutorconnected".to_string()),
            jwt_secret: required("JWT_SECRET")?,
            jwt_expire_hours: parse_or("JWT_EXPIRE_HOURS", 720)?,
            base_url: env::var("BASE_URL")
                .unwrap_or_else(|_| format!("http://localhost:{}", port)),
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            meeting_base_url: env::var("MEETING_BASE_URL")
                .unwrap_or_else(|_| "https://meet.jit.si".to_string()),
            cors_origins: parse_list(&env::var("CORS_ORIGINS").unwrap_or_default()),
            host,
            port,
            gateway,
            payment_rules,
        })
    }

    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn required(key: &str) -> Result<String> {
    non_empty(key).ok_or_else(|| AppError::configuration(format!("{} must be set", key)))
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr + Display,
    T::Err: Display,
{
    match non_empty(key) {
        Some(raw) => raw
            .parse()
            .map_err(|e| AppError::configuration(format!("Invalid {} value '{}': {}", key, raw, e))),
        None => {
            tracing::debug!("{} not set, using default: {}", key, default);
            Ok(default)
        }
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().trim_end_matches('/').to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_comma_separated_origins() {
        let origins = parse_list(" http://localhost:3000/, https://app.example.com ,,");
        assert_eq!(
            origins,
            vec!["http://localhost:3000".to_string(), "https://app.example.com".to_string()]
        );
        assert!(parse_list("").is_empty());
    }

    #[test]
    fn gateway_base_url_follows_live_flag() {
        let mut gw = GatewayConfig {
            store_id: "store".into(),
            store_password: "pass".into(),
            is_live: false,
        };
        assert_eq!(gw.base_url(), "https://sandbox.sslcommerz.com");
        gw.is_live = true;
        assert_eq!(gw.base_url(), "https://securepay.sslcommerz.com");
    }
}
