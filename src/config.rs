use std::env;
use std::fmt;
use std::time::Duration;

use log::warn;
use thiserror::Error;

/// A value that must never end up in logs.
#[derive(Clone, Default)]
pub struct Secret<T: Clone + Default> {
    value: T,
}

impl<T: Clone + Default> Secret<T> {
    pub fn new(value: T) -> Self {
        Self { value }
    }

    pub fn reveal(&self) -> &T {
        &self.value
    }
}

impl<T: Clone + Default> fmt::Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("****")
    }
}

impl<T: Clone + Default> fmt::Display for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("****")
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has an invalid value '{value}'")]
    Invalid { name: &'static str, value: String },
}

/// Credentials and endpoint of the payment gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub shop_id: String,
    pub secret_key: Secret<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub secret: Secret<String>,
    pub signature_header: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub gateway: GatewayConfig,
    pub webhook: WebhookConfig,
    /// Bearer token for operator-only routes. Unset disables them.
    pub operator_token: Option<Secret<String>>,
}

pub const DEFAULT_GATEWAY_URL: &str = "https://api.yookassa.ru/v3";
pub const DEFAULT_SIGNATURE_HEADER: &str = "X-Webhook-Signature";

impl AppConfig {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from any key lookup; `from_env` passes `std::env`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::Missing(name))
        };
        let parsed = |name: &'static str, default: &str| -> Result<u64, ConfigError> {
            let value = lookup(name).unwrap_or_else(|| default.to_string());
            value.parse().map_err(|_| ConfigError::Invalid { name, value })
        };

        let port = parsed("PORT", "8080")?;
        let port = u16::try_from(port).map_err(|_| ConfigError::Invalid {
            name: "PORT",
            value: port.to_string(),
        })?;

        let base_url = lookup("GATEWAY_BASE_URL").unwrap_or_else(|| {
            warn!("GATEWAY_BASE_URL not set, using {DEFAULT_GATEWAY_URL}");
            DEFAULT_GATEWAY_URL.to_string()
        });

        let operator_token = lookup("OPERATOR_TOKEN").filter(|v| !v.is_empty());
        if operator_token.is_none() {
            warn!("OPERATOR_TOKEN not set, operator routes are disabled");
        }

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            gateway: GatewayConfig {
                base_url: base_url.trim_end_matches('/').to_string(),
                shop_id: required("GATEWAY_SHOP_ID")?,
                secret_key: Secret::new(required("GATEWAY_SECRET_KEY")?),
                timeout: Duration::from_secs(parsed("GATEWAY_TIMEOUT_SECS", "30")?),
            },
            webhook: WebhookConfig {
                secret: Secret::new(required("WEBHOOK_SECRET")?),
                signature_header: lookup("WEBHOOK_SIGNATURE_HEADER")
                    .unwrap_or_else(|| DEFAULT_SIGNATURE_HEADER.to_string()),
            },
            operator_token: operator_token.map(Secret::new),
        })
    }
}
