//! Application configuration loaded from environment variables.

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `3000`)
/// - `DATABASE_URL` — PostgreSQL URL; absent means the in-memory store
/// - `DELIVERY_FEE_CENTS` — flat home-delivery surcharge (default: `800`)
/// - `DELIVERY_LEAD_DAYS` — target delivery date offset (default: `3`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_url: Option<String>,
    pub delivery_fee_cents: i64,
    pub delivery_lead_days: i64,
    pub log_level: String,
}

impl Config {
    /// Loads configuration from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            database_url: std::env::var("DATABASE_URL").ok(),
            delivery_fee_cents: std::env::var("DELIVERY_FEE_CENTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(800),
            delivery_lead_days: std::env::var("DELIVERY_LEAD_DAYS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3),
            log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Checkout policy derived from this configuration.
    pub fn checkout_policy(&self) -> checkout::CheckoutPolicy {
        checkout::CheckoutPolicy {
            delivery_fee: common::Money::from_cents(self.delivery_fee_cents),
            delivery_lead_days: self.delivery_lead_days,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            database_url: None,
            delivery_fee_cents: 800,
            delivery_lead_days: 3,
            log_level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert!(config.database_url.is_none());
        assert_eq!(config.delivery_fee_cents, 800);
        assert_eq!(config.delivery_lead_days, 3);
    }

    #[test]
    fn addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn policy_carries_the_fee() {
        let config = Config {
            delivery_fee_cents: 1200,
            ..Config::default()
        };
        assert_eq!(config.checkout_policy().delivery_fee.cents(), 1200);
    }
}
