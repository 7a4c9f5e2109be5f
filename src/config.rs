//! Environment-driven configuration.

use anyhow::Context;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub nats_url: Option<String>,
    pub currency: String,
    pub operator_email: String,
    pub cart_retention_days: i64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            database_url: std::env::var("DATABASE_URL").context("DATABASE_URL is required")?,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8083".to_string())
                .parse()
                .context("PORT must be a number")?,
            nats_url: std::env::var("NATS_URL").ok(),
            currency: std::env::var("CURRENCY").unwrap_or_else(|_| "USD".to_string()),
            operator_email: std::env::var("OPERATOR_EMAIL")
                .unwrap_or_else(|_| "orders@example.com".to_string()),
            cart_retention_days: std::env::var("CART_RETENTION_DAYS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .context("CART_RETENTION_DAYS must be a number")?,
        })
    }
}
