use dotenvy::dotenv;
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server_port: u16,
    pub database_url: String,
    pub gateway_base_url: String,
    pub gateway_api_key: String,
    pub gateway_private_key: String,
    pub gateway_merchant_code: String,
    pub return_url: String,
    /// Price of one install credit, in whole currency units.
    pub quota_unit_price: i64,
    /// Lifetime of an unpaid transaction, in seconds.
    pub topup_expiry_secs: i64,
    /// Interval of the credit-repair scan, in seconds.
    pub repair_interval_secs: u64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok(); // Load .env file if present

        Ok(Config {
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?,
            database_url: env::var("DATABASE_URL")?,
            gateway_base_url: env::var("GATEWAY_BASE_URL")?,
            gateway_api_key: env::var("GATEWAY_API_KEY")?,
            gateway_private_key: env::var("GATEWAY_PRIVATE_KEY")?,
            gateway_merchant_code: env::var("GATEWAY_MERCHANT_CODE")?,
            return_url: env::var("RETURN_URL").unwrap_or_else(|_| "/topup/done".to_string()),
            quota_unit_price: env::var("QUOTA_UNIT_PRICE")
                .unwrap_or_else(|_| "5000".to_string())
                .parse()?,
            topup_expiry_secs: env::var("TOPUP_EXPIRY_SECS")
                .unwrap_or_else(|_| "86400".to_string())
                .parse()?,
            repair_interval_secs: env::var("REPAIR_INTERVAL_SECS")
                .unwrap_or_else(|_| "300".to_string())
                .parse()?,
        })
    }
}
