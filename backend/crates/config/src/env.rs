use chrono::{FixedOffset, Offset, Utc};
use hubsync_common::error::{HubsyncError, HubsyncResult};
use serde::Deserialize;
use std::env;

const DEFAULT_DATASYSTEM_BASE_URL: &str = "https://integracaodatasystem.useserver.com.br/api/v1";

/// America/Sao_Paulo has observed a fixed UTC-3 offset since 2019.
const DEFAULT_UTC_OFFSET_HOURS: &str = "-3";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub datasystem_base_url: String,
    pub datasystem_cnpj: String,
    pub datasystem_hash: String,
    pub clients_webhook_url: String,
    pub products_webhook_url: String,
    pub utc_offset_hours: i32,
    pub http_timeout_secs: u64,
    pub fetch_max_retries: u32,
    pub host: String,
    pub port: u16,
}

impl AppConfig {
    /// Load configuration from environment variables.
    /// Loads `.env` file if present, then reads required vars.
    pub fn from_env() -> HubsyncResult<Self> {
        // Best-effort .env load; ignore if missing
        let _ = dotenvy::dotenv();

        let utc_offset_hours: i32 = parse_var("SYNC_UTC_OFFSET_HOURS", DEFAULT_UTC_OFFSET_HOURS)?;
        if !(-14..=14).contains(&utc_offset_hours) {
            return Err(HubsyncError::Config(format!(
                "SYNC_UTC_OFFSET_HOURS out of range: {utc_offset_hours}"
            )));
        }

        Ok(Self {
            datasystem_base_url: get_var_or("DATASYSTEM_BASE_URL", DEFAULT_DATASYSTEM_BASE_URL),
            datasystem_cnpj: get_var("DATASYSTEM_CNPJ")?,
            datasystem_hash: get_var("DATASYSTEM_HASH")?,
            clients_webhook_url: get_var("WEBHOOK_CLIENTS_URL")?,
            products_webhook_url: get_var("WEBHOOK_PRODUCTS_URL")?,
            utc_offset_hours,
            http_timeout_secs: parse_var("HTTP_TIMEOUT_SECS", "30")?,
            fetch_max_retries: parse_var("FETCH_MAX_RETRIES", "2")?,
            host: get_var_or("HOST", "0.0.0.0"),
            port: parse_var("PORT", "8080")?,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The fixed offset used for the sync window and the midnight schedule.
    pub fn utc_offset(&self) -> FixedOffset {
        // Range is validated in `from_env`; fall back to UTC for hand-built configs.
        FixedOffset::east_opt(self.utc_offset_hours * 3600).unwrap_or_else(|| Utc.fix())
    }
}

fn get_var(key: &str) -> HubsyncResult<String> {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| HubsyncError::Config(format!("{key} is required but not set")))
}

fn get_var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_owned())
}

fn parse_var<T>(key: &str, default: &str) -> HubsyncResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_var_or(key, default)
        .trim()
        .parse()
        .map_err(|e| HubsyncError::Config(format!("invalid {key}: {e}")))
}
