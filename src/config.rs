use std::net::IpAddr;
use std::path::PathBuf;

use ipnet::IpNet;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub host: IpAddr,
    pub port: u16,
    pub trusted_proxies: Vec<IpNet>,
    pub log_level: String,
    pub field_mappings: Option<PathBuf>,
    pub max_write_attempts: u32,
    pub max_page_size: i64,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let database_url = env_required("DATABASE_URL")?;
        let jwt_secret = env_required("JWT_SECRET")?;

        let host: IpAddr = env_or("VISITLOG_HOST", "0.0.0.0")
            .parse()
            .map_err(|e| format!("Invalid VISITLOG_HOST: {e}"))?;

        let port: u16 = env_or("VISITLOG_PORT", "3000")
            .parse()
            .map_err(|e| format!("Invalid VISITLOG_PORT: {e}"))?;

        let trusted_proxies: Vec<IpNet> = env_or("VISITLOG_TRUSTED_PROXIES", "")
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .map(|s| {
                s.trim()
                    .parse()
                    .map_err(|e| format!("Invalid VISITLOG_TRUSTED_PROXIES entry '{s}': {e}"))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let log_level = env_or("VISITLOG_LOG_LEVEL", "info");

        let field_mappings = std::env::var("VISITLOG_FIELD_MAPPINGS")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);

        let max_write_attempts: u32 = env_or("VISITLOG_MAX_WRITE_ATTEMPTS", "5")
            .parse()
            .map_err(|e| format!("Invalid VISITLOG_MAX_WRITE_ATTEMPTS: {e}"))?;
        if max_write_attempts == 0 {
            return Err("VISITLOG_MAX_WRITE_ATTEMPTS must be at least 1".to_string());
        }

        let max_page_size: i64 = env_or("VISITLOG_MAX_PAGE_SIZE", "500")
            .parse()
            .map_err(|e| format!("Invalid VISITLOG_MAX_PAGE_SIZE: {e}"))?;
        if max_page_size < 1 {
            return Err("VISITLOG_MAX_PAGE_SIZE must be at least 1".to_string());
        }

        Ok(Config {
            database_url,
            jwt_secret,
            host,
            port,
            trusted_proxies,
            log_level,
            field_mappings,
            max_write_attempts,
            max_page_size,
        })
    }
}

fn env_required(key: &str) -> Result<String, String> {
    std::env::var(key).map_err(|_| format!("Missing required environment variable: {key}"))
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
