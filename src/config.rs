use std::env;

use crate::service::{EngineSettings, PendingScope};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub rust_env: String,
    pub api_host: String,
    pub api_port: u16,
    pub db_path: String,
    pub max_conflict_retries: u32,
    pub pending_scope: PendingScope,
    pub default_page_size: u64,
    pub max_page_size: u64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, String> {
        load_dotenv_layers();

        let default_page_size = read_optional_u64("APPROVAL_DEFAULT_PAGE_SIZE", 10)?;
        let max_page_size = read_optional_u64("APPROVAL_MAX_PAGE_SIZE", 100)?;
        if default_page_size == 0 || max_page_size == 0 {
            return Err("page sizes must be greater than zero".to_string());
        }

        Ok(Self {
            rust_env: read_optional_string("RUST_ENV", "development"),
            api_host: read_optional_string("API_HOST", "127.0.0.1"),
            api_port: read_optional_u16("API_PORT", 8090)?,
            db_path: read_optional_string("APPROVAL_DB_PATH", "data/approval.sled"),
            max_conflict_retries: read_optional_u32("APPROVAL_MAX_CONFLICT_RETRIES", 8)?,
            pending_scope: read_optional_string("APPROVAL_PENDING_SCOPE", "all")
                .parse()
                .map_err(|e| format!("invalid APPROVAL_PENDING_SCOPE: {e}"))?,
            default_page_size: default_page_size.min(max_page_size),
            max_page_size,
        })
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            max_conflict_retries: self.max_conflict_retries,
            pending_scope: self.pending_scope,
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.api_host, self.api_port)
    }

    /// Clamps a caller's page size, substituting the default when absent.
    pub fn page_size(&self, requested: Option<u64>) -> u64 {
        requested
            .unwrap_or(self.default_page_size)
            .clamp(1, self.max_page_size)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            rust_env: "test".to_string(),
            api_host: "127.0.0.1".to_string(),
            api_port: 0,
            db_path: "data/approval.sled".to_string(),
            max_conflict_retries: 8,
            pending_scope: PendingScope::All,
            default_page_size: 10,
            max_page_size: 100,
        }
    }
}

fn read_optional_u16(key: &str, default: u16) -> Result<u16, String> {
    match env::var(key) {
        Ok(v) => v.parse::<u16>().map_err(|e| format!("invalid {key}: {e}")),
        Err(_) => Ok(default),
    }
}

fn read_optional_u32(key: &str, default: u32) -> Result<u32, String> {
    match env::var(key) {
        Ok(v) => v.parse::<u32>().map_err(|e| format!("invalid {key}: {e}")),
        Err(_) => Ok(default),
    }
}

fn read_optional_u64(key: &str, default: u64) -> Result<u64, String> {
    match env::var(key) {
        Ok(v) => v.parse::<u64>().map_err(|e| format!("invalid {key}: {e}")),
        Err(_) => Ok(default),
    }
}

fn read_optional_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn load_dotenv_layers() {
    for path in [".env", "../.env"] {
        let _ = dotenvy::from_path(path);
    }
}
