use crate::error::{BecknError, Result};
use crate::model::SupportInfo;
use crate::registry::ProviderDescriptor;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Deserialize, Clone, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub gateway: GatewayConfig,
    pub callback: CallbackConfig,
    pub dispatcher: DispatcherConfig,
    pub support: SupportConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// `sqlite://...` for the SQLite store, `memory` for the in-process one.
    pub url: String,
    pub max_connections: Option<u32>,
    pub min_connections: Option<u32>,
    pub acquire_timeout_seconds: Option<u64>,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub registry_url: Option<String>,
    /// Used when no registry URL is configured.
    pub providers: Vec<ProviderDescriptor>,
    pub max_concurrency: usize,
    pub timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(default)]
pub struct CallbackConfig {
    pub timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(default)]
pub struct DispatcherConfig {
    pub drain_timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(default)]
pub struct SupportConfig {
    pub contact: String,
    pub phone: String,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://bpp.db".to_string(),
            max_connections: Some(10),
            min_connections: Some(1),
            acquire_timeout_seconds: Some(30),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            registry_url: None,
            providers: Vec::new(),
            max_concurrency: 32,
            timeout_seconds: 10,
        }
    }
}

impl Default for CallbackConfig {
    fn default() -> Self {
        Self { timeout_seconds: 10 }
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            drain_timeout_seconds: 30,
        }
    }
}

impl Default for SupportConfig {
    fn default() -> Self {
        Self {
            contact: "support@bpp.com".to_string(),
            phone: "+1234567890".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: Some("text".to_string()),
        }
    }
}

impl GatewayConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl CallbackConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl DispatcherConfig {
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_seconds)
    }
}

impl From<&SupportConfig> for SupportInfo {
    fn from(config: &SupportConfig) -> Self {
        SupportInfo {
            contact: config.contact.clone(),
            phone: config.phone.clone(),
        }
    }
}

impl LoggingConfig {
    /// Installs the global tracing subscriber. `RUST_LOG`, when set, wins over `level`.
    pub fn init_tracing(&self) {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level));
        let builder = tracing_subscriber::fmt().with_env_filter(filter);

        let result = match self.format.as_deref() {
            Some("json") => builder.json().try_init(),
            _ => builder.try_init(),
        };
        if let Err(e) = result {
            eprintln!("Tracing already initialised: {}", e);
        }
    }
}

impl AppConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .map_err(|e| BecknError::Config(format!("Failed to read config file: {}", e)))?;

        let config: AppConfig = toml::from_str(&config_str)
            .map_err(|e| BecknError::Config(format!("Failed to parse config file: {}", e)))?;

        Ok(config)
    }

    /// Loads `path` if it exists, otherwise starts from defaults, then applies env overrides.
    pub fn load_with_env_overrides<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = if path.as_ref().exists() {
            Self::load(path)?
        } else {
            tracing::debug!("Config file {} not found, using defaults", path.as_ref().display());
            Self::default()
        };

        if let Ok(database_url) = std::env::var("DATABASE_URL") {
            config.database.url = database_url;
        }

        if let Ok(registry_url) = std::env::var("REGISTRY_URL") {
            config.gateway.registry_url = Some(registry_url);
        }

        if let Ok(log_level) = std::env::var("RUST_LOG") {
            config.logging.level = log_level;
        }

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(BecknError::Config("Server port cannot be 0".to_string()));
        }

        if self.database.url.is_empty() {
            return Err(BecknError::Config("Database URL cannot be empty".to_string()));
        }

        if self.gateway.max_concurrency == 0 {
            return Err(BecknError::Config("Gateway max_concurrency must be at least 1".to_string()));
        }

        if self.gateway.timeout_seconds == 0 || self.callback.timeout_seconds == 0 {
            return Err(BecknError::Config("Outbound timeouts must be greater than 0".to_string()));
        }

        Ok(())
    }

    pub fn get_server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn uses_memory_store(&self) -> bool {
        self.database.url == "memory"
    }
}

pub fn create_default_config_file<P: AsRef<Path>>(path: P) -> Result<()> {
    let default_config = AppConfig::default();
    let toml_str = toml::to_string_pretty(&default_config)
        .map_err(|e| BecknError::Config(format!("Failed to serialize default config: {}", e)))?;

    std::fs::write(path, toml_str)
        .map_err(|e| BecknError::Config(format!("Failed to write default config file: {}", e)))?;

    Ok(())
}
