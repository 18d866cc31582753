use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info};

/// Application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Environment (dev, staging, prod)
    #[serde(default = "default_environment")]
    pub environment: String,

    /// CORS allowed origins (comma separated)
    pub cors_origins: Option<String>,

    /// HS256 secret used to validate bearer tokens
    pub auth_jwt_secret: Option<String>,

    /// Database URL, required by the server binary
    pub db_url: Option<String>,

    /// Whether the public endpoint is served over TLS
    #[serde(default)]
    pub tls_enabled: bool,

    /// Public host name of the TLS certificate
    pub tls_subject_name: Option<String>,

    /// Sessions without participants are closed after this much inactivity
    #[serde(default = "default_session_idle_timeout_secs")]
    pub session_idle_timeout_secs: u64,

    /// Interval of the idle session sweep
    #[serde(default = "default_session_sweep_interval_secs")]
    pub session_sweep_interval_secs: u64,

    /// Outbound frames buffered per live connection before frames are dropped
    #[serde(default = "default_participant_queue_capacity")]
    pub participant_queue_capacity: usize,

    /// A per-diagram update worker exits after this long without jobs
    #[serde(default = "default_pipeline_worker_idle_secs")]
    pub pipeline_worker_idle_secs: u64,
}

impl Config {
    /// Load configuration from environment variables or app.env file
    pub fn load() -> Result<Self, ConfigError> {
        // Try to load from app.env file first
        if std::path::Path::new("app.env").exists() {
            dotenvy::from_filename("app.env").ok();
        } else {
            // Fallback to .env file
            dotenvy::dotenv().ok();
        }

        // Load from environment variables using envy
        match envy::from_env::<Config>() {
            Ok(config) => {
                info!("✅ Configuration loaded successfully");
                Ok(config)
            }
            Err(e) => {
                error!("❌ Failed to load configuration: {}", e);
                Err(ConfigError::EnvError(e))
            }
        }
    }

    /// Get the full server address
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if running in development mode
    pub fn is_development(&self) -> bool {
        self.environment.to_lowercase() == "dev" || self.environment.to_lowercase() == "development"
    }

    pub fn session_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.session_idle_timeout_secs)
    }

    pub fn session_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.session_sweep_interval_secs.max(1))
    }

    pub fn pipeline_worker_idle(&self) -> Duration {
        Duration::from_secs(self.pipeline_worker_idle_secs.max(1))
    }

    /// The deployment settings the session view builder derives endpoints from
    pub fn deployment(&self) -> DeploymentSettings {
        DeploymentSettings {
            tls_enabled: self.tls_enabled,
            tls_subject_name: self.tls_subject_name.clone().filter(|name| !name.is_empty()),
            port: self.port,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            environment: default_environment(),
            cors_origins: None,
            auth_jwt_secret: None,
            db_url: None,
            tls_enabled: false,
            tls_subject_name: None,
            session_idle_timeout_secs: default_session_idle_timeout_secs(),
            session_sweep_interval_secs: default_session_sweep_interval_secs(),
            participant_queue_capacity: default_participant_queue_capacity(),
            pipeline_worker_idle_secs: default_pipeline_worker_idle_secs(),
        }
    }
}

/// TLS and port settings of the public deployment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentSettings {
    pub tls_enabled: bool,
    pub tls_subject_name: Option<String>,
    pub port: u16,
}

#[derive(Debug)]
pub enum ConfigError {
    EnvError(envy::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::EnvError(e) => write!(f, "Environment variable error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_session_idle_timeout_secs() -> u64 {
    15 * 60
}

fn default_session_sweep_interval_secs() -> u64 {
    5 * 60
}

fn default_participant_queue_capacity() -> usize {
    256
}

fn default_pipeline_worker_idle_secs() -> u64 {
    60
}
