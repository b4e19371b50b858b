use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,

    pub server: ServerConfig,

    pub keystone: KeystoneConfig,

    pub provisioning: ProvisioningConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub database_path: String,

    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            database_path: "sqlite:gatepass.db".to_string(),
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,

    pub port: u16,

    pub cors_allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8780,
            cors_allowed_origins: vec!["*".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeystoneConfig {
    /// Base URL of the identity service, without the version suffix.
    pub url: String,

    /// Token presented on every identity-service call.
    pub token: String,

    /// Name of the domain new users are created in.
    pub domain_name: String,

    /// Role preselected in the activation choices.
    pub default_role: String,

    /// Identity API generation. Generation 3 and later supports extra
    /// attributes and a description on user creation; the legacy
    /// generation requires a primary project instead.
    pub api_generation: u8,

    pub request_timeout_seconds: u64,
}

impl Default for KeystoneConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:5000".to_string(),
            token: String::new(),
            domain_name: "Default".to_string(),
            default_role: "member".to_string(),
            api_generation: 3,
            request_timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisioningConfig {
    /// Credential issued when the operator omits a password on
    /// activation. A documented fallback, threaded into the reconciler
    /// explicitly rather than read from ambient state.
    pub default_password: String,

    /// Allow-list of extra field names forwarded verbatim on
    /// identity-service user creation.
    pub extra_attributes: Vec<String>,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            default_password: "changeme".to_string(),
            extra_attributes: Vec::new(),
        }
    }
}

impl Config {
    fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("GATEPASS_CONFIG") {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("gatepass")
            .join("config.toml")
    }

    pub fn load() -> Result<Self> {
        let path = Self::config_path();

        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.general.database_path.is_empty() {
            anyhow::bail!("general.database_path must not be empty");
        }

        if self.keystone.url.is_empty() {
            anyhow::bail!("keystone.url must not be empty");
        }

        if self.keystone.request_timeout_seconds == 0 {
            anyhow::bail!("keystone.request_timeout_seconds must be positive");
        }

        if self.provisioning.default_password.is_empty() {
            anyhow::bail!("provisioning.default_password must not be empty");
        }

        Ok(())
    }
}
