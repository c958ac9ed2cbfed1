use serde::{Deserialize, Serialize};
use socialgate_auth::config::{FederationConfig, RedirectConfig, SessionCookieConfig};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Federation provider settings
    #[serde(default)]
    pub federation: FederationConfig,
    /// Redirect targets of the social login endpoints
    #[serde(default)]
    pub redirects: RedirectConfig,
    /// Session cookie settings
    #[serde(default)]
    pub session: SessionCookieConfig,
    /// Accounts granted extra capabilities at startup
    #[serde(default)]
    pub access: AccessConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        self.federation.validate().map_err(|e| e.to_string())?;
        self.session.validate().map_err(|e| e.to_string())?;
        Ok(())
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Colored output.
    #[serde(default = "default_ansi")]
    pub ansi: bool,
}
fn default_log_level() -> String {
    "info".into()
}
fn default_ansi() -> bool {
    true
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            ansi: default_ansi(),
        }
    }
}

/// Capability grants applied when the server starts.
///
/// Account ids listed in `admin_accounts` receive `manage_users` and may
/// list and remove identities of any account.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AccessConfig {
    #[serde(default)]
    pub admin_accounts: Vec<String>,
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    /// Default configuration file name.
    pub const DEFAULT_CONFIG_PATH: &str = "socialgate.toml";

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_PATH));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        }
        // Environment variable overrides, e.g., SOCIALGATE__FEDERATION__VERSION=1
        builder = builder.add_source(
            Environment::with_prefix("SOCIALGATE")
                .prefix_separator("__")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let mut merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.federation = merged.federation.sanitized();
        merged.validate()?;
        Ok(merged)
    }
}
