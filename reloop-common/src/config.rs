//! Bootstrap configuration and root folder resolution
//!
//! Two sources feed the service at startup:
//! 1. **TOML bootstrap file** (`reloop-api.toml`): bind address, port, logging,
//!    collaborator endpoints and workflow tuning
//! 2. **Environment**: `RELOOP_ROOT_FOLDER`, `RELOOP_GEMINI_API_KEY`
//!
//! A missing or malformed TOML file never stops the service. It is reported
//! with a warning and built-in defaults are used instead.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "RELOOP_ROOT_FOLDER";

/// Environment variable carrying the Gemini API key
pub const GEMINI_API_KEY_ENV: &str = "RELOOP_GEMINI_API_KEY";

/// Database file name inside the root folder
pub const DATABASE_FILE_NAME: &str = "reloop.db";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Root folder holding reloop.db (optional)
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// Interface the HTTP server binds to
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Vision/pricing collaborator settings
    #[serde(default)]
    pub gemini: GeminiConfig,

    /// Verification workflow tuning
    #[serde(default)]
    pub workflow: WorkflowConfig,

    /// Optional TOML catalog loaded at startup
    #[serde(default)]
    pub catalog_seed: Option<PathBuf>,

    /// Lifetime of a sign-in token
    #[serde(default = "default_session_ttl_hours")]
    pub session_ttl_hours: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Gemini-style `generateContent` collaborator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_gemini_base_url")]
    pub base_url: String,

    /// Model used for photo classification
    #[serde(default = "default_gemini_model")]
    pub vision_model: String,

    /// Model used for pricing and waste estimates
    #[serde(default = "default_gemini_model")]
    pub text_model: String,

    /// Request timeout applied to every collaborator call
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

/// Verification workflow tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Pause before surfacing a "service busy" failure
    #[serde(default = "default_busy_delay_ms")]
    pub busy_delay_ms: u64,

    /// XP granted for each verified component
    #[serde(default = "default_verification_xp")]
    pub verification_xp: i64,

    /// XP granted once when a session is finished
    #[serde(default = "default_completion_bonus_xp")]
    pub completion_bonus_xp: i64,

    /// Live sessions untouched for this long are dropped from memory
    #[serde(default = "default_session_idle_minutes")]
    pub session_idle_minutes: u64,
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5780
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_gemini_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_timeout_seconds() -> u64 {
    20
}

fn default_busy_delay_ms() -> u64 {
    1500
}

fn default_verification_xp() -> i64 {
    250
}

fn default_completion_bonus_xp() -> i64 {
    500
}

fn default_session_idle_minutes() -> u64 {
    120
}

fn default_session_ttl_hours() -> u64 {
    24
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            root_folder: None,
            bind_address: default_bind_address(),
            port: default_port(),
            logging: LoggingConfig::default(),
            gemini: GeminiConfig::default(),
            workflow: WorkflowConfig::default(),
            catalog_seed: None,
            session_ttl_hours: default_session_ttl_hours(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_gemini_base_url(),
            vision_model: default_gemini_model(),
            text_model: default_gemini_model(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            busy_delay_ms: default_busy_delay_ms(),
            verification_xp: default_verification_xp(),
            completion_bonus_xp: default_completion_bonus_xp(),
            session_idle_minutes: default_session_idle_minutes(),
        }
    }
}

impl TomlConfig {
    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }

    /// Load configuration from `path`, falling back to defaults
    ///
    /// Never fails: unreadable or invalid files are logged and ignored.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            info!("No config file at {}, using defaults", path.display());
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(content) => match Self::from_toml_str(&content) {
                Ok(config) => {
                    info!("Loaded configuration from {}", path.display());
                    config
                }
                Err(e) => {
                    warn!("Ignoring invalid config {}: {}", path.display(), e);
                    Self::default()
                }
            },
            Err(e) => {
                warn!("Failed to read config {}: {}", path.display(), e);
                Self::default()
            }
        }
    }
}

/// Default location of the bootstrap TOML file
///
/// `~/.config/reloop/reloop-api.toml` on Linux, the platform config dir elsewhere.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("reloop").join("reloop-api.toml"))
        .unwrap_or_else(|| PathBuf::from("reloop-api.toml"))
}

/// Resolve the Gemini API key
///
/// **Priority:** ENV → TOML. Blank values are ignored.
pub fn resolve_gemini_api_key(toml_config: &TomlConfig) -> Option<String> {
    if let Ok(key) = std::env::var(GEMINI_API_KEY_ENV) {
        if is_valid_key(&key) {
            info!("Gemini API key loaded from environment variable");
            return Some(key);
        }
    }

    if let Some(key) = toml_config.gemini.api_key.as_ref() {
        if is_valid_key(key) {
            info!("Gemini API key loaded from TOML config");
            return Some(key.clone());
        }
    }

    warn!(
        "Gemini API key not configured (set {} or gemini.api_key); AI verification and pricing disabled",
        GEMINI_API_KEY_ENV
    );
    None
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

/// Root folder resolution
///
/// Priority order:
/// 1. Command-line argument
/// 2. `RELOOP_ROOT_FOLDER` environment variable
/// 3. TOML `root_folder`
/// 4. OS-dependent default
pub struct RootFolderResolver<'a> {
    cli_arg: Option<PathBuf>,
    toml_config: &'a TomlConfig,
}

impl<'a> RootFolderResolver<'a> {
    pub fn new(cli_arg: Option<PathBuf>, toml_config: &'a TomlConfig) -> Self {
        Self {
            cli_arg,
            toml_config,
        }
    }

    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            return path.clone();
        }

        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.trim().is_empty() {
                return PathBuf::from(path);
            }
        }

        if let Some(path) = &self.toml_config.root_folder {
            return path.clone();
        }

        default_root_folder()
    }
}

/// OS-dependent default root folder
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("reloop"))
        .unwrap_or_else(|| PathBuf::from("./reloop_data"))
}

/// Creates the root folder and locates the database inside it
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    pub fn ensure_directory_exists(&self) -> Result<()> {
        if !self.root_folder.exists() {
            std::fs::create_dir_all(&self.root_folder)?;
            info!("Created root folder: {}", self.root_folder.display());
        }
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join(DATABASE_FILE_NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TomlConfig::default();
        assert_eq!(config.port, 5780);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.workflow.busy_delay_ms, 1500);
        assert_eq!(config.workflow.verification_xp, 250);
        assert_eq!(config.workflow.completion_bonus_xp, 500);
        assert!(config.gemini.api_key.is_none());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config = TomlConfig::from_toml_str(
            r#"
            port = 9000

            [workflow]
            busy_delay_ms = 0
            "#,
        )
        .unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(config.workflow.busy_delay_ms, 0);
        assert_eq!(config.workflow.verification_xp, 250);
        assert_eq!(config.workflow.session_idle_minutes, 120);
        assert_eq!(config.bind_address, "127.0.0.1");
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = TomlConfig::from_toml_str("port = \"not a number\"").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_is_valid_key() {
        assert!(is_valid_key("abc"));
        assert!(!is_valid_key(""));
        assert!(!is_valid_key("   "));
    }
}
