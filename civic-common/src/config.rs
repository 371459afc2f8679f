//! Configuration loading and root folder resolution
//!
//! Bootstrap configuration comes from an optional TOML file. Every field has
//! a built-in default, so a missing or malformed file degrades to defaults
//! with a warning instead of stopping the service.
//!
//! Root folder priority:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable `CIVIC_ROOT_FOLDER`
//! 3. TOML config file `root_folder`
//! 4. OS-dependent compiled default (fallback)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "CIVIC_ROOT_FOLDER";

/// Environment variable carrying the generative AI API key
pub const API_KEY_ENV: &str = "CIVIC_GEMINI_API_KEY";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Root folder for database, uploads and generated page images
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// HTTP server port (module default used when absent)
    #[serde(default)]
    pub port: Option<u16>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Generative AI backend configuration
    #[serde(default)]
    pub ai: AiConfig,

    /// Page rasterization configuration
    #[serde(default)]
    pub rasterizer: RasterizerConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Generative AI backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    /// API key (the environment variable takes precedence)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Model name
    #[serde(default = "default_model")]
    pub model: String,

    /// Base URL of the generative language API
    #[serde(default = "default_ai_base_url")]
    pub base_url: String,

    /// Client-side rate limit
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,

    /// Per-call HTTP timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Attempts per AI call, including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_model(),
            base_url: default_ai_base_url(),
            requests_per_minute: default_requests_per_minute(),
            timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
        }
    }
}

/// Page rasterization configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RasterizerConfig {
    /// Converter executable
    #[serde(default = "default_rasterizer_program")]
    pub program: String,

    /// Output resolution
    #[serde(default = "default_dpi")]
    pub dpi: u32,
}

impl Default for RasterizerConfig {
    fn default() -> Self {
        Self {
            program: default_rasterizer_program(),
            dpi: default_dpi(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_ai_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_requests_per_minute() -> u32 {
    30
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_max_attempts() -> u32 {
    3
}

fn default_rasterizer_program() -> String {
    "pdftoppm".to_string()
}

fn default_dpi() -> u32 {
    150
}

impl TomlConfig {
    /// Resolve the AI API key: environment first, then TOML
    pub fn resolve_api_key(&self) -> Option<String> {
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.trim().is_empty() {
                info!("AI API key loaded from environment variable");
                return Some(key);
            }
        }

        match &self.ai.api_key {
            Some(key) if !key.trim().is_empty() => {
                info!("AI API key loaded from TOML config");
                Some(key.clone())
            }
            _ => None,
        }
    }
}

/// Read and parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Load config if present, otherwise fall back to defaults with a warning
pub fn load_or_default(path: Option<&Path>) -> TomlConfig {
    let Some(path) = path else {
        info!("No config file given, using built-in defaults");
        return TomlConfig::default();
    };

    if !path.exists() {
        warn!("Config file {} not found, using built-in defaults", path.display());
        return TomlConfig::default();
    }

    match load_toml_config(path) {
        Ok(config) => {
            info!("Loaded config from {}", path.display());
            config
        }
        Err(e) => {
            warn!("{} - using built-in defaults", e);
            TomlConfig::default()
        }
    }
}

/// Default config file location for a module (`<config_dir>/civic/<module>.toml`)
pub fn default_config_path(module_name: &str) -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("civic").join(format!("{}.toml", module_name)))
}

/// Write config atomically (temp file + rename)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tmp = path.with_extension("toml.tmp");
    std::fs::write(&tmp, content)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Root folder resolver following the documented priority order
#[derive(Debug, Clone)]
pub struct RootFolderResolver {
    module_name: String,
    cli_arg: Option<PathBuf>,
    toml_root: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new(module_name: impl Into<String>) -> Self {
        Self {
            module_name: module_name.into(),
            cli_arg: None,
            toml_root: None,
        }
    }

    /// Command-line override
    pub fn with_cli_arg(mut self, path: Option<PathBuf>) -> Self {
        self.cli_arg = path;
        self
    }

    /// Root folder from the TOML file
    pub fn with_toml(mut self, config: &TomlConfig) -> Self {
        self.toml_root = config.root_folder.clone();
        self
    }

    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            info!(module = %self.module_name, "Root folder from command line: {}", path.display());
            return path.clone();
        }

        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.trim().is_empty() {
                info!(module = %self.module_name, "Root folder from {}: {}", ROOT_FOLDER_ENV, path);
                return PathBuf::from(path);
            }
        }

        if let Some(path) = &self.toml_root {
            info!(module = %self.module_name, "Root folder from TOML: {}", path.display());
            return path.clone();
        }

        let path = default_root_folder();
        info!(module = %self.module_name, "Root folder from compiled default: {}", path.display());
        path
    }
}

/// OS-dependent default root folder
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("civic"))
        .unwrap_or_else(|| PathBuf::from("./civic_data"))
}

/// Creates the root folder layout and derives paths inside it
#[derive(Debug, Clone)]
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    /// Create root, upload and generated-image directories if missing
    pub fn ensure_directory_exists(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root_folder)?;
        std::fs::create_dir_all(self.pdf_upload_dir())?;
        std::fs::create_dir_all(self.generated_root())?;
        Ok(())
    }

    pub fn root_folder(&self) -> &Path {
        &self.root_folder
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join("civic.db")
    }

    /// Where uploaded source PDFs live (`uploads/pdf`)
    pub fn pdf_upload_dir(&self) -> PathBuf {
        self.root_folder.join("uploads").join("pdf")
    }

    /// Parent of all per-request page image folders
    pub fn generated_root(&self) -> PathBuf {
        self.root_folder.join("uploads").join("generated")
    }

    /// Page image folder for one request (`uploads/generated/<request_id>`)
    pub fn generated_dir(&self, request_id: Uuid) -> PathBuf {
        self.generated_root().join(request_id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config: TomlConfig = toml::from_str("").unwrap();
        assert!(config.root_folder.is_none());
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.ai.model, "gemini-2.5-flash");
        assert_eq!(config.ai.max_attempts, 3);
        assert_eq!(config.rasterizer.program, "pdftoppm");
        assert_eq!(config.rasterizer.dpi, 150);
    }

    #[test]
    fn test_partial_ai_section_keeps_other_defaults() {
        let config: TomlConfig = toml::from_str(
            r#"
            port = 6000
            [ai]
            model = "gemini-2.0-pro"
            "#,
        )
        .unwrap();
        assert_eq!(config.port, Some(6000));
        assert_eq!(config.ai.model, "gemini-2.0-pro");
        assert_eq!(config.ai.requests_per_minute, 30);
    }

    #[test]
    fn test_initializer_paths() {
        let init = RootFolderInitializer::new(PathBuf::from("/srv/civic"));
        let id = Uuid::nil();
        assert_eq!(init.database_path(), PathBuf::from("/srv/civic/civic.db"));
        assert_eq!(init.pdf_upload_dir(), PathBuf::from("/srv/civic/uploads/pdf"));
        assert_eq!(
            init.generated_dir(id),
            PathBuf::from(format!("/srv/civic/uploads/generated/{}", id))
        );
    }
}
