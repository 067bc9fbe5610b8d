//! Configuration for a WallPaint session.
//!
//! Loaded from `~/.config/wallpaint/config.toml` when present. Every field
//! has a default, so an empty or missing file is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, WallPaintError};
use crate::paint::{DEFAULT_COLOR, DEFAULT_OPACITY, HexColor, Opacity, PaintSettings};

/// Environment variable overriding `service.base_url`.
pub const ENV_API_URL: &str = "WALLPAINT_API_URL";
/// Environment variable overriding `session.debounce_ms`.
pub const ENV_DEBOUNCE_MS: &str = "WALLPAINT_DEBOUNCE_MS";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WallPaintConfig {
    pub service: ServiceConfig,
    pub session: SessionConfig,
    pub upload: UploadPolicy,
}

/// Where and how to reach the segmentation service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub base_url: String,
    /// Detection on CPU takes tens of seconds, so this is generous.
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            request_timeout_secs: 120,
            connect_timeout_secs: 10,
        }
    }
}

impl ServiceConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Orchestration tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Debounce window for color, opacity and main-walls-only changes.
    pub debounce_ms: u64,
    /// Refuse `detect` until a health check reported the model loaded.
    pub require_health_check: bool,
    pub default_color: String,
    pub default_opacity: f32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 300,
            require_health_check: true,
            default_color: DEFAULT_COLOR.to_string(),
            default_opacity: DEFAULT_OPACITY,
        }
    }
}

impl SessionConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Paint settings a fresh session starts with.
    pub fn default_settings(&self) -> Result<PaintSettings> {
        Ok(PaintSettings {
            color: HexColor::parse(&self.default_color)
                .map_err(|e| WallPaintError::config(format!("session.default_color: {e}")))?,
            opacity: Opacity::new(self.default_opacity)
                .map_err(|e| WallPaintError::config(format!("session.default_opacity: {e}")))?,
            main_walls_only: false,
        })
    }
}

/// Size and type limits applied to uploads before anything else happens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadPolicy {
    pub max_bytes: u64,
    pub allowed_mime_types: Vec<String>,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_bytes: 10 * 1024 * 1024,
            allowed_mime_types: vec![
                "image/jpeg".to_string(),
                "image/png".to_string(),
                "image/webp".to_string(),
            ],
        }
    }
}

impl WallPaintConfig {
    /// Parses a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the configuration from `path`.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            WallPaintError::config(format!(
                "Failed to read configuration file at {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    /// Loads `path` if given, else the default file if it exists, else defaults.
    /// Environment overrides are applied last.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load_from(path)?,
            None => match default_config_path() {
                Some(default) if default.exists() => {
                    tracing::debug!("[Config] Loading {}", default.display());
                    Self::load_from(&default)?
                }
                _ => Self::default(),
            },
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Applies overrides from a variable lookup (the process environment in
    /// production).
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_API_URL) {
            self.service.base_url = url;
        }
        if let Some(ms) = lookup(ENV_DEBOUNCE_MS) {
            self.session.debounce_ms = ms.trim().parse().map_err(|_| {
                WallPaintError::config(format!("{ENV_DEBOUNCE_MS}='{ms}' is not a number"))
            })?;
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<()> {
        let base_url = self.service.base_url.trim();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(WallPaintError::config(format!(
                "service.base_url '{}' must start with http:// or https://",
                self.service.base_url
            )));
        }
        if self.upload.allowed_mime_types.is_empty() {
            return Err(WallPaintError::config(
                "upload.allowed_mime_types must not be empty",
            ));
        }
        self.session.default_settings()?;
        Ok(())
    }
}

/// Returns `~/.config/wallpaint/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".config").join("wallpaint").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_empty_document_yields_defaults() {
        let config = WallPaintConfig::from_toml_str("").unwrap();
        assert_eq!(config, WallPaintConfig::default());
        assert_eq!(config.session.debounce(), Duration::from_millis(300));
        assert_eq!(config.service.base_url, "http://localhost:5000");
    }

    #[test]
    fn test_partial_document_overrides_fields() {
        let config = WallPaintConfig::from_toml_str(
            r##"
            [service]
            base_url = "https://paint.example.com"

            [session]
            debounce_ms = 150
            default_color = "#00aa00"
            "##,
        )
        .unwrap();

        assert_eq!(config.service.base_url, "https://paint.example.com");
        assert_eq!(config.service.request_timeout_secs, 120);
        assert_eq!(config.session.debounce_ms, 150);
        let settings = config.session.default_settings().unwrap();
        assert_eq!(settings.color.as_str(), "#00AA00");
    }

    #[test]
    fn test_invalid_values_are_config_errors() {
        let err = WallPaintConfig::from_toml_str("[service]\nbase_url = \"localhost\"").unwrap_err();
        assert!(matches!(err, WallPaintError::Config(_)));

        let err =
            WallPaintConfig::from_toml_str("[session]\ndefault_color = \"blue\"").unwrap_err();
        assert!(matches!(err, WallPaintError::Config(_)));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            (ENV_API_URL, "http://10.0.0.2:5000"),
            (ENV_DEBOUNCE_MS, "50"),
        ]);
        let mut config = WallPaintConfig::default();
        config
            .apply_env_overrides(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.service.base_url, "http://10.0.0.2:5000");
        assert_eq!(config.session.debounce_ms, 50);

        let mut config = WallPaintConfig::default();
        let err = config
            .apply_env_overrides(|key| (key == ENV_DEBOUNCE_MS).then(|| "soon".to_string()))
            .unwrap_err();
        assert!(matches!(err, WallPaintError::Config(_)));
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[upload]\nmax_bytes = 2048").unwrap();

        let config = WallPaintConfig::load_from(&path).unwrap();
        assert_eq!(config.upload.max_bytes, 2048);
        assert_eq!(config.upload.allowed_mime_types.len(), 3);

        let missing = WallPaintConfig::load_from(&temp_dir.path().join("nope.toml"));
        assert!(matches!(missing, Err(WallPaintError::Config(_))));
    }
}
