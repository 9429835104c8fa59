//! Reader configuration.
//!
//! Settings for the page list: how many rendered pages stay cached, how slot
//! widths turn into render sizes, and where to find PDFium. Configuration can
//! be loaded from a TOML file, environment variables, or built in code.

use pdf_reader_render::PageSize;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const ENV_MAX_CACHED_PAGES: &str = "PDF_READER_MAX_CACHED_PAGES";
const ENV_PAGE_ASPECT: &str = "PDF_READER_PAGE_ASPECT";
const ENV_RENDER_WIDTH: &str = "PDF_READER_RENDER_WIDTH";
const ENV_PDFIUM_DIR: &str = "PDF_READER_PDFIUM_DIR";

/// Configuration for the page list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Upper bound on rendered pages kept in memory
    pub max_cached_pages: usize,
    /// Page height divided by page width, used to size render requests
    pub page_aspect_ratio: f32,
    /// Minimum render width in pixels, applied when a slot is narrower
    pub fallback_render_width: u32,
    /// Directory holding the PDFium shared library
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdfium_library_dir: Option<PathBuf>,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            max_cached_pages: 5,
            page_aspect_ratio: 1.414, // A4
            fallback_render_width: 1080,
            pdfium_library_dir: None,
        }
    }
}

impl ReaderConfig {
    pub fn with_max_cached_pages(mut self, pages: usize) -> Self {
        self.max_cached_pages = pages;
        self
    }

    pub fn with_page_aspect_ratio(mut self, ratio: f32) -> Self {
        self.page_aspect_ratio = ratio;
        self
    }

    /// Sets the minimum render width. Zero renders at the slot's own width.
    pub fn with_fallback_render_width(mut self, width: u32) -> Self {
        self.fallback_render_width = width;
        self
    }

    pub fn with_pdfium_library_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.pdfium_library_dir = Some(path.as_ref().to_path_buf());
        self
    }

    /// Returns the default config file location for the current platform.
    ///
    /// - macOS: ~/Library/Application Support/pdf-reader/config.toml
    /// - Linux: ~/.config/pdf-reader/config.toml
    /// - Windows: %APPDATA%\pdf-reader\config.toml
    pub fn default_config_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("pdf-reader").join("config.toml")
        } else {
            PathBuf::from("pdf-reader.toml")
        }
    }

    /// Loads configuration from environment variables.
    ///
    /// Environment variables:
    /// - `PDF_READER_MAX_CACHED_PAGES`: cached page limit (default: 5)
    /// - `PDF_READER_PAGE_ASPECT`: page height / width (default: 1.414)
    /// - `PDF_READER_RENDER_WIDTH`: minimum render width (default: 1080)
    /// - `PDF_READER_PDFIUM_DIR`: PDFium library directory
    ///
    /// # Errors
    /// Returns an error if any variable holds an unparsable or invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(pages) = parse_env(ENV_MAX_CACHED_PAGES)? {
            config.max_cached_pages = pages;
        }
        if let Some(ratio) = parse_env(ENV_PAGE_ASPECT)? {
            config.page_aspect_ratio = ratio;
        }
        if let Some(width) = parse_env(ENV_RENDER_WIDTH)? {
            config.fallback_render_width = width;
        }
        if let Ok(dir) = std::env::var(ENV_PDFIUM_DIR) {
            config.pdfium_library_dir = Some(PathBuf::from(dir));
        }

        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a TOML file. Missing keys keep their
    /// defaults.
    ///
    /// ```toml
    /// max_cached_pages = 5
    /// page_aspect_ratio = 1.414
    /// fallback_render_width = 1080
    /// pdfium_library_dir = "/opt/pdfium/lib"
    /// ```
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Saves configuration to a TOML file.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path.as_ref(), contents)?;
        Ok(())
    }

    /// Checks that the cache holds at least one page and the aspect ratio is
    /// a positive finite number.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_cached_pages == 0 {
            return Err(ConfigError::InvalidValue("max_cached_pages".to_string()));
        }
        if !self.page_aspect_ratio.is_finite() || self.page_aspect_ratio <= 0.0 {
            return Err(ConfigError::InvalidValue("page_aspect_ratio".to_string()));
        }
        Ok(())
    }

    /// Render size for a slot `slot_width` pixels wide.
    pub fn target_size(&self, slot_width: u32) -> PageSize {
        let width = slot_width.max(self.fallback_render_width);
        let height = (width as f32 * self.page_aspect_ratio) as u32;
        PageSize::new(width, height)
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue(name.to_string())),
        Err(_) => Ok(None),
    }
}

/// Errors that can occur during configuration operations.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for configuration key: {0}")]
    InvalidValue(String),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    const ALL_VARS: [&str; 4] =
        [ENV_MAX_CACHED_PAGES, ENV_PAGE_ASPECT, ENV_RENDER_WIDTH, ENV_PDFIUM_DIR];

    // Saves and restores environment variables around a test
    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new(var_names: &[&str]) -> Self {
            let vars = var_names
                .iter()
                .map(|name| (name.to_string(), env::var(name).ok()))
                .collect();
            for name in var_names {
                env::remove_var(name);
            }
            Self { vars }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (name, value) in &self.vars {
                match value {
                    Some(v) => env::set_var(name, v),
                    None => env::remove_var(name),
                }
            }
        }
    }

    #[test]
    fn test_default_config() {
        let config = ReaderConfig::default();
        assert_eq!(config.max_cached_pages, 5);
        assert_eq!(config.page_aspect_ratio, 1.414);
        assert_eq!(config.fallback_render_width, 1080);
        assert_eq!(config.pdfium_library_dir, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_methods() {
        let config = ReaderConfig::default()
            .with_max_cached_pages(12)
            .with_page_aspect_ratio(1.294)
            .with_fallback_render_width(720)
            .with_pdfium_library_dir("/opt/pdfium");

        assert_eq!(config.max_cached_pages, 12);
        assert_eq!(config.page_aspect_ratio, 1.294);
        assert_eq!(config.fallback_render_width, 720);
        assert_eq!(config.pdfium_library_dir, Some(PathBuf::from("/opt/pdfium")));
    }

    #[test]
    fn test_target_size_uses_fallback_width() {
        let config = ReaderConfig::default();
        assert_eq!(config.target_size(300), PageSize::new(1080, 1527));
        assert_eq!(config.target_size(2000), PageSize::new(2000, 2828));

        let config = config.with_fallback_render_width(0);
        assert_eq!(config.target_size(100), PageSize::new(100, 141));
        assert!(config.target_size(0).is_empty());
    }

    #[test]
    fn test_validate_rejects_empty_cache() {
        let result = ReaderConfig::default().with_max_cached_pages(0).validate();
        assert!(matches!(result, Err(ConfigError::InvalidValue(key)) if key == "max_cached_pages"));
    }

    #[test]
    fn test_validate_rejects_bad_aspect() {
        for ratio in [0.0, -1.0, f32::NAN, f32::INFINITY] {
            let result = ReaderConfig::default().with_page_aspect_ratio(ratio).validate();
            assert!(
                matches!(
                    result,
                    Err(ConfigError::InvalidValue(ref key)) if key == "page_aspect_ratio"
                ),
                "ratio {ratio} accepted"
            );
        }
    }

    #[test]
    fn test_default_config_path_ends_with_file_name() {
        let path = ReaderConfig::default_config_path();
        assert!(path.ends_with("config.toml") || path.ends_with("pdf-reader.toml"));
    }

    #[test]
    #[serial]
    fn test_from_env() {
        let _guard = EnvGuard::new(&ALL_VARS);

        env::set_var(ENV_MAX_CACHED_PAGES, "9");
        env::set_var(ENV_PAGE_ASPECT, "1.5");
        env::set_var(ENV_RENDER_WIDTH, "640");
        env::set_var(ENV_PDFIUM_DIR, "/tmp/pdfium");

        let config = ReaderConfig::from_env().unwrap();
        assert_eq!(config.max_cached_pages, 9);
        assert_eq!(config.page_aspect_ratio, 1.5);
        assert_eq!(config.fallback_render_width, 640);
        assert_eq!(config.pdfium_library_dir, Some(PathBuf::from("/tmp/pdfium")));
    }

    #[test]
    #[serial]
    fn test_from_env_partial() {
        let _guard = EnvGuard::new(&ALL_VARS);

        env::set_var(ENV_MAX_CACHED_PAGES, "3");

        let config = ReaderConfig::from_env().unwrap();
        assert_eq!(config.max_cached_pages, 3);
        assert_eq!(config.page_aspect_ratio, 1.414); // default
        assert_eq!(config.fallback_render_width, 1080); // default
        assert_eq!(config.pdfium_library_dir, None);
    }

    #[test]
    #[serial]
    fn test_from_env_invalid() {
        let _guard = EnvGuard::new(&ALL_VARS);

        env::set_var(ENV_RENDER_WIDTH, "wide");
        assert!(matches!(
            ReaderConfig::from_env(),
            Err(ConfigError::InvalidValue(key)) if key == ENV_RENDER_WIDTH
        ));

        env::remove_var(ENV_RENDER_WIDTH);
        env::set_var(ENV_MAX_CACHED_PAGES, "0");
        assert!(matches!(
            ReaderConfig::from_env(),
            Err(ConfigError::InvalidValue(key)) if key == "max_cached_pages"
        ));
    }

    #[test]
    fn test_file_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let config = ReaderConfig::default()
            .with_max_cached_pages(8)
            .with_fallback_render_width(900)
            .with_pdfium_library_dir("/usr/local/lib");
        config.save_to_file(&path).unwrap();

        let loaded = ReaderConfig::from_file(&path).unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_from_file_partial() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "# reader\nmax_cached_pages = 2\n").unwrap();

        let config = ReaderConfig::from_file(&path).unwrap();
        assert_eq!(config.max_cached_pages, 2);
        assert_eq!(config.fallback_render_width, 1080); // default
    }

    #[test]
    fn test_from_file_errors() {
        let dir = tempfile::tempdir().unwrap();

        let missing = ReaderConfig::from_file(dir.path().join("missing.toml"));
        assert!(matches!(missing, Err(ConfigError::Io(_))));

        let garbled = dir.path().join("garbled.toml");
        fs::write(&garbled, "max_cached_pages = \"lots\"\n").unwrap();
        assert!(matches!(ReaderConfig::from_file(&garbled), Err(ConfigError::Parse(_))));

        let invalid = dir.path().join("invalid.toml");
        fs::write(&invalid, "page_aspect_ratio = -2.0\n").unwrap();
        assert!(matches!(ReaderConfig::from_file(&invalid), Err(ConfigError::InvalidValue(_))));
    }
}
