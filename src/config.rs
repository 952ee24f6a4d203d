//! Site configuration module.
//!
//! Handles loading, validating, and merging `config.toml`. The user file is
//! sparse: stock defaults are serialized to a TOML table and the user's
//! values are merged on top before deserializing.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! pages_dir = "pages"         # Root of the page source tree
//! page_extension = "page"     # Only files with this extension are indexed
//! asset_root = "."            # Base directory for cover images and lazy images
//! site_url = "http://localhost"
//! minify_html = false
//! not_found_slug = "404"      # Page rendered when a lookup misses
//! error_slug = "error"        # Page rendered when a body fails to render
//!
//! [template]
//! dir = "template"
//! extension = "html"
//! parts = ["header", "body", "footer"]
//!
//! [cache]
//! backend = "none"            # none | file | sqlite
//! path = "ziggurat-cache.json"
//! prerender_ignored = false
//!
//! [sitemap]
//! path = "sitemap.xml"
//! changefreq = "weekly"
//!
//! [[image_sizes]]
//! label = "small"
//! width = 512
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the template part that carries the page body.
pub const BODY_PART: &str = "body";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Site configuration loaded from `config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteConfig {
    /// Root of the page source tree, relative to the config directory.
    pub pages_dir: String,
    /// Extension (without dot) of page source files.
    pub page_extension: String,
    /// Base directory that cover-image and lazy-image URLs resolve against.
    pub asset_root: String,
    /// Absolute site URL used for sitemap locations.
    pub site_url: String,
    /// Collapse whitespace and strip comments from rendered output.
    pub minify_html: bool,
    /// Slug of the page rendered for lookup misses.
    pub not_found_slug: String,
    /// Slug of the page rendered when a body fails.
    pub error_slug: String,
    pub template: TemplateConfig,
    pub cache: CacheConfig,
    pub sitemap: SitemapConfig,
    /// Size labels for cover-image expansion, in declaration order.
    pub image_sizes: Vec<ImageSize>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            pages_dir: "pages".to_string(),
            page_extension: "page".to_string(),
            asset_root: ".".to_string(),
            site_url: "http://localhost".to_string(),
            minify_html: false,
            not_found_slug: "404".to_string(),
            error_slug: "error".to_string(),
            template: TemplateConfig::default(),
            cache: CacheConfig::default(),
            sitemap: SitemapConfig::default(),
            image_sizes: default_image_sizes(),
        }
    }
}

impl SiteConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_extension.trim().is_empty() {
            return Err(ConfigError::Validation(
                "page_extension must not be empty".into(),
            ));
        }
        if !self.template.parts.is_empty() && !self.template.parts.iter().any(|p| p == BODY_PART)
        {
            return Err(ConfigError::Validation(format!(
                "template.parts must include \"{BODY_PART}\""
            )));
        }
        let mut labels = HashSet::new();
        for size in &self.image_sizes {
            if size.width == 0 {
                return Err(ConfigError::Validation(format!(
                    "image_sizes.{} width must be non-zero",
                    size.label
                )));
            }
            if !labels.insert(size.label.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "duplicate image size label: {}",
                    size.label
                )));
            }
        }
        Ok(())
    }

    /// Rebase every relative path in the config onto `base`.
    ///
    /// Paths in `config.toml` are relative to the directory holding it.
    pub fn rebased(mut self, base: &Path) -> Self {
        let rebase = |p: &str| -> String {
            let path = Path::new(p);
            if path.is_absolute() {
                p.to_string()
            } else {
                base.join(path).to_string_lossy().to_string()
            }
        };
        self.pages_dir = rebase(&self.pages_dir);
        self.asset_root = rebase(&self.asset_root);
        self.template.dir = rebase(&self.template.dir);
        self.cache.path = rebase(&self.cache.path);
        self.sitemap.path = rebase(&self.sitemap.path);
        self
    }

    pub fn pages_dir(&self) -> PathBuf {
        PathBuf::from(&self.pages_dir)
    }

    pub fn asset_root(&self) -> PathBuf {
        PathBuf::from(&self.asset_root)
    }
}

/// Template fragment layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TemplateConfig {
    /// Directory holding the fragment files.
    pub dir: String,
    /// Extension (without dot) of fragment files.
    pub extension: String,
    /// Fragment names, concatenated in this order. `body` may be overridden
    /// per page through the `template` directive. Empty means no template:
    /// the page body is the whole document.
    pub parts: Vec<String>,
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            dir: "template".to_string(),
            extension: "html".to_string(),
            parts: vec!["header".into(), BODY_PART.into(), "footer".into()],
        }
    }
}

impl TemplateConfig {
    /// File name of a fragment (`header` → `header.html`).
    pub fn file_name(&self, part: &str) -> String {
        format!("{}.{}", part, self.extension)
    }
}

/// Which cache store backs the index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    #[default]
    None,
    File,
    Sqlite,
}

/// Cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    pub backend: CacheBackend,
    /// JSON snapshot file or SQLite database, depending on the backend.
    pub path: String,
    /// Pre-render `ignore`-flagged pages too.
    pub prerender_ignored: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::None,
            path: "ziggurat-cache.json".to_string(),
            prerender_ignored: false,
        }
    }
}

impl CacheConfig {
    pub fn enabled(&self) -> bool {
        self.backend != CacheBackend::None
    }
}

/// Sitemap output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SitemapConfig {
    pub path: String,
    /// Default `changefreq` for pages without their own.
    pub changefreq: String,
}

impl Default for SitemapConfig {
    fn default() -> Self {
        Self {
            path: "sitemap.xml".to_string(),
            changefreq: "weekly".to_string(),
        }
    }
}

/// A cover-image size label and its pixel width.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImageSize {
    pub label: String,
    pub width: u32,
}

fn default_image_sizes() -> Vec<ImageSize> {
    [("small", 512), ("medium", 1024), ("large", 1920)]
        .into_iter()
        .map(|(label, width)| ImageSize {
            label: label.to_string(),
            width,
        })
        .collect()
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(SiteConfig::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a `config.toml` from a directory as a raw TOML value.
///
/// Returns `Ok(None)` if no `config.toml` exists in the directory.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    let config_path = path.join("config.toml");
    if !config_path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&config_path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<SiteConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: SiteConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from `config.toml` in `dir`, with relative paths rebased onto
/// `dir`. Uses stock defaults when the file doesn't exist.
pub fn load_config(dir: &Path) -> Result<SiteConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let overlay = load_raw_config(dir)?;
    Ok(resolve_config(base, overlay)?.rebased(dir))
}

/// Returns a fully-commented stock `config.toml`.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Ziggurat Configuration
# ======================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Relative paths are resolved against
# the directory holding this file. Unknown keys will cause an error.

# Root of the page source tree.
pages_dir = "pages"

# Only files with this extension are indexed as pages.
page_extension = "page"

# Base directory for cover-image files and lazy-loaded <picture> images.
asset_root = "."

# Absolute URL of the site, used for sitemap locations.
site_url = "http://localhost"

# Strip HTML comments and collapse whitespace (outside <pre>) in output.
minify_html = false

# Slug of the page shown when a lookup misses.
not_found_slug = "404"

# Slug of the page shown when a page body fails to render.
error_slug = "error"

# ---------------------------------------------------------------------------
# Template fragments
# ---------------------------------------------------------------------------
[template]
dir = "template"
extension = "html"
# Concatenated in this order. A page can swap the body fragment with
# #zigg:template = `name`. An empty list renders the bare page body.
parts = ["header", "body", "footer"]

# ---------------------------------------------------------------------------
# Cache
# ---------------------------------------------------------------------------
[cache]
# none   - index lives in memory only
# file   - JSON snapshot, replaced atomically on every index pass
# sqlite - one row per page, upserted by slug path
backend = "none"
path = "ziggurat-cache.json"
# Also pre-render pages flagged with #zigg:ignore.
prerender_ignored = false

# ---------------------------------------------------------------------------
# Sitemap
# ---------------------------------------------------------------------------
[sitemap]
path = "sitemap.xml"
changefreq = "weekly"

# ---------------------------------------------------------------------------
# Cover image sizes
# ---------------------------------------------------------------------------
# #zigg:cover-image = `img/photo-{size}.jpg` expands {size} to "<width>px"
# for each label below, keeping only the files that exist.
[[image_sizes]]
label = "small"
width = 512

[[image_sizes]]
label = "medium"
width = 1024

[[image_sizes]]
label = "large"
width = 1920
"##
}
