//! Shared test utilities for the ziggurat test suite.
//!
//! Provides record builders, a throwaway site layout on disk, and lookup
//! helpers that panic with the available addresses on a miss.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let site = SiteFixture::new();
//! site.write_page("about.page", "#zigg:slug = `about`\n<h1>About</h1>");
//! let report = build_index(&site.config);
//!
//! let about = find_page(&report.pages, "about");
//! assert_eq!(about.ancestors, vec!["about"]);
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::config::SiteConfig;
use crate::types::{PageRecord, PropertyValue};

// =========================================================================
// Record builders
// =========================================================================

/// Build an unresolved record from `(key, value)` text properties.
pub fn page(source_path: &str, props: &[(&str, &str)]) -> PageRecord {
    let properties = props
        .iter()
        .map(|(k, v)| (k.to_string(), PropertyValue::from(*v)))
        .collect();
    PageRecord::new(source_path, properties)
}

/// Build a record and resolve its slug path as if it were top-level.
pub fn addressed(source_path: &str, slug_path: &str, props: &[(&str, &str)]) -> PageRecord {
    let mut record = page(source_path, props);
    record.set_slug_path(Some(slug_path.to_string()));
    record
}

// =========================================================================
// Fixture setup
// =========================================================================

/// A temporary site directory with `pages/`, `template/` and a config whose
/// paths all point inside it.
pub struct SiteFixture {
    pub dir: TempDir,
    pub config: SiteConfig,
}

impl SiteFixture {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let config = SiteConfig::default().rebased(dir.path());
        fs::create_dir_all(config.pages_dir()).unwrap();
        fs::create_dir_all(&config.template.dir).unwrap();
        Self { dir, config }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Write a page source under `pages/`, creating parent directories.
    pub fn write_page(&self, rel: &str, content: &str) -> PathBuf {
        let path = self.config.pages_dir().join(rel);
        write_file(&path, content);
        path
    }

    /// Write a template fragment (`name` without extension).
    pub fn write_template(&self, name: &str, content: &str) -> PathBuf {
        let path =
            Path::new(&self.config.template.dir).join(self.config.template.file_name(name));
        write_file(&path, content);
        path
    }

    /// Write a file relative to the asset root.
    pub fn write_asset(&self, rel: &str, bytes: &[u8]) -> PathBuf {
        let path = self.config.asset_root().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, bytes).unwrap();
        path
    }

    /// The stock header/body/footer fragments.
    pub fn write_default_templates(&self) {
        self.write_template("header", "<html><body>\n");
        self.write_template("body", "<main>{{ page.content | safe }}</main>\n");
        self.write_template("footer", "</body></html>\n");
    }
}

fn write_file(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

/// Encode a blank PNG of the given size.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::new(width, height);
    let mut bytes = Vec::new();
    img.write_to(
        &mut std::io::Cursor::new(&mut bytes),
        image::ImageFormat::Png,
    )
    .unwrap();
    bytes
}

// =========================================================================
// Lookups (panic with the available addresses on a miss)
// =========================================================================

/// Find a record by address. Panics if not found.
pub fn find_page<'a>(pages: &'a [PageRecord], address: &str) -> &'a PageRecord {
    pages
        .iter()
        .find(|p| p.address() == address)
        .unwrap_or_else(|| {
            let addresses: Vec<String> = pages.iter().map(PageRecord::address).collect();
            panic!("page '{address}' not found. Available: {addresses:?}")
        })
}

/// All addresses in record order.
pub fn addresses(pages: &[PageRecord]) -> Vec<String> {
    pages.iter().map(PageRecord::address).collect()
}
