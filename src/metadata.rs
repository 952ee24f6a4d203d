//! Page metadata extraction.
//!
//! Pages declare their metadata inline with directives:
//!
//! ```text
//! #zigg:slug     = `blog`
//! #zigg:title    = `Blog`
//! #zigg:order    = `2`
//! #zigg:ignore
//! ```
//!
//! A bare key is a flag and is stored as `"true"`. A key followed by `=` and
//! a backtick-quoted payload stores the payload verbatim. Whitespace around
//! `#`, `zigg`, `:` and `=` is allowed, but a directive never spans lines.
//! Directives can sit anywhere in the file; inside a template comment
//! (``{# #zigg:slug = `about` #}``) they are invisible in the rendered body.
//!
//! The extractor only checks syntax. Anything that doesn't match (an `=`
//! without a closed backtick value, say) is skipped without an error, and
//! unknown keys are kept as plain text properties.
//!
//! ## Cover images
//!
//! `cover-image` and `cover-image-webp` carry a URL template with a `{size}`
//! placeholder. For every configured size label the placeholder becomes
//! `<width>px`, and the variant is kept only if that file exists under the
//! asset root:
//!
//! ```text
//! #zigg:cover-image = `img/photo-{size}.jpg`
//!   small  → img/photo-512px.jpg   (kept if it exists)
//!   medium → img/photo-1024px.jpg
//!   large  → img/photo-1920px.jpg
//! ```
//!
//! A cover-image value without the placeholder is stored as plain text.

use crate::config::{ImageSize, SiteConfig};
use crate::types::{Properties, PropertyValue, SizedImage};
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Directives whose value is a sized image URL template.
pub const IMAGE_DIRECTIVES: &[&str] = &["cover-image", "cover-image-webp"];

/// Placeholder replaced by `<width>px` in cover-image templates.
pub const SIZE_PLACEHOLDER: &str = "{size}";

static DIRECTIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"#[ \t]*zigg[ \t]*:[ \t]*([A-Za-z0-9_-]+)(?:[ \t]*(=)[ \t]*(?:`([^`\n]*)`)?)?")
        .expect("directive pattern is valid")
});

static DIRECTIVE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*#[ \t]*zigg[ \t]*:[^\n]*\n?").expect("directive line pattern is valid")
});

/// Extracts properties from page source text.
#[derive(Debug, Clone)]
pub struct Extractor {
    image_sizes: Vec<ImageSize>,
    asset_root: PathBuf,
}

impl Extractor {
    pub fn new(image_sizes: Vec<ImageSize>, asset_root: impl Into<PathBuf>) -> Self {
        Self {
            image_sizes,
            asset_root: asset_root.into(),
        }
    }

    pub fn from_config(config: &SiteConfig) -> Self {
        Self::new(config.image_sizes.clone(), config.asset_root())
    }

    /// Parse every well-formed directive in `text`. Later duplicates win.
    pub fn extract(&self, text: &str) -> Properties {
        let mut properties = Properties::new();

        for caps in DIRECTIVE.captures_iter(text) {
            let key = &caps[1];
            let has_equals = caps.get(2).is_some();
            let value = caps.get(3).map(|m| m.as_str());

            let value = match (has_equals, value) {
                (false, _) => PropertyValue::from("true"),
                (true, Some(v)) if IMAGE_DIRECTIVES.contains(&key) => self.expand_image(v),
                (true, Some(v)) => PropertyValue::from(v),
                // `key =` without a closed backtick value
                (true, None) => continue,
            };
            properties.insert(key.to_string(), value);
        }

        properties
    }

    fn expand_image(&self, template: &str) -> PropertyValue {
        if !template.contains(SIZE_PLACEHOLDER) {
            return PropertyValue::from(template);
        }

        let variants: BTreeMap<String, SizedImage> = self
            .image_sizes
            .iter()
            .filter_map(|size| {
                let url = template.replace(SIZE_PLACEHOLDER, &format!("{}px", size.width));
                asset_exists(&self.asset_root, &url).then(|| {
                    (
                        size.label.clone(),
                        SizedImage {
                            url,
                            pixel_width: size.width,
                        },
                    )
                })
            })
            .collect();

        PropertyValue::Images(variants)
    }
}

/// Whether `url` names an existing file under `root`.
///
/// Leading slashes are treated as site-root relative, not filesystem
/// absolute.
pub fn asset_exists(root: &Path, url: &str) -> bool {
    resolve_asset(root, url).is_file()
}

pub fn resolve_asset(root: &Path, url: &str) -> PathBuf {
    root.join(url.trim_start_matches('/'))
}

/// Write text properties back out as directive lines.
///
/// Image-valued properties are derived from the files on disk and have no
/// directive form of their own, so they are skipped.
pub fn to_directives(properties: &Properties) -> String {
    let mut out = String::new();
    for (key, value) in properties {
        if let Some(text) = value.as_text() {
            out.push_str(&format!("#zigg:{key} = `{text}`\n"));
        }
    }
    out
}

/// Remove lines that hold nothing but a directive.
pub fn strip_directives(text: &str) -> String {
    DIRECTIVE_LINE.replace_all(text, "").into_owned()
}
