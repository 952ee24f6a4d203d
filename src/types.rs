//! Shared types for the index, the cache, and the render pipeline.
//!
//! A [`PageRecord`] is serialized as-is into the flat-file cache and column
//! by column into the SQLite cache, so both backends read back exactly what
//! the indexer produced.
//!
//! Properties stay an untyped string bag at the boundary (any directive is
//! storable). The keys the router itself interprets (`slug`, `parent`,
//! `order`, `date`, `ignore`, `type`, `template`) go through the typed
//! accessors below, which parse on read and treat garbage as absent.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Directive name → value, sorted by key.
pub type Properties = BTreeMap<String, PropertyValue>;

/// A single property value.
///
/// Almost everything is [`PropertyValue::Text`]. Only the cover-image
/// directives expand into [`PropertyValue::Images`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Text(String),
    Images(BTreeMap<String, SizedImage>),
}

impl PropertyValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(s) => Some(s),
            PropertyValue::Images(_) => None,
        }
    }

    pub fn as_images(&self) -> Option<&BTreeMap<String, SizedImage>> {
        match self {
            PropertyValue::Images(m) => Some(m),
            PropertyValue::Text(_) => None,
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::Text(s.to_string())
    }
}

/// One generated size variant of a cover image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizedImage {
    pub url: String,
    pub pixel_width: u32,
}

/// One indexed page source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRecord {
    /// Path of the backing source file, as discovered under the pages root.
    pub source_path: String,
    #[serde(default)]
    pub properties: Properties,
    /// Full `/`-joined public address. `None` when the page declares no slug.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug_path: Option<String>,
    #[serde(default)]
    pub ancestors: Vec<String>,
    /// Pre-rendered output, only populated in cache mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
}

impl PageRecord {
    pub fn new(source_path: impl Into<String>, properties: Properties) -> Self {
        Self {
            source_path: source_path.into(),
            properties,
            slug_path: None,
            ancestors: Vec::new(),
            html: None,
        }
    }

    /// Set the slug path and derive `ancestors` from it.
    pub fn set_slug_path(&mut self, slug_path: Option<String>) {
        self.ancestors = ancestors_of(slug_path.as_deref());
        self.slug_path = slug_path;
    }

    /// Text value of a property. Image-valued properties read as absent.
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(PropertyValue::as_text)
    }

    /// The bare `slug` property, if declared and non-empty.
    pub fn slug(&self) -> Option<&str> {
        self.property("slug").filter(|s| !s.is_empty())
    }

    /// The `parent` property, if declared and non-empty.
    pub fn parent(&self) -> Option<&str> {
        self.property("parent").filter(|s| !s.is_empty())
    }

    /// Numeric `order`, or `None` when missing or unparsable.
    pub fn order(&self) -> Option<f64> {
        self.property("order")
            .and_then(|s| s.trim().parse::<f64>().ok())
            .filter(|n| n.is_finite())
    }

    /// Parsed `date`, or `None` when missing or unparsable.
    pub fn date(&self) -> Option<NaiveDateTime> {
        self.property("date").and_then(parse_date)
    }

    pub fn is_ignored(&self) -> bool {
        self.property("ignore") == Some("true")
    }

    pub fn is_markdown(&self) -> bool {
        self.property("type") == Some("markdown")
    }

    /// File stem of the source path (`pages/blog/post.page` → `post`).
    pub fn file_stem(&self) -> String {
        Path::new(&self.source_path)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    /// The key this page answers to: its slug path, or its file stem when it
    /// has none.
    pub fn address(&self) -> String {
        match &self.slug_path {
            Some(path) => path.clone(),
            None => self.file_stem(),
        }
    }

    pub fn rendered_html(&self) -> Option<&str> {
        self.html.as_deref().filter(|h| !h.is_empty())
    }
}

/// Split a slug path into its segments. Absent or empty paths have none.
pub fn ancestors_of(slug_path: Option<&str>) -> Vec<String> {
    match slug_path {
        Some(path) if !path.is_empty() => path.split('/').map(String::from).collect(),
        _ => Vec::new(),
    }
}

/// Accepts `2024-03-01`, `2024-03-01 12:00`, `2024-03-01T12:00:00` and RFC 3339.
fn parse_date(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return d.and_hms_opt(0, 0, 0);
    }
    for fmt in ["%Y-%m-%d %H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt);
        }
    }
    DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.naive_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(props: &[(&str, &str)]) -> PageRecord {
        let properties = props
            .iter()
            .map(|(k, v)| (k.to_string(), PropertyValue::from(*v)))
            .collect();
        PageRecord::new("pages/blog/post.page", properties)
    }

    #[test]
    fn ancestors_follow_slug_path() {
        let mut page = record(&[]);
        page.set_slug_path(Some("blog/2024/post".into()));
        assert_eq!(page.ancestors, vec!["blog", "2024", "post"]);

        page.set_slug_path(None);
        assert!(page.ancestors.is_empty());
    }

    #[test]
    fn order_parses_numbers_and_fails_soft() {
        assert_eq!(record(&[("order", "2")]).order(), Some(2.0));
        assert_eq!(record(&[("order", " 1.5 ")]).order(), Some(1.5));
        assert_eq!(record(&[("order", "first")]).order(), None);
        assert_eq!(record(&[]).order(), None);
    }

    #[test]
    fn date_accepts_common_formats() {
        assert!(record(&[("date", "2024-03-01")]).date().is_some());
        assert!(record(&[("date", "2024-03-01 12:30")]).date().is_some());
        assert!(record(&[("date", "2024-03-01T12:30:00+02:00")]).date().is_some());
        assert_eq!(record(&[("date", "next tuesday")]).date(), None);
    }

    #[test]
    fn empty_slug_and_parent_read_as_absent() {
        let page = record(&[("slug", ""), ("parent", "")]);
        assert_eq!(page.slug(), None);
        assert_eq!(page.parent(), None);
    }

    #[test]
    fn address_falls_back_to_file_stem() {
        let mut page = record(&[]);
        assert_eq!(page.address(), "post");
        page.set_slug_path(Some("blog/post".into()));
        assert_eq!(page.address(), "blog/post");
    }

    #[test]
    fn ignore_requires_true_flag() {
        assert!(record(&[("ignore", "true")]).is_ignored());
        assert!(!record(&[("ignore", "false")]).is_ignored());
        assert!(!record(&[]).is_ignored());
    }

    #[test]
    fn image_property_is_not_text() {
        let mut page = record(&[]);
        page.properties
            .insert("cover-image".into(), PropertyValue::Images(BTreeMap::new()));
        assert_eq!(page.property("cover-image"), None);
    }
}
