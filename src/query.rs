//! The page index and the queries answered against it.
//!
//! A [`PageIndex`] is an immutable snapshot. The site swaps in a new one
//! after every indexing pass, so queries never see a half-built set.
//!
//! ## Listing order
//!
//! [`PageIndex::list_children`] sorts by:
//!
//! 1. numeric `order` ascending; pages with an order come first
//! 2. `date` descending (newest first); dated pages come first
//! 3. index order (the sort is stable)

use crate::types::PageRecord;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::cmp::Ordering;
use std::fs;

/// Address used when a request path is empty.
pub const INDEX_ADDRESS: &str = "index";

/// Where the records of an index came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Built by an indexing pass in this process.
    Built,
    /// Read back from the cache store.
    Cached,
    /// Nothing indexed yet.
    Empty,
}

/// An immutable, ordered page set.
#[derive(Debug, Clone)]
pub struct PageIndex {
    pages: Vec<PageRecord>,
    origin: Origin,
}

/// One `<url>` entry of the sitemap.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SitemapEntry {
    pub loc: String,
    pub priority: String,
    pub lastmod: Option<String>,
    pub changefreq: String,
}

impl PageIndex {
    pub fn new(pages: Vec<PageRecord>, origin: Origin) -> Self {
        Self { pages, origin }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), Origin::Empty)
    }

    pub fn pages(&self) -> &[PageRecord] {
        &self.pages
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Exact match on slug path; pages without one match on their file stem.
    pub fn find_by_slug(&self, slug_path: &str) -> Option<&PageRecord> {
        self.pages.iter().find(|p| match &p.slug_path {
            Some(path) => path == slug_path,
            None => p.file_stem() == slug_path,
        })
    }

    /// Pages whose `parent` is `parent_slug`, in listing order.
    ///
    /// An empty `parent_slug` lists the top level: pages without a parent.
    /// Ignored pages are left out at every level, not just the top, so a
    /// hidden page never shows up in any public listing.
    pub fn list_children(&self, parent_slug: &str, amount: Option<usize>) -> Vec<&PageRecord> {
        let mut found: Vec<&PageRecord> = self
            .pages
            .iter()
            .filter(|p| !p.is_ignored())
            .filter(|p| match p.parent() {
                Some(parent) => parent == parent_slug,
                None => parent_slug.is_empty(),
            })
            .collect();

        found.sort_by(|a, b| listing_order(a, b));

        if let Some(n) = amount {
            found.truncate(n);
        }
        found
    }

    /// Sitemap entries for every page that isn't ignored.
    pub fn sitemap_entries(&self, site_url: &str, default_changefreq: &str) -> Vec<SitemapEntry> {
        let base = site_url.trim_end_matches('/');
        self.pages
            .iter()
            .filter(|p| !p.is_ignored())
            .map(|p| {
                let address = p.address();
                let loc = if address == INDEX_ADDRESS || address.is_empty() {
                    format!("{base}/")
                } else {
                    format!("{base}/{address}")
                };
                SitemapEntry {
                    loc,
                    priority: p.property("priority").unwrap_or("0.1").to_string(),
                    lastmod: p
                        .date()
                        .map(|d| d.format("%Y-%m-%d").to_string())
                        .or_else(|| modified_date(&p.source_path)),
                    changefreq: p
                        .property("changefreq")
                        .unwrap_or(default_changefreq)
                        .to_string(),
                }
            })
            .collect()
    }
}

fn listing_order(a: &PageRecord, b: &PageRecord) -> Ordering {
    let by_order = match (a.order(), b.order()) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_order.then_with(|| match (a.date(), b.date()) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    })
}

/// Source file modification date as `YYYY-MM-DD`.
fn modified_date(path: &str) -> Option<String> {
    let modified = fs::metadata(path).and_then(|m| m.modified()).ok()?;
    Some(DateTime::<Local>::from(modified).format("%Y-%m-%d").to_string())
}

/// Normalize a request path into an address: drop the query string and
/// surrounding slashes; the empty path is the index.
pub fn normalize_request_path(path: &str) -> &str {
    let path = path.split('?').next().unwrap_or_default();
    let path = path.trim_matches('/');
    if path.is_empty() { INDEX_ADDRESS } else { path }
}
