//! Sitemap generation.
//!
//! Written after every indexing pass from [`PageIndex::sitemap_entries`]:
//!
//! ```xml
//! <?xml version="1.0" encoding="UTF-8"?>
//! <urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
//!   <url><loc>https://example.com/about</loc><priority>0.1</priority>
//!   <lastmod>2024-02-03</lastmod><changefreq>weekly</changefreq></url>
//! </urlset>
//! ```
//!
//! [`PageIndex::sitemap_entries`]: crate::query::PageIndex::sitemap_entries

use crate::query::SitemapEntry;
use maud::{PreEscaped, html};
use std::fs;
use std::io;
use std::path::Path;

const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;
const SITEMAP_NS: &str = "http://www.sitemaps.org/schemas/sitemap/0.9";

/// Render the `<urlset>` document.
pub fn render_sitemap(entries: &[SitemapEntry]) -> String {
    html! {
        (PreEscaped(XML_DECLARATION))
        urlset xmlns=(SITEMAP_NS) {
            @for entry in entries {
                url {
                    loc { (entry.loc) }
                    priority { (entry.priority) }
                    @if let Some(date) = &entry.lastmod {
                        lastmod { (date) }
                    }
                    changefreq { (entry.changefreq) }
                }
            }
        }
    }
    .into_string()
}

/// Write the sitemap, replacing any previous one atomically.
pub fn write_sitemap(path: &Path, entries: &[SitemapEntry]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("xml.tmp");
    fs::write(&tmp, render_sitemap(entries))?;
    fs::rename(&tmp, path)
}
