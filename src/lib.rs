//! # Ziggurat
//!
//! A file-tree-backed content router. Page sources live in a directory;
//! directives inside each file (`` #zigg:slug = `about` ``) give the page its
//! address, parent and metadata. The router turns a request path into
//! rendered HTML.
//!
//! # Architecture
//!
//! ```text
//! pages/  ──scan──►  PageIndex  ──resolve──►  PageRecord  ──render──►  html
//!                        │
//!                        ├──► cache store (json file | sqlite)
//!                        └──► sitemap.xml
//! ```
//!
//! Indexing is a batch pass; the result is an immutable snapshot that
//! requests read through an `Arc`. With caching on, every page is rendered
//! during the pass and the html is stored with the record, so requests are
//! answered without touching the templates.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`metadata`] | Directive extraction from page sources, responsive image expansion |
//! | [`scan`] | Walks the pages directory and builds the record set |
//! | [`slug`] | Slug path resolution through parent chains |
//! | [`query`] | The index snapshot: slug lookup, child listings, sitemap entries |
//! | [`cache`] | Persistence of the record set: JSON snapshot or SQLite upserts |
//! | [`render`] | Template composition, markdown, lazy-image ratios, minification |
//! | [`sitemap`] | Sitemap XML written after each index pass |
//! | [`site`] | The router: index passes, request resolution, fallback pages |
//! | [`config`] | `config.toml` loading, merging and validation |
//! | [`types`] | `PageRecord` and property values shared by every stage |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Directives Over Front Matter
//!
//! Metadata sits in comment-like lines (`` #zigg:key = `value` ``) anywhere in the
//! source, so a page stays a valid template for whatever engine renders it.
//! Directive lines at the start of a line are stripped before rendering;
//! directives inside `{# … #}` template comments vanish on their own.
//!
//! ## Runtime Templates
//!
//! Fragments are loaded from the template directory at startup and rendered
//! with Tera. Site authors edit templates without recompiling; the sitemap,
//! which has a fixed shape, is built with Maud.
//!
//! ## Snapshots, Not Locks
//!
//! A rebuild constructs a whole new [`query::PageIndex`] and swaps it in.
//! Readers never block on a half-built index and a failed pass never leaves
//! one behind.

pub mod cache;
pub mod config;
pub mod metadata;
pub mod output;
pub mod query;
pub mod render;
pub mod scan;
pub mod site;
pub mod sitemap;
pub mod slug;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
