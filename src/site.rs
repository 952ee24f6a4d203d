//! The content router.
//!
//! [`Site`] ties the pieces together: it owns the current [`PageIndex`]
//! snapshot, the optional cache store and the renderer.
//!
//! ## Index pass
//!
//! ```text
//! build_index ──► pre-render (cache enabled) ──► swap snapshot
//!      ──► cache save ──► sitemap
//! ```
//!
//! Readers clone the current `Arc<PageIndex>` and keep using it while a
//! rebuild runs; the rebuild lock only serializes index passes.
//!
//! ## Responses
//!
//! Every request ends in a [`Response`]:
//!
//! | Outcome | Status | Body |
//! |---------|--------|------|
//! | rendered | `Ok` | page html |
//! | unknown address | `NotFound` | not-found page, else plain text |
//! | render failure | `ServerError` | error page, else plain text |
//!
//! The error page is tried once. If it fails as well the plain-text message
//! is the answer.

use crate::cache::{self, CacheError, CacheStore};
use crate::config::{ConfigError, SiteConfig};
use crate::query::{Origin, PageIndex, normalize_request_path};
use crate::render::{BodyRenderer, RenderError, RenderMode, Renderer};
use crate::scan::{self, IndexError, IndexReport};
use crate::sitemap;
use crate::types::PageRecord;
use log::{debug, info, warn};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use thiserror::Error;

pub const NOT_FOUND_TEXT: &str = "404 - Page not found.";
pub const SERVER_ERROR_TEXT: &str = "500 - Something went wrong while rendering this page.";

#[derive(Error, Debug)]
pub enum SiteError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
    /// The index pass finished and is live, but persisting it failed.
    #[error("Cache save failed: {source}")]
    CacheSave {
        report: Box<IndexReport>,
        #[source]
        source: CacheError,
    },
    #[error("Render setup error: {0}")]
    Render(#[from] RenderError),
    #[error("Cannot write sitemap {path}: {source}")]
    Sitemap {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Outcome of looking up a request path.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Found(PageRecord),
    /// The normalized address that matched nothing.
    NotFound(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    NotFound,
    ServerError,
}

impl Status {
    pub fn code(self) -> u16 {
        match self {
            Status::Ok => 200,
            Status::NotFound => 404,
            Status::ServerError => 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: Status,
    pub body: String,
}

impl Response {
    fn new(status: Status, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

pub struct Site {
    config: SiteConfig,
    renderer: Renderer,
    store: Option<Box<dyn CacheStore>>,
    index: RwLock<Arc<PageIndex>>,
    rebuild: Mutex<()>,
}

impl Site {
    /// Set up a site from a resolved config.
    ///
    /// With caching enabled the last saved snapshot is loaded, so requests
    /// can be served before the first index pass.
    pub fn new(config: SiteConfig) -> Result<Self, SiteError> {
        config.validate()?;
        let renderer = Renderer::new(&config)?;
        let store = cache::open(&config.cache)?;

        let index = match &store {
            Some(store) => load_snapshot(store.as_ref()),
            None => PageIndex::empty(),
        };

        Ok(Self {
            config,
            renderer,
            store,
            index: RwLock::new(Arc::new(index)),
            rebuild: Mutex::new(()),
        })
    }

    /// Replace the page body hook.
    pub fn with_body_renderer(mut self, body: Box<dyn BodyRenderer>) -> Self {
        self.renderer = self.renderer.with_body(body);
        self
    }

    pub fn config(&self) -> &SiteConfig {
        &self.config
    }

    /// The current index snapshot.
    pub fn snapshot(&self) -> Arc<PageIndex> {
        let guard = self.index.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Rebuild the index from the pages directory.
    ///
    /// Per-page problems end up in the report. A missing pages directory
    /// swaps in an empty index and leaves the cache and sitemap alone. Cache
    /// and sitemap write failures are returned after the new index is live;
    /// [`SiteError::CacheSave`] carries the report of that pass.
    pub fn index(&self) -> Result<IndexReport, SiteError> {
        let _rebuilding = self.rebuild.lock().unwrap_or_else(PoisonError::into_inner);

        let mut report = scan::build_index(&self.config);
        if !report.is_indexed() {
            self.swap(PageIndex::empty());
            return Ok(report);
        }

        if self.store.is_some() {
            self.prerender(&mut report);
        }

        let index = Arc::new(PageIndex::new(report.pages.clone(), Origin::Built));
        self.swap_arc(Arc::clone(&index));

        let saved = match &self.store {
            Some(store) => {
                let result = store.save(index.pages());
                if result.is_ok() {
                    info!("saved {} pages to {} cache", index.len(), store.name());
                }
                result
            }
            None => Ok(()),
        };

        let sitemap_path = PathBuf::from(&self.config.sitemap.path);
        let entries = index.sitemap_entries(&self.config.site_url, &self.config.sitemap.changefreq);
        sitemap::write_sitemap(&sitemap_path, &entries).map_err(|source| SiteError::Sitemap {
            path: sitemap_path.clone(),
            source,
        })?;
        debug!("wrote {} sitemap entries to {}", entries.len(), sitemap_path.display());

        match saved {
            Ok(()) => Ok(report),
            Err(source) => Err(SiteError::CacheSave {
                report: Box::new(report),
                source,
            }),
        }
    }

    /// Fill `html` for every eligible page. Failures are collected as issues.
    fn prerender(&self, report: &mut IndexReport) {
        let base = Arc::new(PageIndex::new(report.pages.clone(), Origin::Built));
        let include_ignored = self.config.cache.prerender_ignored;

        let rendered: Vec<Option<Result<String, RenderError>>> = report
            .pages
            .par_iter()
            .map(|page| {
                if page.is_ignored() && !include_ignored {
                    return None;
                }
                Some(self.renderer.render(page, &base, RenderMode::Prerender))
            })
            .collect();

        let mut count = 0;
        for (page, result) in report.pages.iter_mut().zip(rendered) {
            match result {
                Some(Ok(html)) => {
                    page.html = Some(html);
                    count += 1;
                }
                Some(Err(source)) => {
                    let issue = IndexError::Prerender {
                        source_path: page.source_path.clone(),
                        source,
                    };
                    warn!("{issue}");
                    report.issues.push(issue);
                }
                None => {}
            }
        }
        info!("pre-rendered {count} pages");
    }

    fn swap(&self, index: PageIndex) {
        self.swap_arc(Arc::new(index));
    }

    fn swap_arc(&self, index: Arc<PageIndex>) {
        let mut guard = self.index.write().unwrap_or_else(PoisonError::into_inner);
        *guard = index;
    }

    /// Look up a request path.
    ///
    /// Until this process has indexed, a store with keyed reads is asked
    /// first and the loaded snapshot second.
    pub fn resolve(&self, path: &str) -> Resolution {
        let address = normalize_request_path(path);
        let snapshot = self.snapshot();

        let store = self
            .store
            .as_ref()
            .filter(|store| store.has_keyed_lookup() && snapshot.origin() != Origin::Built);
        if let Some(store) = store {
            match store.lookup(address) {
                Ok(Some(page)) => {
                    debug!("{address} served from {} cache", store.name());
                    return Resolution::Found(page);
                }
                Ok(None) => {}
                Err(e) => warn!("cache lookup of {address} failed: {e}"),
            }
        }

        match snapshot.find_by_slug(address) {
            Some(page) => Resolution::Found(page.clone()),
            None => Resolution::NotFound(address.to_string()),
        }
    }

    /// Pages under `parent` in listing order.
    pub fn list(&self, parent: &str, amount: Option<usize>) -> Vec<PageRecord> {
        self.snapshot()
            .list_children(parent, amount)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Resolve and render a request path.
    pub fn respond(&self, path: &str) -> Response {
        let snapshot = self.snapshot();
        match self.resolve(path) {
            Resolution::Found(page) => {
                let status = if page.rendered_html().is_none() && !has_source_file(&page) {
                    Status::NotFound
                } else {
                    Status::Ok
                };
                self.render_as(&page, &snapshot, status)
            }
            Resolution::NotFound(address) => {
                debug!("no page at {address}");
                match snapshot.find_by_slug(&self.config.not_found_slug) {
                    Some(not_found) => self.render_as(not_found, &snapshot, Status::NotFound),
                    None => Response::new(Status::NotFound, NOT_FOUND_TEXT),
                }
            }
        }
    }

    fn render_as(&self, page: &PageRecord, snapshot: &Arc<PageIndex>, status: Status) -> Response {
        match self.renderer.render(page, snapshot, RenderMode::Request) {
            Ok(body) => Response::new(status, body),
            Err(RenderError::NotFound(address)) => {
                debug!("no renderable page for {address}");
                Response::new(Status::NotFound, NOT_FOUND_TEXT)
            }
            Err(e) => {
                warn!("rendering {} failed: {e}", page.address());
                self.error_page(snapshot)
            }
        }
    }

    /// The error page, rendered once; plain text if that fails too.
    fn error_page(&self, snapshot: &Arc<PageIndex>) -> Response {
        let Some(page) = snapshot.find_by_slug(&self.config.error_slug) else {
            return Response::new(Status::ServerError, SERVER_ERROR_TEXT);
        };
        match self.renderer.render(page, snapshot, RenderMode::Request) {
            Ok(body) => Response::new(Status::ServerError, body),
            Err(e) => {
                warn!("error page failed as well: {e}");
                Response::new(Status::ServerError, SERVER_ERROR_TEXT)
            }
        }
    }
}

fn load_snapshot(store: &dyn CacheStore) -> PageIndex {
    match store.load() {
        Ok(Some(pages)) => {
            info!("loaded {} pages from {} cache", pages.len(), store.name());
            PageIndex::new(pages, Origin::Cached)
        }
        Ok(None) => PageIndex::empty(),
        Err(e) => {
            warn!("{} cache unreadable, starting empty: {e}", store.name());
            PageIndex::empty()
        }
    }
}

fn has_source_file(page: &PageRecord) -> bool {
    !page.source_path.is_empty() && Path::new(&page.source_path).is_file()
}
