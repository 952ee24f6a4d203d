//! Page source discovery and index construction.
//!
//! Walks the pages directory, extracts directives from every file with the
//! configured extension, and resolves each record's slug path.
//!
//! ## Directory Structure
//!
//! Layout on disk carries no meaning beyond ordering. The hierarchy comes
//! from `slug`/`parent` directives, not from directories:
//!
//! ```text
//! pages/
//! ├── index.page          #zigg:slug = ``
//! ├── about.page          #zigg:slug = `about`
//! ├── 404.page            #zigg:slug = `404`   #zigg:ignore
//! └── blog/
//!     ├── blog.page       #zigg:slug = `blog`
//!     └── first-post.page #zigg:slug = `first-post`  #zigg:parent = `blog`
//! ```
//!
//! ## Ordering
//!
//! Records are sorted by source path before slugs are resolved. Parent
//! search and address lookups are first-match, so this order is what makes
//! them deterministic.
//!
//! ## Failure handling
//!
//! A missing or unreadable root is reported as [`IndexStatus::NotIndexed`]
//! with an empty page set. Per-file problems (unreadable files, slug
//! collisions, parent cycles) are collected in [`IndexReport::issues`] and
//! never stop the pass.
//!
//! Slug collisions are rejected: the first record in index order keeps the
//! address and later ones lose their slug path (they stay indexed and
//! reachable through their file stem).

use crate::config::SiteConfig;
use crate::metadata::Extractor;
use crate::render::RenderError;
use crate::slug;
use crate::types::PageRecord;
use log::{debug, info, warn};
use rayon::prelude::*;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// A problem found while indexing. Only `NotIndexed` means the pass
/// produced nothing; everything else affects a single record.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Pages directory missing or unreadable: {0}")]
    NotIndexed(PathBuf),
    #[error("Cannot read page source {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Directory walk error: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("Slug path '{slug_path}' of {dropped} already taken by {kept}")]
    SlugCollision {
        slug_path: String,
        kept: String,
        dropped: String,
    },
    #[error("Parent chain of {0} loops back on itself; parent reference dropped")]
    ParentCycle(String),
    #[error("Pre-render of {source_path} failed: {source}")]
    Prerender {
        source_path: String,
        #[source]
        source: RenderError,
    },
}

/// Whether the pass ran at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexStatus {
    Indexed,
    NotIndexed,
}

/// Result of one indexing pass.
#[derive(Debug)]
pub struct IndexReport {
    pub status: IndexStatus,
    /// Records in source path order.
    pub pages: Vec<PageRecord>,
    pub issues: Vec<IndexError>,
}

impl IndexReport {
    fn not_indexed(root: &Path) -> Self {
        Self {
            status: IndexStatus::NotIndexed,
            pages: Vec::new(),
            issues: vec![IndexError::NotIndexed(root.to_path_buf())],
        }
    }

    pub fn is_indexed(&self) -> bool {
        self.status == IndexStatus::Indexed
    }
}

/// Build the page set for the configured pages directory.
pub fn build_index(config: &SiteConfig) -> IndexReport {
    let root = config.pages_dir();
    if !root.is_dir() {
        warn!("pages directory {} not found", root.display());
        return IndexReport::not_indexed(&root);
    }

    let mut issues = Vec::new();
    let files = match collect_sources(&root, &config.page_extension, &mut issues) {
        Some(files) => files,
        None => {
            warn!("pages directory {} unreadable", root.display());
            return IndexReport::not_indexed(&root);
        }
    };

    let extractor = Extractor::from_config(config);
    let parsed: Vec<Result<PageRecord, IndexError>> = files
        .par_iter()
        .map(|path| read_record(path, &extractor))
        .collect();

    let mut pages = Vec::with_capacity(parsed.len());
    for result in parsed {
        match result {
            Ok(page) => pages.push(page),
            Err(e) => {
                warn!("{e}");
                issues.push(e);
            }
        }
    }

    resolve_all(&mut pages, &mut issues);

    info!(
        "indexed {} pages from {} ({} issues)",
        pages.len(),
        root.display(),
        issues.len()
    );

    IndexReport {
        status: IndexStatus::Indexed,
        pages,
        issues,
    }
}

/// Every regular file under `root` with `extension`, sorted by path.
///
/// Returns `None` if the root itself can't be read.
fn collect_sources(
    root: &Path,
    extension: &str,
    issues: &mut Vec<IndexError>,
) -> Option<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) if e.depth() == 0 => return None,
            Err(e) => {
                warn!("{e}");
                issues.push(IndexError::Walk(e));
                continue;
            }
        };
        if entry.file_type().is_file() && has_extension(entry.path(), extension) {
            files.push(entry.into_path());
        }
    }
    files.sort_by(|a, b| a.to_string_lossy().cmp(&b.to_string_lossy()));
    Some(files)
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().eq_ignore_ascii_case(extension))
        .unwrap_or(false)
}

fn read_record(path: &Path, extractor: &Extractor) -> Result<PageRecord, IndexError> {
    let content = fs::read_to_string(path).map_err(|source| IndexError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;
    let properties = extractor.extract(&content);
    debug!("{}: {} properties", path.display(), properties.len());
    Ok(PageRecord::new(path.to_string_lossy(), properties))
}

/// Assign slug paths, then reject collisions in index order.
fn resolve_all(pages: &mut [PageRecord], issues: &mut Vec<IndexError>) {
    let resolved: Vec<slug::Resolved> = pages.iter().map(|p| slug::resolve(p, pages)).collect();

    let mut taken: HashMap<String, String> = HashMap::new();
    for (page, resolved) in pages.iter_mut().zip(resolved) {
        if let Some(at) = resolved.cycle_at {
            // Records hanging off a loop report the same cut; keep one issue each.
            if !issues
                .iter()
                .any(|i| matches!(i, IndexError::ParentCycle(p) if *p == at))
            {
                warn!("parent cycle at {at}");
                issues.push(IndexError::ParentCycle(at));
            }
        }

        let slug_path = match resolved.slug_path {
            Some(path) => match taken.get(&path) {
                Some(kept) => {
                    let issue = IndexError::SlugCollision {
                        slug_path: path,
                        kept: kept.clone(),
                        dropped: page.source_path.clone(),
                    };
                    warn!("{issue}");
                    issues.push(issue);
                    None
                }
                None => {
                    taken.insert(path.clone(), page.source_path.clone());
                    Some(path)
                }
            },
            None => None,
        };
        page.set_slug_path(slug_path);
    }
}
