//! Hierarchical slug resolution.
//!
//! A page's public address is its own `slug` prefixed by its parent's full
//! address, recursively:
//!
//! ```text
//! blog.page   #zigg:slug = `blog`
//! 2024.page   #zigg:slug = `2024`   #zigg:parent = `blog`
//! post.page   #zigg:slug = `post`   #zigg:parent = `2024`
//!
//! post → blog/2024/post
//! ```
//!
//! `parent` names the parent's bare `slug` property, never a resolved path,
//! and the search runs over the raw properties so records can be resolved
//! in any order. The first candidate in index order wins.
//!
//! Page sources are untrusted input: a parent that doesn't exist is dropped
//! (the page keeps its bare slug), and a parent chain that loops back to a
//! page already being resolved is cut at the page that would close the loop.

use crate::types::PageRecord;
use std::collections::HashSet;

/// Outcome of resolving one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub slug_path: Option<String>,
    /// Source path of the record whose parent reference was cut to break a
    /// cycle, if any.
    pub cycle_at: Option<String>,
}

/// Compute the full slug path of `record` against `all`.
pub fn resolve_slug(record: &PageRecord, all: &[PageRecord]) -> Option<String> {
    resolve(record, all).slug_path
}

/// Like [`resolve_slug`], also reporting where a parent cycle was cut.
pub fn resolve(record: &PageRecord, all: &[PageRecord]) -> Resolved {
    let mut visited = HashSet::new();
    let mut cycle_at = None;
    let slug_path = resolve_with(record, all, &mut visited, &mut cycle_at);
    Resolved {
        slug_path,
        cycle_at,
    }
}

fn resolve_with<'a>(
    record: &'a PageRecord,
    all: &'a [PageRecord],
    visited: &mut HashSet<&'a str>,
    cycle_at: &mut Option<String>,
) -> Option<String> {
    let slug = record.slug()?;
    visited.insert(record.source_path.as_str());

    let Some(parent_slug) = record.parent() else {
        return Some(slug.to_string());
    };
    let Some(parent) = find_by_slug_property(all, parent_slug) else {
        return Some(slug.to_string());
    };
    if visited.contains(parent.source_path.as_str()) {
        cycle_at.get_or_insert_with(|| record.source_path.clone());
        return Some(slug.to_string());
    }

    match resolve_with(parent, all, visited, cycle_at) {
        Some(prefix) if !prefix.is_empty() => Some(format!("{prefix}/{slug}")),
        _ => Some(slug.to_string()),
    }
}

/// First record whose bare `slug` property equals `slug`.
fn find_by_slug_property<'a>(all: &'a [PageRecord], slug: &str) -> Option<&'a PageRecord> {
    all.iter().find(|p| p.slug() == Some(slug))
}
