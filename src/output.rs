//! CLI output formatting.
//!
//! Output leads with the page address, the thing a visitor types, and shows
//! the source file as an indented `Source:` line underneath.
//!
//! # Output Format
//!
//! ## Index
//!
//! ```text
//! Pages
//! 001 about
//!     Source: about.page
//! 002 blog
//!     Source: blog/blog.page
//!     001 blog/first-post
//!         Source: blog/first-post.page
//!
//! Unaddressed
//! 001 index
//!     Source: index.page
//!
//! Issues
//!     Slug path 'dup' of b.page already taken by a.page
//!
//! Indexed 4 pages (1 ignored, 1 issue)
//! ```
//!
//! ## List
//!
//! ```text
//! 001 blog/first-post  2024-05-01
//! 002 blog/older       2023-11-20
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout.

use crate::scan::IndexReport;
use crate::site::Response;
use crate::types::PageRecord;
use std::path::Path;

// ============================================================================
// Shared helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Source path relative to `root` when it lives under it.
fn display_source(source_path: &str, root: &Path) -> String {
    let path = Path::new(source_path);
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .to_string()
}

fn page_lines(page: &PageRecord, position: usize, depth: usize, root: &Path) -> [String; 2] {
    let flag = if page.is_ignored() { " (ignored)" } else { "" };
    [
        format!("{}{} {}{}", indent(depth), format_index(position), page.address(), flag),
        format!(
            "{}Source: {}",
            indent(depth + 1),
            display_source(&page.source_path, root)
        ),
    ]
}

fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        format!("{n} {word}")
    } else {
        format!("{n} {word}s")
    }
}

// ============================================================================
// Index
// ============================================================================

/// Format an index pass: the slug tree, stem-addressed pages, issues.
pub fn format_index_report(report: &IndexReport, pages_root: &Path) -> Vec<String> {
    let mut lines = Vec::new();

    if !report.is_indexed() {
        lines.push(format!("Not indexed: {}", pages_root.display()));
        return lines;
    }

    lines.push("Pages".to_string());
    walk_slug_tree(&report.pages, &[], 0, pages_root, &mut lines);

    let unaddressed: Vec<&PageRecord> = report
        .pages
        .iter()
        .filter(|p| p.slug_path.is_none())
        .collect();
    if !unaddressed.is_empty() {
        lines.push(String::new());
        lines.push("Unaddressed".to_string());
        for (i, page) in unaddressed.iter().enumerate() {
            lines.extend(page_lines(page, i + 1, 0, pages_root));
        }
    }

    if !report.issues.is_empty() {
        lines.push(String::new());
        lines.push("Issues".to_string());
        for issue in &report.issues {
            lines.push(format!("{}{}", indent(1), issue));
        }
    }

    let ignored = report.pages.iter().filter(|p| p.is_ignored()).count();
    lines.push(String::new());
    lines.push(format!(
        "Indexed {} ({} ignored, {})",
        plural(report.pages.len(), "page"),
        ignored,
        plural(report.issues.len(), "issue")
    ));
    lines
}

/// Pages whose ancestor chain is `parent` plus one segment, depth-first.
fn walk_slug_tree(
    pages: &[PageRecord],
    parent: &[String],
    depth: usize,
    root: &Path,
    lines: &mut Vec<String>,
) {
    let children = pages.iter().filter(|p| {
        p.slug_path.is_some()
            && p.ancestors.len() == parent.len() + 1
            && p.ancestors.starts_with(parent)
    });
    for (i, page) in children.enumerate() {
        lines.extend(page_lines(page, i + 1, depth, root));
        walk_slug_tree(pages, &page.ancestors, depth + 1, root, lines);
    }
}

pub fn print_index_report(report: &IndexReport, pages_root: &Path) {
    for line in format_index_report(report, pages_root) {
        println!("{}", line);
    }
}

// ============================================================================
// List
// ============================================================================

/// One line per page: position, address, date when set.
pub fn format_listing(pages: &[PageRecord]) -> Vec<String> {
    if pages.is_empty() {
        return vec!["No pages".to_string()];
    }
    let width = pages.iter().map(|p| p.address().len()).max().unwrap_or(0);
    pages
        .iter()
        .enumerate()
        .map(|(i, page)| match page.property("date") {
            Some(date) => format!(
                "{} {:<width$}  {}",
                format_index(i + 1),
                page.address(),
                date
            ),
            None => format!("{} {}", format_index(i + 1), page.address()),
        })
        .collect()
}

pub fn print_listing(pages: &[PageRecord]) {
    for line in format_listing(pages) {
        println!("{}", line);
    }
}

// ============================================================================
// Resolve / render
// ============================================================================

/// Address, source and text properties of a single page.
pub fn format_page(page: &PageRecord) -> Vec<String> {
    let mut lines = vec![
        page.address(),
        format!("{}Source: {}", indent(1), page.source_path),
    ];
    if !page.ancestors.is_empty() {
        lines.push(format!("{}Ancestors: {}", indent(1), page.ancestors.join(" → ")));
    }
    for (key, value) in &page.properties {
        match value.as_text() {
            Some(text) => lines.push(format!("{}{}: {}", indent(1), key, text)),
            None => {
                let sizes: Vec<&str> = value
                    .as_images()
                    .map(|images| images.keys().map(String::as_str).collect())
                    .unwrap_or_default();
                lines.push(format!("{}{}: [{}]", indent(1), key, sizes.join(", ")));
            }
        }
    }
    if page.rendered_html().is_some() {
        lines.push(format!("{}Pre-rendered", indent(1)));
    }
    lines
}

pub fn print_page(page: &PageRecord) {
    for line in format_page(page) {
        println!("{}", line);
    }
}

/// Status line followed by the body.
pub fn format_response(response: &Response) -> Vec<String> {
    vec![
        format!("Status: {}", response.status.code()),
        String::new(),
        response.body.clone(),
    ]
}

pub fn print_response(response: &Response) {
    for line in format_response(response) {
        println!("{}", line);
    }
}
