//! Page rendering.
//!
//! Turns a resolved [`PageRecord`] into the final HTML document:
//!
//! ```text
//! cached html? ──yes──► return it (request renders only)
//!      │ no
//!      ▼
//! body hook ──► markdown (type = markdown) ──► header + body + footer
//!      ──► lazy-image aspect ratios ──► minify (optional)
//! ```
//!
//! ## Templates
//!
//! Fragments are [Tera](https://keats.github.io/tera/) files in the template
//! directory, named by their path without extension (`header.html` →
//! `header`). They are concatenated in the configured order; the `body`
//! fragment is swapped for the page's `template` directive when it has one.
//! When the template directory doesn't exist the page body is the whole
//! document.
//!
//! Every fragment, and the page body itself, sees:
//!
//! - `page`: the record (`source_path`, `slug_path`, `ancestors`,
//!   `properties`), plus `content` (the rendered body) in fragments
//! - `site_url`
//! - `list_children(parent="", amount=N)` and `find_page(slug="...")`,
//!   answered from the index snapshot being rendered against
//!
//! Page sources are authored alongside the templates, so nothing is
//! autoescaped.
//!
//! ## Lazy images
//!
//! `<picture … data-src="img/a.jpg"` gets an inline
//! `style="padding-top:<height/width × 100>%"` when the image exists under the
//! asset root, so the browser can reserve its box before loading. Missing
//! or unreadable images are left alone.

use crate::config::{BODY_PART, SiteConfig, TemplateConfig};
use crate::metadata::{resolve_asset, strip_directives};
use crate::query::PageIndex;
use crate::types::PageRecord;
use log::{debug, info};
use pulldown_cmark::{Parser, html as md_html};
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use tera::{Context, Tera, Value};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Page not found: {0}")]
    NotFound(String),
    #[error("Cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Template error: {0}")]
    Template(#[from] tera::Error),
    #[error("Template fragment '{0}' not found")]
    MissingTemplate(String),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Page body failed: {0}")]
    Body(String),
}

/// Whether a render may be answered from `PageRecord::html`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// Serving a request: pre-rendered html wins.
    Request,
    /// Building the cache: always render from source.
    Prerender,
}

/// Produces the raw body of a page.
pub trait BodyRenderer: Send + Sync {
    fn render_body(
        &self,
        page: &PageRecord,
        engine: &mut Tera,
        context: &Context,
    ) -> Result<String, RenderError>;
}

/// Renders the page source as a template, minus its directive lines.
#[derive(Debug, Default, Clone, Copy)]
pub struct TemplateBody;

impl BodyRenderer for TemplateBody {
    fn render_body(
        &self,
        page: &PageRecord,
        engine: &mut Tera,
        context: &Context,
    ) -> Result<String, RenderError> {
        let source = fs::read_to_string(&page.source_path).map_err(|source| RenderError::Io {
            path: PathBuf::from(&page.source_path),
            source,
        })?;
        Ok(engine.render_str(&strip_directives(&source), context)?)
    }
}

/// The render pipeline for one site.
pub struct Renderer {
    templates: Tera,
    /// `None` renders bare page bodies.
    parts: Option<Vec<String>>,
    site_url: String,
    asset_root: PathBuf,
    minify: bool,
    not_found_slug: String,
    body: Box<dyn BodyRenderer>,
}

impl Renderer {
    /// Load the template fragments named in `config`.
    pub fn new(config: &SiteConfig) -> Result<Self, RenderError> {
        let (templates, parts) = load_templates(&config.template)?;
        Ok(Self {
            templates,
            parts,
            site_url: config.site_url.clone(),
            asset_root: config.asset_root(),
            minify: config.minify_html,
            not_found_slug: config.not_found_slug.clone(),
            body: Box::new(TemplateBody),
        })
    }

    /// Replace the body hook.
    pub fn with_body(mut self, body: Box<dyn BodyRenderer>) -> Self {
        self.body = body;
        self
    }

    /// Render `page` against `index`.
    ///
    /// A page without a readable source is swapped for the not-found page;
    /// if that doesn't exist either the result is [`RenderError::NotFound`].
    pub fn render(
        &self,
        page: &PageRecord,
        index: &Arc<PageIndex>,
        mode: RenderMode,
    ) -> Result<String, RenderError> {
        if let Some(html) = prerendered(page, mode) {
            debug!("serving pre-rendered {}", page.address());
            return Ok(html.to_string());
        }

        if has_source(page) {
            return self.render_source(page, index);
        }

        let fallback = index
            .find_by_slug(&self.not_found_slug)
            .filter(|p| has_source(p))
            .ok_or_else(|| RenderError::NotFound(page.address()))?;
        match prerendered(fallback, mode) {
            Some(html) => Ok(html.to_string()),
            None => self.render_source(fallback, index),
        }
    }

    fn render_source(&self, page: &PageRecord, index: &Arc<PageIndex>) -> Result<String, RenderError> {
        let mut engine = self.templates.clone();
        register_queries(&mut engine, index);

        let mut context = Context::new();
        context.insert("site_url", &self.site_url);
        context.insert("page", page);

        let mut content = self.body.render_body(page, &mut engine, &context)?;
        if page.is_markdown() {
            content = markdown_to_html(&content);
        }

        let mut page_value = tera::to_value(page)?;
        if let Value::Object(map) = &mut page_value {
            map.insert("content".to_string(), Value::String(content.clone()));
        }
        context.insert("page", &page_value);

        let composed = match &self.parts {
            Some(parts) => compose(&engine, parts, page, &context)?,
            None => content,
        };

        let html = inject_aspect_ratios(&composed, &self.asset_root);
        Ok(if self.minify { minify_html(&html) } else { html })
    }
}

fn prerendered(page: &PageRecord, mode: RenderMode) -> Option<&str> {
    match mode {
        RenderMode::Request => page.rendered_html(),
        RenderMode::Prerender => None,
    }
}

fn has_source(page: &PageRecord) -> bool {
    !page.source_path.is_empty() && Path::new(&page.source_path).is_file()
}

/// Load every fragment file in the template directory.
///
/// Returns `parts = None` when templating is off: no parts configured, or
/// no template directory.
fn load_templates(config: &TemplateConfig) -> Result<(Tera, Option<Vec<String>>), RenderError> {
    let mut tera = Tera::default();
    tera.autoescape_on(vec![]);

    let dir = Path::new(&config.dir);
    if config.parts.is_empty() || !dir.is_dir() {
        info!("no templates in {}, rendering bare page bodies", dir.display());
        return Ok((tera, None));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| RenderError::Io {
            path: dir.to_path_buf(),
            source: e.into(),
        })?;
        let path = entry.path();
        let matches = path
            .extension()
            .map(|e| e.to_string_lossy().eq_ignore_ascii_case(&config.extension))
            .unwrap_or(false);
        if !entry.file_type().is_file() || !matches {
            continue;
        }
        let Ok(rel) = path.strip_prefix(dir) else {
            continue;
        };
        let name = rel
            .with_extension("")
            .to_string_lossy()
            .replace(std::path::MAIN_SEPARATOR, "/");
        files.push((path.to_path_buf(), Some(name)));
    }
    debug!("loading {} template fragments from {}", files.len(), dir.display());
    tera.add_template_files(files)?;

    Ok((tera, Some(config.parts.clone())))
}

/// Concatenate fragments in order, swapping in the page's body template.
fn compose(
    engine: &Tera,
    parts: &[String],
    page: &PageRecord,
    context: &Context,
) -> Result<String, RenderError> {
    let mut out = String::new();
    for part in parts {
        let name = match page.property("template") {
            Some(custom) if part == BODY_PART => custom,
            _ => part.as_str(),
        };
        if !engine.get_template_names().any(|n| n == name) {
            return Err(RenderError::MissingTemplate(name.to_string()));
        }
        out.push_str(&engine.render(name, context)?);
    }
    Ok(out)
}

/// Expose index queries to templates.
fn register_queries(engine: &mut Tera, index: &Arc<PageIndex>) {
    let idx = Arc::clone(index);
    engine.register_function(
        "list_children",
        move |args: &HashMap<String, Value>| -> tera::Result<Value> {
            let parent = args.get("parent").and_then(Value::as_str).unwrap_or("");
            let amount = args
                .get("amount")
                .and_then(Value::as_u64)
                .map(|n| n as usize);
            Ok(tera::to_value(idx.list_children(parent, amount))?)
        },
    );

    let idx = Arc::clone(index);
    engine.register_function(
        "find_page",
        move |args: &HashMap<String, Value>| -> tera::Result<Value> {
            let slug = args
                .get("slug")
                .and_then(Value::as_str)
                .ok_or_else(|| tera::Error::msg("find_page requires a `slug` argument"))?;
            match idx.find_by_slug(slug) {
                Some(page) => Ok(tera::to_value(page)?),
                None => Ok(Value::Null),
            }
        },
    );
}

pub fn markdown_to_html(markdown: &str) -> String {
    let parser = Parser::new(markdown);
    let mut html = String::new();
    md_html::push_html(&mut html, parser);
    html
}

// ============================================================================
// Post-processing
// ============================================================================

static LAZY_PICTURE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<picture(.+?)data-src="([^"]+)""#).expect("lazy picture pattern is valid")
});

static PRE_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<pre\b.*?</pre>").expect("pre pattern is valid"));

static COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("comment pattern is valid"));

static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s{2,}|\n").expect("whitespace pattern is valid"));

/// Add `padding-top` aspect-ratio styles to lazy `<picture>` elements.
pub fn inject_aspect_ratios(html: &str, asset_root: &Path) -> String {
    LAZY_PICTURE
        .replace_all(html, |caps: &Captures<'_>| {
            let whole = &caps[0];
            match aspect_ratio(&resolve_asset(asset_root, &caps[2])) {
                Some(ratio) => format!(
                    "<picture style=\"padding-top:{ratio}%\"{}",
                    &whole["<picture".len()..]
                ),
                None => whole.to_string(),
            }
        })
        .into_owned()
}

/// Height over width as a percentage, rounded to two decimals.
fn aspect_ratio(path: &Path) -> Option<f64> {
    let (width, height) = image::image_dimensions(path).ok()?;
    if width == 0 {
        return None;
    }
    let ratio = f64::from(height) / f64::from(width) * 100.0;
    Some((ratio * 100.0).round() / 100.0)
}

/// Strip comments and collapse whitespace, leaving `<pre>` blocks intact.
pub fn minify_html(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut last = 0;
    for pre in PRE_BLOCK.find_iter(html) {
        out.push_str(&minify_segment(&html[last..pre.start()]));
        out.push_str(pre.as_str());
        last = pre.end();
    }
    out.push_str(&minify_segment(&html[last..]));
    out
}

fn minify_segment(segment: &str) -> String {
    let segment = COMMENT.replace_all(segment, "");
    let mut out = String::with_capacity(segment.len());
    let mut last = 0;
    for run in WHITESPACE_RUN.find_iter(&segment) {
        out.push_str(&segment[last..run.start()]);
        let at_edge = run.start() == 0 || run.end() == segment.len();
        let between_tags = segment[..run.start()].ends_with('>') && segment[run.end()..].starts_with('<');
        if !at_edge && !between_tags {
            out.push(' ');
        }
        last = run.end();
    }
    out.push_str(&segment[last..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Origin;
    use crate::test_helpers::*;

    struct FailingBody;

    impl BodyRenderer for FailingBody {
        fn render_body(
            &self,
            _page: &PageRecord,
            _engine: &mut Tera,
            _context: &Context,
        ) -> Result<String, RenderError> {
            Err(RenderError::Body("boom".into()))
        }
    }

    fn indexed(site: &SiteFixture) -> Arc<PageIndex> {
        let report = crate::scan::build_index(&site.config);
        Arc::new(PageIndex::new(report.pages, Origin::Built))
    }

    #[test]
    fn composes_fragments_in_order() {
        let site = SiteFixture::new();
        site.write_default_templates();
        site.write_page("about.page", "#zigg:slug = `about`\n<h1>About</h1>");
        let index = indexed(&site);

        let renderer = Renderer::new(&site.config).unwrap();
        let page = index.find_by_slug("about").unwrap();
        let html = renderer.render(page, &index, RenderMode::Request).unwrap();
        let header = html.find("<html><body>").unwrap();
        let body = html.find("<main><h1>About</h1></main>").unwrap();
        let footer = html.find("</body></html>").unwrap();
        assert!(header < body && body < footer);
    }

    #[test]
    fn page_template_overrides_body_fragment() {
        let site = SiteFixture::new();
        site.write_default_templates();
        site.write_template(
            "blog-post",
            "<article>{{ page.properties.title }}: {{ page.content | safe }}</article>\n",
        );
        site.write_page(
            "post.page",
            "#zigg:slug = `post`\n#zigg:title = `Hello`\n#zigg:template = `blog-post`\nText",
        );
        let index = indexed(&site);

        let renderer = Renderer::new(&site.config).unwrap();
        let html = renderer
            .render(index.find_by_slug("post").unwrap(), &index, RenderMode::Request)
            .unwrap();
        assert!(html.contains("<article>Hello: Text</article>"));
        assert!(!html.contains("<main>"));
    }

    #[test]
    fn missing_override_template_is_error() {
        let site = SiteFixture::new();
        site.write_default_templates();
        site.write_page("p.page", "#zigg:slug = `p`\n#zigg:template = `nope`\n");
        let index = indexed(&site);

        let renderer = Renderer::new(&site.config).unwrap();
        let result = renderer.render(index.find_by_slug("p").unwrap(), &index, RenderMode::Request);
        assert!(matches!(result, Err(RenderError::MissingTemplate(name)) if name == "nope"));
    }

    #[test]
    fn bare_body_without_template_dir() {
        let site = SiteFixture::new();
        fs::remove_dir_all(&site.config.template.dir).unwrap();
        site.write_page("a.page", "#zigg:slug = `a`\n<p>{{ page.slug_path }}</p>");
        let index = indexed(&site);

        let renderer = Renderer::new(&site.config).unwrap();
        let html = renderer
            .render(index.find_by_slug("a").unwrap(), &index, RenderMode::Request)
            .unwrap();
        assert_eq!(html, "<p>a</p>");
    }

    #[test]
    fn markdown_pages_converted() {
        let site = SiteFixture::new();
        fs::remove_dir_all(&site.config.template.dir).unwrap();
        site.write_page(
            "notes.page",
            "#zigg:slug = `notes`\n#zigg:type = `markdown`\n# Notes\n\nSome *text*.\n",
        );
        let index = indexed(&site);

        let renderer = Renderer::new(&site.config).unwrap();
        let html = renderer
            .render(index.find_by_slug("notes").unwrap(), &index, RenderMode::Request)
            .unwrap();
        assert!(html.contains("<h1>Notes</h1>"));
        assert!(html.contains("<em>text</em>"));
    }

    #[test]
    fn cached_html_short_circuits_requests_only() {
        let site = SiteFixture::new();
        fs::remove_dir_all(&site.config.template.dir).unwrap();
        site.write_page("a.page", "#zigg:slug = `a`\nfresh");
        let index = indexed(&site);

        let renderer = Renderer::new(&site.config).unwrap();
        let mut page = index.find_by_slug("a").unwrap().clone();
        page.html = Some("cached".into());

        assert_eq!(
            renderer.render(&page, &index, RenderMode::Request).unwrap(),
            "cached"
        );
        assert_eq!(
            renderer.render(&page, &index, RenderMode::Prerender).unwrap(),
            "fresh"
        );
    }

    #[test]
    fn missing_source_falls_back_to_not_found_page() {
        let site = SiteFixture::new();
        fs::remove_dir_all(&site.config.template.dir).unwrap();
        site.write_page("404.page", "#zigg:slug = `404`\n#zigg:ignore\nNot here");
        let index = indexed(&site);

        let renderer = Renderer::new(&site.config).unwrap();
        let ghost = page("pages/deleted.page", &[]);
        assert_eq!(
            renderer.render(&ghost, &index, RenderMode::Request).unwrap(),
            "Not here"
        );
    }

    #[test]
    fn missing_source_without_not_found_page_is_not_found() {
        let site = SiteFixture::new();
        let index = indexed(&site);
        let renderer = Renderer::new(&site.config).unwrap();
        let ghost = page("", &[]);
        assert!(matches!(
            renderer.render(&ghost, &index, RenderMode::Request),
            Err(RenderError::NotFound(_))
        ));
    }

    #[test]
    fn body_hook_failure_propagates() {
        let site = SiteFixture::new();
        site.write_page("a.page", "#zigg:slug = `a`");
        let index = indexed(&site);
        let renderer = Renderer::new(&site.config)
            .unwrap()
            .with_body(Box::new(FailingBody));
        assert!(matches!(
            renderer.render(index.find_by_slug("a").unwrap(), &index, RenderMode::Request),
            Err(RenderError::Body(_))
        ));
    }

    #[test]
    fn templates_can_list_children_and_find_pages() {
        let site = SiteFixture::new();
        fs::remove_dir_all(&site.config.template.dir).unwrap();
        site.write_page(
            "blog.page",
            "#zigg:slug = `blog`\n{% set kids = list_children(parent=\"blog\") %}{% for p in kids %}[{{ p.slug_path }}]{% endfor %}|{% set one = find_page(slug=\"blog/one\") %}{{ one.properties.title }}",
        );
        site.write_page(
            "one.page",
            "#zigg:slug = `one`\n#zigg:parent = `blog`\n#zigg:order = `1`\n#zigg:title = `First`",
        );
        site.write_page(
            "two.page",
            "#zigg:slug = `two`\n#zigg:parent = `blog`\n#zigg:order = `2`",
        );
        let index = indexed(&site);

        let renderer = Renderer::new(&site.config).unwrap();
        let html = renderer
            .render(index.find_by_slug("blog").unwrap(), &index, RenderMode::Request)
            .unwrap();
        assert_eq!(html, "[blog/one][blog/two]|First");
    }

    #[test]
    fn directives_in_template_comments_are_invisible() {
        let site = SiteFixture::new();
        fs::remove_dir_all(&site.config.template.dir).unwrap();
        site.write_page("a.page", "{# #zigg:slug = `a` #}<p>hi</p>");
        let index = indexed(&site);

        let renderer = Renderer::new(&site.config).unwrap();
        let html = renderer
            .render(index.find_by_slug("a").unwrap(), &index, RenderMode::Request)
            .unwrap();
        assert_eq!(html, "<p>hi</p>");
    }

    #[test]
    fn aspect_ratio_injected_for_existing_images() {
        let site = SiteFixture::new();
        site.write_asset("img/wide.png", &png_bytes(16, 9));

        let html = r#"<picture><img data-src="img/wide.png"></picture><picture><img data-src="img/gone.png"></picture>"#;
        let out = inject_aspect_ratios(html, &site.config.asset_root());
        assert_eq!(
            out,
            r#"<picture style="padding-top:56.25%"><img data-src="img/wide.png"></picture><picture><img data-src="img/gone.png"></picture>"#
        );
    }

    #[test]
    fn aspect_ratio_whole_percent_has_no_decimals() {
        let site = SiteFixture::new();
        site.write_asset("sq.png", &png_bytes(4, 2));
        let out = inject_aspect_ratios(
            r#"<picture class="x" data-src="/sq.png">"#,
            &site.config.asset_root(),
        );
        assert_eq!(
            out,
            r#"<picture style="padding-top:50%" class="x" data-src="/sq.png">"#
        );
    }

    #[test]
    fn minify_collapses_whitespace_outside_pre() {
        let html = "<div>\n  <p>Hello   world</p>\n  <!-- note -->\n</div>\n<pre>  keep\n  this </pre>\n<p>a\nb</p>\n";
        assert_eq!(
            minify_html(html),
            "<div><p>Hello world</p></div><pre>  keep\n  this </pre><p>a b</p>"
        );
    }

    #[test]
    fn minify_applied_when_configured() {
        let mut site = SiteFixture::new();
        site.config.minify_html = true;
        site.write_default_templates();
        site.write_page("a.page", "#zigg:slug = `a`\n<p>x</p>\n<!-- gone -->\n");
        let index = indexed(&site);

        let renderer = Renderer::new(&site.config).unwrap();
        let html = renderer
            .render(index.find_by_slug("a").unwrap(), &index, RenderMode::Request)
            .unwrap();
        assert_eq!(html, "<html><body><main><p>x</p></main></body></html>");
    }
}
