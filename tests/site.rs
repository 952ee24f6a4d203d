//! End-to-end run over a small blog: config file, templates, cover images,
//! SQLite cache and sitemap.

use std::fs;
use std::path::Path;
use tempfile::TempDir;
use ziggurat::config::load_config;
use ziggurat::query::Origin;
use ziggurat::site::{Resolution, Site, Status};

const CONFIG: &str = r#"
site_url = "https://example.com"
minify_html = true

[cache]
backend = "sqlite"
path = "cache/ziggurat.db"
"#;

const BLOG_PAGE: &str = r#"#zigg:slug = `blog`
#zigg:title = `Blog`
{% set posts = list_children(parent="blog") %}
{% for post in posts %}
<article>
  <a href="/{{ post.slug_path }}">{{ post.properties.title }}</a>
  {% if "cover-image" in post.properties %}
  <picture><img data-src="{{ post.properties["cover-image"].small.url }}"></picture>
  {% endif %}
</article>
{% endfor %}
"#;

fn write(root: &Path, rel: &str, content: &[u8]) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn png(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = Vec::new();
    image::RgbImage::new(width, height)
        .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}

fn blog_site() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    write(root, "config.toml", CONFIG.as_bytes());

    write(root, "template/header.html", b"<html>\n  <body>\n");
    write(root, "template/body.html", b"    <main>{{ page.content | safe }}</main>\n");
    write(root, "template/footer.html", b"  </body>\n</html>\n");

    write(root, "pages/index.page", b"#zigg:slug = ``\n<h1>Home</h1>");
    write(root, "pages/blog/blog.page", BLOG_PAGE.as_bytes());
    write(
        root,
        "pages/blog/first.page",
        b"#zigg:slug = `first`\n#zigg:parent = `blog`\n#zigg:title = `First`\n#zigg:date = `2024-01-10`\n#zigg:cover-image = `img/photo-{size}.png`\n<p>one</p>",
    );
    write(
        root,
        "pages/blog/second.page",
        b"#zigg:slug = `second`\n#zigg:parent = `blog`\n#zigg:title = `Second`\n#zigg:date = `2024-03-01`\n<p>two</p>",
    );
    write(root, "pages/404.page", b"#zigg:slug = `404`\n#zigg:ignore\n<h1>Lost</h1>");

    // Only the small variant exists
    write(root, "img/photo-512px.png", &png(20, 10));
    tmp
}

#[test]
fn blog_renders_listing_with_cover_images() {
    let tmp = blog_site();
    let site = Site::new(load_config(tmp.path()).unwrap()).unwrap();
    let report = site.index().unwrap();
    assert!(report.issues.is_empty(), "{:?}", report.issues);

    let response = site.respond("/blog");
    assert_eq!(response.status, Status::Ok);

    let body = &response.body;
    let second = body.find(r#"<a href="/blog/second">Second</a>"#).unwrap();
    let first = body.find(r#"<a href="/blog/first">First</a>"#).unwrap();
    assert!(second < first, "newest post first: {body}");
    assert!(body.contains(
        r#"<picture style="padding-top:50%"><img data-src="img/photo-512px.png"></picture>"#
    ));
    assert!(body.starts_with("<html><body><main>"));
    assert!(!body.contains('\n'));
}

#[test]
fn cover_image_keeps_only_existing_sizes() {
    let tmp = blog_site();
    let site = Site::new(load_config(tmp.path()).unwrap()).unwrap();
    site.index().unwrap();

    let Resolution::Found(page) = site.resolve("blog/first") else {
        panic!("blog/first not found");
    };
    let images = page.properties["cover-image"].as_images().unwrap();
    let labels: Vec<&str> = images.keys().map(String::as_str).collect();
    assert_eq!(labels, vec!["small"]);
    assert_eq!(images["small"].url, "img/photo-512px.png");
    assert_eq!(images["small"].pixel_width, 512);
}

#[test]
fn restart_serves_from_sqlite_cache() {
    let tmp = blog_site();
    let config = load_config(tmp.path()).unwrap();
    Site::new(config.clone()).unwrap().index().unwrap();

    // Gone from disk, still in the cache
    fs::remove_file(tmp.path().join("pages/blog/second.page")).unwrap();

    let site = Site::new(config).unwrap();
    assert_eq!(site.snapshot().origin(), Origin::Cached);
    let response = site.respond("blog/second");
    assert_eq!(response.status, Status::Ok);
    assert!(response.body.contains("<p>two</p>"));

    // A fresh pass drops it from the index; the stale row stays in the store
    // but the in-process index now answers
    site.index().unwrap();
    let response = site.respond("blog/second");
    assert_eq!(response.status, Status::NotFound);
    assert!(response.body.contains("<h1>Lost</h1>"));
}

#[test]
fn sitemap_lists_public_pages() {
    let tmp = blog_site();
    let site = Site::new(load_config(tmp.path()).unwrap()).unwrap();
    site.index().unwrap();

    let xml = fs::read_to_string(tmp.path().join("sitemap.xml")).unwrap();
    assert!(xml.contains("<loc>https://example.com/</loc>"));
    assert!(xml.contains(
        "<loc>https://example.com/blog/first</loc><priority>0.1</priority><lastmod>2024-01-10</lastmod><changefreq>weekly</changefreq>"
    ));
    assert!(xml.contains("<loc>https://example.com/blog</loc>"));
    assert!(!xml.contains("404"));
}

#[test]
fn top_level_listing() {
    let tmp = blog_site();
    let site = Site::new(load_config(tmp.path()).unwrap()).unwrap();
    site.index().unwrap();

    let top: Vec<String> = site.list("", None).iter().map(|p| p.address()).collect();
    assert_eq!(top, vec!["blog", "index"]);

    let latest: Vec<String> = site
        .list("blog", Some(1))
        .iter()
        .map(|p| p.address())
        .collect();
    assert_eq!(latest, vec!["blog/second"]);
}
