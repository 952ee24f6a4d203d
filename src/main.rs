use clap::{Parser, Subcommand};
use std::path::PathBuf;
use ziggurat::site::{Resolution, Site, SiteError, Status};
use ziggurat::{config, output};

#[derive(Parser)]
#[command(name = "ziggurat")]
#[command(about = "File-tree-backed content router")]
#[command(long_about = "\
File-tree-backed content router

Page sources live in a directory tree. Directives inside each source give a
page its address and metadata; the directory layout itself carries no meaning.

Site structure:

  site/
  ├── config.toml                  # Site config (optional)
  ├── pages/
  │   ├── index.page               #zigg:slug = ``
  │   ├── about.page               #zigg:slug = `about`
  │   ├── 404.page                 #zigg:slug = `404`  #zigg:ignore
  │   └── blog/
  │       ├── blog.page            #zigg:slug = `blog`
  │       └── first.page           #zigg:slug = `first`  #zigg:parent = `blog`
  └── template/
      ├── header.html
      ├── body.html                # {{ page.content | safe }}
      └── footer.html

Directive syntax: #zigg:key = `value`, or a bare #zigg:flag for true.

Run 'ziggurat gen-config' to generate a documented config.toml.")]
#[command(version)]
struct Cli {
    /// Site directory holding config.toml; relative config paths resolve against it
    #[arg(long, default_value = ".", global = true)]
    config_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Index the pages directory, refresh the cache and write the sitemap
    Index,
    /// Show the page a request path resolves to
    Resolve { path: String },
    /// Render a request path and print the response
    Render { path: String },
    /// List the children of a page (top level when omitted)
    List {
        #[arg(default_value = "")]
        parent: String,
        /// Maximum number of pages to show
        #[arg(long)]
        amount: Option<usize>,
    },
    /// Print a stock config.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();

    if let Command::GenConfig = cli.command {
        print!("{}", config::stock_config_toml());
        return Ok(());
    }

    let site_config = config::load_config(&cli.config_dir)?;
    let pages_root = site_config.pages_dir();
    let site = Site::new(site_config)?;

    match cli.command {
        Command::Index => {
            println!("==> Indexing {}", pages_root.display());
            match site.index() {
                Ok(report) => output::print_index_report(&report, &pages_root),
                Err(SiteError::CacheSave { report, source }) => {
                    output::print_index_report(&report, &pages_root);
                    return Err(source.into());
                }
                Err(e) => return Err(e.into()),
            }
        }
        Command::Resolve { path } => {
            ensure_indexed(&site)?;
            match site.resolve(&path) {
                Resolution::Found(page) => output::print_page(&page),
                Resolution::NotFound(address) => {
                    println!("No page at '{address}'");
                    std::process::exit(1);
                }
            }
        }
        Command::Render { path } => {
            ensure_indexed(&site)?;
            let response = site.respond(&path);
            output::print_response(&response);
            if response.status != Status::Ok {
                std::process::exit(1);
            }
        }
        Command::List { parent, amount } => {
            ensure_indexed(&site)?;
            output::print_listing(&site.list(&parent, amount));
        }
        Command::GenConfig => {}
    }

    Ok(())
}

/// Index when neither a cache nor an earlier pass supplied pages.
fn ensure_indexed(site: &Site) -> Result<(), SiteError> {
    if site.snapshot().is_empty() {
        site.index()?;
    }
    Ok(())
}
