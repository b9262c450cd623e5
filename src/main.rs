use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use thumbcache::config::{self, ServiceConfig};
use thumbcache::logging::{self, LogFormat};
use thumbcache::service::ThumbnailService;
use thumbcache::url::{
    BaseUrlResolver, DEFAULT_SRCSET_WIDTHS, ImageUrlResolver, ResolveContext, ThumbnailUrlResolver,
    srcset,
};
use thumbcache::{http, output};
use tracing::info;

fn version_string() -> &'static str {
    let on_tag = env!("ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            // Leaked once at startup
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "thumbcache")]
#[command(about = "On-demand image thumbnails with a race-free disk cache")]
#[command(long_about = "\
On-demand image thumbnails with a race-free disk cache

Serves GET /resize/<slug>?w=<px>&h=<px>. The first request for a size
decodes the source, crops it to fill, encodes it (WebP by default) and
stores the result; later requests are served from disk with long-lived
cache headers and ETag / Last-Modified revalidation.

Cache layout (relative to public_root):

  resize/
  └── 300x200/                       # one bucket per output size
      └── storage/news/              # slug directory
          └── photo-1a2b3c4d5e6f.webp  # slugified name + slug hash

A source edited after its thumbnail was made is regenerated in place.
Concurrent requests for the same thumbnail, even from separate processes,
generate it exactly once.

Run 'thumbcache gen-config' to generate a documented thumbcache.toml.")]
#[command(version = version_string())]
struct Cli {
    /// Config file (missing file = stock defaults)
    #[arg(long, default_value = config::CONFIG_FILENAME, global = true)]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP resize endpoint
    Serve {
        /// Listen address, overriding server.bind
        #[arg(long)]
        bind: Option<String>,
    },
    /// Delete every cached thumbnail of a source image
    Purge {
        /// Source slug, e.g. storage/news/photo.jpg
        slug: String,
    },
    /// Print the public URL for an image
    Url {
        /// Source slug, e.g. storage/news/photo.jpg
        slug: String,
        /// "WxH" (either side may be "auto") or a preset from url.sizes
        #[arg(long)]
        size: Option<String>,
        /// Print a srcset over the standard widths instead of a single URL
        #[arg(long, conflicts_with = "size")]
        srcset: bool,
    },
    /// Validate the config and show the resolved settings
    Check {
        /// Print the resolved config as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print a stock thumbcache.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.log_format);

    match cli.command {
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
        Command::Check { json } => {
            let config = config::load_config(&cli.config)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                output::print_check_output(&config);
                println!("==> Config is valid");
            }
        }
        Command::Purge { slug } => {
            let config = config::load_config(&cli.config)?;
            let service = ThumbnailService::from_config(&config);
            let deleted = service.purge(&slug);
            println!("{}", output::format_purge_output(&slug, deleted));
        }
        Command::Url { slug, size, srcset: want_srcset } => {
            let config = config::load_config(&cli.config)?;
            let service = ThumbnailService::from_config(&config);
            let resolver = ThumbnailUrlResolver::new(
                BaseUrlResolver::new(config.url.base_url.clone()),
                service.store(),
                config.url.sizes.clone(),
            );
            if want_srcset {
                println!("{}", srcset(&resolver, &slug, DEFAULT_SRCSET_WIDTHS));
            } else {
                let url = resolver
                    .image_url(&slug, size.as_deref(), ResolveContext::default())
                    .ok_or("empty image path")?;
                println!("{url}");
            }
        }
        Command::Serve { bind } => {
            let config = config::load_config(&cli.config)?;
            serve(config, bind)?;
        }
    }

    Ok(())
}

fn serve(config: ServiceConfig, bind: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        let addr = bind.unwrap_or_else(|| config.server.bind.clone());
        let service = Arc::new(ThumbnailService::from_config(&config));
        let app = http::router(service);

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        info!(
            addr = %addr,
            public_root = %config.public_root.display(),
            cache_root = %config.cache_root().display(),
            "listening"
        );
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutting down");
    }
}
