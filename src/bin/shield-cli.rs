use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderMap;
use clap::{Parser, Subcommand};

use header_shield::codec;
use header_shield::config::{load_config, ShieldConfig};
use header_shield::context::RenderMode;
use header_shield::integrity::{index_directory, HashAlgorithm, IndexOptions, IntegrityInjector, IntegrityTable};
use header_shield::observability::logging;
use header_shield::routing::RuleStore;
use header_shield::shield::Shield;

#[derive(Parser)]
#[command(name = "shield-cli")]
#[command(about = "Build-time and diagnostic commands for header-shield", long_about = None)]
struct Cli {
    /// Log level when RUST_LOG is unset
    #[arg(long, default_value = "warn", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Hash built assets into an integrity manifest
    Index {
        /// Directories to index (repeatable)
        #[arg(long = "dir", required = true)]
        dirs: Vec<PathBuf>,
        /// Absolute CDN prefix the assets are served from
        #[arg(long)]
        cdn_url: Option<String>,
        /// Root-relative prefix the assets are served under
        #[arg(long, default_value = "/")]
        base: String,
        /// sha256, sha384 or sha512
        #[arg(long, default_value = "sha384")]
        algorithm: String,
        /// Manifest to write; existing entries are kept
        #[arg(long)]
        out: PathBuf,
    },
    /// Print the effective policy and headers for a path
    Resolve {
        #[arg(long)]
        config: Option<PathBuf>,
        path: String,
    },
    /// Process a pre-rendered HTML file for static hosting
    Prerender {
        #[arg(long)]
        config: Option<PathBuf>,
        /// Integrity manifest produced by `index`
        #[arg(long)]
        manifest: Option<PathBuf>,
        /// Fetch and hash external scripts and stylesheets
        #[arg(long)]
        fetch_external: bool,
        /// Route the page is served at
        #[arg(long)]
        route: String,
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    logging::init(&cli.log_level);

    match cli.command {
        Commands::Index {
            dirs,
            cdn_url,
            base,
            algorithm,
            out,
        } => {
            let algorithm = HashAlgorithm::from_name(&algorithm)
                .ok_or_else(|| format!("unsupported hash algorithm `{}`", algorithm))?;
            let options = IndexOptions {
                cdn_url,
                base,
                algorithm,
            };

            let mut table = if out.exists() {
                IntegrityTable::load(&out)?
            } else {
                IntegrityTable::new()
            };
            let mut indexed = 0;
            for dir in &dirs {
                indexed += index_directory(&mut table, dir, &options)?;
            }
            table.save(&out)?;
            println!("Indexed {} files into {} ({} entries)", indexed, out.display(), table.len());
        }
        Commands::Resolve { config, path } => {
            let config = read_config(config.as_deref())?;
            let rules = RuleStore::from_config(&config)?;
            let policy = rules.resolve(&path);

            println!("{}", serde_json::to_string_pretty(&policy)?);
            println!();
            if let Some(headers) = policy.headers() {
                for (key, value) in headers.iter() {
                    match codec::encode(*key, value) {
                        Some(encoded) => println!("{}: {}", key.header_name(), encoded),
                        None => println!("{}: (removed)", key.header_name()),
                    }
                }
            }
        }
        Commands::Prerender {
            config,
            manifest,
            fetch_external,
            route,
            input,
            output,
        } => {
            let config = read_config(config.as_deref())?;
            let table = match manifest.or(config.integrity.manifest_path.clone()) {
                Some(path) => IntegrityTable::load(&path)?,
                None => IntegrityTable::new(),
            };
            let mut injector = IntegrityInjector::new(Arc::new(table));
            if fetch_external {
                injector = injector
                    .with_external_fetch(Duration::from_secs(config.integrity.fetch_timeout_secs))?;
            }
            let shield = Shield::new(RuleStore::from_config(&config)?).with_integrity(injector);

            let html = std::fs::read_to_string(&input)?;
            let ctx = shield.begin(&route, &HeaderMap::new(), RenderMode::Prerender);
            let processed = shield.process_html(&ctx, &html).await;
            std::fs::write(&output, processed)?;

            let mut headers = HeaderMap::new();
            shield.finalize_headers(&ctx, &mut headers)?;
            println!("Wrote {}", output.display());
            println!("Headers for {}:", route);
            for (name, value) in headers.iter() {
                println!("  {}: {}", name, value.to_str().unwrap_or("<binary>"));
            }
        }
    }

    Ok(())
}

fn read_config(path: Option<&Path>) -> Result<ShieldConfig, Box<dyn std::error::Error>> {
    Ok(match path {
        Some(path) => load_config(path)?,
        None => ShieldConfig::default(),
    })
}
