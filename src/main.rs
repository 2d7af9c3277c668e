//! Recipe Gallery - photo and recipe gallery backed by Google Drive
//!
//! Mirrors a Drive "Recipes" and "Pictures" folder into an in-memory catalog,
//! caches the images (plus thumbnails) on local disk, and serves both over a
//! small JSON API.

mod cache;
mod config;
mod drive;
mod error;
mod search;
mod server;

use anyhow::{Context, Result};
use std::env;
use std::sync::Arc;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use cache::{Catalog, CollectionKind, ImageCache, Phase};
use config::Config;
use drive::DriveClient;
use search::{CustomSearchClient, DisabledSearch, SharedSearch};
use server::AppState;

/// CLI command
#[derive(Debug)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Scan the Drive folders once and print what was found
    Scan,
    /// Show help
    Help,
}

fn print_help() {
    eprintln!(
        r#"Recipe Gallery - serve a Google Drive recipe and picture collection

USAGE:
    recipe-gallery              # Run HTTP server (default)
    recipe-gallery serve
    recipe-gallery scan
    recipe-gallery help

COMMANDS:
    serve   Run the HTTP server
    scan    Scan the Drive folders once, cache images and print counts
    help    Show this help message

ENVIRONMENT:
    PORT                   Listen port (default 3001)
    IMAGE_CACHE_DIR        Local image cache directory
    UPLOAD_DIR             Temp directory for uploads
    MAX_UPLOAD_BYTES       Upload body limit (default 52428800)
    DRIVE_ACCESS_TOKEN     Drive OAuth access token
    DRIVE_REFRESH_TOKEN    Drive OAuth refresh token (with DRIVE_CLIENT_ID
                           and DRIVE_CLIENT_SECRET)
    RECIPES_FOLDER_ID      Recipes root folder (default: folder named "Recipes")
    PICTURES_FOLDER_ID     Pictures root folder (default: folder named "Pictures")
    SEARCH_API_KEY         Custom Search API key (with SEARCH_ENGINE_ID)
    PAGE_SIZE              Items per page (default 10)
    SLIDESHOW_SIZE         Items per slideshow (default 5)
    SLIDESHOW_PAGING       first-page | sequential (default first-page)
    THUMBNAIL_SIZE         Thumbnail edge in pixels (default 200)
    RUST_LOG               Log level (trace, debug, info, warn, error)
"#
    );
}

fn parse_args() -> Command {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        return Command::Serve;
    }

    match args[1].as_str() {
        "serve" => Command::Serve,
        "scan" => Command::Scan,
        "help" | "--help" | "-h" => Command::Help,
        _ => {
            eprintln!("Unknown command: {}", args[1]);
            Command::Help
        }
    }
}

/// Wire the store, image cache and catalog from config
fn build_state(config: &Config) -> Result<Arc<AppState>> {
    if config.drive_access_token.is_empty() && config.drive_refresh.is_none() {
        warn!("No Drive credentials configured, remote calls will fail");
    }

    let store = Arc::new(DriveClient::new(
        config.drive_access_token.clone(),
        config.drive_refresh.clone(),
    )?);

    let images = Arc::new(
        ImageCache::with_config(
            config.image_cache_dir.clone(),
            store.clone(),
            config.thumbnail_size,
        )
        .context("Failed to create image cache")?,
    );

    let catalog = Arc::new(Catalog::new(
        store,
        images.clone(),
        config.recipes_folder_id.clone(),
        config.pictures_folder_id.clone(),
    ));

    let search: SharedSearch = match &config.search {
        Some((api_key, engine_id)) => Arc::new(CustomSearchClient::new(
            api_key.clone(),
            engine_id.clone(),
        )?),
        None => Arc::new(DisabledSearch),
    };

    Ok(Arc::new(AppState {
        catalog,
        images,
        search,
        pager: config.pager,
        upload_dir: config.upload_dir.clone(),
    }))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let log_level = env::var("RUST_LOG")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(Level::INFO);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let command = parse_args();
    if let Command::Help = command {
        print_help();
        return Ok(());
    }

    let config = Config::load()?;
    let state = build_state(&config)?;

    match command {
        Command::Serve => {
            info!(port = config.port, cache_dir = %config.image_cache_dir.display(), "Starting Recipe Gallery");
            if let Err(e) = server::serve(state, config.port, config.max_upload_bytes).await {
                error!(error = %e, "Server failed");
                return Err(e);
            }
            info!("Shutdown complete.");
        }
        Command::Scan => {
            state.catalog.initialize().await;
            if state.catalog.phase().await != Phase::Populated {
                anyhow::bail!("Scan failed, see log for details");
            }
            println!(
                "Recipes:  {}",
                state.catalog.len(CollectionKind::Recipes).await
            );
            println!(
                "Pictures: {}",
                state.catalog.len(CollectionKind::Pictures).await
            );
        }
        Command::Help => print_help(),
    }

    Ok(())
}
