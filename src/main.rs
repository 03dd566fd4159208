//! drive-wallpapers — wallpaper gallery backed by a shared Google Drive folder.
//!
//! Category folders and their images are listed through the Drive REST API
//! and cached in SQLite. The cache is the read path: it is filled from Drive
//! when empty or on request, and it is the only place favourites live.

#![warn(clippy::all)]

mod cache;
mod cli;
mod config;
mod drive;
mod gallery;
mod shutdown;
mod types;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use cache::{CacheStore, Category, PictureRecord, SqliteCacheStore};
use cli::Command;
use config::Config;
use drive::DriveClient;
use gallery::{CacheView, Gallery, RefreshOutcome};

async fn open_cache(config: &Config) -> anyhow::Result<Arc<SqliteCacheStore>> {
    let store = SqliteCacheStore::open(&config.cache_db).await?;
    tracing::debug!(path = %store.path().display(), "Opened cache");
    Ok(Arc::new(store))
}

async fn open_gallery(config: &Config) -> anyhow::Result<(Arc<Gallery>, Arc<SqliteCacheStore>)> {
    let remote = config.remote()?;
    let client = DriveClient::new(
        Box::new(reqwest::Client::new()),
        remote.api_base_url,
        remote.api_key,
        remote.root_folder_id,
    )
    .with_page_size(remote.page_size);

    let cache = open_cache(config).await?;
    let gallery = Arc::new(Gallery::new(Arc::new(client), cache.clone()));
    Ok((gallery, cache))
}

fn report(outcome: RefreshOutcome) {
    match outcome {
        RefreshOutcome::Refreshed { count } => tracing::info!(count, "Cache refreshed"),
        RefreshOutcome::RemoteUnavailable => {
            eprintln!("Drive is unreachable, showing cached data.");
        }
    }
}

fn print_categories(categories: &[Category]) {
    if categories.is_empty() {
        println!("No categories.");
        return;
    }
    for c in categories {
        println!("{}\t{}\t{}", c.id, c.name, c.background_id);
    }
}

fn print_pictures(pictures: &[PictureRecord]) {
    if pictures.is_empty() {
        println!("No pictures.");
        return;
    }
    for p in pictures {
        let mark = if p.is_favourite { "*" } else { " " };
        println!("{} {}\t{}\t{}", mark, p.id, p.category_id, p.name);
    }
}

/// Run the categories command.
async fn run_categories(config: &Config, refresh: bool) -> anyhow::Result<()> {
    let (gallery, cache) = open_gallery(config).await?;

    let mut categories = cache.categories().await?;
    if refresh || categories.is_empty() {
        report(gallery.refresh_categories().await?);
        categories = cache.categories().await?;
    }

    print_categories(&categories);
    Ok(())
}

/// Run the pictures command.
async fn run_pictures(config: &Config, category_id: &str, refresh: bool) -> anyhow::Result<()> {
    let (gallery, cache) = open_gallery(config).await?;

    let mut pictures = cache.pictures(category_id).await?;
    if refresh || pictures.is_empty() {
        report(gallery.refresh_pictures(category_id).await?);
        pictures = cache.pictures(category_id).await?;
    }

    print_pictures(&pictures);
    Ok(())
}

/// Run the favourites command.
async fn run_favourites(config: &Config) -> anyhow::Result<()> {
    let cache = open_cache(config).await?;
    print_pictures(&cache.favourites().await?);
    Ok(())
}

/// Run the toggle command.
async fn run_toggle(config: &Config, picture_id: &str) -> anyhow::Result<()> {
    let (gallery, _cache) = open_gallery(config).await?;
    let picture = gallery.toggle_favourite(picture_id).await?;
    if picture.is_favourite {
        println!("{} added to favourites.", picture.id);
    } else {
        println!("{} removed from favourites.", picture.id);
    }
    Ok(())
}

/// Run the fetch command.
async fn run_fetch(config: &Config, image_id: &str, output: &Path) -> anyhow::Result<()> {
    let (gallery, _cache) = open_gallery(config).await?;

    let Some(image) = gallery.fetch_image(image_id).await else {
        anyhow::bail!("Image {} is not available", image_id);
    };

    tokio::fs::write(output, &image.bytes).await?;
    println!(
        "Saved {} ({:?}, {}x{}, {} bytes) to {}",
        image_id,
        image.format,
        image.width,
        image.height,
        image.bytes.len(),
        output.display()
    );
    Ok(())
}

/// Run the status command.
async fn run_status(config: &Config) -> anyhow::Result<()> {
    if !config.cache_db.exists() {
        println!("No cache database found at {}", config.cache_db.display());
        return Ok(());
    }

    let cache = open_cache(config).await?;
    let summary = cache.summary().await?;

    println!("Cache database: {}", config.cache_db.display());
    println!("  Schema:     v{}", summary.schema_version);
    println!("  Categories: {}", summary.categories);
    println!("  Pictures:   {}", summary.pictures);
    println!("  Favourites: {}", summary.favourites);
    Ok(())
}

/// Print every snapshot of `view` until it ends or `token` is cancelled.
async fn follow<T>(mut view: CacheView<T>, token: CancellationToken, render: fn(&[T])) {
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            next = view.next() => match next {
                Some(Ok(rows)) => {
                    render(&rows);
                    println!();
                }
                Some(Err(e)) => tracing::warn!(error = %e, "Failed to read cache snapshot"),
                None => break,
            },
        }
    }
}

/// Run the watch command.
async fn run_watch(
    config: &Config,
    category_id: Option<&str>,
    favourites: bool,
) -> anyhow::Result<()> {
    let (gallery, _cache) = open_gallery(config).await?;
    let token = shutdown::install_signal_handler();

    match category_id {
        _ if favourites => follow(gallery.watch_favourites(), token, print_pictures).await,
        Some(id) => follow(gallery.watch_pictures(id), token, print_pictures).await,
        None => follow(gallery.watch_categories(), token, print_categories).await,
    }
    Ok(())
}

/// SQLite's journal files sit next to the database with `suffix` appended
/// to the full file name.
fn sidecar_path(db_path: &Path, suffix: &str) -> PathBuf {
    let mut name = db_path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Run the clear-cache command.
async fn run_clear_cache(config: &Config, yes: bool) -> anyhow::Result<()> {
    let db_path = &config.cache_db;

    if !db_path.exists() {
        println!("No cache database found at {}", db_path.display());
        return Ok(());
    }

    if !yes {
        println!("This will delete the cache database, including favourites:");
        println!("  {}", db_path.display());
        println!();
        print!("Are you sure? [y/N] ");
        use std::io::Write;
        std::io::stdout().flush()?;

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;
        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Cancelled.");
            return Ok(());
        }
    }

    std::fs::remove_file(db_path)?;
    for suffix in ["-wal", "-shm"] {
        let _ = std::fs::remove_file(sidecar_path(db_path, suffix));
    }
    println!("Cache database deleted.");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();
    let config = Config::from_cli(&cli)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_filter())),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!(?config, "Starting");

    match cli.command {
        Command::Categories { refresh } => run_categories(&config, refresh).await,
        Command::Pictures {
            category_id,
            refresh,
        } => run_pictures(&config, &category_id, refresh).await,
        Command::Favourites => run_favourites(&config).await,
        Command::Toggle { picture_id } => run_toggle(&config, &picture_id).await,
        Command::Fetch { image_id, output } => run_fetch(&config, &image_id, &output).await,
        Command::Status => run_status(&config).await,
        Command::Watch {
            category_id,
            favourites,
        } => run_watch(&config, category_id.as_deref(), favourites).await,
        Command::ClearCache { yes } => run_clear_cache(&config, yes).await,
    }
}
