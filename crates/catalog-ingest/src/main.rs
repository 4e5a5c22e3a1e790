//! Catalog Ingest - product catalog scraping and sync tool
//!
//! Every command prints its report as JSON on stdout; logs go to stderr
//! and/or log files, so the output can be piped straight into `jq`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use catalog_common::logging::{init_logging, LogConfig, LogLevel};
use catalog_common::snapshot::{read_snapshot, write_snapshot, CatalogAudit};
use catalog_ingest::config::{governor_from_lookup, DatabaseConfig, IngestConfig, SyncConfig};
use catalog_ingest::fetch::html_catalog::{DEFAULT_HTML_MAX_PAGES, DEFAULT_PAGE_PARAM};
use catalog_ingest::fetch::{
    build_http_client, HtmlCatalogConfig, HtmlCatalogSource, PageSource, Paginator, SearchApiConfig,
    SearchApiSource,
};
use catalog_ingest::governor::RateGovernor;
use catalog_ingest::migrate::migrate_bucket;
use catalog_ingest::pipeline::{load_snapshot, Pipeline};
use catalog_ingest::relocate::AssetRelocator;
use catalog_ingest::storage::{S3BlobStore, StorageConfig};
use catalog_ingest::store::PgCatalogStore;
use catalog_ingest::sync::BatchSynchronizer;
use catalog_ingest::transform::TransformDefaults;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "catalog-ingest")]
#[command(author, version, about = "Product catalog scraping and sync tool")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scrape a JSON search API
    Search {
        #[command(flatten)]
        brand: BrandArgs,

        /// Filter by category instead of by brand
        #[arg(long)]
        category: Option<String>,

        /// Sort order sent to the API
        #[arg(long, default_value = "views:desc")]
        sort: String,

        /// Page size sent as hitsPerPage
        #[arg(long)]
        hits_per_page: Option<u32>,

        /// Referer header sent with every request
        #[arg(long)]
        referer: Option<String>,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Scrape an HTML catalog listing
    Html {
        #[command(flatten)]
        brand: BrandArgs,

        /// Listing page URL
        #[arg(long)]
        list_url: String,

        /// Base URL for relative image paths
        #[arg(long)]
        asset_base_url: String,

        /// Category id sent with every listing request
        #[arg(long)]
        category: Option<String>,

        /// Query parameter carrying the category id
        #[arg(long, default_value = "ps_ctid")]
        category_param: String,

        /// Query parameter carrying the page number
        #[arg(long, default_value = DEFAULT_PAGE_PARAM)]
        page_param: String,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Upsert the records of a snapshot file
    Load {
        /// Snapshot JSON file
        path: PathBuf,
    },

    /// Report data-quality gaps in a snapshot file
    Verify {
        /// Snapshot JSON file
        path: PathBuf,
    },

    /// Copy every object under a prefix from one bucket to another
    MigrateBucket {
        #[arg(long)]
        from: String,

        #[arg(long)]
        to: String,

        #[arg(long, default_value = "")]
        prefix: String,
    },
}

#[derive(Args, Debug)]
struct BrandArgs {
    /// Brand name used as default brand and facet filter
    #[arg(long)]
    brand: String,

    /// URL-safe brand prefix for slugs and storage paths
    #[arg(long)]
    brand_slug: Option<String>,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Page cap for this run
    #[arg(long)]
    max_pages: Option<u32>,

    /// Also write the synchronized records to this JSON file
    #[arg(long)]
    snapshot: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();

    let mut log_config = LogConfig::from_env().context("Invalid logging configuration")?;
    if cli.verbose {
        log_config.level = LogLevel::Debug;
    }
    if std::env::var("LOG_FILE_PREFIX").is_err() {
        log_config.log_file_prefix = "catalog-ingest".to_string();
    }
    let _log_guard = init_logging(&log_config)?;

    let cancel = CancellationToken::new();
    spawn_ctrl_c_handler(cancel.clone());

    match cli.command {
        Command::Search {
            brand,
            category,
            sort,
            hits_per_page,
            referer,
            run,
        } => {
            let config = IngestConfig::from_env().context("Invalid configuration")?;
            let client = build_http_client(config.http.timeout, &config.http.user_agent)?;

            let mut query = match &category {
                Some(category) => SearchApiConfig::for_category(&config.search_endpoint, category),
                None => SearchApiConfig::for_brand(&config.search_endpoint, &brand.brand),
            }
            .with_sort(sort);
            if let Some(hits_per_page) = hits_per_page {
                query = query.with_hits_per_page(hits_per_page);
            }
            if let Some(referer) = referer {
                query = query.with_referer(referer);
            }

            info!(brand = %brand.brand, category = ?category, "Scraping search API");
            let source = SearchApiSource::new(client.clone(), query);
            run_pipeline(source, client, &config, &brand, &run, None, &cancel).await?;
        },
        Command::Html {
            brand,
            list_url,
            asset_base_url,
            category,
            category_param,
            page_param,
            run,
        } => {
            let config = IngestConfig::from_env().context("Invalid configuration")?;
            let client = build_http_client(config.http.timeout, &config.http.user_agent)?;

            let mut listing = HtmlCatalogConfig::new(list_url, asset_base_url);
            listing.page_param = page_param;
            if let Some(category) = category {
                listing = listing.with_param(category_param, category);
            }

            info!(brand = %brand.brand, list_url = %listing.list_url, "Scraping HTML catalog");
            let source = HtmlCatalogSource::new(client.clone(), listing)?;
            run_pipeline(
                source,
                client,
                &config,
                &brand,
                &run,
                Some(DEFAULT_HTML_MAX_PAGES),
                &cancel,
            )
            .await?;
        },
        Command::Load { path } => {
            let lookup = |key: &str| std::env::var(key).ok();
            let database = DatabaseConfig::from_lookup(lookup)?;
            let sync = SyncConfig::from_lookup(lookup)?;

            let store = connect_store(&database).await?;
            let mut synchronizer = BatchSynchronizer::new(store)
                .with_batch_size(sync.batch_size)
                .with_batch_pause(sync.batch_pause);

            let report = load_snapshot(&path, &mut synchronizer, &cancel)
                .await
                .with_context(|| format!("Failed to load snapshot {}", path.display()))?;
            print_json(&report)?;
        },
        Command::Verify { path } => {
            let records = read_snapshot(&path)
                .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
            let audit = CatalogAudit::from_records(&records);

            if audit.is_clean() {
                info!(total = audit.total, "Snapshot is complete");
            } else {
                warn!(
                    total = audit.total,
                    duplicate_slugs = audit.duplicate_slugs.len(),
                    "Snapshot has gaps"
                );
            }
            print_json(&audit)?;
        },
        Command::MigrateBucket { from, to, prefix } => {
            let lookup = |key: &str| std::env::var(key).ok();
            let storage = StorageConfig::from_lookup(lookup)?;
            let governor = RateGovernor::new(governor_from_lookup(lookup)?);
            let store = S3BlobStore::new(&storage);

            let report = migrate_bucket(&store, &governor, &from, &to, &prefix, &cancel).await?;
            print_json(&report)?;
        },
    }

    Ok(())
}

/// Wire a source into the full pipeline and run it to completion
async fn run_pipeline<S: PageSource>(
    source: S,
    client: reqwest::Client,
    config: &IngestConfig,
    brand: &BrandArgs,
    run: &RunArgs,
    source_max_pages: Option<u32>,
    cancel: &CancellationToken,
) -> Result<()> {
    let defaults = TransformDefaults::new(&brand.brand, brand.brand_slug.as_deref())?;
    let governor = Arc::new(RateGovernor::new(config.governor.clone()));

    let mut policy = config.fetch;
    if let Some(max_pages) = run.max_pages.or(source_max_pages) {
        policy = policy.with_max_pages(max_pages);
    }
    let paginator = Paginator::new(source, policy, Arc::clone(&governor));

    let blobs = Arc::new(S3BlobStore::new(&config.storage));
    let relocator = AssetRelocator::new(client, blobs, &config.storage.bucket, governor);

    let store = connect_store(&config.database).await?;
    let synchronizer = BatchSynchronizer::new(store)
        .with_batch_size(config.sync.batch_size)
        .with_batch_pause(config.sync.batch_pause);

    let output = Pipeline::new(paginator, defaults, relocator, synchronizer)
        .with_relocation_workers(config.sync.relocation_workers)
        .collect_records(run.snapshot.is_some())
        .run(cancel)
        .await;

    if let Some(path) = &run.snapshot {
        write_snapshot(path, &output.records)
            .with_context(|| format!("Failed to write snapshot {}", path.display()))?;
    }

    print_json(&output.report)
}

async fn connect_store(database: &DatabaseConfig) -> Result<PgCatalogStore> {
    let store = PgCatalogStore::connect(&database.url, database.max_connections, database.timeout)
        .await
        .context("Failed to connect to catalog database")?;
    store.migrate().await?;
    Ok(store)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn spawn_ctrl_c_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing current step before stopping");
            cancel.cancel();
        }
    });
}
