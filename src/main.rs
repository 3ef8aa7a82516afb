use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use bloghub::config::Config;
use bloghub::crawl::{CrawlBatchResult, CrawlEvent, Crawler};
use bloghub::feed::{self, HttpFeedSource};
use bloghub::storage::{Database, DatabaseError};
use bloghub::util::{display_width, truncate_to_width};

/// Get the config directory path (~/.config/bloghub/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("bloghub"))
}

#[derive(Parser, Debug)]
#[command(
    name = "bloghub",
    version,
    about = "Crawl registered blog feeds into a local article store"
)]
struct Args {
    /// Config file (default: ~/.config/bloghub/config.toml)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Database file, overrides `database_path` from the config
    #[arg(long, global = true, value_name = "FILE")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Crawl every registered feed once
    Crawl {
        /// Maximum feeds fetched at the same time
        #[arg(long, value_name = "N")]
        concurrency: Option<NonZeroUsize>,

        /// Print the run summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Register a blog feed
    Add {
        feed_url: String,
        #[arg(long)]
        author: String,
        /// Blog home page
        #[arg(long, value_name = "URL")]
        site: Option<String>,
    },
    /// Unregister a blog feed (collected articles are kept)
    Remove { feed_url: String },
    /// List registered blogs
    Blogs,
    /// Register every feed in an OPML subscription list
    Import { file: PathBuf },
    /// Show the most recent articles
    Articles {
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so `crawl --json` output stays machine-readable
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let mut config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    config
        .apply_env(|key| std::env::var(key).ok())
        .context("Invalid environment override")?;

    let db_path = args
        .db
        .clone()
        .or_else(|| config.database_path.clone())
        .unwrap_or_else(|| config_dir.join("bloghub.db"));
    let db = open_database(&db_path).await?;

    match args.command {
        Command::Crawl { concurrency, json } => {
            if let Some(n) = concurrency {
                config.fetch_concurrency = n.get();
            }
            crawl(&db, &config, json).await
        }
        Command::Add {
            feed_url,
            author,
            site,
        } => {
            let blog = db
                .add_blog(&author, &feed_url, site.as_deref())
                .await
                .context("Failed to register blog")?;
            println!("Registered {} ({})", blog.author, blog.feed_url);
            Ok(())
        }
        Command::Remove { feed_url } => {
            if db.remove_blog(&feed_url).await? {
                println!("Removed {}", feed_url);
            } else {
                println!("No blog registered for {}", feed_url);
            }
            Ok(())
        }
        Command::Blogs => list_blogs(&db).await,
        Command::Import { file } => import_opml(&db, &file).await,
        Command::Articles { limit } => list_articles(&db, limit).await,
    }
}

async fn open_database(path: &Path) -> Result<Database> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if !parent.exists() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create database directory {}", parent.display())
            })?;
            // SEC-007: user-only access to the directory holding the database
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let perms = std::fs::Permissions::from_mode(0o700);
                if let Err(e) = std::fs::set_permissions(parent, perms) {
                    tracing::warn!(
                        path = %parent.display(),
                        error = %e,
                        "Failed to set database directory permissions to 0700"
                    );
                }
            }
        }
    }

    let path_str = path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    match Database::open(path_str).await {
        Ok(db) => Ok(db),
        Err(DatabaseError::InstanceLocked) => {
            anyhow::bail!("{}", DatabaseError::InstanceLocked)
        }
        Err(e) => Err(anyhow::anyhow!("Failed to open database: {}", e)),
    }
}

async fn crawl(db: &Database, config: &Config, json: bool) -> Result<()> {
    let source = HttpFeedSource::from_config(config).context("Failed to build HTTP client")?;
    let store = Arc::new(db.clone());

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, letting in-flight feeds settle");
            interrupt.cancel();
        }
    });

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let progress = tokio::spawn(print_progress(event_rx, !json));

    let crawler = Crawler::new(Arc::new(source), store)
        .with_events(event_tx)
        .with_cancellation(cancel);
    let result = crawler.crawl_registry(db, config.concurrency()).await;

    // Dropping the crawler closes the event channel so the printer finishes
    drop(crawler);
    if let Err(e) = progress.await {
        tracing::debug!(error = %e, "Progress printer ended abnormally");
    }

    let batch = result.context("Failed to read the blog registry")?;
    if json {
        println!("{}", serde_json::to_string_pretty(&batch.summary())?);
    } else {
        print_summary(&batch);
    }
    Ok(())
}

async fn print_progress(mut rx: mpsc::UnboundedReceiver<CrawlEvent>, enabled: bool) {
    let mut total = 0;
    let mut done = 0;
    while let Some(event) = rx.recv().await {
        if !enabled {
            continue;
        }
        match event {
            CrawlEvent::RunStarted { feeds } => total = feeds,
            CrawlEvent::FeedSucceeded {
                endpoint,
                articles,
                created,
            } => {
                done += 1;
                eprintln!(
                    "[{done}/{total}] ok   {endpoint} ({articles} articles, {created} new)"
                );
            }
            CrawlEvent::FeedFailed { endpoint, reason } => {
                done += 1;
                eprintln!("[{done}/{total}] FAIL {endpoint}: {reason}");
            }
            CrawlEvent::FeedStarted { .. } | CrawlEvent::RunFinished { .. } => {}
        }
    }
}

fn print_summary(batch: &CrawlBatchResult) {
    let summary = batch.summary();
    println!(
        "Crawled {} feeds: {} succeeded, {} failed; {} new articles, {} updated",
        summary.feeds,
        summary.succeeded,
        summary.failed,
        summary.articles_created,
        summary.articles_updated
    );
    for failure in &summary.failures {
        println!("  {}: {}", failure.feed, failure.reason);
    }
}

async fn list_blogs(db: &Database) -> Result<()> {
    let blogs = db.list_blogs().await.context("Failed to load blogs")?;
    if blogs.is_empty() {
        println!("No blogs registered. Add one with `bloghub add <FEED_URL> --author NAME`.");
        return Ok(());
    }

    const AUTHOR_WIDTH: usize = 24;
    for blog in &blogs {
        let author = truncate_to_width(&blog.author, AUTHOR_WIDTH);
        let pad = AUTHOR_WIDTH.saturating_sub(display_width(&author));
        println!("{:>4}  {}{}  {}", blog.id, author, " ".repeat(pad), blog.feed_url);
    }
    Ok(())
}

async fn import_opml(db: &Database, file: &Path) -> Result<()> {
    // SEC-008: Canonicalize to resolve symlinks, then require a regular file
    let canonical = file
        .canonicalize()
        .with_context(|| format!("Failed to resolve import file: {}", file.display()))?;
    if !std::fs::metadata(&canonical)?.is_file() {
        anyhow::bail!("Import path must be a regular file");
    }
    let path_str = canonical
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in OPML path"))?;

    let blogs = feed::parse(path_str)
        .await
        .context("Failed to parse OPML file")?;
    if blogs.is_empty() {
        eprintln!("Warning: No valid feeds found in OPML file");
        return Ok(());
    }

    let count = db.sync_blogs(&blogs).await.context("Failed to sync blogs")?;
    println!("Imported {} blogs from {}", count, canonical.display());
    Ok(())
}

async fn list_articles(db: &Database, limit: i64) -> Result<()> {
    let articles = db
        .recent_articles(limit)
        .await
        .context("Failed to load articles")?;
    let total = db.article_count().await?;

    const TITLE_WIDTH: usize = 60;
    for article in &articles {
        let date = article
            .published
            .and_then(|ts| chrono::DateTime::from_timestamp(ts, 0))
            .map(|dt| dt.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "----------".to_string());
        println!(
            "{}  {}  {}",
            article.slug,
            date,
            truncate_to_width(&article.title, TITLE_WIDTH)
        );
    }
    println!("Showing {} of {} articles", articles.len(), total);
    Ok(())
}
