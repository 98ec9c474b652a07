use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

mod api;
mod db;
mod error;
#[cfg(test)]
mod memory_store;
mod models;
mod refresh;
mod sentiment;
mod watchlist;

use db::{PgStore, SentimentStore};
use models::DateWindow;
use refresh::{RefreshLoop, SnapshotCell};

#[derive(Parser)]
#[command(name = "tweet-sentiment-monitor")]
#[command(about = "Normalized tweet sentiment for a watchlist of phrases", long_about = None)]
struct Cli {
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    database_url: String,

    #[arg(long, env = "DB_MAX_CONNECTIONS", default_value_t = 5)]
    max_connections: u32,

    #[command(flatten)]
    serve: ServeArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API and keep the snapshot fresh (default)
    Serve,
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Start watching a phrase
    AddPhrase { phrase: String },
    /// Stop watching a phrase
    RemovePhrase { phrase: String },
    /// Add phrases from a CSV file with a `phrase` column
    ImportPhrases {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Compute sentiment for one phrase over a DD-MM-YYYY date range
    Score {
        #[arg(long)]
        phrase: String,
        #[arg(long)]
        start: String,
        #[arg(long)]
        end: String,
    },
}

#[derive(Args)]
struct ServeArgs {
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0")]
    bind_addr: String,

    #[arg(long, env = "PORT", default_value_t = 3000)]
    port: u16,

    #[arg(long, env = "REFRESH_DELAY_MS", default_value_t = 1000)]
    refresh_delay_ms: u64,

    /// Directory of frontend files served for non-API paths
    #[arg(long, env = "STATIC_DIR")]
    static_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tweet_sentiment_monitor=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let store = PgStore::connect(&cli.database_url, cli.max_connections)
        .await
        .context("failed to connect to Postgres")?;
    info!("connection to Postgres established");

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(store, cli.serve).await?,
        Commands::InitDb => {
            store.init_db().await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            store.seed().await?;
            println!("Seed data inserted.");
        }
        Commands::AddPhrase { phrase } => {
            let outcome = watchlist::add_phrase(&store, &phrase).await?;
            println!("{phrase}: {outcome:?}");
        }
        Commands::RemovePhrase { phrase } => {
            let outcome = watchlist::remove_phrase(&store, &phrase).await?;
            println!("{phrase}: {outcome:?}");
        }
        Commands::ImportPhrases { csv } => {
            let file = std::fs::File::open(&csv)
                .with_context(|| format!("failed to open {}", csv.display()))?;
            let inserted = watchlist::import_phrases(&store, file).await?;
            println!("Added {inserted} phrases from {}.", csv.display());
        }
        Commands::Score { phrase, start, end } => {
            let window = DateWindow::days(api::parse_day(&start)?, api::parse_day(&end)?)
                .context("end date is before start date")?;
            let result = sentiment::compute_sentiment(&store, &phrase, window).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
    }

    Ok(())
}

async fn serve(store: PgStore, args: ServeArgs) -> anyhow::Result<()> {
    let bind_addr: SocketAddr = format!("{}:{}", args.bind_addr, args.port)
        .parse()
        .with_context(|| format!("invalid bind address {}:{}", args.bind_addr, args.port))?;

    let store: Arc<dyn SentimentStore> = Arc::new(store);
    let snapshot = Arc::new(SnapshotCell::default());
    let shutdown = CancellationToken::new();

    let refresh = RefreshLoop::new(
        store.clone(),
        snapshot.clone(),
        Duration::from_millis(args.refresh_delay_ms),
    );
    let refresh_handle = tokio::spawn(refresh.run(shutdown.clone()));

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("shutdown signal received");
                signal_token.cancel();
            }
            Err(e) => error!("failed to listen for shutdown signal: {}", e),
        }
    });

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    info!("server listening on http://{}", bind_addr);

    if let Some(dir) = &args.static_dir {
        info!("serving static files from {}", dir.display());
    }
    let app = api::router(api::AppState { store, snapshot }, args.static_dir);
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.clone().cancelled_owned())
        .await;

    shutdown.cancel();
    if let Err(e) = refresh_handle.await {
        error!("refresh loop task failed: {}", e);
    }
    served.context("server error")?;
    info!("server stopped");
    Ok(())
}
