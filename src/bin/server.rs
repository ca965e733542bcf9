use std::{net::SocketAddr, process::exit, time::Duration};

use axum::{
    Router,
    extract::{MatchedPath, Request},
};
use axum_server::Handle;
use clap::Parser;
use rusqlite::Connection;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use transactions_api::{AppState, PaginationConfig, UploadConfig, build_router, graceful_shutdown};

/// The REST API server for transaction records.
///
/// Every option can also be set with the environment variable named in its help.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// File path to the application SQLite database.
    #[arg(long, env = "DATABASE_PATH")]
    db_path: String,

    /// The address to serve the API from.
    #[arg(short, long, env = "APP_BIND_ADDRESS", default_value = "127.0.0.1:8000")]
    bind: SocketAddr,

    /// The number of transactions per page of the JSON list.
    #[arg(long, env = "APP_PAGE_SIZE", default_value_t = 30,
        value_parser = clap::value_parser!(u64).range(1..))]
    page_size: u64,

    /// The number of uploaded rows written to the database together.
    #[arg(long, env = "APP_UPLOAD_BATCH_SIZE", default_value_t = 1500,
        value_parser = clap::value_parser!(u64).range(1..))]
    batch_size: u64,

    /// The maximum size of an upload request in bytes.
    #[arg(long, env = "APP_MAX_UPLOAD_SIZE", default_value_t = 32 * 1024 * 1024)]
    max_upload_size: usize,

    /// The number of seconds open connections get to finish when shutting down.
    #[arg(long, env = "APP_SHUTDOWN_TIMEOUT", default_value_t = 5)]
    shutdown_timeout: u64,
}

#[tokio::main]
async fn main() {
    setup_logging();

    let args = Args::parse();

    let conn = match Connection::open(&args.db_path) {
        Ok(conn) => conn,
        Err(error) => {
            tracing::error!("Could not open database file {}: {error}", args.db_path);
            exit(1);
        }
    };

    let state = match AppState::new(
        conn,
        PaginationConfig {
            page_size: args.page_size,
        },
        UploadConfig {
            batch_size: args.batch_size as usize,
            max_upload_size: args.max_upload_size,
        },
    ) {
        Ok(state) => state,
        Err(error) => {
            tracing::error!("Could not initialize the database: {error}");
            exit(1);
        }
    };

    let handle = Handle::new();
    tokio::spawn(graceful_shutdown(
        handle.clone(),
        Duration::from_secs(args.shutdown_timeout),
    ));

    let router = add_tracing_layer(build_router(state));

    tracing::info!("HTTP server listening on {}", args.bind);
    if let Err(error) = axum_server::bind(args.bind)
        .handle(handle)
        .serve(router.into_make_service())
        .await
    {
        tracing::error!("Server stopped unexpectedly: {error}");
        exit(1);
    }

    tracing::info!("Server stopped.");
}

fn setup_logging() {
    let stdout_log = tracing_subscriber::fmt::layer().pretty();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(stdout_log)
        .init();
}

fn add_tracing_layer(router: Router) -> Router {
    let tracing_layer = TraceLayer::new_for_http()
        .make_span_with(|req: &Request| {
            let method = req.method();
            let uri = req.uri();

            let matched_path = req
                .extensions()
                .get::<MatchedPath>()
                .map(|matched_path| matched_path.as_str());

            tracing::debug_span!("request", %method, %uri, matched_path)
        })
        // By default, `TraceLayer` will log 5xx responses but we're doing our specific
        // logging of errors so disable that
        .on_failure(());

    router.layer(tracing_layer)
}
