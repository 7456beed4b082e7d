use std::process;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{Dispatch, Level, dispatcher, error, warn};
use tracing_subscriber::fmt as tracing_fmt;
use varco::{
    application::error::AppError,
    application::executor::QueryExecutor,
    config,
    infra::{
        db::PostgresExecutor,
        error::InfraError,
        http::{self, HandlerRegistry, SharedStores, SqlHandlerFactory},
        telemetry,
    },
};

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    if settings.server.grpc_addr.is_some() {
        warn!(target: "varco", "server.grpc is configured but gRPC serving is not supported, ignoring");
    }

    match cli_args.command {
        Some(config::Command::Serve(_)) | None => run_serve(settings).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let dsn = settings
        .storage
        .dsn
        .clone()
        .ok_or_else(|| InfraError::configuration("storage dsn is not configured"))
        .map_err(AppError::from)?;

    let executor = PostgresExecutor::connect(&dsn, settings.storage.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;
    let executor: Arc<dyn QueryExecutor> = Arc::new(executor);

    let registry = HandlerRegistry::new().with(Arc::new(SqlHandlerFactory::new(executor)));
    let stores = SharedStores::in_memory();

    let router = http::build_router(&settings, &registry, &stores)?;

    let cleanup = spawn_store_cleanup(stores);

    let result = http::serve(settings.server.http_addr, router)
        .await
        .map_err(AppError::from);

    cleanup.abort();
    let _ = cleanup.await;

    result
}

/// Periodic sweep reclaiming expired cache entries and rate buckets.
/// Correctness does not depend on it; reads already honour expiry.
fn spawn_store_cleanup(stores: SharedStores) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        interval.tick().await;
        loop {
            interval.tick().await;
            if let Err(err) = stores.cache.cleanup_expired().await {
                warn!(target: "varco", error = %err, "cache cleanup failed");
            }
            if let Err(err) = stores.rate_limit.cleanup_expired().await {
                warn!(target: "varco", error = %err, "rate limit cleanup failed");
            }
        }
    })
}
