use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use dotenv::dotenv;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{self, TraceLayer};
use tracing::{info, warn, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod router;

use appointment_cell::services::ReminderScheduler;
use appointment_cell::AppointmentState;
use lab_test_cell::LabTestState;
use notification_cell::Notifier;
use shared_config::{AppConfig, StorageBackend};
use shared_database::directory::{Directory, InMemoryDirectory, SupabaseDirectory};
use shared_database::storage::{BlobStore, InMemoryBlobStore, SupabaseBlobStore};
use shared_database::supabase::SupabaseClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Loading Env Vars
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Health Consultation booking API");

    let config = Arc::new(AppConfig::from_env());
    let supabase = Arc::new(SupabaseClient::new(&config));

    let (directory, blobs): (Arc<dyn Directory>, Arc<dyn BlobStore>) = match config.storage_backend {
        StorageBackend::Supabase => (
            Arc::new(SupabaseDirectory::new(supabase.clone())),
            Arc::new(SupabaseBlobStore::new(supabase.clone())),
        ),
        StorageBackend::Memory => {
            warn!("STORAGE_BACKEND=memory, all data is lost on restart");
            (Arc::new(InMemoryDirectory::new()), Arc::new(InMemoryBlobStore::new()))
        }
    };
    let notifier = Notifier::from_config(&config, supabase.clone());

    let appointments = Arc::new(AppointmentState::new(
        config.clone(),
        AppointmentState::repository_for(&config, supabase.clone()),
        directory.clone(),
        blobs.clone(),
        notifier.clone(),
    ));
    let labs = Arc::new(LabTestState::new(
        config.clone(),
        LabTestState::repository_for(&config, supabase),
        directory,
        blobs,
        notifier,
    ));

    let scheduler = ReminderScheduler::start(appointments.reconciler.clone());

    // Set up CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = router::create_router(appointments, labs)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new().level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("HTTP server stopped, stopping reminder scheduler");
    scheduler.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Could not listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
