use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use ledgerscan_core::jobs::{FsJobStore, JobOrchestrator};
use ledgerscan_core::roles::ROLE_ADMIN;
use ledgerscan_core::runner::ProcessRunner;
use ledgerscan_core::supervisor::{LlmServerSupervisor, ProcfsTable};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ledgerscan_api::config::ServerConfig;
use ledgerscan_api::engine::job_queue;
use ledgerscan_api::router::build_app_router;
use ledgerscan_api::state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "ledgerscan_api=debug,ledgerscan_core=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = ledgerscan_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    ledgerscan_db::health_check(&pool)
        .await
        .expect("Database health check failed");

    ledgerscan_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    if let Some(admin) = &config.bootstrap_admin {
        ledgerscan_api::bootstrap::ensure_admin(&pool, admin)
            .await
            .expect("Failed to create bootstrap admin");
    }
    match ledgerscan_db::repositories::UserRepo::exists_with_role(&pool, ROLE_ADMIN).await {
        Ok(true) => {}
        Ok(false) => tracing::warn!(
            "No admin account exists; set BOOTSTRAP_ADMIN_USERNAME and BOOTSTRAP_ADMIN_PASSWORD"
        ),
        Err(e) => tracing::warn!(error = %e, "Could not check for an admin account"),
    }

    // --- Job store and pipeline ---
    let store = Arc::new(FsJobStore::new(&config.ocr.results_dir));
    store.init().await.expect("Failed to create OCR results directory");
    tracing::info!(dir = %store.dir().display(), "Job store ready");

    let steps = config
        .ocr
        .pipeline_steps()
        .expect("OCR_META_COMMAND and OCR_TX_COMMAND must be valid command lines");
    let orchestrator = Arc::new(JobOrchestrator::new(
        ProcessRunner,
        Arc::clone(&store),
        steps,
    ));

    let (jobs, dispatcher) = job_queue(orchestrator);
    let dispatcher_cancel = CancellationToken::new();
    let dispatcher_handle = tokio::spawn(dispatcher.run(dispatcher_cancel.clone()));

    // --- LLM server supervisor ---
    let supervisor = Arc::new(LlmServerSupervisor::new(
        config.llm.supervisor_settings(),
        config.llm.launch_spec(),
        ProcfsTable::default(),
    ));
    tracing::info!(url = %config.llm.url, "LLM server supervisor ready");

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .build()
        .expect("Failed to build HTTP client");

    // --- App state ---
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        jobs,
        store,
        supervisor,
        http,
    };

    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    // In-flight OCR jobs run to completion, bounded by the shutdown timeout.
    dispatcher_cancel.cancel();
    let drain = Duration::from_secs(config.shutdown_timeout_secs);
    if tokio::time::timeout(drain, dispatcher_handle).await.is_err() {
        tracing::warn!(
            timeout_secs = config.shutdown_timeout_secs,
            "OCR jobs still running at shutdown; they will be left pending"
        );
    }

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
