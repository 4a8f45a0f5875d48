use anyhow::Context;
use cashout::fulfillment::GiftcardApiGateway;
use cashout::orchestration::{Collaborators, WithdrawalOrchestrator};
use cashout::{api, config::Config, db::init_db, Repository, SqliteLedger};
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    // Load configuration
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(config).await {
        eprintln!("Server error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    let port = config.port;

    // Initialize database and dependencies
    let pool = init_db(&config.database_path)
        .await
        .context("Failed to initialize database")?;

    let repo = Arc::new(Repository::new(pool.clone()));
    let ledger = Arc::new(SqliteLedger::new(pool.clone()));
    let gateway = GiftcardApiGateway::new(
        config.giftcard_api_url.clone(),
        config.giftcard_api_key.clone(),
        config.withdraw.fulfillment_timeout,
    )
    .context("Failed to build gift card client")?;

    let orchestrator = Arc::new(WithdrawalOrchestrator::new(
        Collaborators {
            standing: repo.clone(),
            earnings: repo.clone(),
            ledger,
            records: repo.clone(),
            fulfillment: Arc::new(gateway),
            notifications: repo.clone(),
        },
        config.withdraw.clone(),
    ));

    // Create router
    let app = api::create_router(api::AppState::new(repo, config, orchestrator));

    // Bind to address
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    tracing::info!("Server listening on {}", addr);

    // Run server
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Shutting down, closing database pool");
    pool.close().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}
