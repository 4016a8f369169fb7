//! Application entry point and server initialization
//!
//! This module contains the main function that:
//! - Loads environment configuration
//! - Initializes the database and the bootstrap admin
//! - Starts the HTTP server with graceful shutdown support

use std::error::Error;

use dotenvy::dotenv;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use cardfolio::config::Config;
use cardfolio::database::{init_db, AppState};
use cardfolio::route::create_app;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Load environment variables from .env file if it exists
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cardfolio=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;
    let db = init_db(&config.database_url)?;
    tracing::info!(database = %config.database_url, "database ready");

    let port = config.port;
    let admin = config.admin.clone();
    let state = AppState::new(db, config);

    if let Some(admin) = admin {
        let created = state
            .users
            .ensure_admin(&admin.username, &admin.email, &admin.password)
            .await?;
        if created {
            tracing::info!(username = %admin.username, "bootstrap admin created");
        }
    }

    let app = create_app(state).layer(TraceLayer::new_for_http());

    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("server running at http://localhost:{}", port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

/// Resolves on SIGINT (Ctrl+C) or, on Unix, SIGTERM
///
/// Lets in-flight requests and their transactions finish before exit.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received, stopping server");
}
