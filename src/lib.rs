//! Fetches pull request, issue and commit metadata for a fixed set of GitHub
//! repositories and cross-references contributors against a target geography.

pub mod cache;
pub mod commits;
pub mod config;
pub mod contributors;
pub mod fetcher;
pub mod geo;
pub mod github;
pub mod paging;
pub mod pipeline;
pub mod rate_limit;
pub mod report;
pub mod types;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initializes tracing (logging), honouring `RUST_LOG` when set.
pub fn init_tracing(default_directives: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_directives.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Resolves on Ctrl+C (or SIGTERM on unix).
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
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
}
