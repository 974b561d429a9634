use rmcp::transport::sse_server::{SseServer, SseServerConfig};
use std::{env, sync::Arc};
use tracing_subscriber::{
    layer::SubscriberExt,
    util::SubscriberInitExt,
    {self},
};

pub mod dataset;
pub mod duckdb;
pub mod error;
pub mod filter;
pub mod oracle;
pub mod orchestrator;
pub mod sanitize;
pub mod table;
pub mod tool;

use dataset::TableSource;

pub const DEFAULT_PORT: &str = "8000";

/// Log to stderr, filtered by `RUST_LOG` or `default_level`.
pub fn init_tracing(default_level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_level.to_string().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Expose the company search as an MCP tool over SSE until ctrl-c.
pub async fn serve(source: Arc<dyn TableSource>) -> anyhow::Result<()> {
    let port = env::var("PORT").unwrap_or_else(|_| DEFAULT_PORT.to_string());
    let bind_address = format!("0.0.0.0:{}", port);

    tracing::info!("Attempting to bind to: {}", bind_address);

    let config = SseServerConfig {
        bind: bind_address.parse()?,
        sse_path: "/sse".to_string(),
        post_path: "/message".to_string(),
        ct: tokio_util::sync::CancellationToken::new(),
        sse_keep_alive: None,
    };

    let (sse_server, router) = SseServer::new(config);

    let listener = tokio::net::TcpListener::bind(sse_server.config.bind).await?;

    tracing::info!("Successfully bound to: {}, server ready for connections", sse_server.config.bind);

    let ct = sse_server.config.ct.child_token();

    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        ct.cancelled().await;
        tracing::info!("sse server cancelled");
    });

    tokio::spawn(async move {
        if let Err(e) = server.await {
            tracing::error!(error=%e, "sse server shutdown with error");
        }
    });

    let ct = sse_server.with_service(move || tool::CompanySearchTool::new(source.clone()));

    tokio::signal::ctrl_c().await?;
    ct.cancel();
    Ok(())
}
