// src/main.rs
use anyhow::{Context, Result};
use hyper::{header::CONTENT_TYPE, Body, Request, Response, StatusCode};
use std::sync::Arc;
use tokio::io::{copy, split};
use tokio::signal;
use tracing::{debug, error, info, warn};

use webterm_server::{
    config::{self, AppConfig},
    create_application,
    metrics::MetricsRegistry,
    resolve_address,
    router::{switching_protocols, text_response, upgrade::requested_protocol, SurfaceError},
    ListenTarget,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("webterm_server=debug".parse()?)
                .add_directive("hyper=info".parse()?),
        )
        .init();

    // Load configuration
    let config = match std::env::args().nth(1) {
        Some(path) => {
            info!("Loading configuration from: {}", path);
            config::load_config(&path).await?
        }
        None => {
            let config = config::with_env_overrides(AppConfig::default())?;
            config.validate()?;
            config
        }
    };

    let (app, ws_app, server) = create_application(&config)?;

    app.get("/healthz", |_req: Request<Body>| async {
        Ok::<_, SurfaceError>(Response::new(Body::from("OK")))
    });

    if config.metrics.enabled {
        let registry = Arc::new(MetricsRegistry::new()?);
        server.attach_metrics(registry.collector());
        app.get(config.metrics.path.clone(), move |_req: Request<Body>| {
            let registry = registry.clone();
            async move {
                let metrics = registry
                    .gather()
                    .map_err(|e| SurfaceError::Handler(e.to_string()))?;
                let mut response = Response::new(Body::from(metrics));
                response.headers_mut().insert(
                    CONTENT_TYPE,
                    hyper::header::HeaderValue::from_static("text/plain; version=0.0.4"),
                );
                Ok::<_, SurfaceError>(response)
            }
        });
    }

    // Raw echo over any upgraded connection.
    ws_app.fallback(|mut req: Request<Body>| async move {
        let Some(protocol) = requested_protocol(&req).cloned() else {
            return Ok(text_response(StatusCode::BAD_REQUEST, "Missing Upgrade header"));
        };

        let on_upgrade = hyper::upgrade::on(&mut req);
        tokio::spawn(async move {
            match on_upgrade.await {
                Ok(upgraded) => {
                    let (mut reader, mut writer) = split(upgraded);
                    if let Err(e) = copy(&mut reader, &mut writer).await {
                        debug!("Upgraded connection ended: {}", e);
                    }
                }
                Err(e) => warn!("Upgrade failed: {}", e),
            }
        });

        Ok::<_, SurfaceError>(switching_protocols(protocol))
    });

    let target = ListenTarget::from_config(&config)?;
    server
        .listen(&target)
        .await
        .with_context(|| format!("Failed to listen on {}", target))?;

    info!("HTTP server listening on {}", resolve_address(&server)?);

    shutdown_signal().await;

    if let Err(e) = server.close().await {
        error!("Failed to close listener: {}", e);
    }

    Ok(())
}

// Graceful shutdown handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
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

    info!("Shutdown signal received");
}
