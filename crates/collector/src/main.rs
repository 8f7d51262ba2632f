//! `centinela-collector` -- edge syslog collector binary.
//!
//! Receives syslog on UDP/TCP, buffers in memory, and forwards batches to
//! the cloud ingestion API. See [`centinela_collector::config`] for the
//! full environment variable table.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use centinela_collector::buffer::EventBuffer;
use centinela_collector::config::CollectorConfig;
use centinela_collector::flush::Flusher;
use centinela_collector::forward::HttpForwarder;
use centinela_collector::health::{self, HealthState};
use centinela_collector::metrics::MetricsRegistry;
use centinela_collector::retry::RetryQueue;
use centinela_collector::{tcp, udp};

/// Upper bound on the shutdown drain.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let config = match CollectorConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("centinela-collector: configuration error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("centinela_collector={}", config.log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        collector_name = %config.collector_name,
        api_url = %config.api_url,
        udp_enabled = config.udp_enabled,
        tcp_enabled = config.tcp_enabled,
        "Starting centinela-collector"
    );

    let metrics = Arc::new(MetricsRegistry::new());
    let buffer = Arc::new(EventBuffer::new(config.max_buffer_size));
    let retry = Arc::new(RetryQueue::new(
        config.max_retries,
        config.retry_base_delay_ms,
        config.retry_max_delay_ms,
        Arc::clone(&metrics),
    ));
    let forwarder = Arc::new(HttpForwarder::new(&config));
    let flusher = Arc::new(Flusher::new(
        Arc::clone(&buffer),
        Arc::clone(&retry),
        Arc::clone(&forwarder),
        Arc::clone(&metrics),
        config.batch_size,
    ));

    let cancel = CancellationToken::new();
    let mut handles = Vec::new();

    // --- UDP server ---
    if config.udp_enabled {
        let addr = format!("{}:{}", config.udp_bind, config.udp_port);
        let socket = match tokio::net::UdpSocket::bind(&addr).await {
            Ok(socket) => socket,
            Err(e) => {
                tracing::error!(error = %e, addr = %addr, "Failed to bind UDP socket");
                std::process::exit(1);
            }
        };
        handles.push(tokio::spawn(udp::run(
            socket,
            Arc::clone(&buffer),
            Arc::clone(&metrics),
            cancel.clone(),
        )));
    } else {
        tracing::info!("UDP server disabled");
    }

    // --- TCP server ---
    if config.tcp_enabled {
        let addr = format!("{}:{}", config.tcp_bind, config.tcp_port);
        let listener = match tokio::net::TcpListener::bind(&addr).await {
            Ok(listener) => listener,
            Err(e) => {
                tracing::error!(error = %e, addr = %addr, "Failed to bind TCP listener");
                std::process::exit(1);
            }
        };
        handles.push(tokio::spawn(tcp::run(
            listener,
            Arc::clone(&buffer),
            Arc::clone(&metrics),
            cancel.clone(),
        )));
    } else {
        tracing::info!("TCP server disabled");
    }

    // --- Flush + retry loops ---
    {
        let flusher = Arc::clone(&flusher);
        let config = config.clone();
        let cancel = cancel.clone();
        handles.push(tokio::spawn(async move {
            flusher.run_flush_loop(&config, cancel).await;
        }));
    }
    {
        let flusher = Arc::clone(&flusher);
        let config = config.clone();
        let cancel = cancel.clone();
        handles.push(tokio::spawn(async move {
            flusher.run_retry_loop(&config, cancel).await;
        }));
    }

    // --- Health server ---
    let health_state = HealthState::new(
        &config,
        Arc::clone(&buffer),
        Arc::clone(&retry),
        Arc::clone(&metrics),
    );
    let health_addr: SocketAddr = ([0, 0, 0, 0], config.health_port).into();
    let health_listener = match tokio::net::TcpListener::bind(health_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, addr = %health_addr, "Failed to bind health server");
            std::process::exit(1);
        }
    };
    tracing::info!(addr = %health_addr, "Health server listening");
    let health_cancel = cancel.clone();
    let health_handle = tokio::spawn(async move {
        let app = health::router(health_state);
        let _ = axum::serve(health_listener, app)
            .with_graceful_shutdown(async move { health_cancel.cancelled().await })
            .await;
    });

    // --- Wait for a termination signal ---
    shutdown_signal().await;
    tracing::info!("Shutdown signal received");

    // Stop accepting new work, then drain: full buffer flush plus one
    // final retry pass, bounded by the shutdown deadline.
    cancel.cancel();

    let drain = async {
        for handle in handles {
            let _ = handle.await;
        }
        flusher.flush_all().await;
        flusher.final_retry_pass().await;
        let _ = health_handle.await;
    };
    if tokio::time::timeout(SHUTDOWN_TIMEOUT, drain).await.is_err() {
        tracing::warn!("Shutdown drain timed out");
    }

    tracing::info!(
        sent = metrics.sent(),
        dropped = metrics.dropped(),
        dlq_size = retry.dlq_len(),
        "Collector stopped"
    );
}

/// Wait for SIGINT or SIGTERM.
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
            tracing::info!("Received SIGINT (Ctrl-C)");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM");
        }
    }
}
