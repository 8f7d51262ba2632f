//! UDP syslog server: one datagram = one event.

use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

use crate::buffer::{BufferedEvent, EventBuffer};
use crate::metrics::MetricsRegistry;

/// Largest datagram we read; syslog messages are far smaller in practice.
const MAX_DATAGRAM: usize = 64 * 1024;

/// Run the UDP receive loop until cancelled.
pub async fn run(
    socket: UdpSocket,
    buffer: Arc<EventBuffer>,
    metrics: Arc<MetricsRegistry>,
    cancel: CancellationToken,
) {
    let local = socket
        .local_addr()
        .map(|a| a.to_string())
        .unwrap_or_default();
    tracing::info!(addr = %local, "UDP server listening");

    let mut datagram = vec![0u8; MAX_DATAGRAM];

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("UDP server stopped");
                break;
            }
            received = socket.recv_from(&mut datagram) => {
                match received {
                    Ok((len, peer)) => {
                        let line = String::from_utf8_lossy(&datagram[..len]);
                        let line = line.trim_end_matches(['\r', '\n']);
                        if line.is_empty() {
                            continue;
                        }

                        metrics.incr_received();
                        let event = BufferedEvent::new(
                            line.to_string(),
                            Some(peer.ip().to_string()),
                            "udp",
                        );
                        if !buffer.push(event) {
                            metrics.incr_dropped();
                            tracing::warn!("Buffer full, dropping UDP event");
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "UDP receive error");
                    }
                }
            }
        }
    }
}
