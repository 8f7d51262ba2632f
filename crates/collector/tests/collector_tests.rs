//! Integration tests for the collector: UDP/TCP receive paths, the flush
//! loop's bulk/fallback behaviour, and the retry-to-DLQ lifecycle, all
//! against a local mock backend.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;
use tokio_util::sync::CancellationToken;

use centinela_collector::buffer::{BufferedEvent, EventBuffer};
use centinela_collector::config::CollectorConfig;
use centinela_collector::flush::Flusher;
use centinela_collector::forward::HttpForwarder;
use centinela_collector::metrics::MetricsRegistry;
use centinela_collector::retry::RetryQueue;
use centinela_collector::{tcp, udp};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Start a mock ingest backend that always answers `status`. Returns its
/// base URL and a counter of requests seen.
async fn mock_backend(status: StatusCode) -> (String, Arc<AtomicU64>) {
    let hits = Arc::new(AtomicU64::new(0));
    let hits_clone = Arc::clone(&hits);

    let handler = move || {
        let hits = Arc::clone(&hits_clone);
        async move {
            hits.fetch_add(1, Ordering::SeqCst);
            (status, "{}")
        }
    };

    let app = Router::new()
        .route("/v1/ingest/syslog", post(handler.clone()))
        .route("/v1/ingest/syslog/bulk", post(handler));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}"), hits)
}

fn test_config(api_url: &str, max_retries: u32) -> CollectorConfig {
    CollectorConfig {
        api_url: api_url.trim_end_matches('/').to_string(),
        api_key: "test-key".to_string(),
        udp_enabled: false,
        udp_port: 0,
        udp_bind: "127.0.0.1".to_string(),
        tcp_enabled: false,
        tcp_port: 0,
        tcp_bind: "127.0.0.1".to_string(),
        health_port: 0,
        batch_size: 10,
        flush_interval_ms: 50,
        max_buffer_size: 100,
        max_retries,
        retry_base_delay_ms: 10,
        retry_max_delay_ms: 100,
        retry_check_interval_ms: 10,
        collector_name: "test-collector".to_string(),
        site_id: Some("site-1".to_string()),
        log_level: "debug".to_string(),
    }
}

fn build_flusher(config: &CollectorConfig) -> (Arc<Flusher>, Arc<MetricsRegistry>, Arc<RetryQueue>) {
    let metrics = Arc::new(MetricsRegistry::new());
    let buffer = Arc::new(EventBuffer::new(config.max_buffer_size));
    let retry = Arc::new(RetryQueue::new(
        config.max_retries,
        config.retry_base_delay_ms,
        config.retry_max_delay_ms,
        Arc::clone(&metrics),
    ));
    let forwarder = Arc::new(HttpForwarder::new(config));
    let flusher = Arc::new(Flusher::new(
        buffer,
        Arc::clone(&retry),
        forwarder,
        Arc::clone(&metrics),
        config.batch_size,
    ));
    (flusher, metrics, retry)
}

fn event(msg: &str) -> BufferedEvent {
    BufferedEvent::new(msg.to_string(), Some("10.0.0.1".to_string()), "udp")
}

// ---------------------------------------------------------------------------
// Flush path
// ---------------------------------------------------------------------------

#[tokio::test]
async fn successful_bulk_upload_marks_events_sent() {
    let (url, hits) = mock_backend(StatusCode::ACCEPTED).await;
    let config = test_config(&url, 3);
    let (flusher, metrics, _retry) = build_flusher(&config);

    for i in 0..3 {
        metrics.incr_received();
        assert!(flusher.buffer.push(event(&format!("line {i}"))));
    }

    flusher.flush_once().await;

    assert_eq!(metrics.sent(), 3);
    assert!(flusher.buffer.is_empty());
    // One bulk request, no per-event fallback.
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    // received == sent + failed + dropped + pending
    assert_eq!(metrics.received(), metrics.sent());
}

#[tokio::test]
async fn failed_batch_falls_back_to_singles_and_queues_retries() {
    let (url, hits) = mock_backend(StatusCode::INTERNAL_SERVER_ERROR).await;
    let config = test_config(&url, 3);
    let (flusher, metrics, retry) = build_flusher(&config);

    metrics.incr_received();
    metrics.incr_received();
    flusher.buffer.push(event("a"));
    flusher.buffer.push(event("b"));

    flusher.flush_once().await;

    // 1 bulk attempt + 2 single fallbacks.
    assert_eq!(hits.load(Ordering::SeqCst), 3);
    assert_eq!(metrics.sent(), 0);
    assert_eq!(retry.len(), 2, "both events must be queued for retry");
    assert!(flusher.buffer.is_empty());
}

// ---------------------------------------------------------------------------
// Retry lifecycle (seed scenario: remote always 500, max_retries = 2)
// ---------------------------------------------------------------------------

#[tokio::test]
async fn event_exhausting_retries_lands_in_the_dlq() {
    let (url, _hits) = mock_backend(StatusCode::INTERNAL_SERVER_ERROR).await;
    let config = test_config(&url, 2);
    let (flusher, metrics, retry) = build_flusher(&config);

    metrics.incr_received();
    flusher.buffer.push(event("doomed"));

    // Attempt 1 via the flush path.
    flusher.flush_once().await;
    assert_eq!(retry.len(), 1);

    // Attempts 2 and 3, waiting out each backoff (base 10 ms, +/-20%).
    for _ in 0..2 {
        tokio::time::sleep(Duration::from_millis(150)).await;
        flusher.retry_pass().await;
    }

    assert_eq!(retry.len(), 0, "retry queue must be empty");
    assert_eq!(retry.dlq_len(), 1, "event must be dead-lettered");
    assert_eq!(metrics.failed(), 1);
    assert!(flusher.buffer.is_empty());
}

#[tokio::test]
async fn non_retryable_status_dead_letters_immediately() {
    let (url, hits) = mock_backend(StatusCode::UNAUTHORIZED).await;
    let config = test_config(&url, 5);
    let (flusher, metrics, retry) = build_flusher(&config);

    metrics.incr_received();
    flusher.buffer.push(event("bad auth"));

    flusher.flush_once().await;

    // Bulk 401 + single 401, then straight to the DLQ without retries.
    assert_eq!(hits.load(Ordering::SeqCst), 2);
    assert_eq!(retry.len(), 0);
    assert_eq!(retry.dlq_len(), 1);
    assert_eq!(metrics.failed(), 1);
}

// ---------------------------------------------------------------------------
// UDP receive path
// ---------------------------------------------------------------------------

#[tokio::test]
async fn udp_datagram_becomes_one_buffered_event() {
    let metrics = Arc::new(MetricsRegistry::new());
    let buffer = Arc::new(EventBuffer::new(10));
    let cancel = CancellationToken::new();

    let socket = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    let server = tokio::spawn(udp::run(
        socket,
        Arc::clone(&buffer),
        Arc::clone(&metrics),
        cancel.clone(),
    ));

    let client = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
    client
        .send_to(b"type=event subtype=vpn action=ssl-login-fail\r\n", addr)
        .await
        .unwrap();

    wait_for(|| buffer.len() == 1).await;
    let batch = buffer.pop_batch(1);
    assert_eq!(batch[0].raw_message, "type=event subtype=vpn action=ssl-login-fail");
    assert_eq!(batch[0].transport, "udp");
    assert!(batch[0].source_ip.as_deref().unwrap().starts_with("127.0.0.1"));
    assert_eq!(metrics.received(), 1);

    cancel.cancel();
    let _ = server.await;
}

// ---------------------------------------------------------------------------
// TCP receive path
// ---------------------------------------------------------------------------

#[tokio::test]
async fn tcp_stream_frames_lines_and_flushes_the_tail_on_close() {
    use tokio::io::AsyncWriteExt;

    let metrics = Arc::new(MetricsRegistry::new());
    let buffer = Arc::new(EventBuffer::new(10));
    let cancel = CancellationToken::new();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    let server = tokio::spawn(tcp::run(
        listener,
        Arc::clone(&buffer),
        Arc::clone(&metrics),
        cancel.clone(),
    ));

    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    stream.write_all(b"first\r\nsecond\ntail-without-newline").await.unwrap();
    stream.shutdown().await.unwrap();
    drop(stream);

    wait_for(|| buffer.len() == 3).await;
    let batch = buffer.pop_batch(10);
    assert_eq!(batch[0].raw_message, "first");
    assert_eq!(batch[1].raw_message, "second");
    assert_eq!(batch[2].raw_message, "tail-without-newline");
    assert!(batch.iter().all(|e| e.transport == "tcp"));

    cancel.cancel();
    let _ = server.await;
}

/// Poll until `predicate` holds, panicking after ~2 s.
async fn wait_for(predicate: impl Fn() -> bool) {
    for _ in 0..200 {
        if predicate() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 2s");
}
