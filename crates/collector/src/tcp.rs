//! TCP syslog server with newline-delimited framing.
//!
//! Syslog over TCP commonly uses RFC 6587 non-transparent framing: one
//! message per line. Incomplete trailing bytes are retained across reads,
//! a single pending line is capped at 64 KiB (memory-exhaustion guard),
//! and idle sockets are closed after five minutes.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use crate::buffer::{BufferedEvent, EventBuffer};
use crate::metrics::MetricsRegistry;

/// Cap on one pending line; longer lines are truncated and flushed as
/// one event.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Sockets with no traffic for this long are closed.
const IDLE_TIMEOUT: Duration = Duration::from_secs(300);

const READ_CHUNK: usize = 4096;

/// Run the TCP accept loop until cancelled.
pub async fn run(
    listener: TcpListener,
    buffer: Arc<EventBuffer>,
    metrics: Arc<MetricsRegistry>,
    cancel: CancellationToken,
) {
    let local = listener
        .local_addr()
        .map(|a| a.to_string())
        .unwrap_or_default();
    tracing::info!(addr = %local, "TCP server listening");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("TCP server stopped accepting connections");
                break;
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        let buffer = Arc::clone(&buffer);
                        let metrics = Arc::clone(&metrics);
                        let cancel = cancel.clone();
                        tokio::spawn(async move {
                            metrics.tcp_connection_opened();
                            handle_connection(stream, peer.ip().to_string(), buffer, &metrics, cancel)
                                .await;
                            metrics.tcp_connection_closed();
                        });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "TCP accept error");
                    }
                }
            }
        }
    }
}

/// Drive one connection: read chunks, frame lines, push events.
async fn handle_connection(
    mut stream: TcpStream,
    peer_ip: String,
    buffer: Arc<EventBuffer>,
    metrics: &MetricsRegistry,
    cancel: CancellationToken,
) {
    let mut chunk = vec![0u8; READ_CHUNK];
    let mut framer = LineFramer::new(MAX_LINE_BYTES);

    loop {
        let read = tokio::select! {
            _ = cancel.cancelled() => break,
            read = tokio::time::timeout(IDLE_TIMEOUT, stream.read(&mut chunk)) => read,
        };

        match read {
            Err(_) => {
                tracing::debug!(peer = %peer_ip, "Closing idle TCP connection");
                break;
            }
            Ok(Ok(0)) => break, // clean EOF
            Ok(Ok(n)) => {
                for frame in framer.push_bytes(&chunk[..n]) {
                    submit(frame, &peer_ip, &buffer, metrics);
                }
            }
            Ok(Err(e)) => {
                // Peers dropping mid-stream are routine, not errors.
                if e.kind() == io::ErrorKind::ConnectionReset {
                    tracing::debug!(peer = %peer_ip, "TCP connection reset by peer");
                } else {
                    tracing::warn!(peer = %peer_ip, error = %e, "TCP read error");
                }
                break;
            }
        }
    }

    // Whatever is left without a trailing newline is still one event.
    if let Some(frame) = framer.take_pending() {
        submit(frame, &peer_ip, &buffer, metrics);
    }
}

fn submit(frame: Frame, peer_ip: &str, buffer: &EventBuffer, metrics: &MetricsRegistry) {
    metrics.incr_received();
    let mut event = BufferedEvent::new(frame.line, Some(peer_ip.to_string()), "tcp");
    event.truncated = frame.truncated;
    event.original_length = frame.original_length;
    if !buffer.push(event) {
        metrics.incr_dropped();
        tracing::warn!("Buffer full, dropping TCP event");
    }
}

// ---------------------------------------------------------------------------
// Line framing
// ---------------------------------------------------------------------------

/// One framed syslog line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub line: String,
    pub truncated: bool,
    /// Bytes observed for the line when it was truncated.
    pub original_length: Option<usize>,
}

/// Incremental newline framer with a per-line size cap.
///
/// When a pending line crosses the cap it is flushed immediately as one
/// truncated frame and the remainder of that line (up to its newline) is
/// discarded, so an attacker streaming an endless line costs at most the
/// cap.
pub struct LineFramer {
    pending: Vec<u8>,
    max_line: usize,
    /// True while discarding the tail of an over-long line.
    discarding: bool,
    /// Bytes seen for the line being discarded.
    discarded_len: usize,
}

impl LineFramer {
    pub fn new(max_line: usize) -> Self {
        Self {
            pending: Vec::new(),
            max_line,
            discarding: false,
            discarded_len: 0,
        }
    }

    /// Feed received bytes; returns every completed frame.
    pub fn push_bytes(&mut self, bytes: &[u8]) -> Vec<Frame> {
        let mut frames = Vec::new();

        for &b in bytes {
            if self.discarding {
                self.discarded_len += 1;
                if b == b'\n' {
                    self.discarding = false;
                    self.discarded_len = 0;
                }
                continue;
            }

            if b == b'\n' {
                // A line of exactly max_line bytes is complete, not
                // truncated.
                if let Some(frame) = self.complete_line(false) {
                    frames.push(frame);
                }
                continue;
            }

            if self.pending.len() >= self.max_line {
                // This byte crosses the cap: flush exactly max_line bytes
                // as one event and skip the rest of the line.
                if let Some(frame) = self.complete_line(true) {
                    frames.push(frame);
                }
                self.discarding = true;
                self.discarded_len = 1;
                continue;
            }

            self.pending.push(b);
        }

        frames
    }

    /// Flush whatever is pending (connection close).
    pub fn take_pending(&mut self) -> Option<Frame> {
        if self.pending.is_empty() {
            return None;
        }
        self.complete_line(false)
    }

    fn complete_line(&mut self, truncated: bool) -> Option<Frame> {
        let original_length = self.pending.len();
        let raw = std::mem::take(&mut self.pending);
        let line = String::from_utf8_lossy(&raw);
        let line = line.trim_end_matches('\r').trim();
        if line.is_empty() {
            return None;
        }
        Some(Frame {
            line: line.to_string(),
            truncated,
            original_length: truncated.then_some(original_length),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_lines_split_on_newlines() {
        let mut framer = LineFramer::new(MAX_LINE_BYTES);
        let frames = framer.push_bytes(b"first line\nsecond line\n");
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].line, "first line");
        assert_eq!(frames[1].line, "second line");
        assert!(!frames[0].truncated);
    }

    #[test]
    fn incomplete_tail_is_retained_across_reads() {
        let mut framer = LineFramer::new(MAX_LINE_BYTES);
        assert!(framer.push_bytes(b"partial").is_empty());
        let frames = framer.push_bytes(b" line\nnext");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].line, "partial line");

        let tail = framer.take_pending().unwrap();
        assert_eq!(tail.line, "next");
    }

    #[test]
    fn carriage_returns_and_blank_lines_are_dropped() {
        let mut framer = LineFramer::new(MAX_LINE_BYTES);
        let frames = framer.push_bytes(b"line one\r\n\r\n\nline two\r\n");
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].line, "line one");
        assert_eq!(frames[1].line, "line two");
    }

    #[test]
    fn oversized_line_is_truncated_to_exactly_the_cap() {
        let mut framer = LineFramer::new(MAX_LINE_BYTES);
        // One byte past the cap.
        let mut input = vec![b'a'; MAX_LINE_BYTES + 1];
        input.push(b'\n');
        input.extend_from_slice(b"after\n");

        let frames = framer.push_bytes(&input);
        assert_eq!(frames.len(), 2, "one truncated event plus the next line");
        assert_eq!(frames[0].line.len(), MAX_LINE_BYTES);
        assert!(frames[0].truncated);
        assert_eq!(frames[0].original_length, Some(MAX_LINE_BYTES));
        // The connection keeps framing normally afterwards.
        assert_eq!(frames[1].line, "after");
        assert!(!frames[1].truncated);
    }

    #[test]
    fn line_of_exactly_the_cap_is_not_truncated() {
        let mut framer = LineFramer::new(8);
        let frames = framer.push_bytes(b"01234567\nok\n");
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].line, "01234567");
        assert!(!frames[0].truncated);
        assert_eq!(frames[1].line, "ok");
    }

    #[test]
    fn discarded_tail_does_not_leak_into_the_next_frame() {
        let mut framer = LineFramer::new(8);
        let frames = framer.push_bytes(b"0123456789ABCDEF\nok\n");
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].line, "01234567");
        assert!(frames[0].truncated);
        assert_eq!(frames[1].line, "ok");
    }
}
