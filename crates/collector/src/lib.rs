//! Centinela edge collector.
//!
//! Receives syslog over UDP and TCP, buffers events in memory, and
//! forwards them in batches to the cloud ingestion API over authenticated
//! HTTPS. One cooperative loop per concern: UDP receive, TCP accept,
//! flush, retry, and the health server. Events are only ever lost by
//! explicit tail-drop on a saturated buffer; everything else flows into
//! the retry queue and, past the retry budget, the dead letter queue.

pub mod buffer;
pub mod config;
pub mod flush;
pub mod forward;
pub mod health;
pub mod metrics;
pub mod retry;
pub mod tcp;
pub mod udp;
