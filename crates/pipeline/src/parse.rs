//! The pluggable log parser seam.
//!
//! Vendor-specific log formats are external to the pipeline; the
//! normalizer only sees the [`LogParser`] trait and the structured
//! [`ParsedLog`] it produces. The FortiGate key=value parser in
//! [`crate::fortigate`] is the reference implementation.

use std::collections::BTreeMap;

use centinela_core::types::Timestamp;

/// Error type for parse failures.
///
/// A parse failure is terminal for the raw event: the normalizer records
/// it and never retries.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// The line does not look like the parser's format at all.
    #[error("Unrecognized log format: {0}")]
    Unrecognized(String),

    /// The line matched the format but a required field was unusable.
    #[error("Malformed field {field}: {reason}")]
    MalformedField { field: &'static str, reason: String },
}

/// Structured fields extracted from one raw log line.
///
/// Every field is optional: the normalizer applies its own fallback chain
/// (e.g. `ts` falls back to `received_at`, `src_ip` to the collector's
/// source address). Pairs that did not map to a typed field land in `kv`.
#[derive(Debug, Clone, Default)]
pub struct ParsedLog {
    pub ts: Option<Timestamp>,
    pub log_type: Option<String>,
    pub subtype: Option<String>,
    pub action: Option<String>,
    /// The vendor's native level string (`alert`, `warning`, ...).
    pub level: Option<String>,
    pub src_ip: Option<String>,
    pub dst_ip: Option<String>,
    pub src_user: Option<String>,
    pub dst_user: Option<String>,
    pub src_port: Option<i32>,
    pub dst_port: Option<i32>,
    pub interface: Option<String>,
    pub vdom: Option<String>,
    pub policy_id: Option<String>,
    pub session_id: Option<String>,
    pub message: Option<String>,
    pub kv: BTreeMap<String, String>,
}

/// A vendor log parser.
///
/// Implementations must be cheap to call per line and must never panic on
/// malformed input.
pub trait LogParser: Send + Sync {
    /// Vendor recorded on normalized events, e.g. `fortinet`.
    fn vendor(&self) -> &'static str;

    /// Product recorded on normalized events, e.g. `fortigate`.
    fn product(&self) -> &'static str;

    /// Parse one raw line into structured fields.
    fn parse(&self, raw: &str) -> Result<ParsedLog, ParseError>;
}
