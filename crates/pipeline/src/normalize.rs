//! Raw -> normalized event promotion.
//!
//! Invoked by the pipeline scheduler (never by the queue): selects a batch
//! of unparsed raw events, runs the injected parser, and writes each
//! normalized row in the same transaction that flips `raw_events.parsed`.
//! Replayed ticks therefore cannot double-normalize.

use std::sync::Arc;

use centinela_core::event_type::map_event_type;
use centinela_core::severity::Severity;
use centinela_db::models::normalized_event::NewNormalizedEvent;
use centinela_db::models::raw_event::RawEvent;
use centinela_db::repositories::{NormalizedEventRepo, RawEventRepo};
use centinela_db::DbPool;

use crate::parse::{LogParser, ParsedLog};

/// Outcome of one normalization pass.
#[derive(Debug, Default, Clone, Copy)]
pub struct NormalizeSummary {
    /// Rows promoted to normalized events.
    pub normalized: u64,
    /// Rows marked with a parse error (never retried).
    pub parse_failures: u64,
}

/// Promotes raw events to normalized events using an injected parser.
pub struct Normalizer {
    pool: DbPool,
    parser: Arc<dyn LogParser>,
}

impl Normalizer {
    pub fn new(pool: DbPool, parser: Arc<dyn LogParser>) -> Self {
        Self { pool, parser }
    }

    /// Process up to `limit` unparsed raw events, oldest first.
    pub async fn normalize_batch(&self, limit: i64) -> Result<NormalizeSummary, sqlx::Error> {
        let batch = RawEventRepo::list_unparsed(&self.pool, limit).await?;
        let mut summary = NormalizeSummary::default();

        for raw in batch {
            match self.parser.parse(&raw.raw_message) {
                Ok(parsed) => {
                    self.promote(&raw, parsed).await?;
                    summary.normalized += 1;
                }
                Err(e) => {
                    // Terminal for this row: record the reason and move on
                    // so the same line is never re-parsed every tick.
                    tracing::debug!(
                        raw_event_id = raw.id,
                        error = %e,
                        "Raw event failed to parse"
                    );
                    RawEventRepo::mark_parse_error(&self.pool, raw.id, &e.to_string()).await?;
                    summary.parse_failures += 1;
                }
            }
        }

        if summary.normalized > 0 || summary.parse_failures > 0 {
            tracing::info!(
                normalized = summary.normalized,
                parse_failures = summary.parse_failures,
                "Normalization pass complete"
            );
        }
        Ok(summary)
    }

    /// Insert the normalized row and flip `parsed` in one transaction.
    async fn promote(&self, raw: &RawEvent, parsed: ParsedLog) -> Result<(), sqlx::Error> {
        let event = build_normalized(self.parser.as_ref(), raw, parsed);

        let mut tx = self.pool.begin().await?;
        NormalizedEventRepo::insert(&mut tx, &event).await?;
        RawEventRepo::mark_parsed(&mut tx, raw.id).await?;
        tx.commit().await
    }
}

/// Map parser output onto a normalized-event row, applying the fallback
/// chains for timestamp and source IP.
fn build_normalized(
    parser: &dyn LogParser,
    raw: &RawEvent,
    parsed: ParsedLog,
) -> NewNormalizedEvent {
    let event_type = map_event_type(
        parsed.log_type.as_deref().unwrap_or(""),
        parsed.subtype.as_deref().unwrap_or(""),
        parsed.action.as_deref().unwrap_or(""),
    );

    let severity = Severity::from_syslog_level(parsed.level.as_deref().unwrap_or(""));

    // Parsed device time wins; the collector's wall clock is the fallback.
    let ts = parsed.ts.unwrap_or(raw.received_at);

    // Parsed source address (including the `...(IP)` message pattern the
    // parser already applied), else whatever peer the collector saw.
    let src_ip = parsed.src_ip.or_else(|| raw.source_ip.clone());

    let kv = serde_json::to_value(&parsed.kv).unwrap_or_else(|_| serde_json::json!({}));

    NewNormalizedEvent {
        raw_event_id: raw.id,
        tenant_id: raw.tenant_id,
        site_id: raw.site_id.clone(),
        source_id: raw.source_id.clone(),
        ts,
        vendor: parser.vendor().to_string(),
        product: parser.product().to_string(),
        event_type,
        subtype: parsed.subtype,
        action: parsed.action,
        severity: severity.as_str().to_string(),
        src_ip,
        dst_ip: parsed.dst_ip,
        src_user: parsed.src_user,
        dst_user: parsed.dst_user,
        src_port: parsed.src_port,
        dst_port: parsed.dst_port,
        interface: parsed.interface,
        vdom: parsed.vdom,
        policy_id: parsed.policy_id,
        session_id: parsed.session_id,
        message: parsed.message,
        kv,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fortigate::FortigateParser;
    use chrono::Utc;

    fn raw(message: &str, source_ip: Option<&str>) -> RawEvent {
        RawEvent {
            id: 1,
            tenant_id: 1,
            site_id: Some("site-1".to_string()),
            source_id: None,
            received_at: Utc::now(),
            source_ip: source_ip.map(|s| s.to_string()),
            transport: "udp".to_string(),
            raw_message: message.to_string(),
            collector_name: Some("edge-1".to_string()),
            payload_sha256: None,
            parsed: false,
            parse_error: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn vpn_failure_normalizes_to_the_canonical_type_and_severity() {
        let raw = raw(
            "date=2025-06-01 time=12:30:45 type=event subtype=vpn level=alert \
             action=ssl-login-fail user=alice remip=203.0.113.9",
            None,
        );
        let parsed = FortigateParser.parse(&raw.raw_message).unwrap();
        let event = build_normalized(&FortigateParser, &raw, parsed);

        assert_eq!(event.event_type, "vpn_login_fail");
        assert_eq!(event.severity, "critical"); // alert collapses to critical
        assert_eq!(event.src_ip.as_deref(), Some("203.0.113.9"));
        assert_eq!(event.vendor, "fortinet");
        assert_eq!(event.site_id.as_deref(), Some("site-1"));
    }

    #[test]
    fn missing_device_time_falls_back_to_received_at() {
        let raw = raw("type=event subtype=system level=warning action=login", None);
        let parsed = FortigateParser.parse(&raw.raw_message).unwrap();
        let event = build_normalized(&FortigateParser, &raw, parsed);
        assert_eq!(event.ts, raw.received_at);
        assert_eq!(event.severity, "medium");
    }

    #[test]
    fn missing_src_ip_falls_back_to_collector_source() {
        let raw = raw(
            "date=2025-06-01 time=09:00:00 type=event subtype=system action=login-failed",
            Some("10.9.8.7"),
        );
        let parsed = FortigateParser.parse(&raw.raw_message).unwrap();
        let event = build_normalized(&FortigateParser, &raw, parsed);
        assert_eq!(event.src_ip.as_deref(), Some("10.9.8.7"));
        assert_eq!(event.event_type, "admin_login_fail");
    }
}
