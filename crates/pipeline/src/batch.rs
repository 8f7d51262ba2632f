//! Per-tenant digest assembly.
//!
//! Digests are the only customer-visible notification unit: per-event
//! alerting is deliberately not supported. For each tenant with open
//! detections, the batcher consolidates them into one digest and stamps
//! `reported_digest_id` in the same transaction, freezing the detections.

use std::str::FromStr;

use centinela_core::severity::Severity;
use centinela_db::models::detection::Detection;
use centinela_db::models::digest::NewDigest;
use centinela_db::repositories::{DetectionRepo, DigestRepo, TenantRepo};
use centinela_db::DbPool;

/// Outcome of one batch pass.
#[derive(Debug, Default, Clone, Copy)]
pub struct BatchSummary {
    pub digests_created: u64,
    pub detections_reported: u64,
}

/// Consolidate open detections into digests, one per tenant.
pub async fn run(pool: &DbPool) -> Result<BatchSummary, sqlx::Error> {
    let mut summary = BatchSummary::default();

    for tenant_id in DetectionRepo::tenants_with_open(pool).await? {
        let detections = DetectionRepo::list_open_for_tenant(pool, tenant_id).await?;
        if detections.is_empty() {
            continue;
        }

        let locale = TenantRepo::find_by_id(pool, tenant_id)
            .await?
            .map(|t| t.default_locale)
            .unwrap_or_else(|| "en".to_string());

        let digest = compose_digest(tenant_id, &locale, &detections);
        let ids: Vec<i64> = detections.iter().map(|d| d.id).collect();

        let mut tx = pool.begin().await?;
        let inserted = DigestRepo::insert(&mut tx, &digest).await?;
        let stamped = DetectionRepo::mark_reported(&mut tx, &ids, inserted.id).await?;
        tx.commit().await?;

        tracing::info!(
            tenant_id,
            digest_id = inserted.id,
            detections = stamped,
            severity = %digest.severity,
            "Digest created"
        );
        summary.digests_created += 1;
        summary.detections_reported += stamped;
    }

    Ok(summary)
}

/// Compute digest fields and render the templates.
fn compose_digest(tenant_id: i64, locale: &str, detections: &[Detection]) -> NewDigest {
    let window_start = detections
        .iter()
        .map(|d| d.first_event_at)
        .min()
        .expect("detections is non-empty");
    let window_end = detections
        .iter()
        .map(|d| d.last_event_at)
        .max()
        .expect("detections is non-empty");

    let severity = detections
        .iter()
        .filter_map(|d| Severity::from_str(&d.severity).ok())
        .max()
        .unwrap_or(Severity::Info);

    let event_count: i64 = detections.iter().map(|d| d.event_count).sum();

    NewDigest {
        tenant_id,
        window_start,
        window_end,
        severity: severity.as_str().to_string(),
        detection_count: detections.len() as i32,
        event_count,
        subject: render_subject(locale, severity, detections.len()),
        body_text: render_body(locale, severity, detections),
        body_html: None,
        locale: locale.to_string(),
    }
}

/// Deterministic digest subject, keyed by tenant locale.
fn render_subject(locale: &str, severity: Severity, detection_count: usize) -> String {
    match locale {
        "es" => format!(
            "[Centinela] {detection_count} deteccion(es) de seguridad - severidad {}",
            severity_label_es(severity)
        ),
        _ => format!(
            "[Centinela] {detection_count} security detection(s) - max severity {}",
            severity.as_str()
        ),
    }
}

/// Deterministic plain-text body: one line per detection, pre-sorted by
/// the repository (severity desc, recency desc).
fn render_body(locale: &str, severity: Severity, detections: &[Detection]) -> String {
    let mut body = match locale {
        "es" => format!(
            "Resumen de seguridad Centinela\n\
             Severidad maxima: {}\nDetecciones: {}\n\n",
            severity_label_es(severity),
            detections.len()
        ),
        _ => format!(
            "Centinela security digest\n\
             Max severity: {}\nDetections: {}\n\n",
            severity.as_str(),
            detections.len()
        ),
    };

    for d in detections {
        let line = match locale {
            "es" => format!(
                "- [{}] {} en {}: {} eventos entre {} y {}\n",
                d.severity,
                d.detection_type,
                d.group_key,
                d.event_count,
                d.first_event_at.format("%Y-%m-%d %H:%M:%S UTC"),
                d.last_event_at.format("%Y-%m-%d %H:%M:%S UTC"),
            ),
            _ => format!(
                "- [{}] {} on {}: {} events between {} and {}\n",
                d.severity,
                d.detection_type,
                d.group_key,
                d.event_count,
                d.first_event_at.format("%Y-%m-%d %H:%M:%S UTC"),
                d.last_event_at.format("%Y-%m-%d %H:%M:%S UTC"),
            ),
        };
        body.push_str(&line);
    }

    body
}

fn severity_label_es(severity: Severity) -> &'static str {
    match severity {
        Severity::Info => "informativa",
        Severity::Low => "baja",
        Severity::Medium => "media",
        Severity::High => "alta",
        Severity::Critical => "critica",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn detection(severity: &str, event_count: i64, offset_mins: i64) -> Detection {
        let base = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        Detection {
            id: event_count,
            tenant_id: 1,
            site_id: None,
            source_id: None,
            detection_type: "vpn_bruteforce".to_string(),
            severity: severity.to_string(),
            group_key: "192.168.100.50".to_string(),
            window_minutes: 15,
            event_count,
            first_event_at: base - Duration::minutes(offset_mins),
            last_event_at: base,
            evidence: serde_json::json!({}),
            related_event_ids: vec![],
            reported_digest_id: None,
            acknowledged: false,
            created_at: base,
        }
    }

    #[test]
    fn digest_fields_aggregate_member_detections() {
        let detections = vec![detection("critical", 4, 30), detection("medium", 11, 10)];
        let digest = compose_digest(1, "en", &detections);

        assert_eq!(digest.severity, "critical");
        assert_eq!(digest.detection_count, 2);
        assert_eq!(digest.event_count, 15);
        assert_eq!(
            digest.window_start,
            detections[0].first_event_at.min(detections[1].first_event_at)
        );
        assert_eq!(digest.window_end, detections[0].last_event_at);
    }

    #[test]
    fn subject_and_body_are_deterministic() {
        let detections = vec![detection("high", 6, 15)];
        let a = compose_digest(1, "en", &detections);
        let b = compose_digest(1, "en", &detections);
        assert_eq!(a.subject, b.subject);
        assert_eq!(a.body_text, b.body_text);
        assert!(a.subject.contains("1 security detection(s)"));
        assert!(a.body_text.contains("vpn_bruteforce on 192.168.100.50"));
    }

    #[test]
    fn spanish_locale_renders_spanish_templates() {
        let detections = vec![detection("high", 6, 15)];
        let digest = compose_digest(1, "es", &detections);
        assert!(digest.subject.contains("deteccion(es) de seguridad"));
        assert!(digest.body_text.contains("Severidad maxima: alta"));
        assert_eq!(digest.locale, "es");
    }
}
