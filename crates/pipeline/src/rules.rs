//! The windowed detection rules engine.
//!
//! Runs every built-in rule over the recent normalized events, groups
//! matches by the rule's group key, and converts threshold breaches into
//! detections. The open-detection invariant turns repeat matches into
//! updates instead of duplicates.

use std::str::FromStr;

use centinela_core::rules::{escalate_severity, Rule};
use centinela_core::severity::Severity;
use centinela_db::models::detection::NewDetection;
use centinela_db::models::normalized_event::RuleGroupRow;
use centinela_db::repositories::DetectionRepo;
use centinela_db::DbPool;
use chrono::{Duration, Utc};

/// Outcome of one rules pass.
#[derive(Debug, Default, Clone, Copy)]
pub struct RulesSummary {
    pub detections_created: u64,
    pub detections_updated: u64,
}

/// Evaluate every rule once.
pub async fn run(pool: &DbPool, rules: &[Rule]) -> Result<RulesSummary, sqlx::Error> {
    let mut summary = RulesSummary::default();

    for rule in rules {
        let since = Utc::now() - Duration::minutes(rule.window_minutes);
        let groups = centinela_db::repositories::NormalizedEventRepo::aggregate_for_rule(
            pool,
            rule.event_types,
            since,
            rule.group_by,
            rule.threshold,
        )
        .await?;

        for group in groups {
            apply_group(pool, rule, &group, &mut summary).await?;
        }
    }

    if summary.detections_created > 0 || summary.detections_updated > 0 {
        tracing::info!(
            created = summary.detections_created,
            updated = summary.detections_updated,
            "Rules pass complete"
        );
    }
    Ok(summary)
}

/// Convert one aggregation group into a detection insert or update.
async fn apply_group(
    pool: &DbPool,
    rule: &Rule,
    group: &RuleGroupRow,
    summary: &mut RulesSummary,
) -> Result<(), sqlx::Error> {
    let severity = effective_severity(rule, group.event_count);
    let evidence = build_evidence(group);

    let open = DetectionRepo::find_open(pool, group.tenant_id, rule.name, &group.group_key).await?;

    if let Some(open) = open {
        // Never downgrade a detection that already escalated.
        let kept = Severity::from_str(&open.severity)
            .map(|existing| existing.max(severity))
            .unwrap_or(severity);

        let updated = DetectionRepo::update_open(
            pool,
            open.id,
            kept.as_str(),
            group.event_count,
            group.first_event_at,
            group.last_event_at,
            &evidence,
            &group.event_ids,
        )
        .await?;
        if updated.is_some() {
            summary.detections_updated += 1;
        }
        return Ok(());
    }

    let new = NewDetection {
        tenant_id: group.tenant_id,
        site_id: group.site_id.clone(),
        source_id: group.source_id.clone(),
        detection_type: rule.name.to_string(),
        severity: severity.as_str().to_string(),
        group_key: group.group_key.clone(),
        window_minutes: rule.window_minutes as i32,
        event_count: group.event_count,
        first_event_at: group.first_event_at,
        last_event_at: group.last_event_at,
        evidence: evidence.clone(),
        related_event_ids: group.event_ids.clone(),
    };

    match DetectionRepo::insert(pool, &new).await {
        Ok(_) => {
            tracing::info!(
                tenant_id = group.tenant_id,
                detection_type = rule.name,
                group_key = %group.group_key,
                event_count = group.event_count,
                severity = %severity,
                "Detection created"
            );
            summary.detections_created += 1;
            Ok(())
        }
        // A concurrent pass inserted the open row first; fold into it.
        Err(sqlx::Error::Database(db_err)) if db_err.code().as_deref() == Some("23505") => {
            if let Some(open) =
                DetectionRepo::find_open(pool, group.tenant_id, rule.name, &group.group_key).await?
            {
                DetectionRepo::update_open(
                    pool,
                    open.id,
                    severity.as_str(),
                    group.event_count,
                    group.first_event_at,
                    group.last_event_at,
                    &evidence,
                    &group.event_ids,
                )
                .await?;
                summary.detections_updated += 1;
            }
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Base rule severity plus the burst escalation policy.
fn effective_severity(rule: &Rule, event_count: i64) -> Severity {
    escalate_severity(rule.severity, event_count, rule.threshold)
}

/// Structured evidence stored on the detection and fed to the AI cache
/// signature.
fn build_evidence(group: &RuleGroupRow) -> serde_json::Value {
    let src_ips = group.src_ips.clone().unwrap_or_default();
    let src_users = group.src_users.clone().unwrap_or_default();
    serde_json::json!({
        "event_count": group.event_count,
        "unique_src_ips": src_ips.len(),
        "unique_src_users": src_users.len(),
        "src_ips": src_ips,
        "src_users": src_users,
        "first_event_at": group.first_event_at,
        "last_event_at": group.last_event_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use centinela_core::rules::BUILTIN_RULES;

    fn group(count: i64) -> RuleGroupRow {
        RuleGroupRow {
            tenant_id: 1,
            site_id: None,
            source_id: None,
            group_key: "192.168.100.50".to_string(),
            event_count: count,
            first_event_at: Utc::now() - Duration::seconds(90),
            last_event_at: Utc::now(),
            src_ips: Some(vec!["192.168.100.50".to_string()]),
            src_users: Some(vec!["alice".to_string(), "bob".to_string()]),
            event_ids: vec![1, 2, 3],
        }
    }

    #[test]
    fn evidence_captures_counts_and_distinct_values() {
        let evidence = build_evidence(&group(6));
        assert_eq!(evidence["event_count"], 6);
        assert_eq!(evidence["unique_src_ips"], 1);
        assert_eq!(evidence["unique_src_users"], 2);
    }

    #[test]
    fn severity_escalates_for_large_bursts() {
        let vpn = &BUILTIN_RULES[0];
        assert_eq!(vpn.name, "vpn_bruteforce");
        assert_eq!(effective_severity(vpn, 6), Severity::High);
        // 15 = 5x threshold of 3.
        assert_eq!(effective_severity(vpn, 15), Severity::Critical);
    }
}
