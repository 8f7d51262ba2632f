//! Repository for the `normalized_events` table.

use centinela_core::rules::GroupBy;
use centinela_core::types::{DbId, Timestamp};
use sqlx::{PgConnection, PgPool};

use crate::models::normalized_event::{NewNormalizedEvent, NormalizedEvent, RuleGroupRow};

const NORMALIZED_EVENT_COLUMNS: &str = "\
    id, raw_event_id, tenant_id, site_id, source_id, ts, vendor, product, \
    event_type, subtype, action, severity, src_ip, dst_ip, src_user, dst_user, \
    src_port, dst_port, interface, vdom, policy_id, session_id, message, kv, \
    created_at";

/// Provides operations on normalized events.
pub struct NormalizedEventRepo;

impl NormalizedEventRepo {
    /// Insert a normalized event inside the normalizer's transaction.
    pub async fn insert(
        conn: &mut PgConnection,
        event: &NewNormalizedEvent,
    ) -> Result<NormalizedEvent, sqlx::Error> {
        let query = format!(
            "INSERT INTO normalized_events \
                (raw_event_id, tenant_id, site_id, source_id, ts, vendor, product, \
                 event_type, subtype, action, severity, src_ip, dst_ip, src_user, \
                 dst_user, src_port, dst_port, interface, vdom, policy_id, \
                 session_id, message, kv) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, \
                     $14, $15, $16, $17, $18, $19, $20, $21, $22, $23) \
             RETURNING {NORMALIZED_EVENT_COLUMNS}"
        );
        sqlx::query_as::<_, NormalizedEvent>(&query)
            .bind(event.raw_event_id)
            .bind(event.tenant_id)
            .bind(event.site_id.as_deref())
            .bind(event.source_id.as_deref())
            .bind(event.ts)
            .bind(&event.vendor)
            .bind(&event.product)
            .bind(&event.event_type)
            .bind(event.subtype.as_deref())
            .bind(event.action.as_deref())
            .bind(&event.severity)
            .bind(event.src_ip.as_deref())
            .bind(event.dst_ip.as_deref())
            .bind(event.src_user.as_deref())
            .bind(event.dst_user.as_deref())
            .bind(event.src_port)
            .bind(event.dst_port)
            .bind(event.interface.as_deref())
            .bind(event.vdom.as_deref())
            .bind(event.policy_id.as_deref())
            .bind(event.session_id.as_deref())
            .bind(event.message.as_deref())
            .bind(&event.kv)
            .fetch_one(conn)
            .await
    }

    /// Find normalized events by ID.
    pub async fn find_by_ids(
        pool: &PgPool,
        ids: &[DbId],
    ) -> Result<Vec<NormalizedEvent>, sqlx::Error> {
        let query =
            format!("SELECT {NORMALIZED_EVENT_COLUMNS} FROM normalized_events WHERE id = ANY($1)");
        sqlx::query_as::<_, NormalizedEvent>(&query)
            .bind(ids)
            .fetch_all(pool)
            .await
    }

    /// Aggregate events matching a rule within its sliding window.
    ///
    /// Groups by `(tenant_id, site_id, source_id, group_key)` and returns
    /// only groups that reached `threshold`. The group-key expression and
    /// its NOT NULL guard are fixed per [`GroupBy`] variant; no caller input
    /// reaches the SQL text.
    pub async fn aggregate_for_rule(
        pool: &PgPool,
        event_types: &[&str],
        since: Timestamp,
        group_by: GroupBy,
        threshold: i64,
    ) -> Result<Vec<RuleGroupRow>, sqlx::Error> {
        let (key_expr, key_guard) = match group_by {
            GroupBy::SrcIp => ("src_ip", "src_ip IS NOT NULL"),
            GroupBy::SrcUser => ("src_user", "src_user IS NOT NULL"),
            GroupBy::SrcIpUser => (
                "src_ip || ':' || src_user",
                "src_ip IS NOT NULL AND src_user IS NOT NULL",
            ),
        };

        let query = format!(
            "SELECT tenant_id, site_id, source_id, {key_expr} AS group_key, \
                    COUNT(*) AS event_count, \
                    MIN(ts) AS first_event_at, \
                    MAX(ts) AS last_event_at, \
                    ARRAY_AGG(DISTINCT src_ip) FILTER (WHERE src_ip IS NOT NULL) AS src_ips, \
                    ARRAY_AGG(DISTINCT src_user) FILTER (WHERE src_user IS NOT NULL) AS src_users, \
                    ARRAY_AGG(id) AS event_ids \
             FROM normalized_events \
             WHERE event_type = ANY($1) AND ts >= $2 AND {key_guard} \
             GROUP BY 1, 2, 3, 4 \
             HAVING COUNT(*) >= $3"
        );

        let types: Vec<String> = event_types.iter().map(|t| t.to_string()).collect();

        sqlx::query_as::<_, RuleGroupRow>(&query)
            .bind(types)
            .bind(since)
            .bind(threshold)
            .fetch_all(pool)
            .await
    }
}
