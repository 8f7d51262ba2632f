//! AI knowledge cache behaviour against a real database.

use sqlx::PgPool;

use centinela_db::models::ai_cache::NewAiCacheEntry;
use centinela_db::repositories::{AiCacheRepo, TenantRepo};

fn entry(tenant_id: i64, signature: &str) -> NewAiCacheEntry {
    NewAiCacheEntry {
        tenant_id,
        pattern_signature: signature.to_string(),
        detection_type: "vpn_bruteforce".to_string(),
        severity: "high".to_string(),
        threat_detected: true,
        threat_type: Some("credential_stuffing".to_string()),
        confidence_score: Some(0.92),
        context_summary: Some("Repeated SSL VPN login failures".to_string()),
        recommended_actions: Some(serde_json::json!([{"action": "block source IP"}])),
        report_subject: Some("VPN brute force detected".to_string()),
        report_body: Some("Details...".to_string()),
    }
}

#[sqlx::test(migrations = "./migrations")]
async fn lookup_hit_bumps_counter_and_respects_validity(pool: PgPool) {
    let tenant_id = TenantRepo::create(&pool, "acme", "pro", "en", "UTC")
        .await
        .unwrap()
        .id;
    let sig = "a".repeat(64);

    // Miss before any upsert.
    assert!(AiCacheRepo::lookup_valid(&pool, tenant_id, &sig)
        .await
        .unwrap()
        .is_none());

    AiCacheRepo::upsert(&pool, &entry(tenant_id, &sig), 30)
        .await
        .unwrap();

    let hit = AiCacheRepo::lookup_valid(&pool, tenant_id, &sig)
        .await
        .unwrap()
        .expect("fresh entry should be a hit");
    assert_eq!(hit.hit_count, 1);
    assert!(hit.last_hit_at.is_some());

    let hit2 = AiCacheRepo::lookup_valid(&pool, tenant_id, &sig)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(hit2.hit_count, 2);

    // Invalidation hides the entry from lookups.
    AiCacheRepo::invalidate_by_pattern(&pool, tenant_id, &sig)
        .await
        .unwrap();
    assert!(AiCacheRepo::lookup_valid(&pool, tenant_id, &sig)
        .await
        .unwrap()
        .is_none());
}

#[sqlx::test(migrations = "./migrations")]
async fn upsert_overwrites_and_revalidates(pool: PgPool) {
    let tenant_id = TenantRepo::create(&pool, "acme", "pro", "en", "UTC")
        .await
        .unwrap()
        .id;
    let sig = "b".repeat(64);

    AiCacheRepo::upsert(&pool, &entry(tenant_id, &sig), 30)
        .await
        .unwrap();
    AiCacheRepo::invalidate_by_type(&pool, tenant_id, "vpn_bruteforce")
        .await
        .unwrap();

    // Re-upserting the same signature flips it back to valid with new content.
    let mut updated = entry(tenant_id, &sig);
    updated.context_summary = Some("Updated summary".to_string());
    let row = AiCacheRepo::upsert(&pool, &updated, 30).await.unwrap();
    assert!(row.is_valid);
    assert_eq!(row.context_summary.as_deref(), Some("Updated summary"));

    assert!(AiCacheRepo::lookup_valid(&pool, tenant_id, &sig)
        .await
        .unwrap()
        .is_some());
}

#[sqlx::test(migrations = "./migrations")]
async fn cleanup_removes_invalid_rows(pool: PgPool) {
    let tenant_id = TenantRepo::create(&pool, "acme", "pro", "en", "UTC")
        .await
        .unwrap()
        .id;
    AiCacheRepo::upsert(&pool, &entry(tenant_id, &"c".repeat(64)), 30)
        .await
        .unwrap();
    AiCacheRepo::upsert(&pool, &entry(tenant_id, &"d".repeat(64)), 30)
        .await
        .unwrap();
    AiCacheRepo::invalidate_by_pattern(&pool, tenant_id, &"c".repeat(64))
        .await
        .unwrap();

    let removed = AiCacheRepo::cleanup(&pool).await.unwrap();
    assert_eq!(removed, 1);

    // The surviving entry is still usable.
    assert!(AiCacheRepo::lookup_valid(&pool, tenant_id, &"d".repeat(64))
        .await
        .unwrap()
        .is_some());
}
