//! Detection open/frozen lifecycle against a real database.

use chrono::{Duration, Utc};
use sqlx::PgPool;

use centinela_db::models::detection::NewDetection;
use centinela_db::models::digest::NewDigest;
use centinela_db::repositories::{DetectionRepo, DigestRepo, TenantRepo};

async fn seed_tenant(pool: &PgPool) -> i64 {
    TenantRepo::create(pool, "acme", "pro", "en", "UTC")
        .await
        .unwrap()
        .id
}

fn new_detection(tenant_id: i64) -> NewDetection {
    let now = Utc::now();
    NewDetection {
        tenant_id,
        site_id: None,
        source_id: None,
        detection_type: "vpn_bruteforce".to_string(),
        severity: "high".to_string(),
        group_key: "192.168.100.50".to_string(),
        window_minutes: 15,
        event_count: 6,
        first_event_at: now - Duration::seconds(90),
        last_event_at: now,
        evidence: serde_json::json!({"event_count": 6}),
        related_event_ids: vec![],
    }
}

#[sqlx::test(migrations = "./migrations")]
async fn open_detection_is_found_and_updated_not_duplicated(pool: PgPool) {
    let tenant_id = seed_tenant(&pool).await;
    let inserted = DetectionRepo::insert(&pool, &new_detection(tenant_id))
        .await
        .unwrap();

    let open = DetectionRepo::find_open(&pool, tenant_id, "vpn_bruteforce", "192.168.100.50")
        .await
        .unwrap()
        .expect("detection should be open");
    assert_eq!(open.id, inserted.id);

    let updated = DetectionRepo::update_open(
        &pool,
        open.id,
        "high",
        12,
        open.first_event_at,
        Utc::now(),
        &serde_json::json!({"event_count": 12}),
        &[],
    )
    .await
    .unwrap()
    .expect("open detection should accept updates");
    assert_eq!(updated.event_count, 12);

    // Still exactly one open detection for the tuple.
    let tenants = DetectionRepo::tenants_with_open(&pool).await.unwrap();
    assert_eq!(tenants, vec![tenant_id]);
    let open_rows = DetectionRepo::list_open_for_tenant(&pool, tenant_id)
        .await
        .unwrap();
    assert_eq!(open_rows.len(), 1);
}

#[sqlx::test(migrations = "./migrations")]
async fn partial_unique_index_rejects_second_open_detection(pool: PgPool) {
    let tenant_id = seed_tenant(&pool).await;
    DetectionRepo::insert(&pool, &new_detection(tenant_id))
        .await
        .unwrap();

    let err = DetectionRepo::insert(&pool, &new_detection(tenant_id))
        .await
        .expect_err("second open detection for the same tuple must be rejected");
    match err {
        sqlx::Error::Database(db_err) => {
            assert_eq!(db_err.code().as_deref(), Some("23505"));
        }
        other => panic!("expected unique violation, got {other}"),
    }
}

#[sqlx::test(migrations = "./migrations")]
async fn reported_detection_is_frozen(pool: PgPool) {
    let tenant_id = seed_tenant(&pool).await;
    let detection = DetectionRepo::insert(&pool, &new_detection(tenant_id))
        .await
        .unwrap();

    // Report it through a digest, in one transaction like the batcher does.
    let mut tx = pool.begin().await.unwrap();
    let digest = DigestRepo::insert(
        &mut tx,
        &NewDigest {
            tenant_id,
            window_start: detection.first_event_at,
            window_end: detection.last_event_at,
            severity: "high".to_string(),
            detection_count: 1,
            event_count: detection.event_count,
            subject: "Security digest".to_string(),
            body_text: "1 detection".to_string(),
            body_html: None,
            locale: "en".to_string(),
        },
    )
    .await
    .unwrap();
    let stamped = DetectionRepo::mark_reported(&mut tx, &[detection.id], digest.id)
        .await
        .unwrap();
    tx.commit().await.unwrap();
    assert_eq!(stamped, 1);

    // No longer open; update_open must not touch it.
    assert!(
        DetectionRepo::find_open(&pool, tenant_id, "vpn_bruteforce", "192.168.100.50")
            .await
            .unwrap()
            .is_none()
    );
    let touched = DetectionRepo::update_open(
        &pool,
        detection.id,
        "critical",
        99,
        detection.first_event_at,
        Utc::now(),
        &serde_json::json!({}),
        &[],
    )
    .await
    .unwrap();
    assert!(touched.is_none(), "frozen detections must not be updated");

    // A fresh insert for the same tuple is allowed again.
    DetectionRepo::insert(&pool, &new_detection(tenant_id))
        .await
        .expect("tuple is free again once the previous detection is reported");
}
