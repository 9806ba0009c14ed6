use entitled::entitlements::{
    EntitlementError, EntitlementService, FeatureType, PlanCatalog,
};
use sqlx::PgPool;
use uuid::Uuid;

async fn seed_user(pool: &PgPool, email: &str) -> Uuid {
    let user_id = Uuid::new_v4();
    sqlx::query("INSERT INTO users (id, email) VALUES ($1, $2)")
        .bind(user_id)
        .bind(email)
        .execute(pool)
        .await
        .unwrap();
    user_id
}

async fn seed_subscription(pool: &PgPool, user_id: Uuid, status: &str, tier: &str, sub_ref: &str) {
    sqlx::query(
        r#"
        INSERT INTO subscriptions (id, user_id, billing_subscription_ref, status, plan_tier)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(sub_ref)
    .bind(status)
    .bind(tier)
    .execute(pool)
    .await
    .unwrap();
}

// key: entitlement-tests -> free-tier quota exhaustion end to end
#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn free_tier_assessment_quota_exhausts_at_two(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    let user_id = seed_user(&pool, "free@example.com").await;
    let service = EntitlementService::new(pool.clone(), PlanCatalog::default());

    for expected in 1..=2 {
        let decision = service
            .can_use(user_id, FeatureType::Assessment)
            .await
            .unwrap();
        assert!(decision.can_use);

        let used = service
            .try_increment(user_id, FeatureType::Assessment)
            .await
            .unwrap();
        assert_eq!(used, expected);
    }

    let decision = service
        .can_use(user_id, FeatureType::Assessment)
        .await
        .unwrap();
    assert!(!decision.can_use, "third use must be denied");
    assert_eq!(decision.used, 2);
    assert_eq!(decision.limit, 2);

    match service.try_increment(user_id, FeatureType::Assessment).await {
        Err(EntitlementError::QuotaExceeded { used, limit }) => {
            assert_eq!(used, 2);
            assert_eq!(limit, 2);
        }
        other => panic!("expected quota exceeded, got {other:?}"),
    }

    // The denied increment must not have touched the counter.
    let stored: i64 = sqlx::query_scalar(
        "SELECT count FROM usage_counters WHERE user_id = $1 AND feature_type = 'assessment'",
    )
    .bind(user_id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(stored, 2);
}

// key: entitlement-tests -> concurrent increments settle at the quota
#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn concurrent_increments_grant_exactly_the_quota(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    let user_id = seed_user(&pool, "racer@example.com").await;
    let service = EntitlementService::new(pool.clone(), PlanCatalog::default());

    // free tier assessment quota is 2; launch well past it
    let mut handles = Vec::new();
    for _ in 0..6 {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            service.try_increment(user_id, FeatureType::Assessment).await
        }));
    }

    let mut successes = 0;
    let mut rejections = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(EntitlementError::QuotaExceeded { .. }) => rejections += 1,
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
    assert_eq!(successes, 2);
    assert_eq!(rejections, 4);

    let stored: i64 = sqlx::query_scalar(
        "SELECT count FROM usage_counters WHERE user_id = $1 AND feature_type = 'assessment'",
    )
    .bind(user_id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(stored, 2);
}

// key: entitlement-tests -> unlimited features never deny
#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn premium_tier_is_unlimited(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    let user_id = seed_user(&pool, "premium@example.com").await;
    seed_subscription(&pool, user_id, "active", "premium", "sub_premium").await;
    let service = EntitlementService::new(pool.clone(), PlanCatalog::default());

    for expected in 1..=10 {
        let used = service
            .try_increment(user_id, FeatureType::AiInsights)
            .await
            .unwrap();
        assert_eq!(used, expected);
    }

    let decision = service
        .can_use(user_id, FeatureType::AiInsights)
        .await
        .unwrap();
    assert!(decision.can_use);
    assert!(decision.unlimited);

    let snapshot = service.usage_snapshot(user_id).await.unwrap();
    let insights = snapshot
        .iter()
        .find(|f| f.feature == FeatureType::AiInsights)
        .unwrap();
    assert_eq!(insights.used, 10);
    assert!(insights.unlimited);
    assert_eq!(insights.percentage, 0);
}

// key: entitlement-tests -> canceled subscriptions fall back to free limits
#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn canceled_subscription_uses_free_limits(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    let user_id = seed_user(&pool, "lapsed@example.com").await;
    seed_subscription(&pool, user_id, "canceled", "free", "sub_lapsed").await;
    let service = EntitlementService::new(pool.clone(), PlanCatalog::default());

    let decision = service
        .can_use(user_id, FeatureType::Assessment)
        .await
        .unwrap();
    assert_eq!(decision.limit, 2);
    assert!(!decision.unlimited);
}

// key: entitlement-tests -> administrative reset zeroes every feature
#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn reset_zeroes_every_counter(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    let user_id = seed_user(&pool, "reset@example.com").await;
    let service = EntitlementService::new(pool.clone(), PlanCatalog::default());

    service
        .try_increment(user_id, FeatureType::Assessment)
        .await
        .unwrap();
    service
        .try_increment(user_id, FeatureType::JournalEntry)
        .await
        .unwrap();

    let reset = service.reset_user_usage(user_id).await.unwrap();
    assert_eq!(reset, 2);

    let snapshot = service.usage_snapshot(user_id).await.unwrap();
    assert!(snapshot.iter().all(|f| f.used == 0));
    assert_eq!(snapshot.len(), 4);
}

// key: entitlement-tests -> snapshot percentage math
#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn snapshot_reports_percentage_against_limit(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    let user_id = seed_user(&pool, "snapshot@example.com").await;
    let service = EntitlementService::new(pool.clone(), PlanCatalog::default());

    service
        .try_increment(user_id, FeatureType::Assessment)
        .await
        .unwrap();

    let snapshot = service.usage_snapshot(user_id).await.unwrap();
    let assessment = snapshot
        .iter()
        .find(|f| f.feature == FeatureType::Assessment)
        .unwrap();
    assert_eq!(assessment.used, 1);
    assert_eq!(assessment.limit, 2);
    assert_eq!(assessment.percentage, 50);

    // never-used features report zero without creating rows
    let journal = snapshot
        .iter()
        .find(|f| f.feature == FeatureType::JournalEntry)
        .unwrap();
    assert_eq!(journal.used, 0);
}

// key: entitlement-tests -> free default for users with no subscription row
#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn subscription_status_defaults_to_free(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    let user_id = seed_user(&pool, "nobody@example.com").await;
    let service = EntitlementService::new(pool.clone(), PlanCatalog::default());

    let subscription = service.subscription_status(user_id).await.unwrap();
    assert_eq!(subscription.status, "free");
    assert_eq!(subscription.plan_tier, "free");
    assert!(subscription.billing_subscription_ref.is_none());
}
