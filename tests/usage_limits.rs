use chrono::{Duration, TimeZone, Utc};
use portico::{
    analysis::AnalysisFacade,
    clock::ManualClock,
    config::Config,
    models::{UsageStatus, USERS},
    platform::{memory::MemoryStore, DocPath},
    usage::UsageFacade,
    Error, ErrorKind,
};
use secrecy::SecretString;
use serde_json::{json, Value};
use std::sync::Arc;

struct Env {
    store: Arc<MemoryStore>,
    clock: Arc<ManualClock>,
    usage: UsageFacade<MemoryStore>,
}

fn env() -> Env {
    let store = Arc::new(MemoryStore::new());
    // 18:00 in the default usage timezone (UTC+9)
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 10, 16, 9, 0, 0).unwrap(),
    ));
    let config = Arc::new(Config::new(
        "demo".to_string(),
        SecretString::from("key".to_string()),
    ));
    let usage = UsageFacade::new(store.clone(), config, clock.clone());
    Env {
        store,
        clock,
        usage,
    }
}

fn seed(store: &MemoryStore, uid: &str, profile: &Value) {
    store.insert(
        &DocPath::new(USERS, uid),
        profile.as_object().cloned().unwrap_or_default(),
    );
}

fn ai_usage(store: &MemoryStore, uid: &str) -> Option<Value> {
    store
        .document(&DocPath::new(USERS, uid))
        .and_then(|fields| fields.get("aiUsage").cloned())
}

#[tokio::test]
async fn fresh_user_has_full_quota() {
    let env = env();
    seed(&env.store, "u1", &json!({"uid": "u1", "role": "user"}));

    let status = env.usage.check_ai_usage_limit("u1").await.unwrap();
    assert_eq!(
        status,
        UsageStatus {
            usage_count: 0,
            daily_limit: 5,
            remaining_usage: Some(5),
            can_use: true,
            is_admin: false,
        }
    );
    assert!(ai_usage(&env.store, "u1").is_none());
}

#[tokio::test]
async fn increment_at_limit_is_rejected_without_write() {
    let env = env();
    let usage = json!({"usageCount": 5, "dailyLimit": 5, "lastUsedDate": "2026-10-16"});
    seed(&env.store, "u1", &json!({"uid": "u1", "role": "user", "aiUsage": usage}));

    let err = env.usage.increment_ai_usage("u1").await.unwrap_err();
    assert!(err.is(ErrorKind::UsageLimitExceeded));
    match err {
        Error::UsageLimit(status) => {
            assert_eq!(status.remaining_usage, Some(0));
            assert!(!status.can_use);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(ai_usage(&env.store, "u1"), Some(usage));
}

#[tokio::test]
async fn stale_date_resets_then_counts_one() {
    let env = env();
    seed(
        &env.store,
        "u1",
        &json!({
            "uid": "u1",
            "role": "user",
            "aiUsage": {"usageCount": 5, "dailyLimit": 5, "lastUsedDate": "2026-10-15"}
        }),
    );

    let status = env.usage.check_ai_usage_limit("u1").await.unwrap();
    assert_eq!(status.usage_count, 0);
    assert!(status.can_use);

    let status = env.usage.increment_ai_usage("u1").await.unwrap();
    assert_eq!(status.usage_count, 1);
    assert_eq!(status.remaining_usage, Some(4));
    assert_eq!(
        ai_usage(&env.store, "u1"),
        Some(json!({"usageCount": 1, "dailyLimit": 5, "lastUsedDate": "2026-10-16"}))
    );
}

#[tokio::test]
async fn day_rolls_over_in_usage_timezone() {
    let env = env();
    seed(&env.store, "u1", &json!({"uid": "u1", "role": "user"}));
    env.usage.increment_ai_usage("u1").await.unwrap();
    assert_eq!(env.usage.today(), "2026-10-16");

    // 14:59 UTC is still the same day at UTC+9, 15:00 UTC is the next one
    env.clock.set(Utc.with_ymd_and_hms(2026, 10, 16, 14, 59, 0).unwrap());
    assert_eq!(env.usage.check_ai_usage_limit("u1").await.unwrap().usage_count, 1);
    env.clock.advance(Duration::minutes(1));
    assert_eq!(env.usage.today(), "2026-10-17");
    assert_eq!(env.usage.check_ai_usage_limit("u1").await.unwrap().usage_count, 0);
}

#[tokio::test]
async fn admins_are_counted_but_never_denied() {
    let env = env();
    seed(
        &env.store,
        "root",
        &json!({
            "uid": "root",
            "role": "admin",
            "aiUsage": {"usageCount": 5, "dailyLimit": 5, "lastUsedDate": "2026-10-16"}
        }),
    );

    let status = env.usage.increment_ai_usage("root").await.unwrap();
    assert_eq!(status.usage_count, 6);
    assert_eq!(status.remaining_usage, None);
    assert!(status.can_use && status.is_admin);
}

#[tokio::test]
async fn daily_limit_is_admin_only_and_clamped() {
    let env = env();
    seed(&env.store, "root", &json!({"uid": "root", "role": "admin"}));
    seed(&env.store, "u1", &json!({"uid": "u1", "role": "user"}));

    let err = env.usage.set_daily_limit("u1", "u1", 50).await.unwrap_err();
    assert!(err.is(ErrorKind::PermissionDenied));

    assert_eq!(env.usage.set_daily_limit("root", "u1", 5_000).await.unwrap(), 1_000);
    assert_eq!(env.usage.set_daily_limit("root", "u1", -3).await.unwrap(), 0);
    let status = env.usage.check_ai_usage_limit("u1").await.unwrap();
    assert_eq!(status.daily_limit, 0);
    assert!(!status.can_use);

    let err = env.usage.set_daily_limit("root", "ghost", 3).await.unwrap_err();
    assert!(err.is(ErrorKind::NotFound));
}

#[tokio::test]
async fn admin_stats_cover_users_and_analyses() {
    let env = env();
    let now = "2026-10-16T09:00:00.000Z";
    seed(
        &env.store,
        "root",
        &json!({"uid": "root", "role": "admin", "provider": "email", "createdAt": "2026-01-01T00:00:00.000Z", "lastLoginAt": now}),
    );
    seed(
        &env.store,
        "u1",
        &json!({
            "uid": "u1",
            "role": "user",
            "provider": "google",
            "createdAt": now,
            "lastLoginAt": now,
            "aiUsage": {"usageCount": 7, "dailyLimit": 10, "lastUsedDate": "2026-10-16"}
        }),
    );

    let analysis = AnalysisFacade::new(env.store.clone(), env.clock.clone());
    analysis
        .save_analysis_result("u1", &json!({"findings": [{"severity": "HIGH"}]}))
        .await
        .unwrap();

    let stats = env.usage.get_system_stats("root").await.unwrap();
    assert_eq!(stats.total_users, 2);
    assert_eq!(stats.users_by_role.admin, 1);
    assert_eq!(stats.users_by_provider.google, 1);
    assert_eq!(stats.new_users_last_7_days, 1);
    assert_eq!(stats.active_users_last_30_days, 2);
    assert_eq!(stats.total_analyses, 1);

    let ai = env.usage.get_ai_usage_stats("root").await.unwrap();
    assert_eq!(ai.date, "2026-10-16");
    assert_eq!(ai.active_users_today, 1);
    assert_eq!(ai.total_usage_today, 7);
    assert_eq!(ai.distribution.get("5+"), Some(&1));
    assert_eq!(ai.distribution.get("0"), Some(&1));

    let users = env.usage.get_all_users("root").await.unwrap();
    assert_eq!(users.first().map(|user| user.uid.as_str()), Some("u1"));

    let err = env.usage.get_system_stats("u1").await.unwrap_err();
    assert!(err.is(ErrorKind::PermissionDenied));
}

#[tokio::test]
async fn corrupt_stored_counters_are_clamped_not_fatal() {
    let env = env();
    seed(&env.store, "root", &json!({"uid": "root", "role": "admin"}));
    seed(
        &env.store,
        "u1",
        &json!({"uid": "u1", "role": "user", "aiUsage": {"usageCount": 1e20, "lastUsedDate": "2026-10-16"}}),
    );
    seed(
        &env.store,
        "u2",
        &json!({"uid": "u2", "role": "owner", "analysisCount": 2.5, "aiUsage": {"usageCount": null, "dailyLimit": null}}),
    );
    seed(&env.store, "u3", &json!({"uid": "u3", "createdAt": "yesterday"}));

    let status = env.usage.check_ai_usage_limit("u1").await.unwrap();
    assert_eq!(status.usage_count, 10_000);
    assert!(!status.can_use);
    let err = env.usage.increment_ai_usage("u1").await.unwrap_err();
    assert!(err.is(ErrorKind::UsageLimitExceeded));

    let status = env.usage.check_ai_usage_limit("u2").await.unwrap();
    assert_eq!((status.usage_count, status.daily_limit), (0, 5));
    assert!(!status.is_admin);

    let stats = env.usage.get_system_stats("root").await.unwrap();
    assert_eq!(stats.total_users, 3);
    assert_eq!(stats.users_by_role.user, 2);
    assert_eq!(stats.total_analyses, 2);
    assert_eq!(env.usage.get_all_users("root").await.unwrap().len(), 3);
    assert_eq!(env.usage.get_ai_usage_stats("root").await.unwrap().distribution.get("5+"), Some(&1));
}
