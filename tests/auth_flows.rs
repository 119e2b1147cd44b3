use chrono::{TimeZone, Utc};
use portico::{
    auth::{phone::PhoneVerifier, AuthFacade},
    clock::{Clock, ManualClock},
    config::Config,
    models::{Provider, Role, USERS},
    platform::{
        memory::{
            IdentityOp, IdpProfile, MemoryCaptcha, MemoryIdentity, MemoryOAuth, MemoryStore,
            StoreOp, SMS_CODE,
        },
        DocPath, IdentityProvider,
    },
    ErrorKind,
};
use secrecy::SecretString;
use serde_json::{json, Value};
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

struct Env {
    identity: Arc<MemoryIdentity>,
    store: Arc<MemoryStore>,
    clock: Arc<ManualClock>,
    auth: AuthFacade<MemoryIdentity, MemoryStore>,
}

fn env() -> Env {
    let identity = Arc::new(MemoryIdentity::new());
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 10, 16, 9, 0, 0).unwrap(),
    ));
    let config = Arc::new(Config::new(
        "demo".to_string(),
        SecretString::from("key".to_string()),
    ));
    let auth = AuthFacade::new(identity.clone(), store.clone(), config, clock.clone());
    Env {
        identity,
        store,
        clock,
        auth,
    }
}

fn password() -> SecretString {
    SecretString::from("Passw0rd!".to_string())
}

fn field(store: &MemoryStore, uid: &str, name: &str) -> Option<Value> {
    store
        .document(&DocPath::new(USERS, uid))
        .and_then(|fields| fields.get(name).cloned())
}

#[tokio::test]
async fn sign_up_with_phone_stores_normalized_number() {
    let env = env();
    let user = env
        .auth
        .sign_up_with_email("a@x.com", &password(), "Alice", Some("010-1234-5678"))
        .await
        .unwrap();

    assert_eq!(user.profile.phone_number.as_deref(), Some("+821012345678"));
    assert_eq!(field(&env.store, &user.uid, "phoneNumber"), Some(json!("+821012345678")));
    assert_eq!(field(&env.store, &user.uid, "phoneVerified"), Some(json!(true)));
    assert_eq!(field(&env.store, &user.uid, "role"), Some(json!("user")));
    assert_eq!(field(&env.store, &user.uid, "analysisCount"), Some(json!(0)));
    assert_eq!(env.identity.verification_emails(), vec![user.uid.clone()]);
    assert_eq!(env.auth.current_user().map(|current| current.uid), Some(user.uid));
}

#[tokio::test]
async fn duplicate_phone_creates_no_account() {
    let env = env();
    env.store.insert(
        &DocPath::new(USERS, "existing"),
        json!({"uid": "existing", "phoneNumber": "+821012345678"})
            .as_object()
            .cloned()
            .unwrap_or_default(),
    );

    let err = env
        .auth
        .sign_up_with_email("b@x.com", &password(), "Bob", Some("01012345678"))
        .await
        .unwrap_err();
    assert!(err.is(ErrorKind::DuplicatePhone));
    assert_eq!(env.identity.account_count(), 0);
    assert_eq!(env.store.count(USERS), 1);
}

#[tokio::test]
async fn trunk_prefixed_international_phone_is_a_duplicate() {
    let env = env();
    env.auth
        .sign_up_with_email("j@x.com", &password(), "Jin", Some("010-1234-5678"))
        .await
        .unwrap();

    let err = env
        .auth
        .sign_up_with_email("k@x.com", &password(), "Kim", Some("+82 010-1234-5678"))
        .await
        .unwrap_err();
    assert!(err.is(ErrorKind::DuplicatePhone));
    assert_eq!(env.identity.account_count(), 1);
}

#[tokio::test]
async fn failed_profile_write_rolls_back_identity() {
    let env = env();
    env.store.fail_next(StoreOp::Set, USERS, "unavailable");

    let err = env
        .auth
        .sign_up_with_email("c@x.com", &password(), "Carol", None)
        .await
        .unwrap_err();
    assert!(err.is(ErrorKind::ServiceUnavailable));
    assert!(env.identity.account_by_email("c@x.com").is_none());
    assert_eq!(env.store.count(USERS), 0);
    assert!(env.auth.current_user().is_none());
}

#[tokio::test]
async fn duplicate_email_is_translated() {
    let env = env();
    env.auth
        .sign_up_with_email("dup@x.com", &password(), "First", None)
        .await
        .unwrap();
    let err = env
        .auth
        .sign_up_with_email("DUP@x.com", &password(), "Second", None)
        .await
        .unwrap_err();
    assert!(err.is(ErrorKind::EmailAlreadyInUse));
    assert_eq!(err.code().as_deref(), Some("auth/email-already-in-use"));
}

#[tokio::test]
async fn sign_in_without_profile_creates_default() {
    let env = env();
    env.identity
        .create_user("legacy@x.com", &password())
        .await
        .unwrap();

    let user = env
        .auth
        .sign_in_with_email("legacy@x.com", &password())
        .await
        .unwrap();
    assert_eq!(user.profile.role, Role::User);
    assert_eq!(user.profile.analysis_count, 0);
    assert_eq!(user.profile.display_name, "legacy");
    assert_eq!(user.email.as_deref(), Some("legacy@x.com"));
    assert_eq!(field(&env.store, &user.uid, "role"), Some(json!("user")));
}

#[tokio::test]
async fn sign_in_refreshes_last_login() {
    let env = env();
    let created = env
        .auth
        .sign_up_with_email("d@x.com", &password(), "Dana", None)
        .await
        .unwrap();
    env.auth.sign_out().await.unwrap();
    assert!(env.auth.current_user().is_none());

    env.clock.advance(chrono::Duration::hours(3));
    let user = env
        .auth
        .sign_in_with_email("d@x.com", &password())
        .await
        .unwrap();
    assert_eq!(user.uid, created.uid);
    assert_eq!(user.profile.last_login_at, env.clock.now());
    assert_eq!(
        field(&env.store, &user.uid, "lastLoginAt"),
        Some(json!("2026-10-16T12:00:00.000Z"))
    );
}

#[tokio::test]
async fn wrong_password_is_invalid_credential() {
    let env = env();
    env.auth
        .sign_up_with_email("e@x.com", &password(), "Eve", None)
        .await
        .unwrap();
    let err = env
        .auth
        .sign_in_with_email("e@x.com", &SecretString::from("nope-nope".to_string()))
        .await
        .unwrap_err();
    assert!(err.is(ErrorKind::InvalidCredential));
}

#[tokio::test]
async fn google_sign_in_creates_profile_with_provider() {
    let env = env();
    let flow = MemoryOAuth::new(IdpProfile {
        email: "g@x.com".to_string(),
        name: "Gina".to_string(),
        picture: Some("https://img.test/g.png".to_string()),
    });

    let user = env.auth.sign_in_with_google(&flow).await.unwrap();
    assert_eq!(user.profile.provider, Provider::Google);
    assert_eq!(user.profile.display_name, "Gina");
    assert_eq!(field(&env.store, &user.uid, "photoURL"), Some(json!("https://img.test/g.png")));

    let err = env
        .auth
        .sign_in_with_google(&MemoryOAuth::blocked())
        .await
        .unwrap_err();
    assert!(err.is(ErrorKind::PopupBlocked));
}

#[tokio::test]
async fn reset_password_validates_and_sends() {
    let env = env();
    let err = env.auth.reset_password("not-an-email").await.unwrap_err();
    assert!(err.is(ErrorKind::InvalidEmail));

    env.auth
        .sign_up_with_email("f@x.com", &password(), "Finn", None)
        .await
        .unwrap();
    env.auth.reset_password(" F@x.com ").await.unwrap();
    assert_eq!(env.identity.password_resets(), vec!["f@x.com".to_string()]);

    env.identity
        .fail_next(IdentityOp::SendPasswordReset, "auth/too-many-requests");
    let err = env.auth.reset_password("f@x.com").await.unwrap_err();
    assert!(err.is(ErrorKind::TooManyRequests));
}

#[tokio::test]
async fn listener_sees_sign_in_and_sign_out() {
    let env = env();
    let seen: Arc<Mutex<Vec<Option<String>>>> = Arc::default();
    let sink = seen.clone();
    let subscription = env.auth.on_auth_state_changed(move |user| {
        if let Ok(mut seen) = sink.lock() {
            seen.push(user.map(|user| user.uid));
        }
    });
    assert!(subscription.is_active());

    tokio::time::sleep(Duration::from_millis(20)).await;
    let user = env
        .auth
        .sign_up_with_email("h@x.com", &password(), "Hana", None)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    env.auth.sign_out().await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    subscription.unsubscribe();

    let seen = seen.lock().map(|seen| seen.clone()).unwrap_or_default();
    assert_eq!(seen, vec![None, Some(user.uid), None]);
}

#[tokio::test]
async fn email_verification_is_mirrored_into_profile() {
    let env = env();
    let user = env
        .auth
        .sign_up_with_email("i@x.com", &password(), "Ian", None)
        .await
        .unwrap();
    assert!(!env.auth.refresh_email_verification().await.unwrap());

    env.identity.mark_email_verified(&user.uid);
    assert!(env.auth.refresh_email_verification().await.unwrap());
    assert_eq!(field(&env.store, &user.uid, "emailVerified"), Some(json!(true)));
    assert!(env
        .auth
        .current_user()
        .is_some_and(|current| current.email_verified));
}

#[tokio::test]
async fn phone_round_trip_through_captcha() {
    let identity = Arc::new(MemoryIdentity::new());
    let widgets = Arc::new(MemoryCaptcha::new());
    let config = Arc::new(Config::new(
        "demo".to_string(),
        SecretString::from("key".to_string()),
    ));
    let verifier = PhoneVerifier::new(identity.clone(), widgets.clone(), config);

    let session = verifier.setup_recaptcha("recaptcha-container").await.unwrap();
    let confirmation = verifier
        .send_verification_code(&session, "010 9876 5432")
        .await
        .unwrap();
    assert_eq!(confirmation.phone_number(), "+821098765432");
    assert!(!confirmation.is_bypassed());
    assert_eq!(identity.sms_sent(), vec!["+821098765432".to_string()]);

    let err = verifier
        .confirm_verification_code(&confirmation, "000000")
        .await
        .unwrap_err();
    assert!(err.is(ErrorKind::InvalidVerificationCode));
    let verified = verifier
        .confirm_verification_code(&confirmation, SMS_CODE)
        .await
        .unwrap();
    assert_eq!(verified, "+821098765432");

    verifier.cleanup_recaptcha(session).await;
    assert!(widgets.active().is_empty());
}
