//! In-process platform for tests and offline development.
//!
//! Each fake keeps its state behind a `Mutex` and supports one-shot failure
//! injection, so callers can exercise the error paths of the facades without a
//! network.

use super::{
    CaptchaWidgets, Direction, DocPath, Document, DocumentStore, Fields, IdentityProvider,
    IdentitySession, IdentityUser, IdpCredential, OAuthFlow, OAuthProvider, PlatformResult, Query,
    RenderedWidget,
};
use crate::error::PlatformError;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    cmp::Ordering,
    collections::{BTreeMap, HashMap},
    sync::{
        atomic::{AtomicBool, Ordering as AtomicOrdering},
        Mutex, MutexGuard,
    },
};
use tokio::sync::oneshot;
use ulid::Ulid;

/// Code accepted by [`MemoryIdentity::confirm_phone_code`].
pub const SMS_CODE: &str = "123456";

fn poisoned() -> PlatformError {
    PlatformError::new("unavailable", "memory platform state poisoned")
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IdentityOp {
    CreateUser,
    SignIn,
    SignInWithIdp,
    SendEmailVerification,
    UpdateProfile,
    DeleteUser,
    SendPasswordReset,
    Lookup,
    SendPhoneCode,
    ConfirmPhoneCode,
}

#[derive(Debug)]
struct Account {
    user: IdentityUser,
    password: Option<String>,
}

#[derive(Debug, Default)]
struct IdentityState {
    accounts: BTreeMap<String, Account>,
    verifications: HashMap<String, String>,
    verification_emails: Vec<String>,
    password_resets: Vec<String>,
    sms_sent: Vec<String>,
    failures: HashMap<IdentityOp, PlatformError>,
    signed_in: Option<String>,
}

/// Identity provider backed by a map of accounts.
#[derive(Debug)]
pub struct MemoryIdentity {
    state: Mutex<IdentityState>,
    available: AtomicBool,
}

impl Default for MemoryIdentity {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryIdentity {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(IdentityState::default()),
            available: AtomicBool::new(true),
        }
    }

    fn state(&self) -> PlatformResult<MutexGuard<'_, IdentityState>> {
        self.state.lock().map_err(|_| poisoned())
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, AtomicOrdering::SeqCst);
    }

    /// Make the next call of `op` fail with `code`.
    pub fn fail_next(&self, op: IdentityOp, code: &str) {
        if let Ok(mut state) = self.state.lock() {
            state
                .failures
                .insert(op, PlatformError::new(code, format!("injected failure for {op:?}")));
        }
    }

    #[must_use]
    pub fn account_count(&self) -> usize {
        self.state.lock().map_or(0, |state| state.accounts.len())
    }

    #[must_use]
    pub fn account_by_email(&self, email: &str) -> Option<IdentityUser> {
        let state = self.state.lock().ok()?;
        state
            .accounts
            .values()
            .find(|account| account.user.email.as_deref() == Some(email))
            .map(|account| account.user.clone())
    }

    /// Uids that were sent a verification email, in order.
    #[must_use]
    pub fn verification_emails(&self) -> Vec<String> {
        self.state
            .lock()
            .map_or_else(|_| Vec::new(), |state| state.verification_emails.clone())
    }

    #[must_use]
    pub fn password_resets(&self) -> Vec<String> {
        self.state
            .lock()
            .map_or_else(|_| Vec::new(), |state| state.password_resets.clone())
    }

    #[must_use]
    pub fn sms_sent(&self) -> Vec<String> {
        self.state
            .lock()
            .map_or_else(|_| Vec::new(), |state| state.sms_sent.clone())
    }

    #[must_use]
    pub fn signed_in(&self) -> Option<String> {
        self.state.lock().ok()?.signed_in.clone()
    }

    /// Simulate the user clicking the verification link.
    pub fn mark_email_verified(&self, uid: &str) {
        if let Ok(mut state) = self.state.lock() {
            if let Some(account) = state.accounts.get_mut(uid) {
                account.user.email_verified = true;
            }
        }
    }

    fn take_failure(state: &mut IdentityState, op: IdentityOp) -> PlatformResult<()> {
        match state.failures.remove(&op) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn session_for(state: &mut IdentityState, user: IdentityUser) -> IdentitySession {
        state.signed_in = Some(user.uid.clone());
        IdentitySession {
            id_token: SecretString::from(format!("memory-id-token:{}", user.uid)),
            refresh_token: Some(SecretString::from(format!("memory-refresh:{}", user.uid))),
            user,
        }
    }
}

/// Payload carried in the `id_token` of credentials issued by [`MemoryOAuth`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdpProfile {
    pub email: String,
    pub name: String,
    pub picture: Option<String>,
}

impl IdentityProvider for MemoryIdentity {
    fn is_available(&self) -> bool {
        self.available.load(AtomicOrdering::SeqCst)
    }

    async fn create_user(&self, email: &str, password: &SecretString) -> PlatformResult<IdentitySession> {
        let mut state = self.state()?;
        Self::take_failure(&mut state, IdentityOp::CreateUser)?;
        if password.expose_secret().chars().count() < 6 {
            return Err(PlatformError::new("auth/weak-password", "WEAK_PASSWORD"));
        }
        if state
            .accounts
            .values()
            .any(|account| account.user.email.as_deref() == Some(email))
        {
            return Err(PlatformError::new("auth/email-already-in-use", "EMAIL_EXISTS"));
        }
        let user = IdentityUser {
            uid: Ulid::new().to_string(),
            email: Some(email.to_string()),
            ..IdentityUser::default()
        };
        state.accounts.insert(
            user.uid.clone(),
            Account {
                user: user.clone(),
                password: Some(password.expose_secret().to_string()),
            },
        );
        Ok(Self::session_for(&mut state, user))
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &SecretString,
    ) -> PlatformResult<IdentitySession> {
        let mut state = self.state()?;
        Self::take_failure(&mut state, IdentityOp::SignIn)?;
        let user = state
            .accounts
            .values()
            .find(|account| {
                account.user.email.as_deref() == Some(email)
                    && account.password.as_deref() == Some(password.expose_secret())
            })
            .map(|account| account.user.clone())
            .ok_or_else(|| {
                PlatformError::new("auth/invalid-credential", "INVALID_LOGIN_CREDENTIALS")
            })?;
        Ok(Self::session_for(&mut state, user))
    }

    async fn sign_in_with_idp(&self, credential: &IdpCredential) -> PlatformResult<IdentitySession> {
        let mut state = self.state()?;
        Self::take_failure(&mut state, IdentityOp::SignInWithIdp)?;
        let profile: IdpProfile = serde_json::from_str(credential.id_token.expose_secret())
            .map_err(|_| PlatformError::new("auth/invalid-credential", "INVALID_IDP_RESPONSE"))?;
        let existing = state
            .accounts
            .values_mut()
            .find(|account| account.user.email.as_deref() == Some(profile.email.as_str()));
        let user = if let Some(account) = existing {
            account.user.photo_url.clone_from(&profile.picture);
            account.user.clone()
        } else {
            let user = IdentityUser {
                uid: Ulid::new().to_string(),
                email: Some(profile.email.clone()),
                display_name: Some(profile.name.clone()),
                photo_url: profile.picture.clone(),
                phone_number: None,
                email_verified: true,
            };
            state.accounts.insert(
                user.uid.clone(),
                Account {
                    user: user.clone(),
                    password: None,
                },
            );
            user
        };
        Ok(Self::session_for(&mut state, user))
    }

    async fn send_email_verification(&self, session: &IdentitySession) -> PlatformResult<()> {
        let mut state = self.state()?;
        Self::take_failure(&mut state, IdentityOp::SendEmailVerification)?;
        state.verification_emails.push(session.user.uid.clone());
        Ok(())
    }

    async fn update_profile(
        &self,
        session: &IdentitySession,
        display_name: Option<&str>,
        photo_url: Option<&str>,
    ) -> PlatformResult<()> {
        let mut state = self.state()?;
        Self::take_failure(&mut state, IdentityOp::UpdateProfile)?;
        let account = state
            .accounts
            .get_mut(&session.user.uid)
            .ok_or_else(|| PlatformError::new("auth/user-not-found", "USER_NOT_FOUND"))?;
        if let Some(name) = display_name {
            account.user.display_name = Some(name.to_string());
        }
        if let Some(url) = photo_url {
            account.user.photo_url = Some(url.to_string());
        }
        Ok(())
    }

    async fn delete_user(&self, session: &IdentitySession) -> PlatformResult<()> {
        let mut state = self.state()?;
        Self::take_failure(&mut state, IdentityOp::DeleteUser)?;
        state.accounts.remove(&session.user.uid);
        if state.signed_in.as_deref() == Some(session.user.uid.as_str()) {
            state.signed_in = None;
        }
        Ok(())
    }

    async fn send_password_reset(&self, email: &str) -> PlatformResult<()> {
        let mut state = self.state()?;
        Self::take_failure(&mut state, IdentityOp::SendPasswordReset)?;
        if !state
            .accounts
            .values()
            .any(|account| account.user.email.as_deref() == Some(email))
        {
            return Err(PlatformError::new("auth/user-not-found", "EMAIL_NOT_FOUND"));
        }
        state.password_resets.push(email.to_string());
        Ok(())
    }

    async fn lookup(&self, session: &IdentitySession) -> PlatformResult<IdentityUser> {
        let mut state = self.state()?;
        Self::take_failure(&mut state, IdentityOp::Lookup)?;
        state
            .accounts
            .get(&session.user.uid)
            .map(|account| account.user.clone())
            .ok_or_else(|| PlatformError::new("auth/user-token-expired", "USER_NOT_FOUND"))
    }

    async fn send_phone_code(&self, phone_number: &str, captcha_token: &str) -> PlatformResult<String> {
        let mut state = self.state()?;
        Self::take_failure(&mut state, IdentityOp::SendPhoneCode)?;
        if captcha_token.is_empty() {
            return Err(PlatformError::new("auth/captcha-check-failed", "CAPTCHA_CHECK_FAILED"));
        }
        if !phone_number.starts_with('+') {
            return Err(PlatformError::new("auth/invalid-phone-number", "INVALID_PHONE_NUMBER"));
        }
        let verification_id = Ulid::new().to_string();
        state
            .verifications
            .insert(verification_id.clone(), phone_number.to_string());
        state.sms_sent.push(phone_number.to_string());
        Ok(verification_id)
    }

    async fn confirm_phone_code(&self, verification_id: &str, code: &str) -> PlatformResult<String> {
        let mut state = self.state()?;
        Self::take_failure(&mut state, IdentityOp::ConfirmPhoneCode)?;
        let Some(phone_number) = state.verifications.get(verification_id).cloned() else {
            return Err(PlatformError::new("auth/code-expired", "SESSION_EXPIRED"));
        };
        if code != SMS_CODE {
            return Err(PlatformError::new("auth/invalid-verification-code", "INVALID_CODE"));
        }
        state.verifications.remove(verification_id);
        Ok(phone_number)
    }

    async fn sign_out(&self) -> PlatformResult<()> {
        let mut state = self.state()?;
        state.signed_in = None;
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Get,
    Set,
    Add,
    Update,
    Delete,
    Query,
    Increment,
}

#[derive(Debug, Default)]
struct StoreState {
    collections: BTreeMap<String, BTreeMap<String, Fields>>,
    failures: Vec<(StoreOp, String, PlatformError)>,
}

/// Document store with the ordering and filtering rules of the hosted one:
/// documents missing an ordered field are excluded from ordered queries.
#[derive(Debug)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
    available: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(StoreState::default()),
            available: AtomicBool::new(true),
        }
    }

    fn state(&self) -> PlatformResult<MutexGuard<'_, StoreState>> {
        self.state.lock().map_err(|_| poisoned())
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, AtomicOrdering::SeqCst);
    }

    /// Make the next `op` on `collection` fail with `code`.
    pub fn fail_next(&self, op: StoreOp, collection: &str, code: &str) {
        if let Ok(mut state) = self.state.lock() {
            state.failures.push((
                op,
                collection.to_string(),
                PlatformError::new(code, format!("injected failure for {op:?} on {collection}")),
            ));
        }
    }

    /// Seed a document directly, bypassing failure injection.
    pub fn insert(&self, path: &DocPath, fields: Fields) {
        if let Ok(mut state) = self.state.lock() {
            state
                .collections
                .entry(path.collection().to_string())
                .or_default()
                .insert(path.id().to_string(), fields);
        }
    }

    #[must_use]
    pub fn document(&self, path: &DocPath) -> Option<Fields> {
        let state = self.state.lock().ok()?;
        state.collections.get(path.collection())?.get(path.id()).cloned()
    }

    #[must_use]
    pub fn count(&self, collection: &str) -> usize {
        self.state.lock().map_or(0, |state| {
            state.collections.get(collection).map_or(0, BTreeMap::len)
        })
    }

    fn take_failure(state: &mut StoreState, op: StoreOp, collection: &str) -> PlatformResult<()> {
        if let Some(index) = state
            .failures
            .iter()
            .position(|(failing_op, failing, _)| *failing_op == op && failing == collection)
        {
            let (_, _, err) = state.failures.remove(index);
            return Err(err);
        }
        Ok(())
    }
}

fn not_found(path: &DocPath) -> PlatformError {
    PlatformError::new("not-found", format!("no document at {path}"))
}

/// Read a dotted field path out of a document.
pub(crate) fn field_at<'a>(fields: &'a Fields, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = fields.get(first)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Write a dotted field path, creating intermediate maps.
pub(crate) fn set_field_at(fields: &mut Fields, path: &str, value: Value) {
    let mut segments: Vec<&str> = path.split('.').collect();
    let Some(last) = segments.pop() else {
        return;
    };
    let mut current = fields;
    for segment in segments {
        let entry = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Fields::new()));
        if !entry.is_object() {
            *entry = Value::Object(Fields::new());
        }
        let Value::Object(next) = entry else {
            return;
        };
        current = next;
    }
    current.insert(last.to_string(), value);
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

pub(crate) fn compare_values(left: &Value, right: &Value) -> Ordering {
    match (left, right) {
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Number(a), Value::Number(b)) => {
            let a = a.as_f64().unwrap_or(0.0);
            let b = b.as_f64().unwrap_or(0.0);
            a.partial_cmp(&b).unwrap_or(Ordering::Equal)
        }
        (Value::String(a), Value::String(b)) => a.cmp(b),
        _ => type_rank(left).cmp(&type_rank(right)),
    }
}

impl DocumentStore for MemoryStore {
    fn is_available(&self) -> bool {
        self.available.load(AtomicOrdering::SeqCst)
    }

    async fn get(&self, path: &DocPath) -> PlatformResult<Option<Document>> {
        let mut state = self.state()?;
        Self::take_failure(&mut state, StoreOp::Get, path.collection())?;
        Ok(state
            .collections
            .get(path.collection())
            .and_then(|documents| documents.get(path.id()))
            .map(|fields| Document {
                id: path.id().to_string(),
                fields: fields.clone(),
            }))
    }

    async fn set(&self, path: &DocPath, fields: Fields) -> PlatformResult<()> {
        let mut state = self.state()?;
        Self::take_failure(&mut state, StoreOp::Set, path.collection())?;
        state
            .collections
            .entry(path.collection().to_string())
            .or_default()
            .insert(path.id().to_string(), fields);
        Ok(())
    }

    async fn add(&self, collection: &str, fields: Fields) -> PlatformResult<String> {
        let mut state = self.state()?;
        Self::take_failure(&mut state, StoreOp::Add, collection)?;
        let id = Ulid::new().to_string();
        state
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), fields);
        Ok(id)
    }

    async fn update(&self, path: &DocPath, fields: Fields) -> PlatformResult<()> {
        let mut state = self.state()?;
        Self::take_failure(&mut state, StoreOp::Update, path.collection())?;
        let document = state
            .collections
            .get_mut(path.collection())
            .and_then(|documents| documents.get_mut(path.id()))
            .ok_or_else(|| not_found(path))?;
        for (key, value) in fields {
            set_field_at(document, &key, value);
        }
        Ok(())
    }

    async fn delete(&self, path: &DocPath) -> PlatformResult<()> {
        let mut state = self.state()?;
        Self::take_failure(&mut state, StoreOp::Delete, path.collection())?;
        if let Some(documents) = state.collections.get_mut(path.collection()) {
            documents.remove(path.id());
        }
        Ok(())
    }

    async fn query(&self, query: &Query) -> PlatformResult<Vec<Document>> {
        let mut state = self.state()?;
        Self::take_failure(&mut state, StoreOp::Query, &query.collection)?;
        let Some(documents) = state.collections.get(&query.collection) else {
            return Ok(Vec::new());
        };

        let mut matches: Vec<Document> = documents
            .iter()
            .filter(|(_, fields)| {
                query
                    .filters
                    .iter()
                    .all(|(field, expected)| field_at(fields, field) == Some(expected))
            })
            .filter(|(_, fields)| {
                query
                    .order_by
                    .iter()
                    .all(|(field, _)| field_at(fields, field).is_some())
            })
            .map(|(id, fields)| Document {
                id: id.clone(),
                fields: fields.clone(),
            })
            .collect();

        matches.sort_by(|left, right| {
            for (field, direction) in &query.order_by {
                let ordering = match (field_at(&left.fields, field), field_at(&right.fields, field)) {
                    (Some(a), Some(b)) => compare_values(a, b),
                    _ => Ordering::Equal,
                };
                let ordering = match direction {
                    Direction::Ascending => ordering,
                    Direction::Descending => ordering.reverse(),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });

        if let Some(limit) = query.limit {
            matches.truncate(limit);
        }
        Ok(matches)
    }

    async fn increment(&self, path: &DocPath, field: &str, delta: i64) -> PlatformResult<()> {
        let mut state = self.state()?;
        Self::take_failure(&mut state, StoreOp::Increment, path.collection())?;
        let document = state
            .collections
            .get_mut(path.collection())
            .and_then(|documents| documents.get_mut(path.id()))
            .ok_or_else(|| not_found(path))?;
        let next = match field_at(document, field) {
            Some(Value::Number(current)) => match current.as_i64() {
                Some(current) => Value::from(current.saturating_add(delta)),
                None => Value::from(current.as_f64().unwrap_or(0.0) + delta as f64),
            },
            _ => Value::from(delta),
        };
        set_field_at(document, field, next);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct CaptchaState {
    next_id: u64,
    widgets: BTreeMap<String, String>,
    cleared: Vec<String>,
    stall_ready: bool,
    stalled: Vec<oneshot::Sender<()>>,
    verify_failure: Option<PlatformError>,
}

/// Challenge widget that renders instantly and always solves, unless told otherwise.
#[derive(Debug, Default)]
pub struct MemoryCaptcha {
    state: Mutex<CaptchaState>,
}

impl MemoryCaptcha {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> PlatformResult<MutexGuard<'_, CaptchaState>> {
        self.state.lock().map_err(|_| poisoned())
    }

    /// Render widgets that never report ready.
    pub fn stall_ready(&self, stall: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.stall_ready = stall;
        }
    }

    /// Report ready for every widget rendered while stalled.
    pub fn release_stalled(&self) {
        if let Ok(mut state) = self.state.lock() {
            for ready in state.stalled.drain(..) {
                let _ = ready.send(());
            }
        }
    }

    pub fn fail_next_verify(&self, code: &str) {
        if let Ok(mut state) = self.state.lock() {
            state.verify_failure = Some(PlatformError::new(code, "injected captcha failure"));
        }
    }

    /// Widget id → container id of widgets that are currently rendered.
    #[must_use]
    pub fn active(&self) -> BTreeMap<String, String> {
        self.state
            .lock()
            .map_or_else(|_| BTreeMap::new(), |state| state.widgets.clone())
    }

    #[must_use]
    pub fn cleared(&self) -> Vec<String> {
        self.state
            .lock()
            .map_or_else(|_| Vec::new(), |state| state.cleared.clone())
    }
}

impl CaptchaWidgets for MemoryCaptcha {
    async fn render(&self, container_id: &str) -> PlatformResult<RenderedWidget> {
        let mut state = self.state()?;
        state.next_id += 1;
        let widget_id = format!("widget-{}", state.next_id);
        state
            .widgets
            .insert(widget_id.clone(), container_id.to_string());
        let (ready_tx, ready) = oneshot::channel();
        if state.stall_ready {
            state.stalled.push(ready_tx);
        } else {
            let _ = ready_tx.send(());
        }
        Ok(RenderedWidget { widget_id, ready })
    }

    async fn verify(&self, widget_id: &str) -> PlatformResult<String> {
        let mut state = self.state()?;
        if let Some(err) = state.verify_failure.take() {
            return Err(err);
        }
        if !state.widgets.contains_key(widget_id) {
            return Err(PlatformError::new(
                "auth/captcha-check-failed",
                format!("widget {widget_id} is not rendered"),
            ));
        }
        Ok(format!("captcha-token:{widget_id}"))
    }

    async fn clear(&self, widget_id: &str, _container_id: &str) -> PlatformResult<()> {
        let mut state = self.state()?;
        state.widgets.remove(widget_id);
        state.cleared.push(widget_id.to_string());
        Ok(())
    }
}

/// OAuth popup that either is blocked, gets closed, or returns a fixed profile.
#[derive(Debug, Clone)]
pub struct MemoryOAuth {
    popup_blocked: bool,
    profile: Option<IdpProfile>,
}

impl MemoryOAuth {
    #[must_use]
    pub fn new(profile: IdpProfile) -> Self {
        Self {
            popup_blocked: false,
            profile: Some(profile),
        }
    }

    #[must_use]
    pub fn blocked() -> Self {
        Self {
            popup_blocked: true,
            profile: None,
        }
    }

    #[must_use]
    pub fn closed_by_user() -> Self {
        Self {
            popup_blocked: false,
            profile: None,
        }
    }
}

impl OAuthFlow for MemoryOAuth {
    async fn probe_popup(&self) -> PlatformResult<()> {
        if self.popup_blocked {
            return Err(PlatformError::new("auth/popup-blocked", "popup blocked"));
        }
        Ok(())
    }

    async fn authorize(&self, provider: OAuthProvider) -> PlatformResult<IdpCredential> {
        let profile = self
            .profile
            .as_ref()
            .ok_or_else(|| PlatformError::new("auth/popup-closed-by-user", "popup closed"))?;
        let token = serde_json::to_string(profile)
            .map_err(|err| PlatformError::new("auth/invalid-credential", err.to_string()))?;
        Ok(IdpCredential {
            provider,
            id_token: SecretString::from(token),
        })
    }
}
