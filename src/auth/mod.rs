//! Sign-up, sign-in and session observation.
//!
//! The facade keeps the current platform session and publishes the signed-in
//! user on a `watch` channel; [`AuthFacade::on_auth_state_changed`] forwards
//! that channel to a callback.

pub mod phone;
pub mod utils;

use crate::{
    clock::Clock,
    config::Config,
    error::{Error, ErrorKind},
    models::{self, format_timestamp, AiUsage, Preferences, Provider, Role, UserProfile, USERS},
    platform::{
        ensure_available, DocPath, DocumentStore, Fields, IdentityProvider, IdentitySession,
        OAuthFlow, OAuthProvider, Query,
    },
    users::load_profile,
};
use secrecy::SecretString;
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, info, instrument, warn};
use utils::{normalize_email, normalize_phone, valid_email};

/// Identity fields merged with the stored profile.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    #[serde(rename = "photoURL")]
    pub photo_url: Option<String>,
    pub email_verified: bool,
    pub phone_number: Option<String>,
    pub profile: UserProfile,
}

impl AuthUser {
    fn new(session: &IdentitySession, profile: UserProfile) -> Self {
        let user = &session.user;
        Self {
            uid: user.uid.clone(),
            email: user.email.clone(),
            display_name: user.display_name.clone(),
            photo_url: user.photo_url.clone(),
            email_verified: user.email_verified,
            phone_number: user.phone_number.clone(),
            profile,
        }
    }
}

/// Handle returned by [`AuthFacade::on_auth_state_changed`].
#[derive(Debug)]
pub struct Subscription {
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    fn noop() -> Self {
        Self { task: None }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stop delivering auth state changes.
    pub fn unsubscribe(self) {
        if let Some(task) = self.task {
            task.abort();
        }
    }
}

pub struct AuthFacade<I, D> {
    identity: Arc<I>,
    store: Arc<D>,
    config: Arc<Config>,
    clock: Arc<dyn Clock>,
    session: Mutex<Option<IdentitySession>>,
    state: watch::Sender<Option<AuthUser>>,
}

impl<I: IdentityProvider, D: DocumentStore> AuthFacade<I, D> {
    pub fn new(identity: Arc<I>, store: Arc<D>, config: Arc<Config>, clock: Arc<dyn Clock>) -> Self {
        let (state, _) = watch::channel(None);
        Self {
            identity,
            store,
            config,
            clock,
            session: Mutex::new(None),
            state,
        }
    }

    fn ensure_ready(&self) -> Result<(), Error> {
        ensure_available(self.identity.is_available())?;
        ensure_available(self.store.is_available())
    }

    fn current_session(&self) -> Option<IdentitySession> {
        self.session.lock().ok().and_then(|session| session.clone())
    }

    fn publish(&self, session: Option<IdentitySession>, user: Option<AuthUser>) {
        if let Ok(mut slot) = self.session.lock() {
            *slot = session;
        }
        self.state.send_replace(user);
    }

    fn new_profile(&self, session: &IdentitySession, display_name: &str, provider: Provider) -> UserProfile {
        let now = self.clock.now();
        UserProfile {
            uid: session.user.uid.clone(),
            email: session.user.email.clone().unwrap_or_default(),
            display_name: display_name.to_string(),
            photo_url: session.user.photo_url.clone(),
            role: Role::User,
            email_verified: session.user.email_verified,
            phone_number: session.user.phone_number.clone(),
            phone_verified: false,
            created_at: now,
            last_login_at: now,
            analysis_count: 0,
            preferences: Preferences::default(),
            provider,
            ai_usage: Some(AiUsage {
                usage_count: 0,
                daily_limit: Some(i64::from(self.config.default_daily_limit())),
                last_used_date: None,
            }),
        }
    }

    async fn phone_taken(&self, phone_number: &str) -> Result<bool, Error> {
        let query = Query::new(USERS)
            .where_eq("phoneNumber", phone_number)
            .limit(1);
        Ok(!self.store.query(&query).await?.is_empty())
    }

    /// Register a new email/password account and its profile document.
    ///
    /// The verification mail and the display name on the identity record are
    /// best-effort. If the profile write fails the identity record is removed.
    ///
    /// # Errors
    /// `InvalidEmail`, `InvalidArgument` (blank name), `DuplicatePhone`, or the
    /// translated platform error.
    #[instrument(skip(self, password))]
    pub async fn sign_up_with_email(
        &self,
        email: &str,
        password: &SecretString,
        display_name: &str,
        phone_number: Option<&str>,
    ) -> Result<AuthUser, Error> {
        self.ensure_ready()?;
        let email = normalize_email(email);
        if !valid_email(&email) {
            return Err(Error::Precondition(ErrorKind::InvalidEmail));
        }
        let display_name = display_name.trim();
        if display_name.is_empty() {
            return Err(Error::Precondition(ErrorKind::InvalidArgument));
        }

        let phone_number = match phone_number.map(str::trim).filter(|phone| !phone.is_empty()) {
            Some(raw) => {
                let normalized = normalize_phone(raw)?;
                if self.phone_taken(&normalized).await? {
                    return Err(Error::Precondition(ErrorKind::DuplicatePhone));
                }
                Some(normalized)
            }
            None => None,
        };

        let mut session = self.identity.create_user(&email, password).await?;

        if let Err(err) = self.identity.send_email_verification(&session).await {
            warn!("Failed to send verification email: {err}");
        }
        match self
            .identity
            .update_profile(&session, Some(display_name), None)
            .await
        {
            Ok(()) => session.user.display_name = Some(display_name.to_string()),
            Err(err) => warn!("Failed to set display name: {err}"),
        }

        let mut profile = self.new_profile(&session, display_name, Provider::Email);
        profile.phone_verified = phone_number.is_some();
        profile.phone_number = phone_number;

        let path = DocPath::new(USERS, &session.user.uid);
        let written = match models::encode(&profile) {
            Ok(fields) => self.store.set(&path, fields).await.map_err(Error::from),
            Err(err) => Err(err),
        };
        if let Err(err) = written {
            warn!("Failed to write profile for {}: {err}", session.user.uid);
            if let Err(rollback) = self.identity.delete_user(&session).await {
                warn!("Failed to roll back identity record {}: {rollback}", session.user.uid);
            }
            self.publish(None, None);
            return Err(err);
        }

        info!("signed up {}", session.user.uid);
        let user = AuthUser::new(&session, profile);
        self.publish(Some(session), Some(user.clone()));
        Ok(user)
    }

    /// Load the profile of a freshly signed-in session, creating a default one
    /// when it is missing and refreshing `lastLoginAt` otherwise.
    async fn ensure_profile(
        &self,
        session: &IdentitySession,
        provider: Provider,
    ) -> Result<UserProfile, Error> {
        let path = DocPath::new(USERS, &session.user.uid);
        let now = self.clock.now();
        match load_profile(self.store.as_ref(), &session.user.uid).await? {
            Some(mut profile) => {
                let mut fields = Fields::new();
                fields.insert("lastLoginAt".to_string(), Value::from(format_timestamp(&now)));
                if provider == Provider::Google {
                    if let Some(photo_url) = &session.user.photo_url {
                        fields.insert("photoURL".to_string(), Value::from(photo_url.clone()));
                        profile.photo_url = Some(photo_url.clone());
                    }
                }
                match self.store.update(&path, fields).await {
                    Ok(()) => profile.last_login_at = now,
                    Err(err) => warn!("Failed to update last login: {err}"),
                }
                Ok(profile)
            }
            None => {
                let display_name = session
                    .user
                    .display_name
                    .clone()
                    .or_else(|| {
                        session
                            .user
                            .email
                            .as_deref()
                            .and_then(|email| email.split('@').next())
                            .map(str::to_string)
                    })
                    .unwrap_or_default();
                let profile = self.new_profile(session, &display_name, provider);
                self.store.set(&path, models::encode(&profile)?).await?;
                debug!("created default profile for {}", session.user.uid);
                Ok(profile)
            }
        }
    }

    /// # Errors
    /// `InvalidEmail` or the translated platform error.
    #[instrument(skip(self, password))]
    pub async fn sign_in_with_email(&self, email: &str, password: &SecretString) -> Result<AuthUser, Error> {
        self.ensure_ready()?;
        let email = normalize_email(email);
        if !valid_email(&email) {
            return Err(Error::Precondition(ErrorKind::InvalidEmail));
        }
        let session = self.identity.sign_in_with_password(&email, password).await?;
        let profile = self.ensure_profile(&session, Provider::Email).await?;
        let user = AuthUser::new(&session, profile);
        self.publish(Some(session), Some(user.clone()));
        Ok(user)
    }

    /// Sign in through the Google popup.
    ///
    /// # Errors
    /// `PopupBlocked` when the popup cannot open, or the translated platform error.
    #[instrument(skip(self, flow))]
    pub async fn sign_in_with_google<F: OAuthFlow>(&self, flow: &F) -> Result<AuthUser, Error> {
        self.ensure_ready()?;
        flow.probe_popup().await?;
        let credential = flow.authorize(OAuthProvider::Google).await?;
        let session = self.identity.sign_in_with_idp(&credential).await?;
        let profile = self.ensure_profile(&session, Provider::Google).await?;
        let user = AuthUser::new(&session, profile);
        self.publish(Some(session), Some(user.clone()));
        Ok(user)
    }

    /// # Errors
    /// The translated platform error.
    #[instrument(skip(self))]
    pub async fn sign_out(&self) -> Result<(), Error> {
        ensure_available(self.identity.is_available())?;
        self.identity.sign_out().await?;
        self.publish(None, None);
        Ok(())
    }

    /// # Errors
    /// `InvalidEmail` or the translated platform error.
    #[instrument(skip(self))]
    pub async fn reset_password(&self, email: &str) -> Result<(), Error> {
        ensure_available(self.identity.is_available())?;
        let email = normalize_email(email);
        if !valid_email(&email) {
            return Err(Error::Precondition(ErrorKind::InvalidEmail));
        }
        self.identity.send_password_reset(&email).await?;
        Ok(())
    }

    /// Call `callback` with the current user now and after every change.
    ///
    /// Returns an inactive subscription when the identity platform is
    /// unavailable or no Tokio runtime is running.
    pub fn on_auth_state_changed<F>(&self, mut callback: F) -> Subscription
    where
        F: FnMut(Option<AuthUser>) + Send + 'static,
    {
        if !self.identity.is_available() {
            warn!("Identity platform unavailable, auth state listener not installed");
            return Subscription::noop();
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No async runtime, auth state listener not installed");
            return Subscription::noop();
        };
        let mut receiver = self.state.subscribe();
        let task = runtime.spawn(async move {
            let current = receiver.borrow_and_update().clone();
            callback(current);
            while receiver.changed().await.is_ok() {
                let next = receiver.borrow_and_update().clone();
                callback(next);
            }
        });
        Subscription { task: Some(task) }
    }

    /// # Errors
    /// `NotAuthenticated` without a session, or the translated platform error.
    #[instrument(skip(self))]
    pub async fn resend_email_verification(&self) -> Result<(), Error> {
        ensure_available(self.identity.is_available())?;
        let session = self
            .current_session()
            .ok_or(Error::Precondition(ErrorKind::NotAuthenticated))?;
        self.identity.send_email_verification(&session).await?;
        Ok(())
    }

    /// Reload the account and return whether its email is verified. A newly
    /// verified flag is mirrored into the profile document.
    ///
    /// # Errors
    /// `NotAuthenticated` without a session, or the translated platform error.
    #[instrument(skip(self))]
    pub async fn refresh_email_verification(&self) -> Result<bool, Error> {
        ensure_available(self.identity.is_available())?;
        let mut session = self
            .current_session()
            .ok_or(Error::Precondition(ErrorKind::NotAuthenticated))?;
        let account = self.identity.lookup(&session).await?;
        let verified = account.email_verified;
        session.user = account;

        let mut user = self.current_user();
        if verified && user.as_ref().is_some_and(|user| !user.profile.email_verified) {
            let mut fields = Fields::new();
            fields.insert("emailVerified".to_string(), Value::Bool(true));
            if let Err(err) = self
                .store
                .update(&DocPath::new(USERS, &session.user.uid), fields)
                .await
            {
                warn!("Failed to mirror email verification: {err}");
            }
        }
        if let Some(user) = user.as_mut() {
            user.email_verified = verified;
            user.profile.email_verified = user.profile.email_verified || verified;
        }
        self.publish(Some(session), user);
        Ok(verified)
    }

    /// The last published auth state.
    #[must_use]
    pub fn current_user(&self) -> Option<AuthUser> {
        self.state.borrow().clone()
    }

    /// Sign in with the configured development credentials.
    ///
    /// # Errors
    /// `OperationNotAllowed` when no dev credentials are configured.
    #[instrument(skip(self))]
    pub async fn dev_auto_login(&self) -> Result<AuthUser, Error> {
        let credentials = self
            .config
            .dev_login()
            .cloned()
            .ok_or(Error::Precondition(ErrorKind::OperationNotAllowed))?;
        info!("dev auto login as {}", credentials.email);
        self.sign_in_with_email(&credentials.email, &credentials.password)
            .await
    }
}
