//! Profile reads, preference updates and role management.

use crate::{
    error::{Error, ErrorKind},
    models::{self, Preferences, PreferencesUpdate, Role, UserProfile, USERS},
    platform::{ensure_available, DocPath, DocumentStore, Fields},
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, instrument};

pub const DISPLAY_NAME_MAX_CHARS: usize = 50;

/// Load `users/{uid}`, `None` when the document does not exist.
pub(crate) async fn load_profile<D: DocumentStore>(
    store: &D,
    uid: &str,
) -> Result<Option<UserProfile>, Error> {
    store
        .get(&DocPath::new(USERS, uid))
        .await?
        .map(models::decode)
        .transpose()
}

/// Re-read the actor's stored profile and check that its role satisfies `role`.
///
/// # Errors
/// `NotAuthenticated` for an empty uid, `PermissionDenied` when the profile is
/// missing or its role is insufficient.
#[instrument(skip(store))]
pub async fn require_role<D: DocumentStore>(
    store: &D,
    uid: &str,
    role: Role,
) -> Result<UserProfile, Error> {
    if uid.is_empty() {
        return Err(Error::Precondition(ErrorKind::NotAuthenticated));
    }
    let profile = load_profile(store, uid)
        .await?
        .ok_or(Error::Precondition(ErrorKind::PermissionDenied))?;
    if profile.role.satisfies(role) {
        Ok(profile)
    } else {
        Err(Error::Precondition(ErrorKind::PermissionDenied))
    }
}

pub struct UsersFacade<D> {
    store: Arc<D>,
}

impl<D: DocumentStore> UsersFacade<D> {
    pub fn new(store: Arc<D>) -> Self {
        Self { store }
    }

    /// # Errors
    /// `NotFound` when the user has no profile document.
    #[instrument(skip(self))]
    pub async fn get_user_profile(&self, uid: &str) -> Result<UserProfile, Error> {
        ensure_available(self.store.is_available())?;
        load_profile(self.store.as_ref(), uid)
            .await?
            .ok_or(Error::Precondition(ErrorKind::NotFound))
    }

    /// Merge `update` into the stored preferences and return the result.
    ///
    /// # Errors
    /// `NotFound` when the user has no profile document.
    #[instrument(skip(self, update))]
    pub async fn update_preferences(
        &self,
        uid: &str,
        update: PreferencesUpdate,
    ) -> Result<Preferences, Error> {
        let mut preferences = self.get_user_profile(uid).await?.preferences;
        let mut fields = Fields::new();
        if let Some(framework) = update.framework {
            fields.insert("preferences.framework".to_string(), Value::from(framework.clone()));
            preferences.framework = framework;
        }
        if let Some(notifications) = update.notifications {
            fields.insert("preferences.notifications".to_string(), Value::from(notifications));
            preferences.notifications = notifications;
        }
        if let Some(theme) = update.theme {
            fields.insert("preferences.theme".to_string(), Value::from(theme.clone()));
            preferences.theme = theme;
        }
        if !fields.is_empty() {
            self.store.update(&DocPath::new(USERS, uid), fields).await?;
        }
        Ok(preferences)
    }

    /// # Errors
    /// `InvalidArgument` for a blank or overly long name.
    #[instrument(skip(self))]
    pub async fn update_display_name(&self, uid: &str, name: &str) -> Result<(), Error> {
        ensure_available(self.store.is_available())?;
        let name = name.trim();
        if name.is_empty() || name.chars().count() > DISPLAY_NAME_MAX_CHARS {
            return Err(Error::Precondition(ErrorKind::InvalidArgument));
        }
        let mut fields = Fields::new();
        fields.insert("displayName".to_string(), Value::from(name));
        self.store.update(&DocPath::new(USERS, uid), fields).await?;
        Ok(())
    }

    /// Change `uid`'s role. The actor must be an admin and may not demote itself.
    ///
    /// # Errors
    /// `PermissionDenied` for non-admins and self-demotion, `NotFound` for an
    /// unknown target.
    #[instrument(skip(self))]
    pub async fn set_user_role(&self, actor: &str, uid: &str, role: Role) -> Result<(), Error> {
        ensure_available(self.store.is_available())?;
        require_role(self.store.as_ref(), actor, Role::Admin).await?;
        if actor == uid && role != Role::Admin {
            return Err(Error::Precondition(ErrorKind::PermissionDenied));
        }
        if load_profile(self.store.as_ref(), uid).await?.is_none() {
            return Err(Error::Precondition(ErrorKind::NotFound));
        }
        let mut fields = Fields::new();
        fields.insert("role".to_string(), Value::from(role.as_str()));
        self.store.update(&DocPath::new(USERS, uid), fields).await?;
        info!("role of {} set to {} by {}", uid, role.as_str(), actor);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::memory::MemoryStore;
    use serde_json::json;

    fn seed(store: &MemoryStore, uid: &str, role: &str) {
        store.insert(
            &DocPath::new(USERS, uid),
            json!({"uid": uid, "email": format!("{uid}@x.com"), "role": role})
                .as_object()
                .cloned()
                .unwrap_or_default(),
        );
    }

    #[tokio::test]
    async fn role_gate_rereads_stored_role() {
        let store = MemoryStore::new();
        seed(&store, "admin", "admin");
        seed(&store, "mod", "moderator");
        seed(&store, "user", "user");

        assert!(require_role(&store, "admin", Role::Admin).await.is_ok());
        assert!(require_role(&store, "admin", Role::Moderator).await.is_ok());
        assert!(require_role(&store, "mod", Role::Moderator).await.is_ok());
        let denied = require_role(&store, "user", Role::Admin).await.unwrap_err();
        assert!(denied.is(ErrorKind::PermissionDenied));
        let missing = require_role(&store, "ghost", Role::Admin).await.unwrap_err();
        assert!(missing.is(ErrorKind::PermissionDenied));
        let anonymous = require_role(&store, "", Role::User).await.unwrap_err();
        assert!(anonymous.is(ErrorKind::NotAuthenticated));
    }

    #[tokio::test]
    async fn preferences_merge_partially() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, "u1", "user");
        let users = UsersFacade::new(store.clone());
        let preferences = users
            .update_preferences(
                "u1",
                PreferencesUpdate {
                    theme: Some("dark".to_string()),
                    ..PreferencesUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(preferences.theme, "dark");
        assert_eq!(preferences.framework, "react");
        let profile = users.get_user_profile("u1").await.unwrap();
        assert_eq!(profile.preferences.theme, "dark");
        assert!(profile.preferences.notifications);
    }

    #[tokio::test]
    async fn admins_cannot_demote_themselves() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, "admin", "admin");
        seed(&store, "u1", "user");
        let users = UsersFacade::new(store.clone());

        users.set_user_role("admin", "u1", Role::Moderator).await.unwrap();
        assert_eq!(users.get_user_profile("u1").await.unwrap().role, Role::Moderator);

        let err = users.set_user_role("admin", "admin", Role::User).await.unwrap_err();
        assert!(err.is(ErrorKind::PermissionDenied));
        let err = users.set_user_role("u1", "admin", Role::User).await.unwrap_err();
        assert!(err.is(ErrorKind::PermissionDenied));
        let err = users.set_user_role("admin", "ghost", Role::User).await.unwrap_err();
        assert!(err.is(ErrorKind::NotFound));
    }

    #[tokio::test]
    async fn display_name_is_validated() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, "u1", "user");
        let users = UsersFacade::new(store);
        let err = users.update_display_name("u1", "   ").await.unwrap_err();
        assert!(err.is(ErrorKind::InvalidArgument));
        users.update_display_name("u1", " Alice ").await.unwrap();
        assert_eq!(users.get_user_profile("u1").await.unwrap().display_name, "Alice");
    }
}
