//! Seams to the hosted identity + document platform.
//!
//! The facades only talk to these traits. [`rest`] implements identity and
//! documents over the platform's public REST APIs; [`memory`] keeps everything
//! in process for tests and offline development. The CAPTCHA widget and the
//! OAuth popup live in the embedding UI, which implements [`CaptchaWidgets`]
//! and [`OAuthFlow`].

pub mod memory;
pub mod rest;

use crate::error::{Error, ErrorKind, PlatformError};
use secrecy::SecretString;
use serde_json::{Map, Value};
use std::fmt;
use tokio::sync::oneshot;

pub type Fields = Map<String, Value>;
pub type PlatformResult<T> = Result<T, PlatformError>;

/// Account as the identity provider reports it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IdentityUser {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    pub phone_number: Option<String>,
    pub email_verified: bool,
}

/// Signed-in account plus the tokens that authorize further calls.
#[derive(Clone, Debug)]
pub struct IdentitySession {
    pub user: IdentityUser,
    pub id_token: SecretString,
    pub refresh_token: Option<SecretString>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OAuthProvider {
    Google,
}

impl OAuthProvider {
    #[must_use]
    pub fn provider_id(self) -> &'static str {
        match self {
            Self::Google => "google.com",
        }
    }
}

/// Credential obtained from an OAuth popup, exchanged with the identity provider.
#[derive(Clone, Debug)]
pub struct IdpCredential {
    pub provider: OAuthProvider,
    pub id_token: SecretString,
}

/// Path of a single document: `collection/id`, where `collection` may itself
/// be nested (`posts/{postId}/comments`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocPath {
    collection: String,
    id: String,
}

impl DocPath {
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }

    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Child collection under this document.
    #[must_use]
    pub fn child(&self, collection: &str) -> String {
        format!("{self}/{collection}")
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Query {
    pub collection: String,
    pub filters: Vec<(String, Value)>,
    pub order_by: Vec<(String, Direction)>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            filters: Vec::new(),
            order_by: Vec::new(),
            limit: None,
        }
    }

    /// Equality filter on a top-level or dotted field.
    #[must_use]
    pub fn where_eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters.push((field.to_string(), value.into()));
        self
    }

    #[must_use]
    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order_by.push((field.to_string(), direction));
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// `ServiceUnavailable` unless the platform client initialized.
pub(crate) fn ensure_available(available: bool) -> Result<(), Error> {
    if available {
        Ok(())
    } else {
        Err(Error::Precondition(ErrorKind::ServiceUnavailable))
    }
}

#[allow(async_fn_in_trait)]
pub trait IdentityProvider: Send + Sync {
    /// `false` when the platform client could not be initialized.
    fn is_available(&self) -> bool {
        true
    }

    async fn create_user(&self, email: &str, password: &SecretString) -> PlatformResult<IdentitySession>;

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &SecretString,
    ) -> PlatformResult<IdentitySession>;

    async fn sign_in_with_idp(&self, credential: &IdpCredential) -> PlatformResult<IdentitySession>;

    async fn send_email_verification(&self, session: &IdentitySession) -> PlatformResult<()>;

    async fn update_profile(
        &self,
        session: &IdentitySession,
        display_name: Option<&str>,
        photo_url: Option<&str>,
    ) -> PlatformResult<()>;

    async fn delete_user(&self, session: &IdentitySession) -> PlatformResult<()>;

    async fn send_password_reset(&self, email: &str) -> PlatformResult<()>;

    /// Reload the account behind `session`.
    async fn lookup(&self, session: &IdentitySession) -> PlatformResult<IdentityUser>;

    /// Dispatch an SMS code; returns the verification id for confirmation.
    async fn send_phone_code(&self, phone_number: &str, captcha_token: &str) -> PlatformResult<String>;

    /// Confirm an SMS code; returns the verified E.164 number.
    async fn confirm_phone_code(&self, verification_id: &str, code: &str) -> PlatformResult<String>;

    async fn sign_out(&self) -> PlatformResult<()>;
}

#[allow(async_fn_in_trait)]
pub trait DocumentStore: Send + Sync {
    fn is_available(&self) -> bool {
        true
    }

    async fn get(&self, path: &DocPath) -> PlatformResult<Option<Document>>;

    /// Create or overwrite the whole document.
    async fn set(&self, path: &DocPath, fields: Fields) -> PlatformResult<()>;

    /// Create a document with a generated id.
    async fn add(&self, collection: &str, fields: Fields) -> PlatformResult<String>;

    /// Merge fields into an existing document. Keys may be dotted paths
    /// (`aiUsage.usageCount`). Fails with `not-found` when the document is missing.
    async fn update(&self, path: &DocPath, fields: Fields) -> PlatformResult<()>;

    async fn delete(&self, path: &DocPath) -> PlatformResult<()>;

    async fn query(&self, query: &Query) -> PlatformResult<Vec<Document>>;

    /// Atomic numeric increment; a missing field counts as zero.
    async fn increment(&self, path: &DocPath, field: &str, delta: i64) -> PlatformResult<()>;
}

/// A rendered challenge widget. `ready` resolves once the widget platform
/// reports that the challenge is attached and usable.
#[derive(Debug)]
pub struct RenderedWidget {
    pub widget_id: String,
    pub ready: oneshot::Receiver<()>,
}

#[allow(async_fn_in_trait)]
pub trait CaptchaWidgets: Send + Sync {
    async fn render(&self, container_id: &str) -> PlatformResult<RenderedWidget>;

    /// Solve or validate the challenge and return its token.
    async fn verify(&self, widget_id: &str) -> PlatformResult<String>;

    /// Destroy the widget and empty its container.
    async fn clear(&self, widget_id: &str, container_id: &str) -> PlatformResult<()>;
}

#[allow(async_fn_in_trait)]
pub trait OAuthFlow: Send + Sync {
    /// Fail with `auth/popup-blocked` when popups cannot be opened.
    async fn probe_popup(&self) -> PlatformResult<()>;

    async fn authorize(&self, provider: OAuthProvider) -> PlatformResult<IdpCredential>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn doc_path_formats_nested_collections() {
        let post = DocPath::new("posts", "p1");
        assert_eq!(post.to_string(), "posts/p1");
        assert_eq!(post.child("comments"), "posts/p1/comments");
        let comment = DocPath::new(post.child("comments"), "c1");
        assert_eq!(comment.to_string(), "posts/p1/comments/c1");
        assert_eq!(comment.collection(), "posts/p1/comments");
    }

    #[test]
    fn query_builder_accumulates_clauses() {
        let query = Query::new("notices")
            .where_eq("isPublished", true)
            .order_by("isPinned", Direction::Descending)
            .order_by("createdAt", Direction::Descending)
            .limit(10);
        assert_eq!(query.filters, vec![("isPublished".to_string(), json!(true))]);
        assert_eq!(query.order_by.len(), 2);
        assert_eq!(query.limit, Some(10));
    }
}
