//! HTTP implementation of the platform seams.
//!
//! [`RestIdentity`] speaks the identity toolkit v1 API and [`RestStore`] the
//! document REST API v1. Both share one `reqwest::Client` and a [`TokenSlot`],
//! so document calls carry the id token of whoever signed in last.

pub mod firestore;
pub mod identity;
mod value;

pub use firestore::RestStore;
pub use identity::RestIdentity;

use crate::{config::Config, error::PlatformError, APP_USER_AGENT};
use reqwest::{Client, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};
use url::Url;

use super::PlatformResult;

const IDENTITY_HOST: &str = "https://identitytoolkit.googleapis.com";
const DOCUMENTS_HOST: &str = "https://firestore.googleapis.com";
const APP_CHECK_HEADER: &str = "X-Firebase-AppCheck";

/// Id token of the current session, shared between identity and documents.
#[derive(Clone, Debug, Default)]
pub struct TokenSlot(Arc<RwLock<Option<SecretString>>>);

impl TokenSlot {
    pub fn set(&self, token: Option<SecretString>) {
        if let Ok(mut slot) = self.0.write() {
            *slot = token;
        }
    }

    #[must_use]
    pub fn get(&self) -> Option<SecretString> {
        self.0.read().ok().and_then(|slot| slot.clone())
    }
}

/// Settings every request needs.
#[derive(Clone, Debug)]
struct Transport {
    client: Client,
    api_key: SecretString,
    app_check: Option<SecretString>,
    tokens: TokenSlot,
}

impl Transport {
    /// Parse `raw` and append the API key.
    fn url(&self, raw: &str) -> PlatformResult<Url> {
        let mut url = Url::parse(raw)
            .map_err(|err| PlatformError::new("invalid-argument", format!("{raw}: {err}")))?;
        url.query_pairs_mut()
            .append_pair("key", self.api_key.expose_secret());
        Ok(url)
    }

    fn decorate(&self, request: RequestBuilder, bearer: bool) -> RequestBuilder {
        let request = match &self.app_check {
            Some(token) => request.header(APP_CHECK_HEADER, token.expose_secret()),
            None => request,
        };
        match self.tokens.get() {
            Some(token) if bearer => request.bearer_auth(token.expose_secret()),
            _ => request,
        }
    }
}

fn emulator_base(host: &str) -> String {
    if host.starts_with("http://") || host.starts_with("https://") {
        host.trim_end_matches('/').to_string()
    } else {
        format!("http://{}", host.trim_end_matches('/'))
    }
}

/// Transport-level failure (DNS, TLS, reset) reported with `code`.
fn transport_error(code: &str, err: &reqwest::Error) -> PlatformError {
    PlatformError::new(code, err.to_string())
}

/// Read a JSON body, or turn an error status into a [`PlatformError`] using
/// `code_of` on the error payload.
async fn read_json(
    response: Response,
    transport_code: &str,
    code_of: fn(&Value) -> String,
) -> PlatformResult<Value> {
    let status = response.status();
    if !status.is_success() {
        let body: Value = response.json().await.unwrap_or_default();
        let message = body["error"]["message"]
            .as_str()
            .unwrap_or_else(|| status.canonical_reason().unwrap_or_default())
            .to_string();
        debug!("platform request failed: {} - {}", status, message);
        return Err(PlatformError::new(code_of(&body), message));
    }
    response
        .json()
        .await
        .map_err(|err| transport_error(transport_code, &err))
}

/// Build the REST identity provider and document store for `config`.
///
/// # Errors
/// Returns an error if the HTTP client cannot be built.
pub fn connect(config: &Config) -> PlatformResult<(RestIdentity, RestStore)> {
    let client = Client::builder()
        .user_agent(APP_USER_AGENT)
        .build()
        .map_err(|err| transport_error("unavailable", &err))?;

    let app_check = config.app_check();
    if app_check.enforce && app_check.debug_token.is_none() {
        warn!("App Check is enforced but no token is configured; requests may be rejected");
    }

    let transport = Transport {
        client,
        api_key: config.api_key().clone(),
        app_check: app_check.debug_token.clone(),
        tokens: TokenSlot::default(),
    };

    let (identity_base, documents_root) = match config.emulator() {
        Some(hosts) => (
            format!("{}/identitytoolkit.googleapis.com/v1", emulator_base(&hosts.auth)),
            format!("{}/v1", emulator_base(&hosts.firestore)),
        ),
        None => (format!("{IDENTITY_HOST}/v1"), format!("{DOCUMENTS_HOST}/v1")),
    };

    let available = !config.api_key().expose_secret().is_empty() && !config.project_id().is_empty();

    debug!(
        "platform endpoints: identity {}, documents {}",
        identity_base, documents_root
    );

    Ok((
        RestIdentity::new(transport.clone(), identity_base, available),
        RestStore::new(transport, &documents_root, config.project_id(), available),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmulatorHosts;

    #[test]
    fn emulator_hosts_get_a_scheme() {
        assert_eq!(emulator_base("localhost:9099"), "http://localhost:9099");
        assert_eq!(emulator_base("https://emu.test/"), "https://emu.test");
    }

    #[test]
    fn token_slot_is_shared_between_clones() {
        let slot = TokenSlot::default();
        let other = slot.clone();
        slot.set(Some(SecretString::from("abc".to_string())));
        assert_eq!(
            other.get().map(|token| token.expose_secret().to_string()),
            Some("abc".to_string())
        );
        other.set(None);
        assert!(slot.get().is_none());
    }

    #[test]
    fn connect_targets_emulator_hosts() {
        let config = Config::new("demo".to_string(), SecretString::from("key".to_string()))
            .with_emulator(EmulatorHosts {
                auth: "localhost:9099".to_string(),
                firestore: "localhost:8080".to_string(),
            });
        let (identity, store) = connect(&config).unwrap();
        assert_eq!(
            identity.endpoint("signUp"),
            "http://localhost:9099/identitytoolkit.googleapis.com/v1/accounts:signUp"
        );
        assert_eq!(
            store.documents_url(),
            "http://localhost:8080/v1/projects/demo/databases/(default)/documents"
        );
    }

    #[test]
    fn url_appends_api_key() {
        let transport = Transport {
            client: Client::new(),
            api_key: SecretString::from("k1".to_string()),
            app_check: None,
            tokens: TokenSlot::default(),
        };
        let url = transport.url("https://example.test/v1/accounts:lookup").unwrap();
        assert_eq!(url.as_str(), "https://example.test/v1/accounts:lookup?key=k1");
    }
}
