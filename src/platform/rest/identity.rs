use super::{read_json, transport_error, PlatformResult, Transport};
use crate::{
    error::PlatformError,
    platform::{IdentityProvider, IdentitySession, IdentityUser, IdpCredential},
};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::{debug, instrument};

const NETWORK_FAILED: &str = "auth/network-request-failed";

/// Identity toolkit error string → SDK-style code.
const IDENTITY_CODES: &[(&str, &str)] = &[
    ("EMAIL_EXISTS", "auth/email-already-in-use"),
    ("INVALID_EMAIL", "auth/invalid-email"),
    ("MISSING_EMAIL", "auth/invalid-email"),
    ("WEAK_PASSWORD", "auth/weak-password"),
    ("EMAIL_NOT_FOUND", "auth/user-not-found"),
    ("USER_NOT_FOUND", "auth/user-not-found"),
    ("INVALID_PASSWORD", "auth/wrong-password"),
    ("INVALID_LOGIN_CREDENTIALS", "auth/invalid-credential"),
    ("INVALID_IDP_RESPONSE", "auth/invalid-credential"),
    ("USER_DISABLED", "auth/user-disabled"),
    ("TOO_MANY_ATTEMPTS_TRY_LATER", "auth/too-many-requests"),
    ("OPERATION_NOT_ALLOWED", "auth/operation-not-allowed"),
    ("PASSWORD_LOGIN_DISABLED", "auth/operation-not-allowed"),
    ("TOKEN_EXPIRED", "auth/user-token-expired"),
    ("INVALID_ID_TOKEN", "auth/invalid-user-token"),
    ("CREDENTIAL_TOO_OLD_LOGIN_AGAIN", "auth/requires-recent-login"),
    ("NEED_CONFIRMATION", "auth/account-exists-with-different-credential"),
    ("INVALID_PHONE_NUMBER", "auth/invalid-phone-number"),
    ("MISSING_PHONE_NUMBER", "auth/missing-phone-number"),
    ("QUOTA_EXCEEDED", "auth/quota-exceeded"),
    ("CAPTCHA_CHECK_FAILED", "auth/captcha-check-failed"),
    ("INVALID_CODE", "auth/invalid-verification-code"),
    ("SESSION_EXPIRED", "auth/code-expired"),
    ("BILLING_NOT_ENABLED", "auth/billing-not-enabled"),
    ("UNAUTHORIZED_DOMAIN", "auth/app-not-authorized"),
    ("INVALID_APP_CREDENTIAL", "auth/invalid-app-credential"),
];

/// Map an identity toolkit error payload to an SDK-style code. Messages look
/// like `WEAK_PASSWORD : Password should be at least 6 characters`; unknown
/// ones become `auth/<kebab-case>`.
pub(crate) fn identity_code(body: &Value) -> String {
    let message = body["error"]["message"].as_str().unwrap_or_default();
    let key = message.split(" : ").next().unwrap_or_default().trim();
    if key.is_empty() {
        return String::new();
    }
    IDENTITY_CODES
        .iter()
        .find(|(known, _)| *known == key)
        .map_or_else(
            || format!("auth/{}", key.to_lowercase().replace('_', "-")),
            |(_, code)| (*code).to_string(),
        )
}

#[derive(Clone, Debug)]
pub struct RestIdentity {
    transport: Transport,
    base: String,
    available: bool,
}

impl RestIdentity {
    pub(super) fn new(transport: Transport, base: String, available: bool) -> Self {
        Self {
            transport,
            base,
            available,
        }
    }

    pub(crate) fn endpoint(&self, method: &str) -> String {
        format!("{}/accounts:{method}", self.base)
    }

    async fn call(&self, method: &str, payload: Value) -> PlatformResult<Value> {
        let url = self.transport.url(&self.endpoint(method))?;
        debug!("identity call: {}", method);
        let response = self
            .transport
            .decorate(self.transport.client.post(url), false)
            .json(&payload)
            .send()
            .await
            .map_err(|err| transport_error(NETWORK_FAILED, &err))?;
        read_json(response, NETWORK_FAILED, identity_code).await
    }

    /// Turn a sign-in response into a session, reloading the full account.
    async fn establish(&self, response: &Value) -> PlatformResult<IdentitySession> {
        let id_token = response["idToken"]
            .as_str()
            .ok_or_else(|| PlatformError::new("", "sign-in response without idToken"))?;
        let mut session = IdentitySession {
            user: IdentityUser {
                uid: response["localId"].as_str().unwrap_or_default().to_string(),
                email: response["email"].as_str().map(str::to_string),
                ..IdentityUser::default()
            },
            id_token: SecretString::from(id_token.to_string()),
            refresh_token: response["refreshToken"]
                .as_str()
                .map(|token| SecretString::from(token.to_string())),
        };
        session.user = self.lookup(&session).await?;
        self.transport.tokens.set(Some(session.id_token.clone()));
        Ok(session)
    }
}

fn user_from_lookup(account: &Value) -> IdentityUser {
    IdentityUser {
        uid: account["localId"].as_str().unwrap_or_default().to_string(),
        email: account["email"].as_str().map(str::to_string),
        display_name: account["displayName"].as_str().map(str::to_string),
        photo_url: account["photoUrl"].as_str().map(str::to_string),
        phone_number: account["phoneNumber"].as_str().map(str::to_string),
        email_verified: account["emailVerified"].as_bool().unwrap_or_default(),
    }
}

impl IdentityProvider for RestIdentity {
    fn is_available(&self) -> bool {
        self.available
    }

    #[instrument(skip(self, password))]
    async fn create_user(&self, email: &str, password: &SecretString) -> PlatformResult<IdentitySession> {
        let response = self
            .call(
                "signUp",
                json!({
                    "email": email,
                    "password": password.expose_secret(),
                    "returnSecureToken": true,
                }),
            )
            .await?;
        self.establish(&response).await
    }

    #[instrument(skip(self, password))]
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &SecretString,
    ) -> PlatformResult<IdentitySession> {
        let response = self
            .call(
                "signInWithPassword",
                json!({
                    "email": email,
                    "password": password.expose_secret(),
                    "returnSecureToken": true,
                }),
            )
            .await?;
        self.establish(&response).await
    }

    #[instrument(skip(self, credential))]
    async fn sign_in_with_idp(&self, credential: &IdpCredential) -> PlatformResult<IdentitySession> {
        let post_body = format!(
            "id_token={}&providerId={}",
            credential.id_token.expose_secret(),
            credential.provider.provider_id()
        );
        let response = self
            .call(
                "signInWithIdp",
                json!({
                    "postBody": post_body,
                    "requestUri": "http://localhost",
                    "returnIdpCredential": true,
                    "returnSecureToken": true,
                }),
            )
            .await?;
        if response["needConfirmation"].as_bool().unwrap_or_default() {
            return Err(PlatformError::new(
                "auth/account-exists-with-different-credential",
                "NEED_CONFIRMATION",
            ));
        }
        self.establish(&response).await
    }

    #[instrument(skip(self, session), fields(uid = %session.user.uid))]
    async fn send_email_verification(&self, session: &IdentitySession) -> PlatformResult<()> {
        self.call(
            "sendOobCode",
            json!({
                "requestType": "VERIFY_EMAIL",
                "idToken": session.id_token.expose_secret(),
            }),
        )
        .await?;
        Ok(())
    }

    #[instrument(skip(self, session), fields(uid = %session.user.uid))]
    async fn update_profile(
        &self,
        session: &IdentitySession,
        display_name: Option<&str>,
        photo_url: Option<&str>,
    ) -> PlatformResult<()> {
        let mut payload = json!({
            "idToken": session.id_token.expose_secret(),
            "returnSecureToken": false,
        });
        if let Some(name) = display_name {
            payload["displayName"] = Value::from(name);
        }
        if let Some(url) = photo_url {
            payload["photoUrl"] = Value::from(url);
        }
        self.call("update", payload).await?;
        Ok(())
    }

    #[instrument(skip(self, session), fields(uid = %session.user.uid))]
    async fn delete_user(&self, session: &IdentitySession) -> PlatformResult<()> {
        self.call(
            "delete",
            json!({ "idToken": session.id_token.expose_secret() }),
        )
        .await?;
        self.transport.tokens.set(None);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn send_password_reset(&self, email: &str) -> PlatformResult<()> {
        self.call(
            "sendOobCode",
            json!({ "requestType": "PASSWORD_RESET", "email": email }),
        )
        .await?;
        Ok(())
    }

    #[instrument(skip(self, session), fields(uid = %session.user.uid))]
    async fn lookup(&self, session: &IdentitySession) -> PlatformResult<IdentityUser> {
        let response = self
            .call(
                "lookup",
                json!({ "idToken": session.id_token.expose_secret() }),
            )
            .await?;
        response["users"]
            .get(0)
            .map(user_from_lookup)
            .ok_or_else(|| PlatformError::new("auth/user-not-found", "USER_NOT_FOUND"))
    }

    #[instrument(skip(self, captcha_token))]
    async fn send_phone_code(&self, phone_number: &str, captcha_token: &str) -> PlatformResult<String> {
        let response = self
            .call(
                "sendVerificationCode",
                json!({ "phoneNumber": phone_number, "recaptchaToken": captcha_token }),
            )
            .await?;
        response["sessionInfo"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| PlatformError::new("", "sendVerificationCode response without sessionInfo"))
    }

    #[instrument(skip(self, verification_id, code))]
    async fn confirm_phone_code(&self, verification_id: &str, code: &str) -> PlatformResult<String> {
        let response = self
            .call(
                "signInWithPhoneNumber",
                json!({ "sessionInfo": verification_id, "code": code }),
            )
            .await?;
        response["phoneNumber"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| PlatformError::new("", "signInWithPhoneNumber response without phoneNumber"))
    }

    async fn sign_out(&self) -> PlatformResult<()> {
        self.transport.tokens.set(None);
        Ok(())
    }
}
