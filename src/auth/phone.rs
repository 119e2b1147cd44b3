//! Phone verification: CAPTCHA widget lifecycle and SMS dispatch.
//!
//! At most one widget is active per verifier. [`PhoneVerifier::setup_recaptcha`]
//! hands the caller a [`CaptchaSession`]; a session is only usable while it is
//! still the active one, so a stale session cannot dispatch SMS through a
//! widget that has since been replaced.

use super::utils::{normalize_phone, valid_verification_code};
use crate::{
    config::Config,
    error::{Error, ErrorKind},
    platform::{ensure_available, CaptchaWidgets, IdentityProvider},
};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex,
};
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

/// A rendered, ready challenge widget.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CaptchaSession {
    generation: u64,
    widget_id: String,
    container_id: String,
}

impl CaptchaSession {
    #[must_use]
    pub fn widget_id(&self) -> &str {
        &self.widget_id
    }

    #[must_use]
    pub fn container_id(&self) -> &str {
        &self.container_id
    }
}

/// Pending SMS confirmation returned by [`PhoneVerifier::send_verification_code`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PhoneConfirmation {
    verification_id: Option<String>,
    phone_number: String,
}

impl PhoneConfirmation {
    #[must_use]
    pub fn phone_number(&self) -> &str {
        &self.phone_number
    }

    /// `true` when SMS bypass skipped the platform.
    #[must_use]
    pub fn is_bypassed(&self) -> bool {
        self.verification_id.is_none()
    }
}

pub struct PhoneVerifier<I, C> {
    identity: Arc<I>,
    widgets: Arc<C>,
    config: Arc<Config>,
    active: Mutex<Option<CaptchaSession>>,
    generation: AtomicU64,
}

impl<I: IdentityProvider, C: CaptchaWidgets> PhoneVerifier<I, C> {
    pub fn new(identity: Arc<I>, widgets: Arc<C>, config: Arc<Config>) -> Self {
        Self {
            identity,
            widgets,
            config,
            active: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    fn is_active(&self, session: &CaptchaSession) -> bool {
        self.active
            .lock()
            .is_ok_and(|active| active.as_ref() == Some(session))
    }

    async fn clear_widget(&self, widget_id: &str, container_id: &str) {
        if let Err(err) = self.widgets.clear(widget_id, container_id).await {
            warn!("Failed to clear captcha widget {widget_id}: {err}");
        }
    }

    /// Render a challenge widget into `container_id` and wait for it to be
    /// ready. Any previously active widget is cleared first.
    ///
    /// The slot is claimed before rendering. When a newer call claims it while
    /// this one is still waiting, this call clears its own widget and fails.
    ///
    /// # Errors
    /// `CaptchaNotReady` when the widget does not report ready within the
    /// configured timeout, or when a newer setup superseded this one.
    #[instrument(skip(self))]
    pub async fn setup_recaptcha(&self, container_id: &str) -> Result<CaptchaSession, Error> {
        ensure_available(self.identity.is_available())?;

        let (generation, previous) = {
            let mut active = self
                .active
                .lock()
                .map_err(|_| Error::Precondition(ErrorKind::CaptchaNotReady))?;
            (self.generation.fetch_add(1, Ordering::SeqCst) + 1, active.take())
        };
        if let Some(previous) = previous {
            debug!("clearing previous captcha widget {}", previous.widget_id);
            self.clear_widget(&previous.widget_id, &previous.container_id)
                .await;
        }

        let rendered = self.widgets.render(container_id).await?;
        match timeout(self.config.captcha_ready_timeout(), rendered.ready).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) | Err(_) => {
                warn!("Captcha widget {} did not become ready", rendered.widget_id);
                self.clear_widget(&rendered.widget_id, container_id).await;
                return Err(Error::Precondition(ErrorKind::CaptchaNotReady));
            }
        }

        let session = CaptchaSession {
            generation,
            widget_id: rendered.widget_id,
            container_id: container_id.to_string(),
        };
        let claimed = self.active.lock().is_ok_and(|mut active| {
            let current = self.generation.load(Ordering::SeqCst) == generation;
            if current {
                *active = Some(session.clone());
            }
            current
        });
        if !claimed {
            debug!("captcha widget {} was superseded", session.widget_id);
            self.clear_widget(&session.widget_id, &session.container_id)
                .await;
            return Err(Error::Precondition(ErrorKind::CaptchaNotReady));
        }
        Ok(session)
    }

    /// Solve the challenge and send an SMS code to `phone_number`.
    ///
    /// # Errors
    /// `InvalidPhoneNumber`/`MissingPhoneNumber` for bad input,
    /// `CaptchaNotReady` when `session` is no longer the active widget, or the
    /// translated platform error.
    #[instrument(skip(self, session))]
    pub async fn send_verification_code(
        &self,
        session: &CaptchaSession,
        phone_number: &str,
    ) -> Result<PhoneConfirmation, Error> {
        ensure_available(self.identity.is_available())?;
        let phone_number = normalize_phone(phone_number)?;

        if self.config.sms_bypass() {
            info!("SMS bypass enabled, not sending a code to {}", phone_number);
            return Ok(PhoneConfirmation {
                verification_id: None,
                phone_number,
            });
        }

        if !self.is_active(session) {
            return Err(Error::Precondition(ErrorKind::CaptchaNotReady));
        }

        let token = self.widgets.verify(&session.widget_id).await.map_err(|err| {
            warn!("Captcha verification failed: {err}");
            Error::from(err)
        })?;
        let verification_id = self
            .identity
            .send_phone_code(&phone_number, &token)
            .await
            .map_err(|err| {
                warn!("Failed to send verification code: {err}");
                Error::from(err)
            })?;

        Ok(PhoneConfirmation {
            verification_id: Some(verification_id),
            phone_number,
        })
    }

    /// Confirm the 6-digit `code` and return the verified E.164 number.
    ///
    /// # Errors
    /// `InvalidVerificationCode` for malformed codes, or the translated platform error.
    #[instrument(skip(self, confirmation, code))]
    pub async fn confirm_verification_code(
        &self,
        confirmation: &PhoneConfirmation,
        code: &str,
    ) -> Result<String, Error> {
        let code = code.trim();
        if !valid_verification_code(code) {
            return Err(Error::Precondition(ErrorKind::InvalidVerificationCode));
        }
        let Some(verification_id) = &confirmation.verification_id else {
            return Ok(confirmation.phone_number.clone());
        };
        ensure_available(self.identity.is_available())?;
        Ok(self
            .identity
            .confirm_phone_code(verification_id, code)
            .await?)
    }

    /// Clear `session`'s widget and empty its container. Stale sessions were
    /// already cleared when they were replaced.
    #[instrument(skip(self, session))]
    pub async fn cleanup_recaptcha(&self, session: CaptchaSession) {
        let current = {
            let Ok(mut active) = self.active.lock() else {
                return;
            };
            if active.as_ref() == Some(&session) {
                active.take()
            } else {
                None
            }
        };
        match current {
            Some(session) => {
                self.clear_widget(&session.widget_id, &session.container_id)
                    .await;
            }
            None => debug!("captcha widget {} is not active", session.widget_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::memory::{MemoryCaptcha, MemoryIdentity, SMS_CODE};
    use secrecy::SecretString;
    use std::time::Duration;

    fn verifier(
        config: Config,
    ) -> (Arc<MemoryIdentity>, Arc<MemoryCaptcha>, PhoneVerifier<MemoryIdentity, MemoryCaptcha>) {
        let identity = Arc::new(MemoryIdentity::new());
        let widgets = Arc::new(MemoryCaptcha::new());
        let verifier = PhoneVerifier::new(identity.clone(), widgets.clone(), Arc::new(config));
        (identity, widgets, verifier)
    }

    fn config() -> Config {
        Config::new("demo".to_string(), SecretString::from("key".to_string()))
            .with_captcha_ready_timeout(Duration::from_millis(20))
    }

    #[tokio::test]
    async fn send_and_confirm_code() {
        let (identity, widgets, verifier) = verifier(config());
        let session = verifier.setup_recaptcha("recaptcha").await.unwrap();
        let confirmation = verifier
            .send_verification_code(&session, "010-1234-5678")
            .await
            .unwrap();
        assert_eq!(confirmation.phone_number(), "+821012345678");
        assert!(!confirmation.is_bypassed());
        assert_eq!(identity.sms_sent(), vec!["+821012345678".to_string()]);

        let err = verifier
            .confirm_verification_code(&confirmation, "12ab56")
            .await
            .unwrap_err();
        assert!(err.is(ErrorKind::InvalidVerificationCode));
        let verified = verifier
            .confirm_verification_code(&confirmation, SMS_CODE)
            .await
            .unwrap();
        assert_eq!(verified, "+821012345678");

        verifier.cleanup_recaptcha(session).await;
        assert!(widgets.active().is_empty());
    }

    #[tokio::test]
    async fn setup_replaces_previous_widget() {
        let (_, widgets, verifier) = verifier(config());
        let first = verifier.setup_recaptcha("recaptcha").await.unwrap();
        let second = verifier.setup_recaptcha("recaptcha").await.unwrap();
        assert_ne!(first, second);
        assert_eq!(widgets.active().len(), 1);
        assert_eq!(widgets.cleared(), vec![first.widget_id().to_string()]);

        let err = verifier
            .send_verification_code(&first, "01012345678")
            .await
            .unwrap_err();
        assert!(err.is(ErrorKind::CaptchaNotReady));
        assert!(verifier.send_verification_code(&second, "01012345678").await.is_ok());
    }

    #[tokio::test]
    async fn overlapping_setup_keeps_only_the_newest_widget() {
        let (_, widgets, verifier) =
            verifier(config().with_captcha_ready_timeout(Duration::from_secs(5)));
        widgets.stall_ready(true);

        let (first, second) = tokio::join!(verifier.setup_recaptcha("recaptcha"), async {
            widgets.stall_ready(false);
            let second = verifier.setup_recaptcha("recaptcha").await;
            widgets.release_stalled();
            second
        });

        assert!(first.is_err_and(|err| err.is(ErrorKind::CaptchaNotReady)));
        let second = second.unwrap();
        assert_eq!(widgets.active().keys().collect::<Vec<_>>(), vec![second.widget_id()]);
        assert_eq!(widgets.cleared(), vec!["widget-1".to_string()]);
        assert!(verifier.send_verification_code(&second, "01012345678").await.is_ok());
    }

    #[tokio::test]
    async fn widget_that_never_gets_ready_times_out() {
        let (_, widgets, verifier) = verifier(config());
        widgets.stall_ready(true);
        let err = verifier.setup_recaptcha("recaptcha").await.unwrap_err();
        assert!(matches!(err, Error::Precondition(ErrorKind::CaptchaNotReady)));
        assert!(widgets.active().is_empty());
    }

    #[tokio::test]
    async fn provider_errors_are_translated() {
        let (identity, widgets, verifier) = verifier(config());
        let session = verifier.setup_recaptcha("recaptcha").await.unwrap();

        widgets.fail_next_verify("auth/captcha-check-failed");
        let err = verifier
            .send_verification_code(&session, "01012345678")
            .await
            .unwrap_err();
        assert!(err.is(ErrorKind::CaptchaCheckFailed));

        identity.fail_next(
            crate::platform::memory::IdentityOp::SendPhoneCode,
            "auth/billing-not-enabled",
        );
        let err = verifier
            .send_verification_code(&session, "01012345678")
            .await
            .unwrap_err();
        assert!(err.is(ErrorKind::BillingNotEnabled));
        assert_eq!(
            err.localized(crate::config::Locale::Ko),
            "SMS 인증 설정에 문제가 있습니다. (결제 미설정)"
        );

        let err = verifier
            .send_verification_code(&session, "12")
            .await
            .unwrap_err();
        assert!(err.is(ErrorKind::InvalidPhoneNumber));
    }

    #[tokio::test]
    async fn sms_bypass_skips_the_platform() {
        let (identity, widgets, verifier) = verifier(config().with_sms_bypass(true));
        let session = verifier.setup_recaptcha("recaptcha").await.unwrap();
        verifier.cleanup_recaptcha(session.clone()).await;
        let confirmation = verifier
            .send_verification_code(&session, "010-9999-0000")
            .await
            .unwrap();
        assert!(confirmation.is_bypassed());
        assert!(identity.sms_sent().is_empty());
        assert!(widgets.active().is_empty());
        let verified = verifier
            .confirm_verification_code(&confirmation, "000000")
            .await
            .unwrap();
        assert_eq!(verified, "+821099990000");
    }
}
