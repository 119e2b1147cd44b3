//! Error taxonomy and the platform code translator.
//!
//! Platform calls fail with a [`PlatformError`] carrying the vendor code
//! (`auth/email-already-in-use`, `permission-denied`, ...). Those codes are
//! looked up once in [`PLATFORM_CODES`] and become an [`ErrorKind`]; each kind
//! has a localized message. Unmapped codes keep the raw code and surface a
//! generic message that embeds it.

use crate::{config::Locale, models::UsageStatus};
use std::fmt;
use thiserror::Error;

/// Error reported by an identity/document platform implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct PlatformError {
    pub code: String,
    pub message: String,
}

impl PlatformError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    // Preconditions
    ServiceUnavailable,
    CaptchaNotReady,
    PermissionDenied,
    NotAuthenticated,
    NotFound,
    InvalidArgument,
    // Domain rules
    DuplicatePhone,
    UsageLimitExceeded,
    PayloadTooLarge,
    // Identity
    EmailAlreadyInUse,
    InvalidEmail,
    WeakPassword,
    UserNotFound,
    WrongPassword,
    InvalidCredential,
    UserDisabled,
    TooManyRequests,
    NetworkRequestFailed,
    PopupBlocked,
    PopupClosed,
    AccountExistsWithDifferentCredential,
    RequiresRecentLogin,
    OperationNotAllowed,
    SessionExpired,
    // Phone
    InvalidPhoneNumber,
    MissingPhoneNumber,
    QuotaExceeded,
    CaptchaCheckFailed,
    InvalidVerificationCode,
    CodeExpired,
    BillingNotEnabled,
    AppNotAuthorized,
    InvalidAppCredential,
    // Documents
    DeadlineExceeded,
    AlreadyExists,
    Unknown,
}

/// Platform code → kind. Codes must be unique; several codes may share a kind.
pub const PLATFORM_CODES: &[(&str, ErrorKind)] = &[
    ("auth/email-already-in-use", ErrorKind::EmailAlreadyInUse),
    ("auth/invalid-email", ErrorKind::InvalidEmail),
    ("auth/weak-password", ErrorKind::WeakPassword),
    ("auth/user-not-found", ErrorKind::UserNotFound),
    ("auth/wrong-password", ErrorKind::WrongPassword),
    ("auth/invalid-credential", ErrorKind::InvalidCredential),
    ("auth/invalid-login-credentials", ErrorKind::InvalidCredential),
    ("auth/user-disabled", ErrorKind::UserDisabled),
    ("auth/too-many-requests", ErrorKind::TooManyRequests),
    ("auth/network-request-failed", ErrorKind::NetworkRequestFailed),
    ("auth/popup-blocked", ErrorKind::PopupBlocked),
    ("auth/popup-closed-by-user", ErrorKind::PopupClosed),
    ("auth/cancelled-popup-request", ErrorKind::PopupClosed),
    (
        "auth/account-exists-with-different-credential",
        ErrorKind::AccountExistsWithDifferentCredential,
    ),
    ("auth/requires-recent-login", ErrorKind::RequiresRecentLogin),
    ("auth/operation-not-allowed", ErrorKind::OperationNotAllowed),
    ("auth/user-token-expired", ErrorKind::SessionExpired),
    ("auth/invalid-user-token", ErrorKind::SessionExpired),
    ("auth/invalid-phone-number", ErrorKind::InvalidPhoneNumber),
    ("auth/missing-phone-number", ErrorKind::MissingPhoneNumber),
    ("auth/quota-exceeded", ErrorKind::QuotaExceeded),
    ("auth/captcha-check-failed", ErrorKind::CaptchaCheckFailed),
    ("auth/invalid-verification-code", ErrorKind::InvalidVerificationCode),
    ("auth/code-expired", ErrorKind::CodeExpired),
    ("auth/billing-not-enabled", ErrorKind::BillingNotEnabled),
    ("auth/app-not-authorized", ErrorKind::AppNotAuthorized),
    ("auth/invalid-app-credential", ErrorKind::InvalidAppCredential),
    ("permission-denied", ErrorKind::PermissionDenied),
    ("unauthenticated", ErrorKind::NotAuthenticated),
    ("not-found", ErrorKind::NotFound),
    ("unavailable", ErrorKind::ServiceUnavailable),
    ("deadline-exceeded", ErrorKind::DeadlineExceeded),
    ("already-exists", ErrorKind::AlreadyExists),
    ("resource-exhausted", ErrorKind::QuotaExceeded),
    ("invalid-argument", ErrorKind::InvalidArgument),
];

impl ErrorKind {
    #[must_use]
    pub fn from_code(code: &str) -> Option<Self> {
        PLATFORM_CODES
            .iter()
            .find(|(known, _)| *known == code)
            .map(|(_, kind)| *kind)
    }

    /// Stable identifier used in result envelopes when no platform code exists.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ServiceUnavailable => "service_unavailable",
            Self::CaptchaNotReady => "captcha_not_ready",
            Self::PermissionDenied => "permission_denied",
            Self::NotAuthenticated => "not_authenticated",
            Self::NotFound => "not_found",
            Self::InvalidArgument => "invalid_argument",
            Self::DuplicatePhone => "duplicate_phone",
            Self::UsageLimitExceeded => "usage_limit_exceeded",
            Self::PayloadTooLarge => "payload_too_large",
            Self::EmailAlreadyInUse => "email_already_in_use",
            Self::InvalidEmail => "invalid_email",
            Self::WeakPassword => "weak_password",
            Self::UserNotFound => "user_not_found",
            Self::WrongPassword => "wrong_password",
            Self::InvalidCredential => "invalid_credential",
            Self::UserDisabled => "user_disabled",
            Self::TooManyRequests => "too_many_requests",
            Self::NetworkRequestFailed => "network_request_failed",
            Self::PopupBlocked => "popup_blocked",
            Self::PopupClosed => "popup_closed",
            Self::AccountExistsWithDifferentCredential => {
                "account_exists_with_different_credential"
            }
            Self::RequiresRecentLogin => "requires_recent_login",
            Self::OperationNotAllowed => "operation_not_allowed",
            Self::SessionExpired => "session_expired",
            Self::InvalidPhoneNumber => "invalid_phone_number",
            Self::MissingPhoneNumber => "missing_phone_number",
            Self::QuotaExceeded => "quota_exceeded",
            Self::CaptchaCheckFailed => "captcha_check_failed",
            Self::InvalidVerificationCode => "invalid_verification_code",
            Self::CodeExpired => "code_expired",
            Self::BillingNotEnabled => "billing_not_enabled",
            Self::AppNotAuthorized => "app_not_authorized",
            Self::InvalidAppCredential => "invalid_app_credential",
            Self::DeadlineExceeded => "deadline_exceeded",
            Self::AlreadyExists => "already_exists",
            Self::Unknown => "unknown",
        }
    }

    #[must_use]
    pub fn message(self, locale: Locale) -> &'static str {
        match locale {
            Locale::Ko => self.message_ko(),
            Locale::En => self.message_en(),
        }
    }

    fn message_ko(self) -> &'static str {
        match self {
            Self::ServiceUnavailable => "서비스를 사용할 수 없습니다. 잠시 후 다시 시도해주세요.",
            Self::CaptchaNotReady => "보안 인증(reCAPTCHA)이 준비되지 않았습니다. 페이지를 새로고침해주세요.",
            Self::PermissionDenied => "권한이 없습니다.",
            Self::NotAuthenticated => "로그인이 필요합니다.",
            Self::NotFound => "요청한 데이터를 찾을 수 없습니다.",
            Self::InvalidArgument => "입력값이 올바르지 않습니다.",
            Self::DuplicatePhone => "이미 가입된 전화번호입니다.",
            Self::UsageLimitExceeded => "오늘의 AI 사용 한도를 모두 사용했습니다.",
            Self::PayloadTooLarge => "저장할 데이터가 너무 큽니다.",
            Self::EmailAlreadyInUse => "이미 사용 중인 이메일입니다.",
            Self::InvalidEmail => "유효하지 않은 이메일 주소입니다.",
            Self::WeakPassword => "비밀번호는 6자 이상이어야 합니다.",
            Self::UserNotFound => "등록되지 않은 사용자입니다.",
            Self::WrongPassword => "비밀번호가 올바르지 않습니다.",
            Self::InvalidCredential => "이메일 또는 비밀번호가 올바르지 않습니다.",
            Self::UserDisabled => "비활성화된 계정입니다.",
            Self::TooManyRequests => "요청이 너무 많습니다. 잠시 후 다시 시도해주세요.",
            Self::NetworkRequestFailed => "네트워크 연결을 확인해주세요.",
            Self::PopupBlocked => "팝업이 차단되었습니다. 팝업 차단을 해제해주세요.",
            Self::PopupClosed => "로그인 창이 닫혔습니다.",
            Self::AccountExistsWithDifferentCredential => {
                "다른 로그인 방식으로 가입된 계정입니다."
            }
            Self::RequiresRecentLogin => "보안을 위해 다시 로그인해주세요.",
            Self::OperationNotAllowed => "허용되지 않은 작업입니다.",
            Self::SessionExpired => "로그인 세션이 만료되었습니다. 다시 로그인해주세요.",
            Self::InvalidPhoneNumber => "유효하지 않은 전화번호 형식입니다.",
            Self::MissingPhoneNumber => "전화번호를 입력해주세요.",
            Self::QuotaExceeded => "SMS 전송 한도를 초과했습니다. 나중에 다시 시도해주세요.",
            Self::CaptchaCheckFailed => "보안 인증에 실패했습니다. 다시 시도해주세요.",
            Self::InvalidVerificationCode => "인증번호가 올바르지 않습니다.",
            Self::CodeExpired => "인증번호가 만료되었습니다. 다시 요청해주세요.",
            Self::BillingNotEnabled => "SMS 인증 설정에 문제가 있습니다. (결제 미설정)",
            Self::AppNotAuthorized => "이 도메인에서는 인증을 사용할 수 없습니다.",
            Self::InvalidAppCredential => "앱 인증 정보가 올바르지 않습니다.",
            Self::DeadlineExceeded => "요청 시간이 초과되었습니다.",
            Self::AlreadyExists => "이미 존재하는 데이터입니다.",
            Self::Unknown => "알 수 없는 오류가 발생했습니다.",
        }
    }

    fn message_en(self) -> &'static str {
        match self {
            Self::ServiceUnavailable => "The service is unavailable. Please try again later.",
            Self::CaptchaNotReady => "The security check is not ready. Please reload the page.",
            Self::PermissionDenied => "You do not have permission to do this.",
            Self::NotAuthenticated => "Please sign in first.",
            Self::NotFound => "The requested data was not found.",
            Self::InvalidArgument => "The input is not valid.",
            Self::DuplicatePhone => "This phone number is already registered.",
            Self::UsageLimitExceeded => "You have used today's AI usage limit.",
            Self::PayloadTooLarge => "The data is too large to save.",
            Self::EmailAlreadyInUse => "This email is already in use.",
            Self::InvalidEmail => "The email address is not valid.",
            Self::WeakPassword => "The password must be at least 6 characters.",
            Self::UserNotFound => "No account exists for this user.",
            Self::WrongPassword => "The password is incorrect.",
            Self::InvalidCredential => "The email or password is incorrect.",
            Self::UserDisabled => "This account has been disabled.",
            Self::TooManyRequests => "Too many requests. Please try again later.",
            Self::NetworkRequestFailed => "Please check your network connection.",
            Self::PopupBlocked => "The popup was blocked. Please allow popups.",
            Self::PopupClosed => "The sign-in window was closed.",
            Self::AccountExistsWithDifferentCredential => {
                "An account already exists with a different sign-in method."
            }
            Self::RequiresRecentLogin => "Please sign in again to continue.",
            Self::OperationNotAllowed => "This operation is not allowed.",
            Self::SessionExpired => "Your session has expired. Please sign in again.",
            Self::InvalidPhoneNumber => "The phone number format is not valid.",
            Self::MissingPhoneNumber => "Please enter a phone number.",
            Self::QuotaExceeded => "The SMS quota was exceeded. Please try again later.",
            Self::CaptchaCheckFailed => "The security check failed. Please try again.",
            Self::InvalidVerificationCode => "The verification code is incorrect.",
            Self::CodeExpired => "The verification code has expired. Please request a new one.",
            Self::BillingNotEnabled => "SMS verification is misconfigured (billing not enabled).",
            Self::AppNotAuthorized => "Authentication is not allowed on this domain.",
            Self::InvalidAppCredential => "The app credential is not valid.",
            Self::DeadlineExceeded => "The request timed out.",
            Self::AlreadyExists => "The data already exists.",
            Self::Unknown => "An unknown error occurred.",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("precondition failed: {0}")]
    Precondition(ErrorKind),
    #[error("platform error {code}: {message}")]
    Platform {
        kind: ErrorKind,
        code: String,
        message: String,
    },
    #[error("payload too large: {size} bytes")]
    PayloadTooLarge { size: usize },
    #[error("daily usage limit reached ({} of {})", .0.usage_count, .0.daily_limit)]
    UsageLimit(UsageStatus),
    #[error("{0}")]
    Unexpected(String),
}

impl Error {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Precondition(kind) | Self::Platform { kind, .. } => *kind,
            Self::PayloadTooLarge { .. } => ErrorKind::PayloadTooLarge,
            Self::UsageLimit(_) => ErrorKind::UsageLimitExceeded,
            Self::Unexpected(_) => ErrorKind::Unknown,
        }
    }

    /// Code exposed to callers: the raw platform code when there is one.
    #[must_use]
    pub fn code(&self) -> Option<String> {
        match self {
            Self::Platform { code, .. } => Some(code.clone()),
            Self::Unexpected(_) => None,
            other => Some(other.kind().as_str().to_string()),
        }
    }

    #[must_use]
    pub fn localized(&self, locale: Locale) -> String {
        match self {
            Self::Platform {
                kind: ErrorKind::Unknown,
                code,
                ..
            } => match locale {
                Locale::Ko => format!("오류가 발생했습니다. ({code})"),
                Locale::En => format!("An error occurred. ({code})"),
            },
            Self::Unexpected(message) => message.clone(),
            other => other.kind().message(locale).to_string(),
        }
    }

    #[must_use]
    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind() == kind
    }
}

impl From<PlatformError> for Error {
    fn from(err: PlatformError) -> Self {
        if err.code.trim().is_empty() {
            return Self::Unexpected(err.message);
        }
        let kind = ErrorKind::from_code(&err.code).unwrap_or(ErrorKind::Unknown);
        Self::Platform {
            kind,
            code: err.code,
            message: err.message,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Unexpected(format!("malformed document: {err}"))
    }
}
