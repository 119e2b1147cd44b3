//! Runtime configuration shared by every facade.
//!
//! Built once at startup (from CLI args or by the embedding application) and
//! handed to the facades behind an `Arc`. Nothing in the library reads the
//! process environment directly.

use chrono::{FixedOffset, Offset, Utc};
use secrecy::SecretString;
use std::{fmt, str::FromStr, time::Duration};

const DEFAULT_DAILY_LIMIT: u32 = 5;
const DEFAULT_USAGE_UTC_OFFSET_SECONDS: i32 = 9 * 60 * 60;
const DEFAULT_CAPTCHA_READY_TIMEOUT_MS: u64 = 10_000;

/// Language used for user-facing error messages.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Locale {
    #[default]
    Ko,
    En,
}

impl FromStr for Locale {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "ko" | "ko-kr" => Ok(Self::Ko),
            "en" | "en-us" => Ok(Self::En),
            other => Err(format!("unsupported locale: {other}")),
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ko => write!(f, "ko"),
            Self::En => write!(f, "en"),
        }
    }
}

/// Local emulator endpoints, `host:port` without scheme.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmulatorHosts {
    pub auth: String,
    pub firestore: String,
}

#[derive(Clone, Debug, Default)]
pub struct AppCheckConfig {
    pub enforce: bool,
    pub debug_token: Option<SecretString>,
}

#[derive(Clone, Debug)]
pub struct DevCredentials {
    pub email: String,
    pub password: SecretString,
}

#[derive(Clone, Debug)]
pub struct Config {
    project_id: String,
    api_key: SecretString,
    locale: Locale,
    emulator: Option<EmulatorHosts>,
    app_check: AppCheckConfig,
    dev_login: Option<DevCredentials>,
    sms_bypass: bool,
    default_daily_limit: u32,
    usage_utc_offset_seconds: i32,
    captcha_ready_timeout: Duration,
}

impl Config {
    #[must_use]
    pub fn new(project_id: String, api_key: SecretString) -> Self {
        Self {
            project_id,
            api_key,
            locale: Locale::default(),
            emulator: None,
            app_check: AppCheckConfig::default(),
            dev_login: None,
            sms_bypass: false,
            default_daily_limit: DEFAULT_DAILY_LIMIT,
            usage_utc_offset_seconds: DEFAULT_USAGE_UTC_OFFSET_SECONDS,
            captcha_ready_timeout: Duration::from_millis(DEFAULT_CAPTCHA_READY_TIMEOUT_MS),
        }
    }

    #[must_use]
    pub fn with_locale(mut self, locale: Locale) -> Self {
        self.locale = locale;
        self
    }

    #[must_use]
    pub fn with_emulator(mut self, hosts: EmulatorHosts) -> Self {
        self.emulator = Some(hosts);
        self
    }

    #[must_use]
    pub fn with_app_check(mut self, app_check: AppCheckConfig) -> Self {
        self.app_check = app_check;
        self
    }

    #[must_use]
    pub fn with_dev_login(mut self, credentials: DevCredentials) -> Self {
        self.dev_login = Some(credentials);
        self
    }

    #[must_use]
    pub fn with_sms_bypass(mut self, enabled: bool) -> Self {
        self.sms_bypass = enabled;
        self
    }

    #[must_use]
    pub fn with_default_daily_limit(mut self, limit: u32) -> Self {
        self.default_daily_limit = limit;
        self
    }

    #[must_use]
    pub fn with_usage_utc_offset_seconds(mut self, seconds: i32) -> Self {
        self.usage_utc_offset_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_captcha_ready_timeout(mut self, timeout: Duration) -> Self {
        self.captcha_ready_timeout = timeout;
        self
    }

    #[must_use]
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    #[must_use]
    pub fn api_key(&self) -> &SecretString {
        &self.api_key
    }

    #[must_use]
    pub fn locale(&self) -> Locale {
        self.locale
    }

    #[must_use]
    pub fn emulator(&self) -> Option<&EmulatorHosts> {
        self.emulator.as_ref()
    }

    #[must_use]
    pub fn app_check(&self) -> &AppCheckConfig {
        &self.app_check
    }

    #[must_use]
    pub fn dev_login(&self) -> Option<&DevCredentials> {
        self.dev_login.as_ref()
    }

    #[must_use]
    pub fn sms_bypass(&self) -> bool {
        self.sms_bypass
    }

    #[must_use]
    pub fn default_daily_limit(&self) -> u32 {
        self.default_daily_limit
    }

    /// Offset used to decide what "today" means for the daily usage counter.
    /// Falls back to UTC when the configured offset is out of range.
    #[must_use]
    pub fn usage_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.usage_utc_offset_seconds).unwrap_or_else(|| Utc.fix())
    }

    #[must_use]
    pub fn captcha_ready_timeout(&self) -> Duration {
        self.captcha_ready_timeout
    }
}
