use crate::config::{AppCheckConfig, Config, DevCredentials, EmulatorHosts, Locale};
use secrecy::SecretString;

#[derive(Debug, Clone)]
pub struct GlobalArgs {
    pub project_id: String,
    pub api_key: SecretString,
    pub emulator: Option<EmulatorHosts>,
    pub app_check_token: Option<SecretString>,
    pub locale: Locale,
    pub daily_limit: Option<u32>,
    pub email: Option<String>,
    pub password: Option<SecretString>,
    pub dev_auto_login: bool,
    pub sms_bypass: bool,
}

impl GlobalArgs {
    #[must_use]
    pub fn new(project_id: String, api_key: SecretString) -> Self {
        Self {
            project_id,
            api_key,
            emulator: None,
            app_check_token: None,
            locale: Locale::default(),
            daily_limit: None,
            email: None,
            password: None,
            dev_auto_login: false,
            sms_bypass: false,
        }
    }

    /// Actor credentials, when both email and password were given.
    #[must_use]
    pub fn credentials(&self) -> Option<DevCredentials> {
        match (&self.email, &self.password) {
            (Some(email), Some(password)) => Some(DevCredentials {
                email: email.clone(),
                password: password.clone(),
            }),
            _ => None,
        }
    }

    /// Library configuration for these arguments.
    #[must_use]
    pub fn config(&self) -> Config {
        let mut config = Config::new(self.project_id.clone(), self.api_key.clone())
            .with_locale(self.locale)
            .with_sms_bypass(self.sms_bypass);
        if let Some(hosts) = &self.emulator {
            config = config.with_emulator(hosts.clone());
        }
        if let Some(token) = &self.app_check_token {
            config = config.with_app_check(AppCheckConfig {
                enforce: true,
                debug_token: Some(token.clone()),
            });
        }
        if let Some(limit) = self.daily_limit {
            config = config.with_default_daily_limit(limit);
        }
        if self.dev_auto_login {
            if let Some(credentials) = self.credentials() {
                config = config.with_dev_login(credentials);
            }
        }
        config
    }
}
