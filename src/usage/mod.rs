//! Daily AI usage quota.
//!
//! The counter lives in the user's profile (`aiUsage`). A `lastUsedDate` other
//! than today, in the configured usage timezone, counts as zero uses. Admins
//! are counted but never denied.

pub mod stats;

use crate::{
    clock::Clock,
    config::Config,
    error::{Error, ErrorKind},
    models::{AiUsage, Role, UserProfile, UsageStatus, USERS},
    platform::{ensure_available, DocPath, DocumentStore, Fields},
    users::{load_profile, require_role},
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, instrument};

pub const MAX_USAGE_COUNT: i64 = 10_000;
pub const MAX_DAILY_LIMIT: i64 = 1_000;

pub struct UsageFacade<D> {
    store: Arc<D>,
    config: Arc<Config>,
    clock: Arc<dyn Clock>,
}

/// Clamp a stored counter into `0..=MAX_USAGE_COUNT`.
pub(crate) fn clamp_count(count: i64) -> u32 {
    u32::try_from(count.clamp(0, MAX_USAGE_COUNT)).unwrap_or_default()
}

/// Clamp a daily limit into `0..=MAX_DAILY_LIMIT`.
pub(crate) fn clamp_limit(limit: i64) -> u32 {
    u32::try_from(limit.clamp(0, MAX_DAILY_LIMIT)).unwrap_or_default()
}

/// Today's count and limit for `usage`; a stale date reads as zero uses.
pub(crate) fn effective_usage(usage: Option<&AiUsage>, today: &str, default_limit: u32) -> (u32, u32) {
    let Some(usage) = usage else {
        return (0, clamp_limit(i64::from(default_limit)));
    };
    let limit = clamp_limit(usage.daily_limit.unwrap_or(i64::from(default_limit)));
    let count = if usage.last_used_date.as_deref() == Some(today) {
        clamp_count(usage.usage_count)
    } else {
        0
    };
    (count, limit)
}

fn status(count: u32, limit: u32, is_admin: bool) -> UsageStatus {
    if is_admin {
        UsageStatus {
            usage_count: count,
            daily_limit: limit,
            remaining_usage: None,
            can_use: true,
            is_admin,
        }
    } else {
        UsageStatus {
            usage_count: count,
            daily_limit: limit,
            remaining_usage: Some(limit.saturating_sub(count)),
            can_use: count < limit,
            is_admin,
        }
    }
}

impl<D: DocumentStore> UsageFacade<D> {
    pub fn new(store: Arc<D>, config: Arc<Config>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            config,
            clock,
        }
    }

    /// `YYYY-MM-DD` in the usage timezone.
    #[must_use]
    pub fn today(&self) -> String {
        self.clock
            .now()
            .with_timezone(&self.config.usage_offset())
            .format("%Y-%m-%d")
            .to_string()
    }

    async fn profile(&self, uid: &str) -> Result<UserProfile, Error> {
        ensure_available(self.store.is_available())?;
        if uid.is_empty() {
            return Err(Error::Precondition(ErrorKind::NotAuthenticated));
        }
        load_profile(self.store.as_ref(), uid)
            .await?
            .ok_or(Error::Precondition(ErrorKind::NotFound))
    }

    /// Current quota status. Nothing is written.
    ///
    /// # Errors
    /// `NotFound` when the user has no profile document.
    #[instrument(skip(self))]
    pub async fn check_ai_usage_limit(&self, uid: &str) -> Result<UsageStatus, Error> {
        let profile = self.profile(uid).await?;
        let (count, limit) = effective_usage(
            profile.ai_usage.as_ref(),
            &self.today(),
            self.config.default_daily_limit(),
        );
        Ok(status(count, limit, profile.role == Role::Admin))
    }

    /// Record one use and return the new status.
    ///
    /// # Errors
    /// [`Error::UsageLimit`] when a non-admin has no uses left today; nothing
    /// is written in that case.
    #[instrument(skip(self))]
    pub async fn increment_ai_usage(&self, uid: &str) -> Result<UsageStatus, Error> {
        let profile = self.profile(uid).await?;
        let today = self.today();
        let (count, limit) = effective_usage(
            profile.ai_usage.as_ref(),
            &today,
            self.config.default_daily_limit(),
        );
        let is_admin = profile.role == Role::Admin;
        if !is_admin && count >= limit {
            debug!("usage limit reached for {}: {} of {}", uid, count, limit);
            return Err(Error::UsageLimit(UsageStatus {
                usage_count: count,
                daily_limit: limit,
                remaining_usage: Some(0),
                can_use: false,
                is_admin,
            }));
        }

        let next = clamp_count(i64::from(count) + 1);
        let usage = AiUsage {
            usage_count: i64::from(next),
            daily_limit: Some(i64::from(limit)),
            last_used_date: Some(today),
        };
        let mut fields = Fields::new();
        fields.insert("aiUsage".to_string(), serde_json::to_value(&usage)?);
        self.store.update(&DocPath::new(USERS, uid), fields).await?;
        Ok(status(next, limit, is_admin))
    }

    /// Set `uid`'s daily limit, clamped into `0..=1000`. Admin only.
    ///
    /// # Errors
    /// `PermissionDenied` unless `actor` is an admin, `NotFound` for an unknown user.
    #[instrument(skip(self))]
    pub async fn set_daily_limit(&self, actor: &str, uid: &str, limit: i64) -> Result<u32, Error> {
        ensure_available(self.store.is_available())?;
        require_role(self.store.as_ref(), actor, Role::Admin).await?;
        self.profile(uid).await?;
        let limit = clamp_limit(limit);
        let mut fields = Fields::new();
        fields.insert("aiUsage.dailyLimit".to_string(), Value::from(limit));
        self.store.update(&DocPath::new(USERS, uid), fields).await?;
        info!("daily limit of {} set to {} by {}", uid, limit, actor);
        Ok(limit)
    }
}
