//! Admin aggregates over the whole `users` collection.
//!
//! These scan every profile in process; they are meant for small admin
//! dashboards, not for hot paths.

use super::{effective_usage, UsageFacade};
use crate::{
    error::Error,
    models::{self, Provider, Role, UserProfile, NOTICES, POSTS, USERS},
    platform::{DocumentStore, Query},
    users::require_role,
};
use chrono::Duration;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{instrument, warn};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleCounts {
    pub user: usize,
    pub moderator: usize,
    pub admin: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderCounts {
    pub email: usize,
    pub google: usize,
    pub phone: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStats {
    pub total_users: usize,
    pub users_by_role: RoleCounts,
    pub users_by_provider: ProviderCounts,
    pub new_users_last_7_days: usize,
    pub active_users_last_30_days: usize,
    pub total_analyses: i64,
    pub total_posts: usize,
    pub total_notices: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AiUsageStats {
    pub date: String,
    pub active_users_today: usize,
    pub total_usage_today: u64,
    /// Mean uses per active user today.
    pub average_usage: f64,
    /// Users per daily count: `0`..`4` and `5+`.
    pub distribution: BTreeMap<String, usize>,
}

fn bucket(count: u32) -> String {
    if count >= 5 {
        "5+".to_string()
    } else {
        count.to_string()
    }
}

impl<D: DocumentStore> UsageFacade<D> {
    /// Every decodable profile; malformed documents are logged and skipped.
    async fn all_profiles(&self) -> Result<Vec<UserProfile>, Error> {
        let documents = self.store.query(&Query::new(USERS)).await?;
        Ok(documents
            .into_iter()
            .filter_map(|document| {
                let id = document.id.clone();
                models::decode::<UserProfile>(document)
                    .map_err(|err| warn!("Skipping malformed profile {id}: {err}"))
                    .ok()
            })
            .collect())
    }

    /// # Errors
    /// `PermissionDenied` unless `actor` is an admin.
    #[instrument(skip(self))]
    pub async fn get_system_stats(&self, actor: &str) -> Result<SystemStats, Error> {
        require_role(self.store.as_ref(), actor, Role::Admin).await?;
        let profiles = self.all_profiles().await?;
        let now = self.clock.now();
        let week_ago = now - Duration::days(7);
        let month_ago = now - Duration::days(30);

        let mut stats = SystemStats {
            total_users: profiles.len(),
            ..SystemStats::default()
        };
        for profile in &profiles {
            match profile.role {
                Role::User => stats.users_by_role.user += 1,
                Role::Moderator => stats.users_by_role.moderator += 1,
                Role::Admin => stats.users_by_role.admin += 1,
            }
            match profile.provider {
                Provider::Email => stats.users_by_provider.email += 1,
                Provider::Google => stats.users_by_provider.google += 1,
                Provider::Phone => stats.users_by_provider.phone += 1,
            }
            if profile.created_at >= week_ago {
                stats.new_users_last_7_days += 1;
            }
            if profile.last_login_at >= month_ago {
                stats.active_users_last_30_days += 1;
            }
            stats.total_analyses += profile.analysis_count.max(0);
        }
        stats.total_posts = self.store.query(&Query::new(POSTS)).await?.len();
        stats.total_notices = self.store.query(&Query::new(NOTICES)).await?.len();
        Ok(stats)
    }

    /// Every profile, newest first.
    ///
    /// # Errors
    /// `PermissionDenied` unless `actor` is an admin.
    #[instrument(skip(self))]
    pub async fn get_all_users(&self, actor: &str) -> Result<Vec<UserProfile>, Error> {
        require_role(self.store.as_ref(), actor, Role::Admin).await?;
        let mut profiles = self.all_profiles().await?;
        profiles.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(profiles)
    }

    /// # Errors
    /// `PermissionDenied` unless `actor` is an admin.
    #[instrument(skip(self))]
    pub async fn get_ai_usage_stats(&self, actor: &str) -> Result<AiUsageStats, Error> {
        require_role(self.store.as_ref(), actor, Role::Admin).await?;
        let profiles = self.all_profiles().await?;
        let today = self.today();

        let mut stats = AiUsageStats {
            distribution: ["0", "1", "2", "3", "4", "5+"]
                .iter()
                .map(|label| ((*label).to_string(), 0))
                .collect(),
            ..AiUsageStats::default()
        };
        for profile in &profiles {
            let (count, _) = effective_usage(
                profile.ai_usage.as_ref(),
                &today,
                self.config.default_daily_limit(),
            );
            if count > 0 {
                stats.active_users_today += 1;
                stats.total_usage_today += u64::from(count);
            }
            *stats.distribution.entry(bucket(count)).or_default() += 1;
        }
        if stats.active_users_today > 0 {
            #[allow(clippy::cast_precision_loss)]
            let average = stats.total_usage_today as f64 / stats.active_users_today as f64;
            stats.average_usage = average;
        }
        stats.date = today;
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buckets_top_out_at_five() {
        assert_eq!(bucket(0), "0");
        assert_eq!(bucket(4), "4");
        assert_eq!(bucket(5), "5+");
        assert_eq!(bucket(42), "5+");
    }
}
