//! Document shapes persisted in the platform's document store.
//!
//! Field names are camelCase on the wire. Every field is defaulted on read so
//! older or partially written documents still load; counters are stored as
//! `i64` and clamped by the facades that write them.

use crate::{
    error::Error,
    platform::{Document, Fields},
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub const USERS: &str = "users";
pub const POSTS: &str = "posts";
pub const COMMENTS: &str = "comments";
pub const NOTICES: &str = "notices";
pub const ANALYSIS_RESULTS: &str = "analysisResults";

/// Fixed-width RFC 3339 so lexical order matches chronological order.
#[must_use]
pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) mod rfc3339 {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(at: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_timestamp(at))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|at| at.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }

    pub mod option {
        use chrono::{DateTime, Utc};
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            at: &Option<DateTime<Utc>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match at {
                Some(at) => super::serialize(at, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            let raw = Option::<String>::deserialize(deserializer)?;
            raw.map(|raw| {
                DateTime::parse_from_rfc3339(&raw)
                    .map(|at| at.with_timezone(&Utc))
                    .map_err(serde::de::Error::custom)
            })
            .transpose()
        }
    }
}

/// Counters read from documents other clients may have written. Any number is
/// accepted (floats are truncated and saturate), numeric strings are parsed,
/// everything else reads as absent.
pub(crate) mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    #[allow(clippy::cast_possible_truncation)]
    fn to_i64(value: &Value) -> Option<i64> {
        match value {
            Value::Number(number) => number
                .as_i64()
                .or_else(|| number.as_u64().map(|n| i64::try_from(n).unwrap_or(i64::MAX)))
                .or_else(|| number.as_f64().map(|n| n as i64)),
            Value::String(raw) => raw
                .trim()
                .parse::<i64>()
                .ok()
                .or_else(|| raw.trim().parse::<f64>().ok().filter(|n| n.is_finite()).map(|n| n as i64)),
            _ => None,
        }
    }

    pub fn int<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        Ok(to_i64(&Value::deserialize(deserializer)?).unwrap_or_default())
    }

    pub fn opt_int<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
        Ok(to_i64(&Value::deserialize(deserializer)?))
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Moderator,
    Admin,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Moderator => "moderator",
            Self::Admin => "admin",
        }
    }

    /// `true` when this role is at least as privileged as `required`.
    #[must_use]
    pub fn satisfies(self, required: Role) -> bool {
        self.rank() >= required.rank()
    }

    fn rank(self) -> u8 {
        match self {
            Self::User => 0,
            Self::Moderator => 1,
            Self::Admin => 2,
        }
    }
}

/// Unknown or missing roles read as `User`, never as something privileged.
impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        Ok(match raw.as_str().map(|role| role.trim().to_lowercase()).as_deref() {
            Some("admin") => Self::Admin,
            Some("moderator") => Self::Moderator,
            _ => Self::User,
        })
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Email,
    Google,
    Phone,
}

impl Provider {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Google => "google",
            Self::Phone => "phone",
        }
    }
}

impl<'de> Deserialize<'de> for Provider {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        Ok(match raw.as_str().map(|provider| provider.trim().to_lowercase()).as_deref() {
            Some("google") => Self::Google,
            Some("phone") => Self::Phone,
            _ => Self::Email,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Preferences {
    pub framework: String,
    pub notifications: bool,
    pub theme: String,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            framework: "react".to_string(),
            notifications: true,
            theme: "light".to_string(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferencesUpdate {
    pub framework: Option<String>,
    pub notifications: Option<bool>,
    pub theme: Option<String>,
}

/// Daily AI usage sub-record. `dailyLimit`/`lastUsedDate` may be absent on
/// documents written before the quota existed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AiUsage {
    #[serde(deserialize_with = "lenient::int")]
    pub usage_count: i64,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::opt_int")]
    pub daily_limit: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used_date: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserProfile {
    pub uid: String,
    pub email: String,
    pub display_name: String,
    #[serde(rename = "photoURL", skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    pub role: Role,
    pub email_verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    pub phone_verified: bool,
    #[serde(with = "rfc3339")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "rfc3339")]
    pub last_login_at: DateTime<Utc>,
    #[serde(deserialize_with = "lenient::int")]
    pub analysis_count: i64,
    pub preferences: Preferences,
    pub provider: Provider,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_usage: Option<AiUsage>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Post {
    #[serde(skip_serializing)]
    pub id: String,
    pub title: String,
    pub content: String,
    pub category: String,
    pub author_id: String,
    pub author_name: String,
    pub author_email: String,
    #[serde(with = "rfc3339")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "rfc3339")]
    pub updated_at: DateTime<Utc>,
    #[serde(deserialize_with = "lenient::int")]
    pub views: i64,
    #[serde(deserialize_with = "lenient::int")]
    pub likes: i64,
    #[serde(deserialize_with = "lenient::int")]
    pub comment_count: i64,
    pub is_published: bool,
    pub tags: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPost {
    pub title: String,
    pub content: String,
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "published_by_default")]
    pub is_published: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostUpdate {
    pub title: Option<String>,
    pub content: Option<String>,
    pub category: Option<String>,
    pub tags: Option<Vec<String>>,
    pub is_published: Option<bool>,
}

impl PostUpdate {
    /// Changed fields only; `updatedAt` is added by the caller.
    pub(crate) fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        if let Some(title) = &self.title {
            fields.insert("title".to_string(), Value::from(title.clone()));
        }
        if let Some(content) = &self.content {
            fields.insert("content".to_string(), Value::from(content.clone()));
        }
        if let Some(category) = &self.category {
            fields.insert("category".to_string(), Value::from(category.clone()));
        }
        if let Some(tags) = &self.tags {
            fields.insert("tags".to_string(), Value::from(tags.clone()));
        }
        if let Some(is_published) = self.is_published {
            fields.insert("isPublished".to_string(), Value::from(is_published));
        }
        fields
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Comment {
    #[serde(skip_serializing)]
    pub id: String,
    pub content: String,
    pub author_id: String,
    pub author_name: String,
    #[serde(with = "rfc3339")]
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticePriority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Notice {
    #[serde(skip_serializing)]
    pub id: String,
    pub title: String,
    pub content: String,
    pub category: String,
    pub priority: NoticePriority,
    pub is_pinned: bool,
    #[serde(with = "rfc3339::option", skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub author_id: String,
    pub author_name: String,
    #[serde(with = "rfc3339")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "rfc3339")]
    pub updated_at: DateTime<Utc>,
    #[serde(deserialize_with = "lenient::int")]
    pub views: i64,
    pub is_published: bool,
}

impl Notice {
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewNotice {
    pub title: String,
    pub content: String,
    pub category: String,
    #[serde(default)]
    pub priority: NoticePriority,
    #[serde(default)]
    pub is_pinned: bool,
    #[serde(default, with = "rfc3339::option")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default = "published_by_default")]
    pub is_published: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NoticeUpdate {
    pub title: Option<String>,
    pub content: Option<String>,
    pub category: Option<String>,
    pub priority: Option<NoticePriority>,
    pub is_pinned: Option<bool>,
    /// `Some(None)` clears the expiry.
    pub expires_at: Option<Option<DateTime<Utc>>>,
    pub is_published: Option<bool>,
}

impl NoticeUpdate {
    pub(crate) fn to_fields(&self) -> Result<Fields, Error> {
        let mut fields = Fields::new();
        if let Some(title) = &self.title {
            fields.insert("title".to_string(), Value::from(title.clone()));
        }
        if let Some(content) = &self.content {
            fields.insert("content".to_string(), Value::from(content.clone()));
        }
        if let Some(category) = &self.category {
            fields.insert("category".to_string(), Value::from(category.clone()));
        }
        if let Some(priority) = self.priority {
            fields.insert("priority".to_string(), serde_json::to_value(priority)?);
        }
        if let Some(is_pinned) = self.is_pinned {
            fields.insert("isPinned".to_string(), Value::from(is_pinned));
        }
        if let Some(expires_at) = &self.expires_at {
            let value = expires_at
                .as_ref()
                .map_or(Value::Null, |at| Value::from(format_timestamp(at)));
            fields.insert("expiresAt".to_string(), value);
        }
        if let Some(is_published) = self.is_published {
            fields.insert("isPublished".to_string(), Value::from(is_published));
        }
        Ok(fields)
    }
}

fn published_by_default() -> bool {
    true
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FileMeta {
    pub name: String,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SeveritySummary {
    pub critical: u32,
    pub high: u32,
    pub medium: u32,
    pub low: u32,
    pub info: u32,
    pub total: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Finding {
    pub id: String,
    pub title: String,
    pub severity: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
}

/// Size-bounded snapshot of a security scan outcome.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalysisSnapshot {
    #[serde(skip_serializing)]
    pub id: String,
    pub device_type: String,
    pub framework: String,
    pub file: FileMeta,
    pub summary: SeveritySummary,
    pub findings: Vec<Finding>,
    pub metadata: Fields,
    pub original_finding_count: u32,
    pub truncated: bool,
    #[serde(with = "rfc3339")]
    pub created_at: DateTime<Utc>,
}

/// Result of a usage quota check or increment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageStatus {
    pub usage_count: u32,
    pub daily_limit: u32,
    /// `None` means unlimited.
    pub remaining_usage: Option<u32>,
    pub can_use: bool,
    pub is_admin: bool,
}

/// Documents that carry their store id outside of the stored fields.
pub trait Record: DeserializeOwned {
    fn set_id(&mut self, id: String);
}

impl Record for Post {
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

impl Record for Comment {
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

impl Record for Notice {
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

impl Record for AnalysisSnapshot {
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

impl Record for UserProfile {
    fn set_id(&mut self, id: String) {
        if self.uid.is_empty() {
            self.uid = id;
        }
    }
}

/// Decode a stored document into its typed record.
pub fn decode<T: Record>(document: Document) -> Result<T, Error> {
    let mut record: T = serde_json::from_value(Value::Object(document.fields))?;
    record.set_id(document.id);
    Ok(record)
}

/// Encode a record into document fields.
pub fn encode<T: Serialize>(record: &T) -> Result<Fields, Error> {
    match serde_json::to_value(record)? {
        Value::Object(fields) => Ok(fields),
        other => Err(Error::Unexpected(format!(
            "expected an object document, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn timestamps_are_fixed_width() {
        let at = Utc.with_ymd_and_hms(2026, 10, 16, 9, 30, 0).unwrap();
        assert_eq!(format_timestamp(&at), "2026-10-16T09:30:00.000Z");
    }

    #[test]
    fn user_profile_defaults_missing_fields() {
        let document = Document {
            id: "u1".to_string(),
            fields: json!({"email": "a@x.com", "role": "admin"})
                .as_object()
                .cloned()
                .unwrap_or_default(),
        };
        let profile: UserProfile = decode(document).unwrap();
        assert_eq!(profile.uid, "u1");
        assert_eq!(profile.role, Role::Admin);
        assert_eq!(profile.analysis_count, 0);
        assert_eq!(profile.preferences, Preferences::default());
        assert!(profile.ai_usage.is_none());
    }

    #[test]
    fn corrupt_counters_and_unknown_enums_still_decode() {
        let document = Document {
            id: "u2".to_string(),
            fields: json!({
                "role": "superuser",
                "provider": 7,
                "analysisCount": null,
                "aiUsage": {"usageCount": 1e20, "dailyLimit": "12", "lastUsedDate": "2026-10-16"}
            })
            .as_object()
            .cloned()
            .unwrap_or_default(),
        };
        let profile: UserProfile = decode(document).unwrap();
        assert_eq!(profile.role, Role::User);
        assert_eq!(profile.provider, Provider::Email);
        assert_eq!(profile.analysis_count, 0);
        let usage = profile.ai_usage.unwrap_or_default();
        assert_eq!(usage.usage_count, i64::MAX);
        assert_eq!(usage.daily_limit, Some(12));
    }

    #[test]
    fn fractional_and_garbage_counters() {
        let usage: AiUsage =
            serde_json::from_value(json!({"usageCount": 2.5, "dailyLimit": null})).unwrap();
        assert_eq!(usage.usage_count, 2);
        assert_eq!(usage.daily_limit, None);

        let usage: AiUsage =
            serde_json::from_value(json!({"usageCount": "lots", "dailyLimit": [1]})).unwrap();
        assert_eq!(usage.usage_count, 0);
        assert_eq!(usage.daily_limit, None);
    }

    #[test]
    fn post_round_trip_keeps_wire_names() {
        let post = Post {
            id: "p1".to_string(),
            title: "t".to_string(),
            author_id: "u1".to_string(),
            is_published: true,
            comment_count: 2,
            ..Post::default()
        };
        let fields = encode(&post).unwrap();
        assert!(fields.get("id").is_none());
        assert_eq!(fields.get("authorId"), Some(&json!("u1")));
        assert_eq!(fields.get("isPublished"), Some(&json!(true)));
        assert_eq!(fields.get("commentCount"), Some(&json!(2)));
    }

    #[test]
    fn notice_update_can_clear_expiry() {
        let update = NoticeUpdate {
            expires_at: Some(None),
            is_pinned: Some(true),
            ..NoticeUpdate::default()
        };
        let fields = update.to_fields().unwrap();
        assert_eq!(fields.get("expiresAt"), Some(&Value::Null));
        assert_eq!(fields.get("isPinned"), Some(&json!(true)));
    }

    #[test]
    fn roles_are_ordered() {
        assert!(Role::Admin.satisfies(Role::Moderator));
        assert!(Role::Moderator.satisfies(Role::User));
        assert!(!Role::Moderator.satisfies(Role::Admin));
        assert!(!Role::User.satisfies(Role::Moderator));
    }

    #[test]
    fn expired_notice_detection() {
        let now = Utc.with_ymd_and_hms(2026, 10, 16, 0, 0, 0).unwrap();
        let mut notice = Notice::default();
        assert!(!notice.is_expired(now));
        notice.expires_at = Some(now - chrono::Duration::seconds(1));
        assert!(notice.is_expired(now));
    }
}
