//! Bounds and cleans raw scan results before they are persisted.
//!
//! Scan results arrive as loosely shaped JSON. Known fields are extracted
//! leniently, text is truncated on char boundaries, and the free-form metadata
//! bag is scrubbed of keys the document store rejects. The encoded snapshot is
//! then shrunk step by step until it fits the size budget.

use crate::{
    error::Error,
    models::{AnalysisSnapshot, FileMeta, Finding, SeveritySummary},
    platform::Fields,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

pub const TITLE_MAX_CHARS: usize = 200;
pub const TEXT_MAX_CHARS: usize = 2_000;
pub const SHRUNK_TEXT_CHARS: usize = 200;
pub const MAX_FINDINGS: usize = 200;
pub const MIN_FINDINGS: usize = 10;
pub const MAX_METADATA_DEPTH: usize = 20;

/// Encoded size limits for one snapshot, in bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Budget {
    /// Shrinking stops once the snapshot is at or under this size.
    pub target_bytes: usize,
    /// Snapshots still above this size after shrinking are rejected.
    pub hard_limit_bytes: usize,
}

impl Default for Budget {
    fn default() -> Self {
        Self {
            target_bytes: 900_000,
            hard_limit_bytes: 950_000,
        }
    }
}

#[must_use]
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => text[..end].to_string(),
        None => text.to_string(),
    }
}

fn text_field(raw: &Value, keys: &[&str], max_chars: usize) -> String {
    keys.iter()
        .find_map(|key| raw.get(*key).and_then(Value::as_str))
        .map(|text| truncate_chars(text, max_chars))
        .unwrap_or_default()
}

fn optional_text(raw: &Value, keys: &[&str], max_chars: usize) -> Option<String> {
    let text = text_field(raw, keys, max_chars);
    (!text.is_empty()).then_some(text)
}

fn severity_of(raw: &Value) -> &'static str {
    let severity = raw
        .get("severity")
        .or_else(|| raw.get("level"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_lowercase();
    match severity.as_str() {
        "critical" => "critical",
        "high" => "high",
        "medium" | "moderate" => "medium",
        "low" => "low",
        _ => "info",
    }
}

/// Locations come either as a string or as `{file, line}`.
fn location_of(raw: &Value) -> Option<String> {
    match raw.get("location")? {
        Value::String(text) if !text.is_empty() => Some(truncate_chars(text, TEXT_MAX_CHARS)),
        Value::Object(location) => {
            let file = location.get("file").and_then(Value::as_str)?;
            let text = match location.get("line").and_then(Value::as_u64) {
                Some(line) => format!("{file}:{line}"),
                None => file.to_string(),
            };
            Some(truncate_chars(&text, TEXT_MAX_CHARS))
        }
        _ => None,
    }
}

fn finding_from(raw: &Value, index: usize) -> Finding {
    let id = match raw.get("id") {
        Some(Value::String(id)) if !id.is_empty() => truncate_chars(id, TITLE_MAX_CHARS),
        Some(Value::Number(id)) => id.to_string(),
        _ => format!("finding-{}", index + 1),
    };
    Finding {
        id,
        title: text_field(raw, &["title", "name", "rule"], TITLE_MAX_CHARS),
        severity: severity_of(raw).to_string(),
        description: text_field(raw, &["description", "message", "details"], TEXT_MAX_CHARS),
        location: location_of(raw),
        recommendation: optional_text(raw, &["recommendation", "remediation", "fix"], TEXT_MAX_CHARS),
    }
}

fn summarize(findings: &[Finding]) -> SeveritySummary {
    let mut summary = SeveritySummary::default();
    for finding in findings {
        match finding.severity.as_str() {
            "critical" => summary.critical += 1,
            "high" => summary.high += 1,
            "medium" => summary.medium += 1,
            "low" => summary.low += 1,
            _ => summary.info += 1,
        }
        summary.total += 1;
    }
    summary
}

fn file_from(raw: &Value) -> FileMeta {
    let file = raw.get("file").filter(|file| file.is_object());
    let source = file.unwrap_or(raw);
    FileMeta {
        name: text_field(source, &["name", "fileName"], TITLE_MAX_CHARS),
        size: source
            .get("size")
            .or_else(|| source.get("fileSize"))
            .and_then(Value::as_u64)
            .unwrap_or_default(),
        mime_type: optional_text(source, &["mimeType", "type"], TITLE_MAX_CHARS),
    }
}

fn key_allowed(key: &str) -> bool {
    !key.is_empty() && !key.starts_with("__") && !key.contains('/')
}

/// Recursively clean one metadata value. `None` drops it.
fn clean_value(value: &Value, depth: usize) -> Option<Value> {
    if depth > MAX_METADATA_DEPTH {
        return None;
    }
    match value {
        Value::String(text) => Some(Value::String(truncate_chars(text, TEXT_MAX_CHARS))),
        Value::Array(items) => Some(Value::Array(
            items
                .iter()
                .filter_map(|item| clean_value(item, depth + 1))
                .collect(),
        )),
        Value::Object(fields) => Some(Value::Object(clean_fields(fields, depth + 1))),
        other => Some(other.clone()),
    }
}

fn clean_fields(fields: &Fields, depth: usize) -> Fields {
    fields
        .iter()
        .filter(|(key, _)| key_allowed(key))
        .filter_map(|(key, value)| clean_value(value, depth).map(|value| (key.clone(), value)))
        .collect()
}

/// Clean a free-form metadata bag for storage.
#[must_use]
pub fn clean_metadata(metadata: &Fields) -> Fields {
    clean_fields(metadata, 1)
}

fn encoded_size<T: Serialize + ?Sized>(value: &T) -> Result<usize, Error> {
    Ok(serde_json::to_vec(value)?.len())
}

/// Drop the largest metadata entries until at least `excess` bytes are gone.
/// Always removes one entry when there is any.
fn trim_metadata(metadata: &mut Fields, excess: usize) -> Result<(), Error> {
    let mut entries = metadata
        .iter()
        .map(|(key, value)| Ok((key.clone(), key.len() + encoded_size(value)? + 4)))
        .collect::<Result<Vec<(String, usize)>, Error>>()?;
    entries.sort_by(|a, b| b.1.cmp(&a.1));

    let mut removed = 0;
    for (key, bytes) in entries {
        metadata.remove(&key);
        removed += bytes;
        if removed >= excess {
            break;
        }
    }
    Ok(())
}

fn shrink_text(snapshot: &mut AnalysisSnapshot) {
    for finding in &mut snapshot.findings {
        finding.description = truncate_chars(&finding.description, SHRUNK_TEXT_CHARS);
        finding.recommendation = finding
            .recommendation
            .as_deref()
            .map(|text| truncate_chars(text, SHRUNK_TEXT_CHARS));
        finding.location = finding
            .location
            .as_deref()
            .map(|text| truncate_chars(text, SHRUNK_TEXT_CHARS));
    }
}

/// Sanitize a raw scan result with the default [`Budget`].
///
/// # Errors
/// Returns [`Error::PayloadTooLarge`] when the snapshot cannot be shrunk under
/// the hard limit.
pub fn sanitize_analysis(raw: &Value, created_at: DateTime<Utc>) -> Result<AnalysisSnapshot, Error> {
    sanitize_with_budget(raw, created_at, Budget::default())
}

/// # Errors
/// Returns [`Error::PayloadTooLarge`] when the snapshot cannot be shrunk under
/// `budget.hard_limit_bytes`.
pub fn sanitize_with_budget(
    raw: &Value,
    created_at: DateTime<Utc>,
    budget: Budget,
) -> Result<AnalysisSnapshot, Error> {
    let all_findings: Vec<Finding> = ["findings", "vulnerabilities", "issues"]
        .iter()
        .find_map(|key| raw.get(*key).and_then(Value::as_array))
        .map(|items| {
            items
                .iter()
                .enumerate()
                .map(|(index, item)| finding_from(item, index))
                .collect()
        })
        .unwrap_or_default();

    let summary = summarize(&all_findings);
    let original_finding_count = summary.total;
    let mut findings = all_findings;
    let mut truncated = findings.len() > MAX_FINDINGS;
    findings.truncate(MAX_FINDINGS);

    let mut snapshot = AnalysisSnapshot {
        id: String::new(),
        device_type: text_field(raw, &["deviceType", "device_type", "platform"], TITLE_MAX_CHARS),
        framework: text_field(raw, &["framework"], TITLE_MAX_CHARS),
        file: file_from(raw),
        summary,
        findings,
        metadata: raw
            .get("metadata")
            .and_then(Value::as_object)
            .map(clean_metadata)
            .unwrap_or_default(),
        original_finding_count,
        truncated,
        created_at,
    };

    let mut size = encoded_size(&snapshot)?;
    let mut text_shrunk = false;
    while size > budget.target_bytes {
        let excess = size - budget.target_bytes;
        let metadata_bytes = encoded_size(&snapshot.metadata)?;
        let findings_bytes = encoded_size(&snapshot.findings)?;
        // cut whichever variable-size part dominates
        if !snapshot.metadata.is_empty() && metadata_bytes >= findings_bytes {
            trim_metadata(&mut snapshot.metadata, excess)?;
        } else if snapshot.findings.len() > MIN_FINDINGS {
            let keep = (snapshot.findings.len() / 2).max(MIN_FINDINGS);
            snapshot.findings.truncate(keep);
        } else if !text_shrunk {
            shrink_text(&mut snapshot);
            text_shrunk = true;
        } else if !snapshot.metadata.is_empty() {
            trim_metadata(&mut snapshot.metadata, excess)?;
        } else {
            break;
        }
        truncated = true;
        size = encoded_size(&snapshot)?;
        debug!("analysis snapshot shrunk to {} bytes", size);
    }
    snapshot.truncated = truncated;

    if size > budget.hard_limit_bytes {
        return Err(Error::PayloadTooLarge { size });
    }
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use chrono::TimeZone;
    use serde_json::json;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 0, 0, 0).unwrap()
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("보안점검", 2), "보안");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }

    #[test]
    fn extracts_fields_leniently() {
        let raw = json!({
            "deviceType": "ios",
            "framework": "react-native",
            "file": {"name": "app.ipa", "size": 1024, "type": "application/octet-stream"},
            "findings": [
                {"title": "Hardcoded key", "severity": "HIGH", "description": "d",
                 "location": {"file": "src/a.js", "line": 12}},
                {"name": "Debug flag", "severity": "moderate", "remediation": "turn it off"},
                {"title": "Note"}
            ]
        });
        let snapshot = sanitize_analysis(&raw, at()).unwrap();
        assert_eq!(snapshot.device_type, "ios");
        assert_eq!(snapshot.file.size, 1024);
        assert_eq!(snapshot.file.mime_type.as_deref(), Some("application/octet-stream"));
        assert_eq!(snapshot.findings[0].location.as_deref(), Some("src/a.js:12"));
        assert_eq!(snapshot.findings[1].severity, "medium");
        assert_eq!(snapshot.findings[1].recommendation.as_deref(), Some("turn it off"));
        assert_eq!(snapshot.findings[2].id, "finding-3");
        assert_eq!(
            snapshot.summary,
            SeveritySummary { critical: 0, high: 1, medium: 1, low: 0, info: 1, total: 3 }
        );
        assert!(!snapshot.truncated);
    }

    #[test]
    fn findings_are_capped_but_summary_counts_all() {
        let findings: Vec<Value> = (0..250)
            .map(|i| json!({"title": format!("f{i}"), "severity": "low"}))
            .collect();
        let snapshot = sanitize_analysis(&json!({ "findings": findings }), at()).unwrap();
        assert_eq!(snapshot.findings.len(), MAX_FINDINGS);
        assert_eq!(snapshot.summary.low, 250);
        assert_eq!(snapshot.original_finding_count, 250);
        assert!(snapshot.truncated);
    }

    #[test]
    fn long_text_is_truncated() {
        let raw = json!({"findings": [{"title": "t".repeat(500), "description": "d".repeat(5_000)}]});
        let snapshot = sanitize_analysis(&raw, at()).unwrap();
        assert_eq!(snapshot.findings[0].title.chars().count(), TITLE_MAX_CHARS);
        assert_eq!(snapshot.findings[0].description.chars().count(), TEXT_MAX_CHARS);
    }

    #[test]
    fn metadata_drops_unsafe_keys() {
        let metadata = json!({
            "": 1,
            "__proto": 2,
            "a/b": 3,
            "ok": {"__hidden": true, "nested": "yes"},
            "list": [{"x/y": 1, "z": 2}]
        });
        let cleaned = clean_metadata(metadata.as_object().unwrap());
        assert_eq!(
            Value::Object(cleaned),
            json!({"ok": {"nested": "yes"}, "list": [{"z": 2}]})
        );
    }

    #[test]
    fn metadata_drops_deep_subtrees() {
        let mut deep = json!("leaf");
        for _ in 0..30 {
            deep = json!({ "n": deep });
        }
        let metadata = json!({ "deep": deep, "shallow": 1 });
        let cleaned = clean_metadata(metadata.as_object().unwrap());
        assert_eq!(cleaned.get("shallow"), Some(&json!(1)));
        let mut depth = 1;
        let mut current = cleaned.get("deep");
        while let Some(Value::Object(map)) = current {
            depth += 1;
            current = map.get("n");
        }
        assert!(depth <= MAX_METADATA_DEPTH + 1);
    }

    #[test]
    fn oversized_snapshot_is_shrunk_under_target() {
        let findings: Vec<Value> = (0..200)
            .map(|i| json!({"title": format!("f{i}"), "description": "x".repeat(2_000)}))
            .collect();
        let metadata: Fields = (0..300)
            .map(|i| (format!("k{i}"), json!("m".repeat(2_000))))
            .collect();
        let raw = json!({ "findings": findings, "metadata": metadata });
        let budget = Budget { target_bytes: 100_000, hard_limit_bytes: 120_000 };
        let snapshot = sanitize_with_budget(&raw, at(), budget).unwrap();
        assert!(snapshot.truncated);
        assert!(snapshot.findings.len() >= MIN_FINDINGS);
        assert!(snapshot.metadata.is_empty());
        assert_eq!(snapshot.original_finding_count, 200);
        assert!(serde_json::to_vec(&snapshot).unwrap().len() <= 100_000);
    }

    #[test]
    fn large_metadata_is_cut_before_findings() {
        let findings: Vec<Value> = (0..100)
            .map(|i| json!({"title": format!("f{i}"), "severity": "high"}))
            .collect();
        let metadata: Fields = (0..300)
            .map(|i| (format!("k{i}"), json!("m".repeat(2_000))))
            .collect();
        let raw = json!({ "findings": findings, "metadata": metadata });
        let budget = Budget { target_bytes: 100_000, hard_limit_bytes: 120_000 };
        let snapshot = sanitize_with_budget(&raw, at(), budget).unwrap();
        assert!(snapshot.truncated);
        assert_eq!(snapshot.findings.len(), 100);
        assert!(!snapshot.metadata.is_empty());
        assert!(snapshot.metadata.len() < 300);
        assert!(serde_json::to_vec(&snapshot).unwrap().len() <= 100_000);
    }

    #[test]
    fn snapshot_over_hard_limit_is_rejected() {
        let raw = json!({"findings": [{"title": "t", "description": "x".repeat(2_000)}]});
        let budget = Budget { target_bytes: 10, hard_limit_bytes: 20 };
        let err = sanitize_with_budget(&raw, at(), budget).unwrap_err();
        assert!(err.is(ErrorKind::PayloadTooLarge));
    }
}
