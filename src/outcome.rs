//! Uniform `{success, data?, error?, code?}` envelope for UI and CLI boundaries.

use crate::{config::Locale, error::Error};
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Outcome<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl<T> Outcome<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            code: None,
        }
    }

    pub fn failure(err: &Error, locale: Locale) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(err.localized(locale)),
            code: err.code(),
        }
    }

    pub fn from_result(result: Result<T, Error>, locale: Locale) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(err) => Self::failure(&err, locale),
        }
    }
}
