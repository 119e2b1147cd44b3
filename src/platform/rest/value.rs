//! Conversion between plain JSON and the document API's typed values
//! (`{"stringValue": "..."}`, `{"integerValue": "42"}`, ...).

use crate::platform::Fields;
use serde_json::{json, Map, Value};

pub(super) fn to_typed(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(flag) => json!({ "booleanValue": flag }),
        Value::Number(number) => match number.as_i64() {
            Some(integer) => json!({ "integerValue": integer.to_string() }),
            None => json!({ "doubleValue": number.as_f64().unwrap_or_default() }),
        },
        Value::String(text) => json!({ "stringValue": text }),
        Value::Array(items) => {
            json!({ "arrayValue": { "values": items.iter().map(to_typed).collect::<Vec<_>>() } })
        }
        Value::Object(fields) => json!({ "mapValue": { "fields": to_typed_fields(fields) } }),
    }
}

pub(super) fn to_typed_fields(fields: &Fields) -> Value {
    Value::Object(
        fields
            .iter()
            .map(|(key, value)| (key.clone(), to_typed(value)))
            .collect(),
    )
}

pub(super) fn from_typed(value: &Value) -> Value {
    let Some((kind, inner)) = value.as_object().and_then(|typed| typed.iter().next()) else {
        return Value::Null;
    };
    match kind.as_str() {
        "booleanValue" => Value::Bool(inner.as_bool().unwrap_or_default()),
        "integerValue" => inner
            .as_str()
            .and_then(|raw| raw.parse::<i64>().ok())
            .or_else(|| inner.as_i64())
            .map_or(Value::Null, Value::from),
        "doubleValue" => inner.as_f64().map_or(Value::Null, Value::from),
        "stringValue" | "timestampValue" | "referenceValue" | "bytesValue" => inner.clone(),
        "arrayValue" => Value::Array(
            inner["values"]
                .as_array()
                .map(|values| values.iter().map(from_typed).collect())
                .unwrap_or_default(),
        ),
        "mapValue" => Value::Object(from_typed_fields(inner.get("fields"))),
        "geoPointValue" => inner.clone(),
        _ => Value::Null,
    }
}

pub(super) fn from_typed_fields(fields: Option<&Value>) -> Fields {
    fields
        .and_then(Value::as_object)
        .map(|typed| {
            typed
                .iter()
                .map(|(key, value)| (key.clone(), from_typed(value)))
                .collect::<Map<String, Value>>()
        })
        .unwrap_or_default()
}

/// Expand dotted keys into nested maps (`a.b = 1` → `{a: {b: 1}}`), as the
/// document API expects alongside an update mask.
pub(super) fn expand_dotted(fields: Fields) -> Fields {
    let mut expanded = Fields::new();
    for (key, value) in fields {
        crate::platform::memory::set_field_at(&mut expanded, &key, value);
    }
    expanded
}
