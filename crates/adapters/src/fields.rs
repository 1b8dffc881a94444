//! Field extraction helpers for decoded event payloads.
//!
//! Both chain families deliver operation arguments as JSON objects (the
//! account chain via ABI-decoded log args, the permissioned chain via
//! chaincode event payloads). Missing or mistyped fields are normalization
//! failures, reported by name.

use std::collections::BTreeSet;

use serde_json::Value;

/// A required field was absent or had the wrong type.
pub(crate) struct FieldError {
    pub field: &'static str,
    pub detail: String,
}

impl FieldError {
    fn missing(field: &'static str) -> Self {
        FieldError {
            field,
            detail: "missing or not a value of the expected type".to_string(),
        }
    }

    pub(crate) fn reason(&self) -> String {
        format!("field '{}': {}", self.field, self.detail)
    }
}

pub(crate) fn get_str<'a>(args: &'a Value, field: &'static str) -> Result<&'a str, FieldError> {
    args.get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| FieldError::missing(field))
}

pub(crate) fn get_u64(args: &Value, field: &'static str) -> Result<u64, FieldError> {
    args.get(field)
        .and_then(Value::as_u64)
        .ok_or_else(|| FieldError::missing(field))
}

/// Optional string array; absent means empty. Non-string entries fail.
pub(crate) fn get_tags(args: &Value, field: &'static str) -> Result<BTreeSet<String>, FieldError> {
    match args.get(field) {
        None | Some(Value::Null) => Ok(BTreeSet::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| {
                v.as_str().map(str::to_string).ok_or(FieldError {
                    field,
                    detail: "contains a non-string entry".to_string(),
                })
            })
            .collect(),
        Some(_) => Err(FieldError {
            field,
            detail: "expected an array of strings".to_string(),
        }),
    }
}

pub(crate) fn parse_tag<T: std::str::FromStr>(
    raw: &str,
    field: &'static str,
) -> Result<T, FieldError>
where
    T::Err: std::fmt::Display,
{
    raw.parse().map_err(|e: T::Err| FieldError {
        field,
        detail: e.to_string(),
    })
}
