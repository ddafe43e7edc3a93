//! Translation of logical parameter overrides into tool flags.
//!
//! Callers use stable, tool-agnostic names (`contextSize`, `nPredict`, ...).
//! The OCR tools accept llama.cpp-style flags, so each known name maps to a
//! fixed flag. Unknown names get a derived `--kebab-case` flag and a warning.

use serde_json::Value;

use crate::types::Overrides;

/// Logical override name -> tool flag.
const FLAG_TABLE: &[(&str, &str)] = &[
    ("threads", "--threads"),
    ("contextSize", "-c"),
    ("nPredict", "-n"),
    ("temperature", "--temp"),
    ("cacheTypeK", "-ctk"),
    ("cacheTypeV", "-ctv"),
    ("ngl", "--ngl"),
];

/// Look up the flag for a well-known override name.
pub fn known_flag(key: &str) -> Option<&'static str> {
    FLAG_TABLE
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, flag)| *flag)
}

/// Derive a flag from an unknown override name: `batchSize` -> `--batch-size`.
///
/// Returns `None` when the name contains anything other than ASCII
/// alphanumerics, `_`, or `-`, so a key can never smuggle in a value.
pub fn derive_flag(key: &str) -> Option<String> {
    if key.is_empty()
        || !key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return None;
    }

    let mut flag = String::from("--");
    for (i, c) in key.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 && !flag.ends_with('-') {
                flag.push('-');
            }
            flag.push(c.to_ascii_lowercase());
        } else if c == '_' {
            flag.push('-');
        } else {
            flag.push(c);
        }
    }
    Some(flag)
}

/// Render a scalar JSON value as a command-line argument.
///
/// Arrays, objects, and `null` have no argument form.
pub fn scalar_to_arg(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Reject override maps containing non-scalar values.
///
/// Returns the offending key on failure.
pub fn validate(overrides: &Overrides) -> Result<(), String> {
    match overrides
        .iter()
        .find(|(_, value)| scalar_to_arg(value).is_none())
    {
        Some((key, _)) => Err(key.clone()),
        None => Ok(()),
    }
}

/// Translate `overrides` into a flat `[flag, value, flag, value, ...]` list.
pub fn to_args(overrides: &Overrides) -> Vec<String> {
    let mut args = Vec::with_capacity(overrides.len() * 2);

    for (key, value) in overrides {
        let Some(rendered) = scalar_to_arg(value) else {
            tracing::warn!(key = %key, "Skipping non-scalar override");
            continue;
        };

        let flag = match known_flag(key) {
            Some(flag) => flag.to_string(),
            None => match derive_flag(key) {
                Some(flag) => {
                    tracing::warn!(key = %key, flag = %flag, "Unknown override, using derived flag");
                    flag
                }
                None => {
                    tracing::warn!(key = %key, "Skipping override with unusable name");
                    continue;
                }
            },
        };

        args.push(flag);
        args.push(rendered);
    }

    args
}
