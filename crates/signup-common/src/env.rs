//! Typed environment variable readers
//!
//! Unset and blank variables are treated the same way: the default applies.
//! A variable that is set but cannot be parsed is an error rather than a
//! silent fallback, so a typo in `.env` surfaces at start-up.

use crate::error::{CommonError, Result};
use std::str::FromStr;

/// Value of `key` if it is set and not blank
pub fn optional(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Value of `key`, failing with [`CommonError::MissingEnv`] when absent
pub fn required(key: &str) -> Result<String> {
    optional(key).ok_or_else(|| CommonError::MissingEnv(key.to_string()))
}

/// Value of `key` or the supplied default
pub fn var_or(key: &str, default: &str) -> String {
    optional(key).unwrap_or_else(|| default.to_string())
}

/// Parse `key` into `T`, returning `default` when unset
pub fn parse_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match optional(key) {
        Some(raw) => raw
            .parse()
            .map_err(|e: T::Err| CommonError::invalid_env(key, raw.clone(), e.to_string())),
        None => Ok(default),
    }
}

/// Boolean flag accepting `true/false`, `1/0`, `yes/no`, `on/off`
pub fn flag(key: &str, default: bool) -> Result<bool> {
    let Some(raw) = optional(key) else {
        return Ok(default);
    };

    match raw.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(CommonError::invalid_env(key, raw, "expected a boolean")),
    }
}
