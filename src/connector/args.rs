//! Parsing of connector argument strings.
//!
//! Backends receive their argument string untouched; this helper is what
//! the built-in ones use. The format is `"default,key=value,key2=value"`:
//! an optional leading positional value followed by `key=value` pairs.

use crate::error::{MemError, Result};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Parsed connector arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectorArgs {
    default: Option<String>,
    extra: BTreeMap<String, String>,
}

impl ConnectorArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an argument string. Empty parts are skipped, duplicate keys
    /// keep the last value.
    pub fn parse(input: &str) -> Result<Self> {
        let mut args = Self::default();
        for (idx, part) in input.split(',').map(str::trim).enumerate() {
            if part.is_empty() {
                continue;
            }
            match part.split_once('=') {
                Some((key, value)) => {
                    let key = key.trim();
                    if key.is_empty() {
                        return Err(MemError::InvalidArgs(format!(
                            "empty key in `{part}`"
                        )));
                    }
                    args.extra.insert(key.to_string(), value.trim().to_string());
                }
                None if idx == 0 => args.default = Some(part.to_string()),
                None => {
                    return Err(MemError::InvalidArgs(format!(
                        "positional value `{part}` must come first"
                    )))
                }
            }
        }
        Ok(args)
    }

    pub fn with_default(mut self, value: impl Into<String>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn insert(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// The leading positional value, if any.
    pub fn get_default(&self) -> Option<&str> {
        self.default.as_deref()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.extra.get(key).map(String::as_str)
    }

    /// Value of `key`, or the positional value when `key` is absent.
    pub fn get_or_default(&self, key: &str) -> Option<&str> {
        self.get(key).or_else(|| self.get_default())
    }

    /// Parse `key` (or the positional value) as a number. Accepts decimal
    /// and `0x`-prefixed hex.
    pub fn parse_u64(&self, key: &str) -> Result<Option<u64>> {
        self.get_or_default(key).map(parse_number).transpose()
    }

    pub fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        self.get(key)
            .map(|v| {
                bool::from_str(&v.to_ascii_lowercase())
                    .map_err(|_| MemError::InvalidArgs(format!("{key}: `{v}` is not a bool")))
            })
            .transpose()
    }

    pub fn is_empty(&self) -> bool {
        self.default.is_none() && self.extra.is_empty()
    }
}

/// Decimal or `0x` hex.
pub fn parse_number(value: &str) -> Result<u64> {
    let value = value.trim().replace('_', "");
    let parsed = match value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => value.parse::<u64>(),
    };
    parsed.map_err(|e| MemError::InvalidArgs(format!("`{value}`: {e}")))
}

impl FromStr for ConnectorArgs {
    type Err = MemError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl std::fmt::Display for ConnectorArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts: Vec<String> = Vec::new();
        if let Some(d) = &self.default {
            parts.push(d.clone());
        }
        parts.extend(self.extra.iter().map(|(k, v)| format!("{k}={v}")));
        write!(f, "{}", parts.join(","))
    }
}
