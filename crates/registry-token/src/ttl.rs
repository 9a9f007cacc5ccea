//! TTL and time literal parsing.

use crate::error::{TokenError, TokenResult};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use std::time::Duration;

/// Default token lifetime literal.
pub const DEFAULT_TTL: &str = "24h0m0s";

static HMS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:(\d+)h)?(?:([1-5]?[0-9])m)?(?:([1-5]?[0-9])s)?$").expect("ttl pattern is valid")
});

static SECONDS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)s?$").expect("seconds pattern is valid"));

static UNIX_STAMP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{10}$").expect("timestamp pattern is valid"));

/// How malformed TTL literals are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TtlMode {
    /// Reject anything that is not a well-formed literal
    #[default]
    Strict,
    /// Unrecognized fragments contribute zero
    Lenient,
}

/// Parse a TTL literal: `<H>h<M>m<S>s` (any subset) or plain seconds.
pub fn parse_ttl(literal: &str, mode: TtlMode) -> TokenResult<Duration> {
    let literal = literal.trim();
    if literal.is_empty() {
        return Err(TokenError::invalid("ttl", "TTL could not be empty"));
    }

    if let Some(caps) = SECONDS.captures(literal) {
        return Ok(Duration::from_secs(number(caps.get(1).map(|m| m.as_str()))?));
    }

    if let Some(caps) = HMS.captures(literal) {
        let hours = number(caps.get(1).map(|m| m.as_str()))?;
        let minutes = number(caps.get(2).map(|m| m.as_str()))?;
        let seconds = number(caps.get(3).map(|m| m.as_str()))?;
        let total = hours
            .checked_mul(3600)
            .and_then(|h| h.checked_add(minutes * 60 + seconds))
            .ok_or_else(|| TokenError::invalid("ttl", format!("'{}' is out of range", literal)))?;
        return Ok(Duration::from_secs(total));
    }

    match mode {
        TtlMode::Strict => Err(TokenError::invalid(
            "ttl",
            format!("'{}' is not of the form 1h30m0s or 5400", literal),
        )),
        TtlMode::Lenient => {
            tracing::warn!(ttl = literal, "Unrecognized TTL literal, treating as zero");
            Ok(Duration::ZERO)
        }
    }
}

fn number(value: Option<&str>) -> TokenResult<u64> {
    match value {
        None => Ok(0),
        Some(digits) => digits
            .parse()
            .map_err(|_| TokenError::invalid("ttl", format!("'{}' is out of range", digits))),
    }
}

/// Render a duration back into `<H>h<M>m<S>s` form.
pub fn format_ttl(ttl: Duration) -> String {
    let secs = ttl.as_secs();
    format!("{}h{}m{}s", secs / 3600, (secs % 3600) / 60, secs % 60)
}

/// A point in time as written in a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimeInput {
    Unix(i64),
    Text(String),
}

impl TimeInput {
    pub fn resolve(&self, field: &str) -> TokenResult<DateTime<Utc>> {
        match self {
            TimeInput::Unix(secs) => from_unix(field, *secs),
            TimeInput::Text(text) => parse_time(field, text),
        }
    }
}

/// Parse a 10-digit unix timestamp, RFC 3339, or `YYYY-MM-DD HH:MM[:SS]` (UTC).
pub fn parse_time(field: &str, text: &str) -> TokenResult<DateTime<Utc>> {
    let text = text.trim();

    if UNIX_STAMP.is_match(text) {
        let secs: i64 = text
            .parse()
            .map_err(|_| TokenError::invalid(field, format!("'{}' is not a timestamp", text)))?;
        return from_unix(field, secs);
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Ok(parsed.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }

    Err(TokenError::invalid(field, format!("'{}' is not a recognized time", text)))
}

fn from_unix(field: &str, secs: i64) -> TokenResult<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| TokenError::invalid(field, format!("{} is out of range", secs)))
}
