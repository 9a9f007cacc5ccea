//! Desired registry token state.

use crate::error::{TokenError, TokenResult};
use crate::expiry::{ExpiryPlanner, DEFAULT_THRESHOLD_SECS};
use crate::scope::{self, AccessScope, ScopeInput};
use crate::ttl::{parse_ttl, TimeInput, TtlMode, DEFAULT_TTL};
use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::LazyLock;
use uuid::Uuid;

pub const DEFAULT_AUDIENCE: &str = "container_registry";
pub const DEFAULT_ISSUER: &str = "omnibus-gitlab-issuer";
pub const DEFAULT_TARGET: &str = "token.json";

/// Offset of `nbf` from `iat` when not given.
pub const NOT_BEFORE_OFFSET_SECS: i64 = 5;

static TARGET_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9.-]+$").expect("target pattern is valid"));

/// File name of a persisted token inside the registry directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct TokenTarget(String);

impl TokenTarget {
    /// Validate and append `.json` when missing.
    pub fn new(raw: &str) -> TokenResult<Self> {
        if !TARGET_NAME.is_match(raw) {
            return Err(TokenError::invalid(
                "target",
                format!("'{}' must match [a-z0-9.-]+", raw),
            ));
        }
        if raw.ends_with(".json") {
            Ok(Self(raw.to_string()))
        } else {
            Ok(Self(format!("{}.json", raw)))
        }
    }

    pub fn file_name(&self) -> &str {
        &self.0
    }

    /// Instance name shown by inventory; `token.json` is the default token.
    pub fn instance_name(&self) -> &str {
        match self.0.strip_suffix(".json") {
            Some("token") => "default",
            Some(stem) => stem,
            None => &self.0,
        }
    }
}

impl Default for TokenTarget {
    fn default() -> Self {
        Self(DEFAULT_TARGET.to_string())
    }
}

impl fmt::Display for TokenTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Token parameters as written in a manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenParams {
    #[serde(default)]
    pub id: Option<Uuid>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default = "default_audience")]
    pub audience: String,
    #[serde(default = "default_issuer")]
    pub issuer: String,
    #[serde(default)]
    pub issued_at: Option<TimeInput>,
    #[serde(default)]
    pub not_before: Option<TimeInput>,
    #[serde(default)]
    pub expire_time: Option<TimeInput>,
    #[serde(default = "default_ttl")]
    pub ttl: String,
    #[serde(default = "default_threshold")]
    pub threshold: u64,
    #[serde(default)]
    pub access: Option<ScopeInput>,
    #[serde(default = "default_target")]
    pub target: String,
    #[serde(default)]
    pub claims: Map<String, Value>,
}

fn default_audience() -> String {
    DEFAULT_AUDIENCE.to_string()
}

fn default_issuer() -> String {
    DEFAULT_ISSUER.to_string()
}

fn default_ttl() -> String {
    DEFAULT_TTL.to_string()
}

fn default_threshold() -> u64 {
    DEFAULT_THRESHOLD_SECS
}

fn default_target() -> String {
    DEFAULT_TARGET.to_string()
}

impl Default for TokenParams {
    fn default() -> Self {
        Self {
            id: None,
            subject: None,
            audience: default_audience(),
            issuer: default_issuer(),
            issued_at: None,
            not_before: None,
            expire_time: None,
            ttl: default_ttl(),
            threshold: default_threshold(),
            access: None,
            target: default_target(),
            claims: Map::new(),
        }
    }
}

/// Validated desired state of one registry token.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenSpec {
    pub id: Uuid,
    pub audience: String,
    pub subject: String,
    pub issuer: String,
    pub issued_at: DateTime<Utc>,
    pub not_before: DateTime<Utc>,
    pub expire_time: DateTime<Utc>,
    pub ttl: Duration,
    pub threshold: Duration,
    pub access: Vec<AccessScope>,
    pub target: TokenTarget,
    pub claims: Map<String, Value>,
}

impl TokenSpec {
    /// Validate manifest parameters against the current time.
    ///
    /// Nothing is touched on disk; a failure here is fatal for the resource.
    pub fn from_params(params: &TokenParams, now: DateTime<Utc>, mode: TtlMode) -> TokenResult<Self> {
        let subject = params
            .subject
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| TokenError::invalid("subject", "username must be provided"))?
            .to_string();

        scope::check(params.access.as_ref())?;

        let ttl = to_chrono(parse_ttl(&params.ttl, mode)?, "ttl")?;
        let threshold = Duration::try_seconds(i64::try_from(params.threshold).unwrap_or(i64::MAX))
            .ok_or_else(|| TokenError::invalid("threshold", "out of range"))?;

        let issued_at = match &params.issued_at {
            Some(input) => input.resolve("issued_at")?,
            None => now,
        };
        let not_before = match &params.not_before {
            Some(input) => input.resolve("not_before")?,
            None => issued_at + Duration::seconds(NOT_BEFORE_OFFSET_SECS),
        };
        let expire_time = match &params.expire_time {
            Some(input) => input.resolve("expire_time")?,
            None => issued_at + ttl,
        };

        if now + threshold > expire_time {
            return Err(TokenError::invalid(
                "expire_time",
                "token expiration is too close, please update",
            ));
        }
        if not_before >= expire_time {
            return Err(TokenError::invalid(
                "not_before",
                "token start time is not before its expiry",
            ));
        }

        Ok(Self {
            id: params.id.unwrap_or_else(Uuid::new_v4),
            audience: params.audience.clone(),
            subject,
            issuer: params.issuer.clone(),
            issued_at,
            not_before,
            expire_time,
            ttl,
            threshold,
            access: scope::normalize(params.access.as_ref()),
            target: TokenTarget::new(&params.target)?,
            claims: params.claims.clone(),
        })
    }

    pub fn planner(&self) -> ExpiryPlanner {
        ExpiryPlanner::new(self.ttl, self.threshold)
    }
}

fn to_chrono(value: std::time::Duration, field: &str) -> TokenResult<Duration> {
    Duration::from_std(value).map_err(|_| TokenError::invalid(field, "out of range"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.timestamp_opt(1_600_000_000, 0).unwrap()
    }

    fn params(subject: &str) -> TokenParams {
        TokenParams {
            subject: Some(subject.into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults() {
        let spec = TokenSpec::from_params(&params("registry"), now(), TtlMode::Strict).unwrap();

        assert_eq!(spec.audience, "container_registry");
        assert_eq!(spec.issuer, "omnibus-gitlab-issuer");
        assert_eq!(spec.issued_at, now());
        assert_eq!(spec.not_before, now() + Duration::seconds(5));
        assert_eq!(spec.expire_time, now() + Duration::hours(24));
        assert_eq!(spec.threshold, Duration::seconds(600));
        assert_eq!(spec.target.file_name(), "token.json");
        assert!(spec.access.is_empty());
    }

    #[test]
    fn test_subject_required() {
        let err = TokenSpec::from_params(&TokenParams::default(), now(), TtlMode::Strict);
        assert!(matches!(err, Err(TokenError::Validation(_))));
        assert!(TokenSpec::from_params(&params("  "), now(), TtlMode::Strict).is_err());
    }

    #[test]
    fn test_expiry_too_close_rejected() {
        let p = TokenParams {
            ttl: "5m".into(),
            ..params("registry")
        };
        assert!(TokenSpec::from_params(&p, now(), TtlMode::Strict).is_err());

        let p = TokenParams {
            expire_time: Some(TimeInput::Unix(1_600_000_300)),
            ..params("registry")
        };
        assert!(TokenSpec::from_params(&p, now(), TtlMode::Strict).is_err());
    }

    #[test]
    fn test_not_before_must_precede_expiry() {
        let p = TokenParams {
            not_before: Some(TimeInput::Text("2020-09-15 00:00".into())),
            expire_time: Some(TimeInput::Text("2020-09-14 12:00".into())),
            ..params("registry")
        };
        assert!(TokenSpec::from_params(&p, now(), TtlMode::Strict).is_err());
    }

    #[test]
    fn test_lenient_ttl_zero_still_checked_against_threshold() {
        let p = TokenParams {
            ttl: "1d".into(),
            ..params("registry")
        };
        assert!(TokenSpec::from_params(&p, now(), TtlMode::Strict).is_err());
        // zero ttl puts expiry inside the threshold window
        assert!(TokenSpec::from_params(&p, now(), TtlMode::Lenient).is_err());
    }

    #[test]
    fn test_invalid_access_rejected() {
        let p = TokenParams {
            access: Some(ScopeInput::Path("Bad/Name".into())),
            ..params("registry")
        };
        assert!(TokenSpec::from_params(&p, now(), TtlMode::Strict).is_err());
    }

    #[test]
    fn test_target_munging() {
        assert_eq!(TokenTarget::new("mirror").unwrap().file_name(), "mirror.json");
        assert_eq!(TokenTarget::new("a.json").unwrap().file_name(), "a.json");
        assert!(TokenTarget::new("../etc/passwd").is_err());
        assert!(TokenTarget::new("Upper").is_err());
        assert_eq!(TokenTarget::default().instance_name(), "default");
        assert_eq!(TokenTarget::new("mirror").unwrap().instance_name(), "mirror");
    }

    #[test]
    fn test_params_from_toml() {
        let p: TokenParams = toml::from_str(
            r#"
            subject = "registry"
            ttl = "2h"
            threshold = 900
            access = [ "group/a", { name = "group/b", actions = "*" } ]
            issued_at = 1600000000

            [claims]
            auth_type = "gitlab_or_ldap"
            "#,
        )
        .unwrap();

        let spec = TokenSpec::from_params(&p, now(), TtlMode::Strict).unwrap();
        assert_eq!(spec.access.len(), 2);
        assert_eq!(spec.expire_time, now() + Duration::hours(2));
        assert_eq!(spec.claims["auth_type"], "gitlab_or_ldap");
    }
}
