//! Registry token resource strategy.

use crate::claims::{custom_claims, RegisteredClaims};
use crate::error::{TokenError, TokenResult};
use crate::issuer::TokenIssuer;
use crate::scope::{self, ScopeInput};
use crate::spec::{TokenSpec, TokenTarget};
use crate::store::TokenStore;
use chrono::{DateTime, TimeZone, Utc};
use converge_core::{Applied, ChangeSet, Clock, ConvergeResult, ResourceStrategy};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// Shared read-only context for every token instance in a run.
#[derive(Clone)]
pub struct TokenContext {
    pub issuer: TokenIssuer,
    pub store: TokenStore,
    pub clock: Arc<dyn Clock>,
}

impl fmt::Debug for TokenContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenContext")
            .field("issuer", &self.issuer)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

/// Watched token properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TokenProperty {
    Audience,
    Subject,
    Issuer,
    Expiry,
    Access,
    Claims,
}

impl fmt::Display for TokenProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TokenProperty::Audience => "audience",
            TokenProperty::Subject => "subject",
            TokenProperty::Issuer => "issuer",
            TokenProperty::Expiry => "expire_time",
            TokenProperty::Access => "access",
            TokenProperty::Claims => "claims",
        };
        f.write_str(name)
    }
}

/// A decoded, signature-verified token found on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenObservation {
    pub claims: RegisteredClaims,
    pub custom: Map<String, Value>,
}

impl TokenObservation {
    pub fn expire_time(&self) -> DateTime<Utc> {
        timestamp(self.claims.exp)
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        timestamp(self.claims.iat)
    }

    pub fn not_before(&self) -> DateTime<Utc> {
        timestamp(self.claims.nbf)
    }
}

fn timestamp(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Read and verify the token at `target`.
///
/// A missing, corrupt or foreign-signed artifact is reported as absent.
pub fn observe(
    issuer: &TokenIssuer,
    store: &TokenStore,
    target: &TokenTarget,
) -> TokenResult<Option<TokenObservation>> {
    let persisted = match store.read(target) {
        Ok(Some(persisted)) => persisted,
        Ok(None) => return Ok(None),
        Err(TokenError::Decode(reason)) => {
            tracing::warn!(file = %target, reason = %reason, "Unreadable token artifact, treating as absent");
            return Ok(None);
        }
        Err(e) => return Err(e),
    };

    let payload = match issuer.decode(&persisted.token) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::warn!(file = %target, error = %e, "Token does not verify, treating as absent");
            return Ok(None);
        }
    };

    match serde_json::from_value::<RegisteredClaims>(Value::Object(payload.clone())) {
        Ok(claims) => Ok(Some(TokenObservation {
            claims,
            custom: custom_claims(&payload),
        })),
        Err(e) => {
            tracing::warn!(file = %target, error = %e, "Token payload is incomplete, treating as absent");
            Ok(None)
        }
    }
}

/// Converges one signed token file.
#[derive(Debug, Clone)]
pub struct RegistryTokenStrategy {
    ctx: Arc<TokenContext>,
}

impl RegistryTokenStrategy {
    pub fn new(ctx: Arc<TokenContext>) -> Self {
        Self { ctx }
    }

    fn write(&self, desired: &TokenSpec, prior: DateTime<Utc>) -> ConvergeResult<Applied> {
        let now = self.ctx.clock.now();
        let expire = desired.planner().compute_expire(now, Some(prior));

        let persisted = self.ctx.issuer.issue(desired, expire)?;
        self.ctx.store.write(&desired.target, &persisted)?;
        Ok(Applied::Done)
    }
}

impl ResourceStrategy for RegistryTokenStrategy {
    type Desired = TokenSpec;
    type Observed = TokenObservation;
    type Property = TokenProperty;

    fn kind(&self) -> &'static str {
        "registry_token"
    }

    fn probe(&mut self, desired: &TokenSpec) -> ConvergeResult<Option<TokenObservation>> {
        Ok(observe(&self.ctx.issuer, &self.ctx.store, &desired.target)?)
    }

    fn diff(
        &self,
        desired: &TokenSpec,
        observed: &TokenObservation,
    ) -> ConvergeResult<ChangeSet<TokenProperty>> {
        let mut changes = ChangeSet::new();
        let is = &observed.claims;

        if is.aud != desired.audience {
            changes.record(TokenProperty::Audience, &is.aud, &desired.audience);
        }
        if is.sub != desired.subject {
            changes.record(TokenProperty::Subject, &is.sub, &desired.subject);
        }
        if is.iss != desired.issuer {
            changes.record(TokenProperty::Issuer, &is.iss, &desired.issuer);
        }

        let now = self.ctx.clock.now();
        if !desired.planner().insync(observed.expire_time(), now) {
            changes.record(
                TokenProperty::Expiry,
                observed.expire_time().to_rfc3339(),
                desired.expire_time.to_rfc3339(),
            );
        }

        let observed_access = scope::normalize(Some(&ScopeInput::from(is.access.as_slice())));
        if !scope::compare(&observed_access, &desired.access) {
            changes.record(
                TokenProperty::Access,
                scope::describe(&observed_access),
                scope::describe(&desired.access),
            );
        }

        let desired_custom = custom_claims(&desired.claims);
        if observed.custom != desired_custom {
            changes.record(
                TokenProperty::Claims,
                Value::Object(observed.custom.clone()),
                Value::Object(desired_custom),
            );
        }

        Ok(changes)
    }

    fn create(&mut self, desired: &TokenSpec) -> ConvergeResult<Applied> {
        self.write(desired, desired.expire_time)
    }

    fn destroy(&mut self, desired: &TokenSpec, _observed: &TokenObservation) -> ConvergeResult<Applied> {
        self.ctx.store.remove(&desired.target)?;
        Ok(Applied::Done)
    }

    fn flush(
        &mut self,
        desired: &TokenSpec,
        observed: &TokenObservation,
        changes: &ChangeSet<TokenProperty>,
    ) -> ConvergeResult<Applied> {
        // keep a still-valid expiry so unrelated edits do not extend the token
        let prior = if changes.contains(&TokenProperty::Expiry) {
            desired.expire_time
        } else {
            observed.expire_time()
        };
        self.write(desired, prior)
    }
}
