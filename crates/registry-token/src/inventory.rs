//! Enumeration of tokens already present in the registry directory.

use crate::error::TokenResult;
use crate::issuer::TokenIssuer;
use crate::resource::observe;
use crate::store::TokenStore;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// One decodable token found on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenInventoryEntry {
    /// Instance name (`token.json` is reported as `default`)
    pub name: String,
    pub target: String,
    pub id: String,
    pub subject: String,
    pub audience: String,
    pub issuer: String,
    pub issued_at: DateTime<Utc>,
    pub not_before: DateTime<Utc>,
    pub expire_time: DateTime<Utc>,
    /// Seconds of validity left; negative once expired
    pub ttl_remaining: i64,
    pub access: Vec<String>,
}

/// List every token artifact that decodes with the current key.
///
/// Undecodable files are skipped.
pub fn inventory(
    issuer: &TokenIssuer,
    store: &TokenStore,
    now: DateTime<Utc>,
) -> TokenResult<Vec<TokenInventoryEntry>> {
    let mut entries = Vec::new();

    for target in store.list()? {
        let Some(observed) = observe(issuer, store, &target)? else {
            continue;
        };

        let expire_time = observed.expire_time();
        entries.push(TokenInventoryEntry {
            name: target.instance_name().to_string(),
            target: target.file_name().to_string(),
            id: observed.claims.jti.clone(),
            subject: observed.claims.sub.clone(),
            audience: observed.claims.aud.clone(),
            issuer: observed.claims.iss.clone(),
            issued_at: observed.issued_at(),
            not_before: observed.not_before(),
            expire_time,
            ttl_remaining: (expire_time - now).num_seconds(),
            access: observed.claims.access.iter().map(|s| s.name.clone()).collect(),
        });
    }

    tracing::debug!(dir = %store.dir().display(), count = entries.len(), "Collected token inventory");
    Ok(entries)
}
