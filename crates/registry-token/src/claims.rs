//! Token payload assembly.

use crate::scope::AccessScope;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Claims the issuer always sets itself.
///
/// A custom claim with one of these names is dropped.
pub const RESERVED_CLAIMS: [&str; 8] = ["jti", "aud", "sub", "iss", "iat", "nbf", "exp", "access"];

/// Registered payload fields of a registry token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredClaims {
    pub jti: String,
    pub aud: String,
    pub sub: String,
    pub iss: String,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
    #[serde(default)]
    pub access: Vec<AccessScope>,
}

pub fn is_reserved(name: &str) -> bool {
    RESERVED_CLAIMS.contains(&name)
}

/// Merge custom claims under the registered ones; registered claims win.
pub fn merge_claims(registered: &RegisteredClaims, custom: &Map<String, Value>) -> Map<String, Value> {
    let mut payload = Map::new();

    for (name, value) in custom {
        if is_reserved(name) {
            tracing::warn!(claim = %name, "Ignoring custom claim that shadows a reserved claim");
            continue;
        }
        payload.insert(name.clone(), value.clone());
    }

    payload.insert("jti".into(), Value::from(registered.jti.clone()));
    payload.insert("aud".into(), Value::from(registered.aud.clone()));
    payload.insert("sub".into(), Value::from(registered.sub.clone()));
    payload.insert("iss".into(), Value::from(registered.iss.clone()));
    payload.insert("iat".into(), Value::from(registered.iat));
    payload.insert("nbf".into(), Value::from(registered.nbf));
    payload.insert("exp".into(), Value::from(registered.exp));
    payload.insert(
        "access".into(),
        serde_json::to_value(&registered.access).unwrap_or_else(|_| Value::Array(Vec::new())),
    );

    payload
}

/// Custom claims carried by a decoded payload.
pub fn custom_claims(payload: &Map<String, Value>) -> Map<String, Value> {
    payload
        .iter()
        .filter(|(name, _)| !is_reserved(name))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}
