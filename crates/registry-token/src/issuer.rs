//! RS256 token signing and verification.

use crate::claims::{merge_claims, RegisteredClaims};
use crate::error::{TokenError, TokenResult};
use crate::jwk::RsaPublicJwk;
use crate::keys::KeyChain;
use crate::scope::AccessScope;
use crate::spec::TokenSpec;
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;

/// On-disk token artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedToken {
    /// Compact signed token
    pub token: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub access: Vec<AccessScope>,
}

impl PersistedToken {
    pub fn to_json(&self) -> TokenResult<String> {
        serde_json::to_string(self).map_err(|e| TokenError::Encode(e.to_string()))
    }

    pub fn from_json(content: &str) -> TokenResult<Self> {
        serde_json::from_str(content).map_err(|e| TokenError::Decode(e.to_string()))
    }
}

/// Signs desired tokens with the registry key.
#[derive(Debug, Clone)]
pub struct TokenIssuer {
    keys: Arc<KeyChain>,
}

impl TokenIssuer {
    pub fn new(keys: Arc<KeyChain>) -> Self {
        Self { keys }
    }

    pub fn keys(&self) -> &KeyChain {
        &self.keys
    }

    /// Build and sign the artifact for `spec`, expiring at `expire`.
    pub fn issue(&self, spec: &TokenSpec, expire: DateTime<Utc>) -> TokenResult<PersistedToken> {
        let key = self.keys.resolve()?;

        let registered = RegisteredClaims {
            jti: spec.id.to_string(),
            aud: spec.audience.clone(),
            sub: spec.subject.clone(),
            iss: spec.issuer.clone(),
            iat: spec.issued_at.timestamp(),
            nbf: spec.not_before.timestamp(),
            exp: expire.timestamp(),
            access: spec.access.clone(),
        };
        let payload = merge_claims(&registered, &spec.claims);

        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(key.kid().to_string());

        let token = jsonwebtoken::encode(&header, &payload, key.encoding_key())
            .map_err(|e| TokenError::Crypto(format!("token signing failed: {}", e)))?;

        tracing::debug!(kid = key.kid(), jti = %registered.jti, exp = registered.exp, "Signed registry token");

        Ok(PersistedToken {
            token,
            access: spec.access.clone(),
        })
    }

    /// Verify a token against the current key.
    ///
    /// Every failure, including an unusable key, is a decode error.
    pub fn decode(&self, token: &str) -> TokenResult<Map<String, Value>> {
        let key = self
            .keys
            .resolve()
            .map_err(|e| TokenError::Decode(e.to_string()))?;
        decode_with(token, key.public_jwk())
    }
}

/// Verify `token` with RS256 against `public` and return its payload.
///
/// Time-based claims are not enforced here; expiry is a convergence concern.
pub fn decode_with(token: &str, public: &RsaPublicJwk) -> TokenResult<Map<String, Value>> {
    let key = public
        .decoding_key()
        .map_err(|e| TokenError::Decode(e.to_string()))?;

    let mut validation = Validation::new(Algorithm::RS256);
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims = HashSet::new();

    jsonwebtoken::decode::<Map<String, Value>>(token, &key, &validation)
        .map(|data| data.claims)
        .map_err(|e| TokenError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{FileKeyProvider, SigningKey};
    use crate::spec::TokenParams;
    use crate::ttl::TtlMode;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    use chrono::TimeZone;
    use secrecy::SecretString;
    use serde_json::json;
    use std::fs;

    const PKCS8: &str = include_str!("../tests/fixtures/registry-pkcs8.key");
    const PKCS1: &str = include_str!("../tests/fixtures/registry-pkcs1.key");
    const PKCS8_KID: &str = "FPcqXdCbdxl3EI03h752iTCgpJiMAYBaxahcoRGkc24";

    fn issuer(dir: &tempfile::TempDir, pem: &str) -> TokenIssuer {
        let path = dir.path().join("registry.key");
        fs::write(&path, pem).unwrap();
        TokenIssuer::new(Arc::new(KeyChain::new().with(FileKeyProvider::new(path))))
    }

    fn spec() -> TokenSpec {
        let params: TokenParams = serde_json::from_value(json!({
            "id": "5b1c2ad0-3bd4-4b43-a0ae-fd9a1e0d5f1c",
            "subject": "registry",
            "access": ["group/app"],
            "claims": {"auth_type": "gitlab_or_ldap", "sub": "ignored"},
        }))
        .unwrap();
        let now = Utc.timestamp_opt(1_600_000_000, 0).unwrap();
        TokenSpec::from_params(&params, now, TtlMode::Strict).unwrap()
    }

    fn public(pem: &str) -> RsaPublicJwk {
        SigningKey::from_pem(&SecretString::from(pem.to_string()))
            .unwrap()
            .public_jwk()
            .clone()
    }

    #[test]
    fn test_issue_then_decode_recovers_claims() {
        let dir = tempfile::tempdir().unwrap();
        let issuer = issuer(&dir, PKCS8);
        let spec = spec();

        let persisted = issuer.issue(&spec, spec.expire_time).unwrap();
        let claims = issuer.decode(&persisted.token).unwrap();

        assert_eq!(claims["jti"], "5b1c2ad0-3bd4-4b43-a0ae-fd9a1e0d5f1c");
        assert_eq!(claims["sub"], "registry");
        assert_eq!(claims["aud"], "container_registry");
        assert_eq!(claims["iss"], "omnibus-gitlab-issuer");
        assert_eq!(claims["iat"], 1_600_000_000);
        assert_eq!(claims["nbf"], 1_600_000_005);
        assert_eq!(claims["exp"], 1_600_086_400);
        assert_eq!(claims["auth_type"], "gitlab_or_ldap");
        assert_eq!(claims["access"][0]["actions"], json!(["pull", "push"]));
        assert_eq!(persisted.access, spec.access);
    }

    #[test]
    fn test_header_carries_kid_and_typ() {
        let dir = tempfile::tempdir().unwrap();
        let persisted = issuer(&dir, PKCS8).issue(&spec(), spec().expire_time).unwrap();

        let header = persisted.token.split('.').next().unwrap();
        let header: Value = serde_json::from_slice(&URL_SAFE_NO_PAD.decode(header).unwrap()).unwrap();
        assert_eq!(header["alg"], "RS256");
        assert_eq!(header["typ"], "JWT");
        assert_eq!(header["kid"], PKCS8_KID);
    }

    #[test]
    fn test_decode_with_mismatched_key_fails() {
        let dir = tempfile::tempdir().unwrap();
        let persisted = issuer(&dir, PKCS8).issue(&spec(), spec().expire_time).unwrap();

        assert!(decode_with(&persisted.token, &public(PKCS8)).is_ok());
        assert!(matches!(
            decode_with(&persisted.token, &public(PKCS1)),
            Err(TokenError::Decode(_))
        ));
    }

    #[test]
    fn test_decode_garbage_and_missing_key() {
        let dir = tempfile::tempdir().unwrap();
        let issuer = issuer(&dir, PKCS8);
        assert!(matches!(issuer.decode("not.a.token"), Err(TokenError::Decode(_))));

        let keyless = TokenIssuer::new(Arc::new(KeyChain::from_file(dir.path().join("gone.key"))));
        assert!(matches!(keyless.decode("a.b.c"), Err(TokenError::Decode(_))));
        assert!(matches!(
            keyless.issue(&spec(), spec().expire_time),
            Err(TokenError::Crypto(_))
        ));
    }

    #[test]
    fn test_persisted_shape_omits_empty_access() {
        let bare = PersistedToken {
            token: "a.b.c".into(),
            access: Vec::new(),
        };
        assert_eq!(bare.to_json().unwrap(), r#"{"token":"a.b.c"}"#);
        assert_eq!(PersistedToken::from_json(r#"{"token":"a.b.c"}"#).unwrap(), bare);
        assert!(PersistedToken::from_json("[]").is_err());
    }
}
