//! RSA public JWK and RFC 7638 thumbprints.

use crate::error::{TokenError, TokenResult};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::DecodingKey;
use rsa::traits::PublicKeyParts;
use rsa::RsaPublicKey;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Public half of an RSA key in JWK form.
///
/// Field order is the lexicographic member order RFC 7638 requires, so the
/// serde output is already canonical.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RsaPublicJwk {
    /// Base64url-encoded big-endian public exponent
    pub e: String,
    pub kty: String,
    /// Base64url-encoded big-endian modulus
    pub n: String,
}

impl RsaPublicJwk {
    pub fn from_public_key(key: &RsaPublicKey) -> Self {
        Self {
            e: URL_SAFE_NO_PAD.encode(key.e().to_bytes_be()),
            kty: "RSA".to_string(),
            n: URL_SAFE_NO_PAD.encode(key.n().to_bytes_be()),
        }
    }

    /// Exact byte string hashed for the thumbprint.
    pub fn canonical_json(&self) -> TokenResult<String> {
        serde_json::to_string(self).map_err(|e| TokenError::Encode(e.to_string()))
    }

    /// RFC 7638 SHA-256 thumbprint, base64url without padding.
    pub fn thumbprint(&self) -> TokenResult<String> {
        let digest = Sha256::digest(self.canonical_json()?.as_bytes());
        Ok(URL_SAFE_NO_PAD.encode(digest))
    }

    pub fn decoding_key(&self) -> TokenResult<DecodingKey> {
        DecodingKey::from_rsa_components(&self.n, &self.e)
            .map_err(|e| TokenError::Crypto(format!("unusable public key: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::SigningKey;
    use secrecy::SecretString;

    const PKCS8: &str = include_str!("../tests/fixtures/registry-pkcs8.key");
    const PKCS1: &str = include_str!("../tests/fixtures/registry-pkcs1.key");

    fn jwk(pem: &str) -> RsaPublicJwk {
        SigningKey::from_pem(&SecretString::from(pem.to_string()))
            .unwrap()
            .public_jwk()
            .clone()
    }

    #[test]
    fn test_known_thumbprints() {
        assert_eq!(
            jwk(PKCS8).thumbprint().unwrap(),
            "FPcqXdCbdxl3EI03h752iTCgpJiMAYBaxahcoRGkc24"
        );
        assert_eq!(
            jwk(PKCS1).thumbprint().unwrap(),
            "OLGwtdw1Ti7uq84XVnZr7f6Ed_-N8f7mdiQcPcB1l9M"
        );
    }

    #[test]
    fn test_canonical_member_order() {
        let json = jwk(PKCS8).canonical_json().unwrap();
        assert!(json.starts_with(r#"{"e":"AQAB","kty":"RSA","n":""#));
        assert!(!json.contains(' '));
        assert!(!json.contains('='));
    }

    #[test]
    fn test_thumbprint_is_deterministic() {
        let key = jwk(PKCS1);
        assert_eq!(key.thumbprint().unwrap(), key.thumbprint().unwrap());
        assert_ne!(key.thumbprint().unwrap(), jwk(PKCS8).thumbprint().unwrap());
    }

    #[test]
    fn test_rfc7638_example_vector() {
        let key = RsaPublicJwk {
            e: "AQAB".into(),
            kty: "RSA".into(),
            n: "0vx7agoebGcQSuuPiLJXZptN9nndrQmbXEps2aiAFbWhM78LhWx4cbbfAAtVT86zwu1RK7aPFFxuhDR1L6tSoc_BJECPebWKRXjBZCiFV4n3oknjhMstn64tZ_2W-5JsGY4Hc5n9yBXArwl93lqt7_RN5w6Cf0h4QyQ5v-65YGjQR0_FDW2QvzqY368QQMicAtaSqzs8KJZgnYb9c7d0zgdAZHzu6qMQvRL5hajrn1n91CbOpbISD08qNLyrdkt-bFTWhAI4vMQFh6WeZu0fM4lFd2NcRwr3XPksINHaQ-G_xBniIqbw0Ls1jF44-csFCur-kEgU8awapJzKnqDKgw".into(),
        };
        assert_eq!(
            key.thumbprint().unwrap(),
            "NzbLsXh8uDCcd-6MNwXF4W_7noWXFZAfHkxZsRGC9Xs"
        );
    }
}
