//! Signing key sources.
//!
//! The registry key can live in a plain PEM file or inside a JSON secrets
//! document. Which one wins has changed over time, so sources are an ordered
//! [`KeyChain`] of [`KeyProvider`]s tried in sequence.

use crate::error::{TokenError, TokenResult};
use crate::jwk::RsaPublicJwk;
use jsonwebtoken::EncodingKey;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::RsaPrivateKey;
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Default location of the registry signing key.
pub const DEFAULT_KEY_FILE: &str = "/var/opt/gitlab/gitlab-rails/etc/gitlab-registry.key";

/// Default dotted path of the key inside the secrets document.
pub const DEFAULT_SECRETS_KEY_PATH: &str = "registry.internal_key";

/// A place PEM key material may be found.
pub trait KeyProvider: Send + Sync {
    /// Human-readable source description
    fn describe(&self) -> String;

    /// Load PEM material; `Ok(None)` when this source has no key.
    fn load(&self) -> TokenResult<Option<SecretString>>;
}

/// PEM file on disk.
#[derive(Debug, Clone)]
pub struct FileKeyProvider {
    path: PathBuf,
}

impl FileKeyProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl KeyProvider for FileKeyProvider {
    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }

    fn load(&self) -> TokenResult<Option<SecretString>> {
        match fs::read_to_string(&self.path) {
            Ok(pem) if pem.trim().is_empty() => Ok(None),
            Ok(pem) => Ok(Some(SecretString::from(pem))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(TokenError::Crypto(format!(
                "cannot read key file {}: {}",
                self.path.display(),
                e
            ))),
        }
    }
}

/// String value at a dotted path inside a JSON secrets document.
#[derive(Debug, Clone)]
pub struct SecretsDocumentKeyProvider {
    path: PathBuf,
    key_path: String,
}

impl SecretsDocumentKeyProvider {
    pub fn new(path: impl Into<PathBuf>, key_path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            key_path: key_path.into(),
        }
    }

    fn lookup<'a>(&self, document: &'a serde_json::Value) -> Option<&'a str> {
        self.key_path
            .split('.')
            .try_fold(document, |node, segment| node.get(segment))
            .and_then(serde_json::Value::as_str)
    }
}

impl KeyProvider for SecretsDocumentKeyProvider {
    fn describe(&self) -> String {
        format!("secrets {}#{}", self.path.display(), self.key_path)
    }

    fn load(&self) -> TokenResult<Option<SecretString>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(TokenError::Crypto(format!(
                    "cannot read secrets document {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        let document: serde_json::Value = serde_json::from_str(&content).map_err(|e| {
            TokenError::Crypto(format!(
                "secrets document {} is not valid JSON: {}",
                self.path.display(),
                e
            ))
        })?;

        Ok(self
            .lookup(&document)
            .filter(|pem| !pem.trim().is_empty())
            .map(|pem| SecretString::from(pem.to_string())))
    }
}

/// Parsed RSA signing key with its public JWK and key id.
pub struct SigningKey {
    encoding: EncodingKey,
    public: RsaPublicJwk,
    kid: String,
}

impl SigningKey {
    /// Parse a PKCS#8 or PKCS#1 PEM private key.
    pub fn from_pem(pem: &SecretString) -> TokenResult<Self> {
        let pem = pem.expose_secret();

        let private = RsaPrivateKey::from_pkcs8_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
            .map_err(|e| TokenError::Crypto(format!("invalid RSA private key: {}", e)))?;

        let encoding = EncodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|e| TokenError::Crypto(format!("invalid RSA private key: {}", e)))?;

        let public = RsaPublicJwk::from_public_key(&private.to_public_key());
        let kid = public.thumbprint()?;

        Ok(Self {
            encoding,
            public,
            kid,
        })
    }

    pub fn encoding_key(&self) -> &EncodingKey {
        &self.encoding
    }

    pub fn public_jwk(&self) -> &RsaPublicJwk {
        &self.public
    }

    /// RFC 7638 thumbprint used as `kid`
    pub fn kid(&self) -> &str {
        &self.kid
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .finish_non_exhaustive()
    }
}

/// Ordered key sources; the first one that yields material wins.
#[derive(Default)]
pub struct KeyChain {
    providers: Vec<Box<dyn KeyProvider>>,
}

impl KeyChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a provider at the lowest priority.
    pub fn with(mut self, provider: impl KeyProvider + 'static) -> Self {
        self.providers.push(Box::new(provider));
        self
    }

    /// Key file only.
    pub fn from_file(path: impl AsRef<Path>) -> Self {
        Self::new().with(FileKeyProvider::new(path.as_ref()))
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn sources(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.describe()).collect()
    }

    /// Resolve and parse the signing key.
    pub fn resolve(&self) -> TokenResult<SigningKey> {
        for provider in &self.providers {
            if let Some(pem) = provider.load()? {
                tracing::debug!(source = %provider.describe(), "Resolved registry signing key");
                return SigningKey::from_pem(&pem);
            }
            tracing::debug!(source = %provider.describe(), "No signing key at source");
        }

        Err(TokenError::Crypto(format!(
            "no signing key found (tried: {})",
            self.sources().join(", ")
        )))
    }
}

impl fmt::Debug for KeyChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyChain")
            .field("sources", &self.sources())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PKCS8: &str = include_str!("../tests/fixtures/registry-pkcs8.key");
    const PKCS1: &str = include_str!("../tests/fixtures/registry-pkcs1.key");

    #[test]
    fn test_file_provider_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FileKeyProvider::new(dir.path().join("missing.key"));
        assert!(provider.load().unwrap().is_none());
    }

    #[test]
    fn test_secrets_document_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gitlab-secrets.json");
        let document = serde_json::json!({"registry": {"internal_key": PKCS1}});
        fs::write(&path, document.to_string()).unwrap();

        let provider = SecretsDocumentKeyProvider::new(&path, DEFAULT_SECRETS_KEY_PATH);
        let pem = provider.load().unwrap().unwrap();
        assert_eq!(pem.expose_secret(), PKCS1);

        let other = SecretsDocumentKeyProvider::new(&path, "registry.missing");
        assert!(other.load().unwrap().is_none());
    }

    #[test]
    fn test_secrets_document_invalid_json_is_crypto_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gitlab-secrets.json");
        fs::write(&path, "{not json").unwrap();

        let provider = SecretsDocumentKeyProvider::new(&path, DEFAULT_SECRETS_KEY_PATH);
        assert!(matches!(provider.load(), Err(TokenError::Crypto(_))));
    }

    #[test]
    fn test_chain_order_decides_key() {
        let dir = tempfile::tempdir().unwrap();
        let key_file = dir.path().join("registry.key");
        fs::write(&key_file, PKCS8).unwrap();
        let secrets = dir.path().join("secrets.json");
        fs::write(
            &secrets,
            serde_json::json!({"registry": {"internal_key": PKCS1}}).to_string(),
        )
        .unwrap();

        let file_first = KeyChain::from_file(&key_file)
            .with(SecretsDocumentKeyProvider::new(&secrets, DEFAULT_SECRETS_KEY_PATH));
        let secrets_first = KeyChain::new()
            .with(SecretsDocumentKeyProvider::new(&secrets, DEFAULT_SECRETS_KEY_PATH))
            .with(FileKeyProvider::new(&key_file));

        assert_eq!(
            file_first.resolve().unwrap().kid(),
            "FPcqXdCbdxl3EI03h752iTCgpJiMAYBaxahcoRGkc24"
        );
        assert_eq!(
            secrets_first.resolve().unwrap().kid(),
            "OLGwtdw1Ti7uq84XVnZr7f6Ed_-N8f7mdiQcPcB1l9M"
        );
    }

    #[test]
    fn test_chain_falls_through_missing_sources() {
        let dir = tempfile::tempdir().unwrap();
        let key_file = dir.path().join("registry.key");
        fs::write(&key_file, PKCS8).unwrap();

        let chain = KeyChain::new()
            .with(SecretsDocumentKeyProvider::new(
                dir.path().join("absent.json"),
                DEFAULT_SECRETS_KEY_PATH,
            ))
            .with(FileKeyProvider::new(&key_file));
        assert_eq!(chain.len(), 2);
        assert!(chain.resolve().is_ok());
    }

    #[test]
    fn test_empty_chain_is_crypto_error() {
        assert!(matches!(KeyChain::new().resolve(), Err(TokenError::Crypto(_))));
    }

    #[test]
    fn test_garbage_pem_is_crypto_error() {
        let result = SigningKey::from_pem(&SecretString::from("not a key".to_string()));
        assert!(matches!(result, Err(TokenError::Crypto(_))));
    }

    #[test]
    fn test_debug_hides_material() {
        let key = SigningKey::from_pem(&SecretString::from(PKCS8.to_string())).unwrap();
        let rendered = format!("{:?}", key);
        assert!(rendered.contains("kid"));
        assert!(!rendered.contains("PRIVATE"));
    }
}
