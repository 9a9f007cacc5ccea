//! Manifest for convergectl
//!
//! Sources, lowest priority first:
//!
//! 1. built-in defaults
//! 2. the TOML manifest file, when given
//! 3. environment variables, e.g. `CONVERGE_SETTINGS__STRICT_TTL=false`

use crate::error::{CtlError, CtlResult};
use converge_core::{Ensure, FileOwnership};
use registry_token::keys::{DEFAULT_KEY_FILE, DEFAULT_SECRETS_KEY_PATH};
use registry_token::store::DEFAULT_REGISTRY_DIR;
use registry_token::{
    FileKeyProvider, KeyChain, SecretsDocumentKeyProvider, TokenParams, TokenTarget, TtlMode,
};
use runner_registration::{HttpSettings, RunnerParams};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Everything one run converges, plus host settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub settings: Settings,

    /// Declared registry tokens
    #[serde(default)]
    pub registry_token: Vec<TokenEntry>,

    /// Declared runner registrations
    #[serde(default)]
    pub runner: Vec<RunnerEntry>,
}

/// Host-wide settings shared by every resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Directory holding token artifacts
    #[serde(default = "default_registry_dir")]
    pub registry_dir: PathBuf,

    /// PEM signing key file
    #[serde(default = "default_key_file")]
    pub key_file: PathBuf,

    /// JSON secrets document that may also hold the signing key
    #[serde(default)]
    pub secrets_file: Option<PathBuf>,

    /// Dotted path of the key inside `secrets_file`
    #[serde(default = "default_secrets_key_path")]
    pub secrets_key_path: String,

    /// Consult `secrets_file` before `key_file`
    #[serde(default)]
    pub secrets_first: bool,

    /// Reject TTL literals with unknown units
    #[serde(default = "default_true")]
    pub strict_ttl: bool,

    /// Owner of written files; -1 leaves ownership alone
    #[serde(default)]
    pub owner_uid: i64,

    #[serde(default)]
    pub owner_gid: i64,

    #[serde(default = "default_http_timeout")]
    pub http_connect_timeout_secs: u64,

    /// Bound on a whole request, response body included
    #[serde(default = "default_http_timeout")]
    pub http_request_timeout_secs: u64,

    #[serde(default = "default_max_redirects")]
    pub http_max_redirects: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            registry_dir: default_registry_dir(),
            key_file: default_key_file(),
            secrets_file: None,
            secrets_key_path: default_secrets_key_path(),
            secrets_first: false,
            strict_ttl: true,
            owner_uid: 0,
            owner_gid: 0,
            http_connect_timeout_secs: default_http_timeout(),
            http_request_timeout_secs: default_http_timeout(),
            http_max_redirects: default_max_redirects(),
        }
    }
}

fn default_registry_dir() -> PathBuf {
    PathBuf::from(DEFAULT_REGISTRY_DIR)
}

fn default_key_file() -> PathBuf {
    PathBuf::from(DEFAULT_KEY_FILE)
}

fn default_secrets_key_path() -> String {
    DEFAULT_SECRETS_KEY_PATH.to_string()
}

fn default_true() -> bool {
    true
}

fn default_http_timeout() -> u64 {
    5
}

fn default_max_redirects() -> usize {
    5
}

impl Settings {
    /// Ownership for written files, `None` when either id is negative.
    pub fn owner(&self) -> CtlResult<Option<FileOwnership>> {
        if self.owner_uid < 0 || self.owner_gid < 0 {
            return Ok(None);
        }

        let uid = u32::try_from(self.owner_uid)
            .map_err(|_| CtlError::Manifest(format!("owner_uid {} is out of range", self.owner_uid)))?;
        let gid = u32::try_from(self.owner_gid)
            .map_err(|_| CtlError::Manifest(format!("owner_gid {} is out of range", self.owner_gid)))?;
        Ok(Some(FileOwnership { uid, gid }))
    }

    pub fn ttl_mode(&self) -> TtlMode {
        if self.strict_ttl {
            TtlMode::Strict
        } else {
            TtlMode::Lenient
        }
    }

    pub fn http(&self) -> HttpSettings {
        HttpSettings {
            connect_timeout: Duration::from_secs(self.http_connect_timeout_secs),
            request_timeout: Duration::from_secs(self.http_request_timeout_secs),
            max_redirects: self.http_max_redirects,
        }
    }

    /// Signing key sources in configured order.
    pub fn key_chain(&self) -> KeyChain {
        let file = FileKeyProvider::new(&self.key_file);
        let Some(secrets_file) = &self.secrets_file else {
            return KeyChain::new().with(file);
        };

        let secrets = SecretsDocumentKeyProvider::new(secrets_file, self.secrets_key_path.clone());
        if self.secrets_first {
            KeyChain::new().with(secrets).with(file)
        } else {
            KeyChain::new().with(file).with(secrets)
        }
    }
}

/// One `[[registry_token]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenEntry {
    pub name: String,

    #[serde(default)]
    pub ensure: Ensure,

    #[serde(flatten)]
    pub params: TokenParams,
}

/// One `[[runner]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerEntry {
    pub name: String,

    #[serde(default)]
    pub ensure: Ensure,

    #[serde(flatten)]
    pub params: RunnerParams,
}

impl Manifest {
    /// Load from defaults, an optional manifest file and the environment.
    ///
    /// A manifest path that was given explicitly must exist.
    pub fn load(path: Option<&Path>) -> CtlResult<Self> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&Manifest::default())?);

        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(true),
            );
        }

        builder = builder.add_source(
            config::Environment::with_prefix("CONVERGE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let manifest: Manifest = builder.build()?.try_deserialize()?;
        manifest.validate()?;

        tracing::debug!(
            tokens = manifest.registry_token.len(),
            runners = manifest.runner.len(),
            "Loaded manifest"
        );
        Ok(manifest)
    }

    /// Parse a manifest from TOML text without consulting the environment.
    pub fn from_toml(content: &str) -> CtlResult<Self> {
        let manifest: Manifest = config::Config::builder()
            .add_source(config::Config::try_from(&Manifest::default())?)
            .add_source(config::File::from_str(content, config::FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Reject entries that would fight over the same name or file.
    pub fn validate(&self) -> CtlResult<()> {
        let mut names = HashSet::new();
        let mut targets = HashSet::new();
        for entry in &self.registry_token {
            check_name("registry_token", &entry.name, &mut names)?;

            let target = TokenTarget::new(&entry.params.target)
                .map_err(|e| CtlError::Manifest(format!("registry_token '{}': {}", entry.name, e)))?;
            if !targets.insert(target.file_name().to_string()) {
                return Err(CtlError::Manifest(format!(
                    "registry_token '{}': target {} is already managed",
                    entry.name, target
                )));
            }
        }

        let mut names = HashSet::new();
        let mut configs = HashSet::new();
        for entry in &self.runner {
            check_name("runner", &entry.name, &mut names)?;

            if !configs.insert(entry.params.config.clone()) {
                return Err(CtlError::Manifest(format!(
                    "runner '{}': {} is already managed",
                    entry.name,
                    entry.params.config.display()
                )));
            }
        }

        Ok(())
    }
}

fn check_name<'a>(kind: &str, name: &'a str, seen: &mut HashSet<&'a str>) -> CtlResult<()> {
    if name.trim().is_empty() {
        return Err(CtlError::Manifest(format!("{} entry without a name", kind)));
    }
    if !seen.insert(name) {
        return Err(CtlError::Manifest(format!("duplicate {} '{}'", kind, name)));
    }
    Ok(())
}
