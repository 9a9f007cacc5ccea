//! Token artifacts in the registry directory.

use crate::error::{TokenError, TokenResult};
use crate::issuer::PersistedToken;
use crate::spec::TokenTarget;
use converge_core::persist::{remove_if_exists, write_private};
use converge_core::FileOwnership;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Default registry configuration directory.
pub const DEFAULT_REGISTRY_DIR: &str = "/etc/docker/registry";

/// Reads and writes persisted tokens under one directory.
#[derive(Debug, Clone)]
pub struct TokenStore {
    dir: PathBuf,
    owner: Option<FileOwnership>,
}

impl TokenStore {
    pub fn new(dir: impl Into<PathBuf>, owner: Option<FileOwnership>) -> Self {
        Self {
            dir: dir.into(),
            owner,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, target: &TokenTarget) -> PathBuf {
        self.dir.join(target.file_name())
    }

    /// Read an artifact; `Ok(None)` when the file does not exist.
    ///
    /// An unreadable or malformed file is a decode error.
    pub fn read(&self, target: &TokenTarget) -> TokenResult<Option<PersistedToken>> {
        let path = self.path(target);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(TokenError::Decode(format!(
                    "cannot read {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        if content.trim().is_empty() {
            return Ok(None);
        }
        PersistedToken::from_json(&content).map(Some)
    }

    /// Atomically replace the artifact, mode 0600, creating the directory.
    pub fn write(&self, target: &TokenTarget, token: &PersistedToken) -> TokenResult<()> {
        let content = token.to_json()?;
        let path = self.path(target);
        fs::create_dir_all(&self.dir)?;
        write_private(&path, content.as_bytes(), self.owner)?;
        tracing::info!(path = %path.display(), "Wrote registry token");
        Ok(())
    }

    pub fn remove(&self, target: &TokenTarget) -> TokenResult<bool> {
        let path = self.path(target);
        let removed = remove_if_exists(&path)?;
        if removed {
            tracing::info!(path = %path.display(), "Removed registry token");
        }
        Ok(removed)
    }

    /// Every `*.json` artifact in the directory, sorted by name.
    pub fn list(&self) -> TokenResult<Vec<TokenTarget>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut targets = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_lowercase();
            if !name.ends_with(".json") || !entry.file_type()?.is_file() {
                continue;
            }
            match TokenTarget::new(&name) {
                Ok(target) => targets.push(target),
                Err(_) => tracing::debug!(file = %name, "Skipping unmanaged file"),
            }
        }

        targets.sort_by(|a, b| a.file_name().cmp(b.file_name()));
        Ok(targets)
    }
}
