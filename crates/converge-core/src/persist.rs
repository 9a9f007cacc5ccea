//! Whole-file persistence for managed credentials.
//!
//! Writes go to a sibling `.tmp` file which is then renamed over the target,
//! so readers never see a half-written file. There is no locking: a
//! concurrent external writer can still lose its edit to the next pass.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Mode applied to every managed file.
pub const PRIVATE_FILE_MODE: u32 = 0o600;

/// Owner and group applied to managed files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileOwnership {
    pub uid: u32,
    pub gid: u32,
}

impl FileOwnership {
    /// `root:root`
    pub const ROOT: FileOwnership = FileOwnership { uid: 0, gid: 0 };
}

/// Atomically replace `path` with `contents`, mode 0600.
///
/// When `owner` is set the file is chowned before it is moved into place.
pub fn write_private(
    path: &Path,
    contents: &[u8],
    owner: Option<FileOwnership>,
) -> std::io::Result<()> {
    let tmp_path = tmp_path_for(path);

    {
        let mut file = open_private(&tmp_path)?;
        file.write_all(contents)?;
        file.sync_all()?;
    }

    if let Some(owner) = owner {
        if let Err(e) = apply_ownership(&tmp_path, owner) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }
    }

    fs::rename(&tmp_path, path)
}

/// Remove a managed file; a missing file is not an error.
pub fn remove_if_exists(path: &Path) -> std::io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(unix)]
fn apply_ownership(path: &Path, owner: FileOwnership) -> std::io::Result<()> {
    std::os::unix::fs::chown(path, Some(owner.uid), Some(owner.gid))
}

#[cfg(not(unix))]
fn apply_ownership(_path: &Path, _owner: FileOwnership) -> std::io::Result<()> {
    Ok(())
}

#[cfg(unix)]
fn open_private(path: &Path) -> std::io::Result<fs::File> {
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(PRIVATE_FILE_MODE)
        .open(path)?;
    // mode() is masked by umask and ignored for pre-existing files
    file.set_permissions(fs::Permissions::from_mode(PRIVATE_FILE_MODE))?;
    Ok(file)
}

#[cfg(not(unix))]
fn open_private(path: &Path) -> std::io::Result<fs::File> {
    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
}
