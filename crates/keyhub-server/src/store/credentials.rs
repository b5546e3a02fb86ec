use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Error, Result};

pub const CREDENTIAL_FILE: &str = "keyhub-admin.json";

/// The single console login identity.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct AdminCredential {
    pub username: String,
    /// Plaintext copy kept for display on the settings form.
    #[serde(rename = "rawpass", default)]
    pub display_password: String,
    #[serde(rename = "password")]
    pub password_hash: String,
}

impl fmt::Debug for AdminCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminCredential")
            .field("username", &self.username)
            .field("display_password", &"<redacted>")
            .field("password_hash", &"<redacted>")
            .finish()
    }
}

/// JSON file holding the persisted [`AdminCredential`].
#[derive(Debug, Clone)]
pub struct CredentialFile {
    path: PathBuf,
}

impl CredentialFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(CREDENTIAL_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<AdminCredential> {
        let bytes = std::fs::read(&self.path)?;
        let cred: AdminCredential = serde_json::from_slice(&bytes)?;
        if cred.username.is_empty() || cred.password_hash.is_empty() {
            return Err(Error::Credentials(format!(
                "{} has an empty username or password hash",
                self.path.display()
            )));
        }
        Ok(cred)
    }

    /// Replace the file contents; readers never see a half-written record.
    pub fn save(&self, cred: &AdminCredential) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(cred)?;
        let tmp = self.path.with_extension("json.tmp");
        // `create_new` below refuses a leftover temp file.
        let _ = std::fs::remove_file(&tmp);
        let mut file = private_file(&tmp)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        drop(file);
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// The record holds a plaintext password: owner read/write only.
#[cfg(unix)]
fn private_file(path: &Path) -> std::io::Result<std::fs::File> {
    use std::os::unix::fs::OpenOptionsExt;

    std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn private_file(path: &Path) -> std::io::Result<std::fs::File> {
    std::fs::OpenOptions::new().write(true).create_new(true).open(path)
}
