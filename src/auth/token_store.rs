use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Tokens expiring within this window are treated as expired.
const EXPIRY_SKEW_SECS: i64 = 60;

/// Persisted authorization token (JSON file).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredToken {
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at_epoch: Option<i64>, // epoch seconds
}

impl StoredToken {
    pub fn is_valid(&self, now: i64) -> bool {
        match (&self.access_token, self.expires_at_epoch) {
            (Some(at), Some(exp)) => !at.is_empty() && now + EXPIRY_SKEW_SECS < exp,
            _ => false,
        }
    }
}

pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `None` when no token has been saved yet.
    pub fn load(&self) -> Result<Option<StoredToken>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let s = fs::read_to_string(&self.path)
            .with_context(|| format!("cannot read token file {}", self.path.display()))?;
        let token = serde_json::from_str(&s)
            .with_context(|| format!("malformed token file {}", self.path.display()))?;
        Ok(Some(token))
    }

    pub fn save(&self, token: &StoredToken) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let s = serde_json::to_string_pretty(token)?;
        fs::write(&self.path, s)
            .with_context(|| format!("cannot write token file {}", self.path.display()))?;
        restrict_permissions(&self.path)
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(exp: Option<i64>) -> StoredToken {
        StoredToken {
            access_token: Some("ya29.abc".into()),
            refresh_token: Some("1//refresh".into()),
            expires_at_epoch: exp,
        }
    }

    #[test]
    fn missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("token.json"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("nested").join("token.json"));

        store.save(&token(Some(1_700_000_000))).unwrap();
        assert_eq!(store.load().unwrap(), Some(token(Some(1_700_000_000))));
    }

    #[cfg(unix)]
    #[test]
    fn token_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("token.json"));
        store.save(&token(None)).unwrap();
        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        fs::write(&path, "not json").unwrap();
        assert!(TokenStore::new(path).load().is_err());
    }

    #[test]
    fn validity_honours_expiry_and_skew() {
        let now = 1_000_000;
        assert!(token(Some(now + 3600)).is_valid(now));
        assert!(!token(Some(now + 30)).is_valid(now));
        assert!(!token(Some(now - 1)).is_valid(now));
        assert!(!token(None).is_valid(now));

        let mut empty = token(Some(now + 3600));
        empty.access_token = None;
        assert!(!empty.is_valid(now));
    }
}
