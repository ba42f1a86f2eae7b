use std::fmt::{Debug, Formatter};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ClientResult;

pub const ACCESS_TOKEN_KEY: &str = "accessToken";
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";

/// Current credential pair. Both values are opaque to this crate.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    #[serde(rename = "accessToken")]
    pub access: String,
    #[serde(rename = "refreshToken")]
    pub refresh: String,
}

impl TokenPair {
    pub fn new<A: Into<String>, R: Into<String>>(access: A, refresh: R) -> Self {
        Self { access: access.into(), refresh: refresh.into() }
    }
}

impl Debug for TokenPair {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPair")
            .field("access", &"<redacted>")
            .field("refresh", &"<redacted>")
            .finish()
    }
}

/// Key-value home of the token pair.
///
/// Operations are synchronous so a caller can check and mutate store state
/// without a suspension point in between.
pub trait TokenStore: Send + Sync {
    fn get(&self) -> Option<TokenPair>;
    /// Replace the current pair. The old pair is never partially visible.
    fn set(&self, pair: TokenPair) -> ClientResult<()>;
    fn clear(&self) -> ClientResult<()>;

    fn access_token(&self) -> Option<String> { self.get().map(|p| p.access) }
    fn refresh_token(&self) -> Option<String> { self.get().map(|p| p.refresh) }
}

#[derive(Default)]
pub struct MemoryTokenStore {
    current: RwLock<Option<TokenPair>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self { Self::default() }

    pub fn with_pair(pair: TokenPair) -> Self { Self { current: RwLock::new(Some(pair)) } }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self) -> Option<TokenPair> { self.current.read().clone() }

    fn set(&self, pair: TokenPair) -> ClientResult<()> {
        *self.current.write() = Some(pair);
        Ok(())
    }

    fn clear(&self) -> ClientResult<()> {
        *self.current.write() = None;
        Ok(())
    }
}

/// On-disk layout. Keys are optional so a half-written document can be detected.
#[derive(Default, Serialize, Deserialize)]
struct PersistedTokens {
    #[serde(rename = "accessToken", default, skip_serializing_if = "Option::is_none")]
    access: Option<String>,
    #[serde(rename = "refreshToken", default, skip_serializing_if = "Option::is_none")]
    refresh: Option<String>,
}

/// JSON file store. Writes land in a sibling temp file first and are renamed
/// over the target, so readers see either the old pair or the new one.
pub struct FileTokenStore {
    path: PathBuf,
    io_lock: Mutex<()>,
}

impl FileTokenStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into(), io_lock: Mutex::new(()) }
    }

    pub fn path(&self) -> &Path { &self.path }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn remove_quietly(&self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != ErrorKind::NotFound {
                warn!(target: "auth.tokens", "failed to remove token file {}: {}", self.path.display(), e);
            }
        }
    }
}

impl TokenStore for FileTokenStore {
    fn get(&self) -> Option<TokenPair> {
        let _g = self.io_lock.lock();
        let text = match std::fs::read_to_string(&self.path) {
            Ok(t) => t,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(target: "auth.tokens", "cannot read token file {}: {}", self.path.display(), e);
                return None;
            }
        };
        let persisted: PersistedTokens = match serde_json::from_str(&text) {
            Ok(p) => p,
            Err(e) => {
                warn!(target: "auth.tokens", "discarding unreadable token file {}: {}", self.path.display(), e);
                self.remove_quietly();
                return None;
            }
        };
        match (persisted.access, persisted.refresh) {
            (Some(access), Some(refresh)) => Some(TokenPair { access, refresh }),
            (None, None) => None,
            // One key without the other is not a session.
            _ => {
                warn!(target: "auth.tokens", "token file {} holds a partial pair; clearing", self.path.display());
                self.remove_quietly();
                None
            }
        }
    }

    fn set(&self, pair: TokenPair) -> ClientResult<()> {
        let _g = self.io_lock.lock();
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() { std::fs::create_dir_all(dir)?; }
        }
        let doc = PersistedTokens { access: Some(pair.access), refresh: Some(pair.refresh) };
        let tmp = self.tmp_path();
        let written = std::fs::write(&tmp, serde_json::to_vec(&doc)?).and_then(|_| std::fs::rename(&tmp, &self.path));
        if let Err(e) = written {
            let _ = std::fs::remove_file(&tmp);
            warn!(target: "auth.tokens", "could not write token file {}: {}", self.path.display(), e);
            return Err(e.into());
        }
        debug!(target: "auth.tokens", "token pair written to {}", self.path.display());
        Ok(())
    }

    fn clear(&self) -> ClientResult<()> {
        let _g = self.io_lock.lock();
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(target: "auth.tokens", "token file {} removed", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
