//!
//! acadworld token storage
//! -----------------------
//! Durable home of the current access/refresh token pair. The pair is written
//! and cleared as a unit; a store never exposes an access token without its
//! refresh token or the other way round.
//!
//! Two implementations are provided:
//! - `MemoryTokenStore` keeps the pair in process memory (tests, short-lived tools).
//! - `FileTokenStore` persists `{"accessToken", "refreshToken"}` JSON so a session
//!   survives restarts of the CLI.

use std::path::PathBuf;
use std::sync::Arc;

mod tokens;

pub use tokens::{FileTokenStore, MemoryTokenStore, TokenPair, TokenStore, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};

pub type SharedTokenStore = Arc<dyn TokenStore>;

/// Pick the store backing a client: file-backed when a path is configured, in-memory otherwise.
pub fn open_token_store(path: Option<PathBuf>) -> SharedTokenStore {
    match path {
        Some(p) => Arc::new(FileTokenStore::new(p)),
        None => Arc::new(MemoryTokenStore::new()),
    }
}

#[cfg(test)]
#[path = "storage_tests.rs"]
mod storage_tests;
