use super::*;

#[test]
fn memory_store_roundtrip_and_clear() {
    let store = MemoryTokenStore::new();
    assert!(store.get().is_none());
    let pair = TokenPair::new("a1", "r1");
    store.set(pair.clone()).unwrap();
    assert_eq!(store.get(), Some(pair));
    assert_eq!(store.access_token().as_deref(), Some("a1"));
    store.clear().unwrap();
    assert!(store.get().is_none());
    assert!(store.refresh_token().is_none());
}

#[test]
fn set_replaces_the_whole_pair() {
    let store = MemoryTokenStore::with_pair(TokenPair::new("a1", "r1"));
    store.set(TokenPair::new("a2", "r2")).unwrap();
    assert_eq!(store.get(), Some(TokenPair::new("a2", "r2")));
}

#[test]
fn file_store_roundtrip_survives_reopen() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("session").join("tokens.json");
    let store = FileTokenStore::new(&path);
    store.set(TokenPair::new("acc", "ref")).unwrap();

    // Persisted with the browser-compatible key names
    let raw: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(raw[ACCESS_TOKEN_KEY], "acc");
    assert_eq!(raw[REFRESH_TOKEN_KEY], "ref");

    let reopened = FileTokenStore::new(&path);
    assert_eq!(reopened.get(), Some(TokenPair::new("acc", "ref")));
    reopened.clear().unwrap();
    assert!(store.get().is_none());
    assert!(!path.exists());
    // clearing twice is fine
    reopened.clear().unwrap();
}

#[test]
fn file_store_partial_pair_is_unauthenticated_and_cleaned() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("tokens.json");
    std::fs::write(&path, r#"{"accessToken":"only-access"}"#).unwrap();
    let store = FileTokenStore::new(&path);
    assert!(store.get().is_none());
    assert!(!path.exists(), "partial token file should be removed");
}

#[test]
fn file_store_corrupt_file_is_discarded() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("tokens.json");
    std::fs::write(&path, "not json").unwrap();
    let store = FileTokenStore::new(&path);
    assert!(store.get().is_none());
    assert!(!path.exists());
}

#[test]
fn failed_write_leaves_no_temp_file_behind() {
    let tmp = tempfile::tempdir().unwrap();
    // A directory where the token file should go makes the final rename fail.
    let path = tmp.path().join("tokens.json");
    std::fs::create_dir(&path).unwrap();
    std::fs::write(path.join("keep"), "x").unwrap();

    let store = FileTokenStore::new(&path);
    assert!(store.set(TokenPair::new("acc", "ref")).is_err());
    assert!(!tmp.path().join("tokens.json.tmp").exists());
    assert!(path.join("keep").exists());
}

#[test]
fn debug_output_redacts_secrets() {
    let s = format!("{:?}", TokenPair::new("secret-access", "secret-refresh"));
    assert!(!s.contains("secret-access"));
    assert!(!s.contains("secret-refresh"));
}

#[test]
fn open_token_store_picks_backend() {
    let tmp = tempfile::tempdir().unwrap();
    let file_backed = open_token_store(Some(tmp.path().join("t.json")));
    file_backed.set(TokenPair::new("a", "r")).unwrap();
    assert!(tmp.path().join("t.json").exists());
    let mem = open_token_store(None);
    assert!(mem.get().is_none());
}
