use pathex_cache::{spawn_sweeper, Token, TokenStore, TokenStorePolicy};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct Stored {
    label: String,
    body: Vec<u8>,
}

fn stored(label: &str) -> Stored {
    Stored {
        label: label.to_string(),
        body: vec![7; 1000],
    }
}

fn set_mtime(path: &Path, secs: u64) {
    fs::OpenOptions::new()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(UNIX_EPOCH + Duration::from_secs(secs))
        .unwrap();
}

#[test]
fn round_trip_and_unknown_tokens() {
    let tmp = TempDir::new().unwrap();
    let store = TokenStore::open(tmp.path(), TokenStorePolicy::default()).unwrap();
    let token = Token::derive("a", b"payload");

    assert_eq!(store.load::<Stored>(&token), None);
    store.save(&token, &stored("a")).unwrap();
    assert_eq!(store.load::<Stored>(&token), Some(stored("a")));
    assert_eq!(
        store.entry_path(&token),
        tmp.path().join(format!("{token}.bin"))
    );
}

#[test]
fn sweep_evicts_least_recently_accessed_down_to_low_water() {
    let tmp = TempDir::new().unwrap();
    let tokens: Vec<Token> = (0..4)
        .map(|i| Token::derive(&format!("set{i}"), b"payload"))
        .collect();

    // Size the marks from a real entry so the test does not depend on the envelope layout.
    let sizing = TokenStore::open(tmp.path(), TokenStorePolicy::default()).unwrap();
    for (i, token) in tokens.iter().enumerate() {
        sizing.save(token, &stored(&format!("set{i}"))).unwrap();
    }
    let entry_len = fs::metadata(sizing.entry_path(&tokens[0])).unwrap().len();
    let policy = TokenStorePolicy {
        ttl: Duration::from_secs(3600),
        high_water_bytes: entry_len * 3 + entry_len / 2,
        low_water_bytes: entry_len * 2 + entry_len / 2,
    };
    let store = TokenStore::open(tmp.path(), policy).unwrap();

    for (i, token) in tokens.iter().enumerate() {
        set_mtime(&store.entry_path(token), 1_000 + i as u64);
    }
    // Reading the oldest entry makes it the most recently used.
    assert!(store.load::<Stored>(&tokens[0]).is_some());

    let report = store.sweep().unwrap();
    assert_eq!(report.scanned, 4);
    assert_eq!(report.evicted, 2);
    assert_eq!(report.remaining_bytes, entry_len * 2);

    assert!(store.contains(&tokens[0]));
    assert!(!store.contains(&tokens[1]));
    assert!(!store.contains(&tokens[2]));
    assert!(store.contains(&tokens[3]));
}

#[test]
fn sweep_below_high_water_evicts_nothing() {
    let tmp = TempDir::new().unwrap();
    let store = TokenStore::open(tmp.path(), TokenStorePolicy::default()).unwrap();
    for i in 0..3 {
        let token = Token::derive(&format!("set{i}"), b"payload");
        store.save(&token, &stored("x")).unwrap();
    }
    let report = store.sweep().unwrap();
    assert_eq!(report.scanned, 3);
    assert_eq!(report.evicted + report.expired + report.corrupt, 0);
}

#[test]
fn corrupt_entries_degrade_to_absent() {
    let tmp = TempDir::new().unwrap();
    let store = TokenStore::open(tmp.path(), TokenStorePolicy::default()).unwrap();
    let token = Token::derive("broken", b"payload");
    fs::write(store.entry_path(&token), b"not bincode").unwrap();

    assert_eq!(store.load::<Stored>(&token), None);
    assert!(!store.entry_path(&token).exists());

    let other = Token::derive("broken-too", b"payload");
    fs::write(store.entry_path(&other), b"\x01\x02").unwrap();
    let report = store.sweep().unwrap();
    assert_eq!(report.corrupt, 1);
    assert!(!store.entry_path(&other).exists());
}

#[test]
fn entry_renamed_to_another_token_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let store = TokenStore::open(tmp.path(), TokenStorePolicy::default()).unwrap();
    let original = Token::derive("a", b"1");
    let forged = Token::derive("b", b"2");
    store.save(&original, &stored("a")).unwrap();
    fs::rename(store.entry_path(&original), store.entry_path(&forged)).unwrap();

    assert_eq!(store.load::<Stored>(&forged), None);
    assert!(!store.entry_path(&forged).exists());
}

#[test]
fn sweep_removes_only_stale_temp_files() {
    let tmp = TempDir::new().unwrap();
    let store = TokenStore::open(tmp.path(), TokenStorePolicy::default()).unwrap();
    let stale = tmp.path().join("abc.bin.tmp.1.1");
    let fresh = tmp.path().join("abc.bin.tmp.1.2");
    fs::write(&stale, b"partial").unwrap();
    fs::write(&fresh, b"partial").unwrap();
    set_mtime(&stale, 1_000);

    store.sweep().unwrap();
    assert!(!stale.exists());
    assert!(fresh.exists());
}

#[test]
fn loads_racing_sweeps_never_observe_partial_entries() {
    let tmp = TempDir::new().unwrap();
    let policy = TokenStorePolicy {
        ttl: Duration::from_secs(3600),
        high_water_bytes: 0,
        low_water_bytes: 0,
    };
    let store = Arc::new(TokenStore::open(tmp.path(), policy).unwrap());
    let token = Token::derive("race", b"payload");
    let expected = stored("race");

    let mut handles = Vec::new();
    for worker in 0..4 {
        let store = store.clone();
        let token = token.clone();
        let expected = expected.clone();
        handles.push(thread::spawn(move || {
            for _ in 0..200 {
                if worker == 0 {
                    store.sweep().unwrap();
                } else {
                    store.save(&token, &expected).unwrap();
                    if let Some(loaded) = store.load::<Stored>(&token) {
                        assert_eq!(loaded, expected);
                    }
                }
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
}

#[tokio::test]
async fn background_sweeper_expires_entries_and_stops_on_cancel() {
    let tmp = TempDir::new().unwrap();
    let policy = TokenStorePolicy {
        ttl: Duration::ZERO,
        ..TokenStorePolicy::default()
    };
    let store = Arc::new(TokenStore::open(tmp.path(), policy).unwrap());
    let token = Token::derive("short-lived", b"payload");
    store.save(&token, &stored("x")).unwrap();
    let path = store.entry_path(&token);

    let cancel = CancellationToken::new();
    let handle = spawn_sweeper(store.clone(), Duration::from_millis(20), cancel.clone());

    let deadline = SystemTime::now() + Duration::from_secs(5);
    while path.exists() && SystemTime::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(!path.exists());

    cancel.cancel();
    handle.await.unwrap();
}
