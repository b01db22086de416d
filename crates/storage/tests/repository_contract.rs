//! Contract tests for `MemorySigningKeyRepository` through the
//! `SigningKeyRepository` trait object, as rotation and caching use it.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use rstest::rstest;
use sigil_storage::{MemorySigningKeyRepository, SigningKeyRepository, StorageError};

fn repository() -> Arc<dyn SigningKeyRepository> {
    Arc::new(MemorySigningKeyRepository::new())
}

#[tokio::test]
async fn list_is_newest_first_after_deletes() {
    let repo = repository();
    for name in ["a", "b", "c", "d"] {
        repo.write(name, &[1u8; 32]).await.unwrap();
    }
    repo.delete("c").await.unwrap();
    repo.write("e", &[1u8; 32]).await.unwrap();

    let names: Vec<String> = repo.list().await.unwrap().into_iter().map(|r| r.name).collect();
    assert_eq!(names, ["e", "d", "b", "a"]);
}

#[tokio::test]
async fn written_record_round_trips_key_material() {
    let repo = repository();
    let key: Vec<u8> = (0..32).collect();

    let written = repo.write("key-1", &key).await.unwrap();
    let listed = repo.list().await.unwrap();

    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0], written);
    assert_eq!(listed[0].key_bytes(), key.as_slice());
}

#[rstest]
#[case::duplicate_write("write")]
#[case::missing_delete("delete")]
#[tokio::test]
async fn invalid_operations_leave_store_unchanged(#[case] op: &str) {
    let repo = repository();
    repo.write("key-1", &[1u8; 32]).await.unwrap();

    let err = match op {
        "write" => repo.write("key-1", &[2u8; 32]).await.unwrap_err(),
        _ => repo.delete("key-2").await.unwrap_err(),
    };

    assert!(
        matches!(err, StorageError::Conflict { .. } | StorageError::NotFound { .. }),
        "unexpected error: {err:?}"
    );
    assert!(!err.is_transient());
    let listed = repo.list().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].key_bytes(), &[1u8; 32]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_writes_are_all_listed() {
    let repo = repository();

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let repo = Arc::clone(&repo);
            tokio::spawn(async move { repo.write(&format!("key-{i}"), &[i; 32]).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let listed = repo.list().await.unwrap();
    assert_eq!(listed.len(), 16);
    let mut names: Vec<String> = listed.into_iter().map(|r| r.name).collect();
    names.sort();
    names.dedup();
    assert_eq!(names.len(), 16);
}
