//! End-to-end exercises of the upload session manager against real
//! backing files.

use std::time::Duration;

use tempfile::TempDir;
use v2m_models::UploadId;
use v2m_server::{ServerConfig, ServerError, UploadManager};

fn manager(dir: &TempDir) -> UploadManager {
    let config = ServerConfig {
        upload_dir: dir.path().to_path_buf(),
        upload_idle_timeout: Duration::from_millis(50),
        ..ServerConfig::default()
    };
    UploadManager::new(&config)
}

async fn upload_in_order(
    uploads: &UploadManager,
    name: &str,
    size: u64,
    chunks: &[(u64, &[u8])],
) -> (UploadId, Vec<u8>) {
    let id = uploads.begin_upload(name, size).await.unwrap();
    for &(offset, payload) in chunks {
        uploads.accept_chunk(&id, offset, payload).await.unwrap();
    }
    let done = uploads.finalize(&id).await.unwrap();
    let bytes = std::fs::read(&done.path).unwrap();
    (id, bytes)
}

#[tokio::test]
async fn test_two_chunks_either_order() {
    let dir = TempDir::new().unwrap();
    let uploads = manager(&dir);

    let (_, forward) = upload_in_order(
        &uploads,
        "a.mp4",
        10,
        &[(0, b"01234"), (5, b"56789")],
    )
    .await;
    assert_eq!(forward, b"0123456789");

    let (_, backward) = upload_in_order(
        &uploads,
        "a.mp4",
        10,
        &[(5, b"56789"), (0, b"01234")],
    )
    .await;
    assert_eq!(backward, forward);
}

#[tokio::test]
async fn test_chunk_permutations_are_byte_identical() {
    let dir = TempDir::new().unwrap();
    let uploads = manager(&dir);

    let chunks: [(u64, &[u8]); 3] = [(0, b"aaaa"), (4, b"bbbb"), (8, b"cc")];
    let permutations: [[usize; 3]; 6] = [
        [0, 1, 2],
        [0, 2, 1],
        [1, 0, 2],
        [1, 2, 0],
        [2, 0, 1],
        [2, 1, 0],
    ];

    for order in permutations {
        let ordered: Vec<(u64, &[u8])> = order.iter().map(|&i| chunks[i]).collect();
        let (_, bytes) = upload_in_order(&uploads, "p.bin", 10, &ordered).await;
        assert_eq!(bytes, b"aaaabbbbcc");
    }
}

#[tokio::test]
async fn test_overlapping_rewrite_does_not_corrupt_neighbors() {
    let dir = TempDir::new().unwrap();
    let uploads = manager(&dir);

    let (_, bytes) = upload_in_order(
        &uploads,
        "o.bin",
        10,
        &[(0, b"AAAAA"), (5, b"BBBBB"), (2, b"CCCCC")],
    )
    .await;
    assert_eq!(bytes, b"AACCCCCBBB");
}

#[tokio::test]
async fn test_progress_tracks_covered_ranges_not_sum() {
    let dir = TempDir::new().unwrap();
    let uploads = manager(&dir);

    let id = uploads.begin_upload("p.mp4", 10).await.unwrap();

    let progress = uploads.accept_chunk(&id, 0, b"01234").await.unwrap();
    assert_eq!(progress.progress, 50);
    assert_eq!(progress.uploaded, 5);
    assert_eq!(progress.total, 10);

    // retransmitted chunk must not inflate the count
    let progress = uploads.accept_chunk(&id, 0, b"01234").await.unwrap();
    assert_eq!(progress.uploaded, 5);

    let progress = uploads.accept_chunk(&id, 5, b"56789").await.unwrap();
    assert_eq!(progress.progress, 100);
    assert_eq!(progress.uploaded, 10);
}

#[tokio::test]
async fn test_finalize_with_gap_fails_and_is_recoverable() {
    let dir = TempDir::new().unwrap();
    let uploads = manager(&dir);

    let id = uploads.begin_upload("gap.mp4", 10).await.unwrap();
    uploads.accept_chunk(&id, 0, b"01234").await.unwrap();

    let err = uploads.finalize(&id).await.unwrap_err();
    match err {
        ServerError::IncompleteUpload {
            received,
            declared_size,
        } => {
            assert_eq!(received, 5);
            assert_eq!(declared_size, 10);
        }
        other => panic!("expected IncompleteUpload, got {:?}", other),
    }

    // the session survived in Receiving; fill the gap and finish
    uploads.accept_chunk(&id, 5, b"56789").await.unwrap();
    let done = uploads.finalize(&id).await.unwrap();
    assert_eq!(std::fs::read(&done.path).unwrap(), b"0123456789");
}

#[tokio::test]
async fn test_chunk_past_declared_size_rejected() {
    let dir = TempDir::new().unwrap();
    let uploads = manager(&dir);

    let id = uploads.begin_upload("r.mp4", 10).await.unwrap();
    let err = uploads.accept_chunk(&id, 8, b"01234").await.unwrap_err();
    assert!(matches!(err, ServerError::OffsetOutOfRange { .. }));

    // the rejection left the session usable
    uploads.accept_chunk(&id, 0, b"0123456789").await.unwrap();
    uploads.finalize(&id).await.unwrap();
}

#[tokio::test]
async fn test_unknown_session_rejected() {
    let dir = TempDir::new().unwrap();
    let uploads = manager(&dir);

    let err = uploads
        .accept_chunk(&UploadId::from_string("bogus"), 0, b"x")
        .await
        .unwrap_err();
    assert!(matches!(err, ServerError::UnknownSession(_)));

    let err = uploads
        .finalize(&UploadId::from_string("bogus"))
        .await
        .unwrap_err();
    assert!(matches!(err, ServerError::UnknownSession(_)));
}

#[tokio::test]
async fn test_abort_releases_storage_and_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let uploads = manager(&dir);

    let id = uploads.begin_upload("ab.mp4", 10).await.unwrap();
    uploads.accept_chunk(&id, 0, b"01234").await.unwrap();
    assert_eq!(uploads.session_count(), 1);

    uploads.abort(&id).await;
    assert_eq!(uploads.session_count(), 0);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);

    // aborting again does nothing
    uploads.abort(&id).await;

    // a chunk for the aborted session cannot resurrect it
    let err = uploads.accept_chunk(&id, 5, b"56789").await.unwrap_err();
    assert!(matches!(err, ServerError::UnknownSession(_)));
    assert_eq!(uploads.session_count(), 0);
}

#[tokio::test]
async fn test_finalized_session_is_evicted() {
    let dir = TempDir::new().unwrap();
    let uploads = manager(&dir);

    let (id, _) = upload_in_order(&uploads, "done.mp4", 4, &[(0, b"0123")]).await;
    assert_eq!(uploads.session_count(), 0);

    let err = uploads.accept_chunk(&id, 0, b"0123").await.unwrap_err();
    assert!(matches!(err, ServerError::UnknownSession(_)));
}

#[tokio::test]
async fn test_idle_sessions_are_swept() {
    let dir = TempDir::new().unwrap();
    let uploads = manager(&dir);

    let id = uploads.begin_upload("idle.mp4", 10).await.unwrap();
    tokio::time::sleep(Duration::from_millis(120)).await;

    let evicted = uploads.sweep_idle().await;
    assert_eq!(evicted, vec![id]);
    assert_eq!(uploads.session_count(), 0);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_begin_upload_validation() {
    let dir = TempDir::new().unwrap();
    let uploads = manager(&dir);

    for (name, size) in [
        ("", 10_u64),
        ("a.mp4", 0),
        ("../escape.mp4", 10),
        ("dir/a.mp4", 10),
    ] {
        let err = uploads.begin_upload(name, size).await.unwrap_err();
        assert!(
            matches!(err, ServerError::InvalidRequest(_)),
            "expected InvalidRequest for {:?}",
            (name, size)
        );
    }
    assert_eq!(uploads.session_count(), 0);
}

#[tokio::test]
async fn test_declared_size_bound_enforced() {
    let dir = TempDir::new().unwrap();
    let config = ServerConfig {
        upload_dir: dir.path().to_path_buf(),
        max_upload_bytes: 16,
        ..ServerConfig::default()
    };
    let uploads = UploadManager::new(&config);

    let err = uploads.begin_upload("big.mp4", 17).await.unwrap_err();
    assert!(matches!(err, ServerError::InvalidRequest(_)));
    assert!(uploads.begin_upload("ok.mp4", 16).await.is_ok());
}
