//! End-to-end fetch against a real `git-upload-pack`.
//!
//! These tests build a fixture repository with the git CLI, then drive the
//! full client path: connect, advertisement, want/have negotiation, pack
//! stream hand-off, and finally decoding the pack into storage. They are
//! skipped when git is not installed.

use std::path::Path;
use std::process::Command;

use grit_hash::ObjectId;
use grit_odb::{unpack_into, MemoryStorage, ObjectStore};
use grit_protocol::{ProtocolError, UploadPackSession, UploadRequest};
use grit_transport::Endpoint;
use grit_utils::CancelToken;

fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false)
}

fn git(dir: &Path, args: &[&str]) {
    let out = Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("GIT_AUTHOR_NAME", "Fixture")
        .env("GIT_AUTHOR_EMAIL", "fixture@example.com")
        .env("GIT_COMMITTER_NAME", "Fixture")
        .env("GIT_COMMITTER_EMAIL", "fixture@example.com")
        .output()
        .expect("run git");
    assert!(
        out.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&out.stderr)
    );
}

/// A bare fixture repository with two commits; returns its path and the
/// two commit hashes (first, head).
fn build_fixture(root: &Path) -> (std::path::PathBuf, ObjectId, ObjectId) {
    let work = root.join("work");
    std::fs::create_dir_all(&work).unwrap();
    git(&work, &["init", "-q", "-b", "master"]);

    std::fs::write(work.join("alpha.txt"), b"alpha\n").unwrap();
    git(&work, &["add", "alpha.txt"]);
    git(&work, &["commit", "-q", "-m", "first"]);
    let first = rev_parse(&work, "HEAD");

    std::fs::write(work.join("beta.txt"), b"beta\n").unwrap();
    git(&work, &["add", "beta.txt"]);
    git(&work, &["commit", "-q", "-m", "second"]);
    let head = rev_parse(&work, "HEAD");

    let bare = root.join("fixture.git");
    git(
        root,
        &[
            "clone",
            "-q",
            "--bare",
            work.to_str().unwrap(),
            bare.to_str().unwrap(),
        ],
    );
    (bare, first, head)
}

fn rev_parse(dir: &Path, rev: &str) -> ObjectId {
    let out = Command::new("git")
        .args(["rev-parse", rev])
        .current_dir(dir)
        .output()
        .expect("run git rev-parse");
    ObjectId::from_hex(String::from_utf8_lossy(&out.stdout).trim()).unwrap()
}

/// Objects in the fixture: per commit a commit + tree + blob, minus
/// nothing shared. Commit 2's tree reuses commit 1's blob, so:
/// 2 commits + 2 trees + 2 blobs = 6.
const FULL_OBJECT_COUNT: usize = 6;

#[test]
fn fetch_full_history_decodes_into_storage() {
    if !git_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let (bare, _first, head) = build_fixture(dir.path());

    let endpoint = Endpoint::parse(bare.to_str().unwrap()).unwrap();
    let mut session = UploadPackSession::new(endpoint);
    session.connect().unwrap();

    let adv = session.advertised_references().unwrap();
    assert_eq!(adv.reference("HEAD"), Some(head));
    assert!(adv.capabilities.supports("agent"));

    let request = UploadRequest::new([head]);
    let reader = session.fetch(&request, &CancelToken::new()).unwrap();

    let storage = MemoryStorage::new();
    let summary = unpack_into(&storage, reader, &CancelToken::new()).unwrap();
    assert_eq!(summary.object_count, FULL_OBJECT_COUNT);
    assert_eq!(storage.len(), FULL_OBJECT_COUNT);
    assert!(storage.exists(&head));
}

#[test]
fn haves_shrink_the_pack() {
    if !git_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let (bare, first, head) = build_fixture(dir.path());

    let endpoint = Endpoint::parse(bare.to_str().unwrap()).unwrap();
    let mut session = UploadPackSession::new(endpoint);
    session.connect().unwrap();
    session.advertised_references().unwrap();

    let mut request = UploadRequest::new([head]);
    request.haves = vec![first];
    let reader = session.fetch(&request, &CancelToken::new()).unwrap();

    let storage = MemoryStorage::new();
    let summary = unpack_into(&storage, reader, &CancelToken::new()).unwrap();
    // Only the second commit, its tree, and its new blob are missing.
    assert!(summary.object_count < FULL_OBJECT_COUNT);
    assert!(storage.exists(&head));
    assert!(!storage.exists(&first));
}

#[test]
fn fetched_commits_decode_through_the_object_model() {
    if !git_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let (bare, first, head) = build_fixture(dir.path());

    let endpoint = Endpoint::parse(bare.to_str().unwrap()).unwrap();
    let mut session = UploadPackSession::new(endpoint);
    session.connect().unwrap();
    session.advertised_references().unwrap();

    let reader = session
        .fetch(&UploadRequest::new([head]), &CancelToken::new())
        .unwrap();
    let storage = MemoryStorage::new();
    unpack_into(&storage, reader, &CancelToken::new()).unwrap();

    let encoded = storage
        .get(Some(grit_object::ObjectType::Commit), &head)
        .unwrap();
    match encoded.decode().unwrap() {
        grit_object::Object::Commit(commit) => {
            assert_eq!(commit.parents, vec![first]);
            assert_eq!(commit.summary(), "second");
            // Round-trip law: re-encoding reproduces the fetched hash.
            assert_eq!(encoded.hash().unwrap(), head);
        }
        other => panic!("expected commit, got {other:?}"),
    }
}

#[test]
fn missing_repository_maps_to_repository_not_found() {
    if !git_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let endpoint =
        Endpoint::parse(dir.path().join("no-such.git").to_str().unwrap()).unwrap();

    let mut session = UploadPackSession::new(endpoint);
    session.connect().unwrap();
    let err = session.advertised_references().unwrap_err();
    assert!(
        matches!(err, ProtocolError::RepositoryNotFound),
        "unexpected error: {err:?}"
    );
    assert_eq!(err.stable_tag(), Some("repository_not_found"));
}
