//! Loose ref files: one file per name under the git directory.
//!
//! File bodies are exactly `<hex40>\n` or `ref: <name>\n`. Writes are
//! atomic: content goes to a lock file that is fsynced and renamed onto
//! the target.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use grit_hash::ObjectId;
use grit_utils::lockfile::LockFile;
use grit_utils::CancelToken;

use crate::{RefError, RefName, Reference};

/// Read a loose ref file, or `None` when absent.
pub(crate) fn read_loose_ref(
    git_dir: &Path,
    name: &RefName,
) -> Result<Option<Reference>, RefError> {
    let path = loose_ref_path(git_dir, name);
    let contents = match fs::read(&path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(RefError::Io(e)),
    };

    let body = std::str::from_utf8(&contents)
        .map_err(|_| RefError::MalformedRef {
            name: name.to_string(),
            reason: "non-UTF-8 content".into(),
        })?
        .trim_end();

    if let Some(target) = body.strip_prefix("ref: ") {
        let target = RefName::new(target.trim())?;
        Ok(Some(Reference::symbolic(name.clone(), target)?))
    } else {
        let oid = ObjectId::from_hex(body).map_err(|_| RefError::MalformedRef {
            name: name.to_string(),
            reason: format!("expected 40-char hex, got '{body}'"),
        })?;
        Ok(Some(Reference::hash(name.clone(), oid)))
    }
}

/// Write a loose ref file atomically.
pub(crate) fn write_loose_ref(git_dir: &Path, reference: &Reference) -> Result<(), RefError> {
    let path = loose_ref_path(git_dir, reference.name());
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let body = match reference {
        Reference::Hash { target, .. } => format!("{}\n", target.to_hex()),
        Reference::Symbolic { target, .. } => format!("ref: {target}\n"),
    };

    let mut lock = LockFile::acquire(&path)?;
    lock.write_all(body.as_bytes())?;
    lock.commit()?;
    Ok(())
}

/// Delete a loose ref file and clean now-empty parent directories.
pub(crate) fn delete_loose_ref(git_dir: &Path, name: &RefName) -> Result<bool, RefError> {
    let path = loose_ref_path(git_dir, name);
    match fs::remove_file(&path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(RefError::Io(e)),
    }

    let refs_dir = git_dir.join("refs");
    let mut dir = path.parent().map(Path::to_path_buf);
    while let Some(d) = dir {
        if d == refs_dir || d == *git_dir {
            break;
        }
        let empty = d
            .read_dir()
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false);
        if !empty {
            break;
        }
        let _ = fs::remove_dir(&d);
        dir = d.parent().map(Path::to_path_buf);
    }
    Ok(true)
}

/// Collect all loose refs under `refs/`, plus `HEAD` when present.
///
/// The token is checked between directory entries.
pub(crate) fn enumerate_loose_refs(
    git_dir: &Path,
    cancel: &CancelToken,
) -> Result<Vec<RefName>, RefError> {
    let mut names = Vec::new();

    if git_dir.join("HEAD").is_file() {
        names.push(RefName::new("HEAD")?);
    }

    let refs_dir = git_dir.join("refs");
    if refs_dir.is_dir() {
        collect_recursive(git_dir, &refs_dir, cancel, &mut names)?;
    }
    Ok(names)
}

fn collect_recursive(
    git_dir: &Path,
    dir: &Path,
    cancel: &CancelToken,
    names: &mut Vec<RefName>,
) -> Result<(), RefError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(RefError::Io(e)),
    };

    for entry in entries {
        if cancel.is_canceled() {
            return Err(RefError::Canceled);
        }
        let entry = entry?;
        let path = entry.path();

        if path.is_dir() {
            collect_recursive(git_dir, &path, cancel, names)?;
            continue;
        }

        let rel = path
            .strip_prefix(git_dir)
            .expect("entry under git_dir");
        let Some(name_str) = rel.to_str() else {
            continue;
        };
        if name_str.ends_with(".lock") {
            continue;
        }
        if let Ok(name) = RefName::new(name_str) {
            names.push(name);
        }
    }
    Ok(())
}

pub(crate) fn loose_ref_path(git_dir: &Path, name: &RefName) -> PathBuf {
    git_dir.join(name.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oid() -> ObjectId {
        ObjectId::from_hex("da39a3ee5e6b4b0d3255bfef95601890afd80709").unwrap()
    }

    #[test]
    fn write_then_read_direct_ref() {
        let dir = tempfile::tempdir().unwrap();
        let name = RefName::new("refs/heads/master").unwrap();
        write_loose_ref(dir.path(), &Reference::hash(name.clone(), oid())).unwrap();

        let read = read_loose_ref(dir.path(), &name).unwrap().unwrap();
        assert_eq!(read.target_hash(), Some(oid()));

        // On-disk body is exactly hex + newline.
        let body = fs::read(dir.path().join("refs/heads/master")).unwrap();
        assert_eq!(body, b"da39a3ee5e6b4b0d3255bfef95601890afd80709\n");
    }

    #[test]
    fn write_then_read_symbolic_ref() {
        let dir = tempfile::tempdir().unwrap();
        let head = RefName::new("HEAD").unwrap();
        let master = RefName::new("refs/heads/master").unwrap();
        let reference = Reference::symbolic(head.clone(), master.clone()).unwrap();
        write_loose_ref(dir.path(), &reference).unwrap();

        let read = read_loose_ref(dir.path(), &head).unwrap().unwrap();
        assert_eq!(read.symbolic_target(), Some(&master));

        let body = fs::read(dir.path().join("HEAD")).unwrap();
        assert_eq!(body, b"ref: refs/heads/master\n");
    }

    #[test]
    fn missing_ref_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let name = RefName::new("refs/heads/nope").unwrap();
        assert!(read_loose_ref(dir.path(), &name).unwrap().is_none());
    }

    #[test]
    fn malformed_body_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("refs/heads")).unwrap();
        fs::write(dir.path().join("refs/heads/bad"), b"not a hash\n").unwrap();
        let name = RefName::new("refs/heads/bad").unwrap();
        assert!(matches!(
            read_loose_ref(dir.path(), &name),
            Err(RefError::MalformedRef { .. })
        ));
    }

    #[test]
    fn delete_prunes_empty_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let name = RefName::new("refs/heads/topic/deep").unwrap();
        write_loose_ref(dir.path(), &Reference::hash(name.clone(), oid())).unwrap();

        assert!(delete_loose_ref(dir.path(), &name).unwrap());
        assert!(!dir.path().join("refs/heads/topic").exists());
        assert!(dir.path().join("refs").exists());
        // Deleting again reports absence.
        assert!(!delete_loose_ref(dir.path(), &name).unwrap());
    }

    #[test]
    fn enumerate_finds_refs_and_head() {
        let dir = tempfile::tempdir().unwrap();
        let head = RefName::new("HEAD").unwrap();
        let master = RefName::new("refs/heads/master").unwrap();
        let tag = RefName::new("refs/tags/v1").unwrap();

        write_loose_ref(
            dir.path(),
            &Reference::symbolic(head.clone(), master.clone()).unwrap(),
        )
        .unwrap();
        write_loose_ref(dir.path(), &Reference::hash(master.clone(), oid())).unwrap();
        write_loose_ref(dir.path(), &Reference::hash(tag.clone(), oid())).unwrap();

        let mut names = enumerate_loose_refs(dir.path(), &CancelToken::new()).unwrap();
        names.sort();
        assert_eq!(names, {
            let mut v = vec![head, master, tag];
            v.sort();
            v
        });
    }
}
