//! The client's persisted index: last-known per-file state across runs.
//!
//! Stored as a single rkyv-archived file named `index.db` in the sync
//! directory. The on-disk format is client-local and not part of the
//! protocol. A missing index is an empty one; saving replaces the file
//! atomically via a temp-file rename.

use std::collections::HashMap;
use std::path::Path;

use rkyv::rancor::Error as RkyvError;
use rkyv::{Archive, Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::metadata::{FileInfoMap, FileMetaData, Manifest};

/// Reserved file name of the persisted index inside the sync directory.
pub const INDEX_FILE: &str = "index.db";

/// Scratch name used while rewriting the index.
pub const INDEX_TMP_FILE: &str = "index.db.tmp";

/// One file's last-known state, in wire manifest form
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[rkyv(derive(Debug))]
struct IndexEntry {
    version: i32,
    hashes: Vec<String>,
}

/// The whole index document
#[derive(Archive, Serialize, Deserialize, Debug, Clone, Default)]
#[rkyv(derive(Debug))]
struct IndexDoc {
    files: HashMap<String, IndexEntry>,
}

/// Load the index from `base_dir`, or an empty map if none exists yet.
///
/// # Errors
/// Returns an error if the file exists but cannot be read or decoded.
pub fn load(base_dir: &Path) -> Result<FileInfoMap> {
    let path = base_dir.join(INDEX_FILE);
    if !path.exists() {
        return Ok(FileInfoMap::new());
    }

    let bytes = std::fs::read(&path)?;
    let archived = rkyv::access::<ArchivedIndexDoc, RkyvError>(&bytes)
        .map_err(|e| CoreError::Index(format!("cannot access archived index: {e}")))?;
    let doc: IndexDoc = rkyv::deserialize::<IndexDoc, RkyvError>(archived)
        .map_err(|e| CoreError::Index(format!("cannot deserialize index: {e}")))?;

    let mut map = FileInfoMap::with_capacity(doc.files.len());
    for (filename, entry) in doc.files {
        let manifest = Manifest::from_wire(&entry.hashes)?;
        map.insert(
            filename.clone(),
            FileMetaData {
                filename,
                version: entry.version,
                manifest,
            },
        );
    }
    Ok(map)
}

/// Save the index into `base_dir`, replacing any previous one.
///
/// The new document is written to a scratch file and renamed into place, so
/// a concurrent reader observes either the old index or the new one.
///
/// # Errors
/// Returns an error if serialization or the file write fails.
pub fn save(base_dir: &Path, index: &FileInfoMap) -> Result<()> {
    let mut doc = IndexDoc::default();
    for (filename, meta) in index {
        doc.files.insert(
            filename.clone(),
            IndexEntry {
                version: meta.version,
                hashes: meta.manifest.to_wire(),
            },
        );
    }

    let bytes = rkyv::to_bytes::<RkyvError>(&doc)
        .map_err(|e| CoreError::Index(format!("cannot serialize index: {e}")))?;

    let tmp = base_dir.join(INDEX_TMP_FILE);
    std::fs::write(&tmp, &bytes)?;
    std::fs::rename(&tmp, base_dir.join(INDEX_FILE))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::BlockHash;

    fn meta(name: &str, version: i32, manifest: Manifest) -> FileMetaData {
        FileMetaData {
            filename: name.to_string(),
            version,
            manifest,
        }
    }

    #[test]
    fn test_missing_index_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let map = load(dir.path()).unwrap();
        assert!(map.is_empty());
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();

        let mut index = FileInfoMap::new();
        index.insert(
            "a.txt".to_string(),
            meta(
                "a.txt",
                3,
                Manifest::Live(vec![BlockHash::of(b"one"), BlockHash::of(b"two")]),
            ),
        );
        index.insert("gone.txt".to_string(), meta("gone.txt", 7, Manifest::Deleted));

        save(dir.path(), &index).unwrap();
        let loaded = load(dir.path()).unwrap();

        assert_eq!(loaded, index);
    }

    #[test]
    fn test_save_overwrites_previous_index() {
        let dir = tempfile::tempdir().unwrap();

        let mut first = FileInfoMap::new();
        first.insert(
            "a.txt".to_string(),
            meta("a.txt", 1, Manifest::Live(vec![BlockHash::of(b"v1")])),
        );
        save(dir.path(), &first).unwrap();

        let mut second = FileInfoMap::new();
        second.insert(
            "b.txt".to_string(),
            meta("b.txt", 1, Manifest::Live(vec![BlockHash::of(b"v2")])),
        );
        save(dir.path(), &second).unwrap();

        let loaded = load(dir.path()).unwrap();
        assert_eq!(loaded, second);
        assert!(!loaded.contains_key("a.txt"));
    }

    #[test]
    fn test_no_scratch_file_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        save(dir.path(), &FileInfoMap::new()).unwrap();
        assert!(dir.path().join(INDEX_FILE).exists());
        assert!(!dir.path().join(INDEX_TMP_FILE).exists());
    }

    #[test]
    fn test_corrupt_index_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(INDEX_FILE), b"not an archive").unwrap();
        assert!(load(dir.path()).is_err());
    }
}
