use std::fs;
use std::path::{Path, PathBuf};
use serde_json::Value;
use crate::{Result, Error};

/// Suffix appended to a record path while its new content is being staged.
pub const TEMP_SUFFIX: &str = "tmp";

/// Encodes a record the way it is stored on disk: pretty-printed JSON
/// followed by a trailing newline.
pub fn encode_record(record: &Value) -> Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec_pretty(record)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Decodes the content of a record file. `path` is only used for error reporting.
pub fn decode_record(path: &Path, bytes: &[u8]) -> Result<Value> {
    serde_json::from_slice(bytes).map_err(|source| Error::CorruptRecord {
        path: path.to_path_buf(),
        source,
    })
}

/// Reads and decodes a single record file.
pub fn load_record(path: &Path) -> Result<Value> {
    let bytes = fs::read(path)?;
    decode_record(path, &bytes)
}

/// Returns the sibling path used to stage a write to `path`.
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(TEMP_SUFFIX);
    PathBuf::from(name)
}

/// Writes `bytes` to the staging path next to `path` and returns it.
///
/// Nothing at `path` changes until [`commit`] is called.
pub fn stage(path: &Path, bytes: &[u8]) -> Result<PathBuf> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = temp_path(path);
    fs::write(&tmp, bytes)?;
    Ok(tmp)
}

/// Atomically replaces `path` with a previously staged file.
pub fn commit(staged: &Path, path: &Path) -> Result<()> {
    fs::rename(staged, path)?;
    Ok(())
}

/// Writes `bytes` to `path` atomically.
///
/// The payload goes to a temporary sibling first and is then renamed over the
/// destination, so a reader sees either the old or the new content, never a
/// truncated file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let staged = stage(path, bytes)?;
    commit(&staged, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use serde_json::json;

    #[test]
    fn test_write_atomic_leaves_no_temp() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("users").join("bob.json");

        write_atomic(&path, &encode_record(&json!({"name": "Bob"})).unwrap()).unwrap();

        assert!(path.exists());
        assert!(!dir.path().join("users").join("bob.json.tmp").exists());
        assert_eq!(load_record(&path).unwrap(), json!({"name": "Bob"}));
    }

    #[test]
    fn test_staged_write_is_invisible_until_commit() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bob.json");
        write_atomic(&path, &encode_record(&json!({"age": 25})).unwrap()).unwrap();

        // Simulate a crash between the temp write and the rename.
        let staged = stage(&path, b"{\"age\": 2").unwrap();
        assert_eq!(load_record(&path).unwrap(), json!({"age": 25}));

        fs::write(&staged, encode_record(&json!({"age": 26})).unwrap()).unwrap();
        commit(&staged, &path).unwrap();
        assert_eq!(load_record(&path).unwrap(), json!({"age": 26}));
    }

    #[test]
    fn test_encoding_is_indented_with_trailing_newline() {
        let bytes = encode_record(&json!({"b": 1, "a": {"c": true}})).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.ends_with("}\n"));
        assert!(text.contains("\n  \"a\": {"));
    }

    #[test]
    fn test_decode_failure_is_corrupt_record() {
        let err = decode_record(Path::new("x.json"), b"{not json").unwrap_err();
        assert!(matches!(err, Error::CorruptRecord { .. }));
    }
}
