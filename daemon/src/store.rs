use crate::error::{Result, SchedError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::Path;

/// Reads a JSON array file. A missing file is an empty collection.
pub fn load_array<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(SchedError::persistence("read", path, e)),
    };
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&content).map_err(|source| SchedError::Corrupt {
        path: path.to_path_buf(),
        source,
    })
}

/// Overwrites `path` with the pretty-printed value. The data goes to a sibling
/// temp file first and is renamed into place, so a crash mid-write leaves the
/// previous contents intact.
pub fn save_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| SchedError::persistence("create", parent, e))?;
    }
    let json = serde_json::to_string_pretty(value).map_err(|source| SchedError::Corrupt {
        path: path.to_path_buf(),
        source,
    })?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).map_err(|e| SchedError::persistence("write", &tmp, e))?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(SchedError::persistence("replace", path, e));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_and_empty_files_load_as_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("jobs.json");
        assert!(load_array::<u32>(&path).unwrap().is_empty());
        fs::write(&path, "  \n").unwrap();
        assert!(load_array::<u32>(&path).unwrap().is_empty());
    }

    #[test]
    fn test_save_creates_parent_and_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("history.json");
        save_json(&path, &vec![1u32, 2, 3]).unwrap();
        assert_eq!(load_array::<u32>(&path).unwrap(), vec![1, 2, 3]);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_failed_replace_removes_temp_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("jobs.json");
        fs::create_dir(&path).unwrap();
        fs::write(path.join("occupied"), "x").unwrap();

        let err = save_json(&path, &vec![1u32]).unwrap_err();
        assert!(matches!(err, SchedError::Persistence { action: "replace", .. }));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_corrupt_file_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("jobs.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(load_array::<u32>(&path), Err(SchedError::Corrupt { .. })));
    }
}
