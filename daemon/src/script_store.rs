use crate::error::{Result, SchedError};
use common::ScriptType;
use std::fs;
use std::path::{Path, PathBuf};

/// Text returned by [`ScriptStore::read`] when a script cannot be read.
pub const UNREADABLE_SCRIPT: &str = "Error reading script content.";

/// Script sources on disk, one file per script named `<uuid>.<ext>`.
#[derive(Debug, Clone)]
pub struct ScriptStore {
    dir: PathBuf,
}

impl ScriptStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn create(&self, content: &str, script_type: &ScriptType) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir).map_err(|e| SchedError::persistence("create", &self.dir, e))?;

        let path = self
            .dir
            .join(format!("{}.{}", uuid::Uuid::new_v4(), script_type.extension()));
        fs::write(&path, content).map_err(|e| SchedError::persistence("write", &path, e))?;

        #[cfg(unix)]
        if script_type.is_executable() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755))
                .map_err(|e| SchedError::persistence("chmod", &path, e))?;
        }

        log::debug!("Wrote script {:?}", path);
        Ok(path)
    }

    pub fn read(&self, path: &Path) -> String {
        match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                log::warn!("Failed to read script {:?}: {}", path, e);
                UNREADABLE_SCRIPT.to_string()
            }
        }
    }

    /// Best effort: a missing file or a failed removal is logged and ignored.
    pub fn delete(&self, path: &Path) {
        match fs::remove_file(path) {
            Ok(()) => log::debug!("Removed script {:?}", path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("Failed to remove script {:?}: {}", path, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_create_names_file_by_extension() {
        let dir = TempDir::new().unwrap();
        let store = ScriptStore::new(dir.path().join("scripts"));
        let path = store.create("print('hi')", &ScriptType::Python).unwrap();
        assert_eq!(path.extension().unwrap(), "py");
        assert_eq!(path.parent().unwrap(), store.dir());
        assert_eq!(store.read(&path), "print('hi')");
    }

    #[cfg(unix)]
    #[test]
    fn test_executable_bit_follows_script_type() {
        use std::os::unix::fs::PermissionsExt;
        let dir = TempDir::new().unwrap();
        let store = ScriptStore::new(dir.path());
        let sh = store.create("echo hi", &ScriptType::Shell).unwrap();
        let sql = store.create("select 1;", &ScriptType::Sql).unwrap();
        assert_eq!(fs::metadata(&sh).unwrap().permissions().mode() & 0o777, 0o755);
        assert_eq!(fs::metadata(&sql).unwrap().permissions().mode() & 0o111, 0);
    }

    #[test]
    fn test_read_and_delete_tolerate_missing_files() {
        let dir = TempDir::new().unwrap();
        let store = ScriptStore::new(dir.path());
        let missing = dir.path().join("gone.sh");
        assert_eq!(store.read(&missing), UNREADABLE_SCRIPT);
        store.delete(&missing);
    }
}
