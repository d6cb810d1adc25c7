//! Local upload store for original CSV files
//!
//! Uploaded files are kept verbatim under a data directory, keyed
//! `{project_id}/{timestamp_millis}-{filename}` so re-uploads of the same
//! file never collide.

use chrono::Utc;
use std::fs;
use std::path::PathBuf;

use crate::error::Result;

#[derive(Debug, Clone)]
pub struct UploadStore {
    root: PathBuf,
}

impl UploadStore {
    pub fn new(root: PathBuf) -> Self {
        UploadStore { root }
    }

    /// Store an uploaded file and return its storage key
    pub fn store(&self, project_id: &str, filename: &str, bytes: &[u8]) -> Result<String> {
        let key = format!("{}/{}-{}", project_id, Utc::now().timestamp_millis(), filename);
        let path = self.root.join(&key);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, bytes)?;

        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_writes_file_under_project_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::new(dir.path().to_path_buf());

        let key = store
            .store("22222222-2222-2222-2222-222222222222", "audience.csv", b"Category,Value\n")
            .unwrap();

        assert!(key.starts_with("22222222-2222-2222-2222-222222222222/"));
        assert!(key.ends_with("-audience.csv"));
        let contents = std::fs::read(dir.path().join(&key)).unwrap();
        assert_eq!(contents, b"Category,Value\n");
    }
}
