use crate::files::disk::DiskFiles;
use crate::store::json::JsonRecordStore;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// A throwaway uploads tree on disk with a JSON record store next to it.
pub struct TestEnv {
    // Held so the directory outlives the test.
    pub _temp_dir: TempDir,
    pub files: DiskFiles,
    pub store: JsonRecordStore,
    pub uploads: PathBuf,
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl TestEnv {
    pub fn new() -> Self {
        let temp_dir = tempfile::tempdir().expect("failed to create temp dir");
        let uploads = temp_dir.path().join("uploads");
        fs::create_dir_all(&uploads).expect("failed to create uploads dir");
        let store = JsonRecordStore::new(temp_dir.path().join("records.json"));
        Self {
            files: DiskFiles::new(&uploads),
            store,
            uploads,
            _temp_dir: temp_dir,
        }
    }

    /// Write `bytes` at `relative` under the uploads root, creating directories.
    pub fn write(&self, relative: &str, bytes: &[u8]) -> PathBuf {
        let path = self.uploads.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("failed to create parent dir");
        }
        fs::write(&path, bytes).expect("failed to write file");
        path
    }

    pub fn lock_file(&self) -> PathBuf {
        self.uploads.join(crate::reconcile::LOCK_FILE)
    }
}
