use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use uuid::Uuid;

// Last path component only, restricted character set. The upload's claimed
// filename is untrusted and must never influence the directory we write to.
pub fn sanitize_filename(filename: &str) -> String {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    base.chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        .collect()
}

// Scoped temporary copy of an upload. The UUID prefix keeps concurrent
// requests for identically named files from colliding; the file is removed
// when the guard drops, on success and failure paths alike.
pub struct TempUpload {
    path: PathBuf,
}

impl TempUpload {
    pub fn write(dir: &Path, original_name: &str, bytes: &[u8]) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        let unique_name = format!("{}_{}", Uuid::new_v4(), sanitize_filename(original_name));
        let path = dir.join(unique_name);
        fs::write(&path, bytes)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempUpload {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            log::warn!(
                "Failed to remove temporary upload {}: {}",
                self.path.display(),
                e
            );
        }
    }
}
