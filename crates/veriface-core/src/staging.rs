//! Ephemeral on-disk staging for image bytes.
//!
//! Analyzers only accept paths, so each request's bytes land in a file that
//! lives exactly as long as the request. Names come from `tempfile`, which
//! creates with `O_EXCL` and a random suffix, so concurrent requests never
//! share a path and no locking is needed.

use std::io::{self, Write};
use std::path::Path;
use tempfile::TempPath;

const STAGING_PREFIX: &str = "veriface-";
const STAGING_SUFFIX: &str = ".jpg";

/// A staged image file. Removed by [`StagedImage::remove`] or, failing that, on drop.
#[derive(Debug)]
pub struct StagedImage {
    path: TempPath,
}

impl StagedImage {
    /// Write `bytes` in full to a fresh file in `dir`.
    ///
    /// On a failed write the partially written file is removed before returning.
    pub fn write(dir: &Path, bytes: &[u8]) -> io::Result<Self> {
        let mut file = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .suffix(STAGING_SUFFIX)
            .tempfile_in(dir)?;
        file.write_all(bytes)?;
        file.as_file().sync_all()?;
        Ok(Self {
            path: file.into_temp_path(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the file, reporting failure instead of swallowing it.
    pub fn remove(self) -> io::Result<()> {
        self.path.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_stores_all_bytes() {
        let dir = TempDir::new().unwrap();
        let staged = StagedImage::write(dir.path(), b"\xff\xd8\xff payload").unwrap();
        assert_eq!(std::fs::read(staged.path()).unwrap(), b"\xff\xd8\xff payload");

        let name = staged.path().file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with(STAGING_PREFIX));
        assert!(name.ends_with(STAGING_SUFFIX));
    }

    #[test]
    fn test_remove_deletes_file() {
        let dir = TempDir::new().unwrap();
        let staged = StagedImage::write(dir.path(), b"abc").unwrap();
        let path = staged.path().to_path_buf();
        staged.remove().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_drop_deletes_file() {
        let dir = TempDir::new().unwrap();
        let path = {
            let staged = StagedImage::write(dir.path(), b"abc").unwrap();
            staged.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_remove_reports_missing_file() {
        let dir = TempDir::new().unwrap();
        let staged = StagedImage::write(dir.path(), b"abc").unwrap();
        std::fs::remove_file(staged.path()).unwrap();
        assert!(staged.remove().is_err());
    }

    #[test]
    fn test_names_are_unique() {
        let dir = TempDir::new().unwrap();
        let staged: Vec<_> = (0..32)
            .map(|_| StagedImage::write(dir.path(), b"x").unwrap())
            .collect();
        let mut paths: Vec<_> = staged.iter().map(|s| s.path().to_path_buf()).collect();
        paths.sort();
        paths.dedup();
        assert_eq!(paths.len(), 32);
    }

    #[test]
    fn test_write_into_missing_dir_fails() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("gone");
        assert!(StagedImage::write(&missing, b"abc").is_err());
    }
}
