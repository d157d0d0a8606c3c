//! Persistent thumbnail store
//!
//! One JPEG per document under the cache directory, named
//! `thumb_<first 16 hex digits of SHA-256(key)>.jpg`. There is no index file:
//! the directory listing is the index. Writes land in a temp file in the same
//! directory and are renamed into place, so readers never observe a partial
//! thumbnail and concurrent writers of the same key resolve to last-writer-wins.

use crate::CacheError;
use leafview_render::{decode_file, encode_jpeg, RasterImage, DEFAULT_JPEG_QUALITY};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

const FILE_PREFIX: &str = "thumb_";
const FILE_EXTENSION: &str = ".jpg";

/// Default retention window for persisted thumbnails
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Outcome of a retention sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    /// Thumbnail files examined
    pub scanned: usize,
    /// Thumbnail files removed for being older than the retention window
    pub deleted: usize,
    /// Thumbnail files younger than the retention window
    pub retained: usize,
    /// Files in the directory that are not thumbnails
    pub ignored: usize,
    /// Thumbnails that could not be inspected or removed
    pub failed: usize,
    pub bytes_freed: u64,
}

/// Disk tier of the thumbnail cache
#[derive(Debug, Clone)]
pub struct ThumbnailDiskStore {
    dir: PathBuf,
    jpeg_quality: u8,
}

impl ThumbnailDiskStore {
    /// Open (and create if needed) a store rooted at `dir`
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self, CacheError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, jpeg_quality: DEFAULT_JPEG_QUALITY })
    }

    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality.clamp(1, 100);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File name used for `key`
    pub fn file_name_for(key: &str) -> String {
        let digest = Sha256::digest(key.as_bytes());
        format!("{FILE_PREFIX}{}{FILE_EXTENSION}", hex::encode(&digest[..8]))
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(Self::file_name_for(key))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.path_for(key).is_file()
    }

    /// Load a persisted thumbnail
    ///
    /// A missing file is `Ok(None)`; an unreadable or corrupt file is an error.
    pub fn load(&self, key: &str) -> Result<Option<RasterImage>, CacheError> {
        let path = self.path_for(key);
        if !path.is_file() {
            return Ok(None);
        }

        let image = decode_file(&path)?;
        tracing::debug!(path = %path.display(), "thumbnail loaded from disk");
        Ok(Some(image))
    }

    /// Persist a thumbnail as JPEG, replacing any previous file for `key`
    pub fn store(&self, key: &str, image: &RasterImage) -> Result<PathBuf, CacheError> {
        let jpeg = encode_jpeg(image, self.jpeg_quality)?;
        let path = self.path_for(key);

        let mut temp = tempfile::Builder::new()
            .prefix(".thumb_")
            .suffix(".tmp")
            .tempfile_in(&self.dir)?;
        temp.write_all(&jpeg)?;
        temp.flush()?;
        temp.persist(&path).map_err(|err| CacheError::Io(err.error))?;

        tracing::debug!(path = %path.display(), bytes = jpeg.len(), "thumbnail persisted");
        Ok(path)
    }

    pub fn remove(&self, key: &str) -> Result<bool, CacheError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Delete thumbnails whose modification time is older than `max_age`
    ///
    /// Only `thumb_*.jpg` files are considered; anything else in the directory
    /// is left alone. Per-file failures are counted, not propagated.
    pub fn cleanup_older_than(&self, max_age: Duration) -> Result<CleanupReport, CacheError> {
        let now = SystemTime::now();
        let mut report = CleanupReport::default();

        for entry in fs::read_dir(&self.dir)? {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    tracing::warn!(error = %err, "failed to read thumbnail directory entry");
                    report.failed += 1;
                    continue;
                }
            };

            let file_name = entry.file_name();
            let is_thumbnail = file_name
                .to_str()
                .map(|name| name.starts_with(FILE_PREFIX) && name.ends_with(FILE_EXTENSION))
                .unwrap_or(false);
            let metadata = match entry.metadata() {
                Ok(metadata) => metadata,
                Err(err) => {
                    tracing::warn!(path = %entry.path().display(), error = %err, "failed to stat thumbnail");
                    report.failed += 1;
                    continue;
                }
            };

            if !is_thumbnail || !metadata.is_file() {
                report.ignored += 1;
                continue;
            }
            report.scanned += 1;

            let age = metadata
                .modified()
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .unwrap_or(Duration::ZERO);

            if age <= max_age {
                report.retained += 1;
                continue;
            }

            match fs::remove_file(entry.path()) {
                Ok(()) => {
                    report.deleted += 1;
                    report.bytes_freed += metadata.len();
                }
                Err(err) => {
                    tracing::warn!(path = %entry.path().display(), error = %err, "failed to delete stale thumbnail");
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            dir = %self.dir.display(),
            deleted = report.deleted,
            retained = report.retained,
            bytes_freed = report.bytes_freed,
            "thumbnail cleanup finished"
        );
        Ok(report)
    }

    /// Number of thumbnails and their total size on disk
    pub fn usage(&self) -> Result<(usize, u64), CacheError> {
        let mut count = 0;
        let mut bytes = 0;
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.starts_with(FILE_PREFIX) && name.ends_with(FILE_EXTENSION) {
                count += 1;
                bytes += entry.metadata()?.len();
            }
        }
        Ok((count, bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::FileTime;
    use image::{Rgba, RgbaImage};
    use tempfile::TempDir;

    const DAY: u64 = 24 * 60 * 60;

    fn thumb() -> RasterImage {
        RasterImage::new(RgbaImage::from_pixel(40, 30, Rgba([200, 120, 40, 255])))
    }

    fn age_file(path: &Path, days: u64) {
        let then = SystemTime::now() - Duration::from_secs(days * DAY);
        filetime::set_file_mtime(path, FileTime::from_system_time(then)).unwrap();
    }

    #[test]
    fn test_file_name_format() {
        let name = ThumbnailDiskStore::file_name_for("/books/one.cbz");
        assert!(name.starts_with("thumb_"));
        assert!(name.ends_with(".jpg"));
        assert_eq!(name.len(), "thumb_".len() + 16 + ".jpg".len());
        assert!(name["thumb_".len()..name.len() - 4].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_file_name_is_stable_and_distinct() {
        let a = ThumbnailDiskStore::file_name_for("/books/one.cbz");
        let b = ThumbnailDiskStore::file_name_for("/books/two.cbz");
        assert_eq!(a, ThumbnailDiskStore::file_name_for("/books/one.cbz"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_store_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let store = ThumbnailDiskStore::new(temp_dir.path()).unwrap();

        let path = store.store("/books/one.cbz", &thumb()).unwrap();
        assert!(path.is_file());
        assert!(store.contains("/books/one.cbz"));

        let loaded = store.load("/books/one.cbz").unwrap().unwrap();
        assert_eq!((loaded.width(), loaded.height()), (40, 30));
    }

    #[test]
    fn test_load_missing_is_none() {
        let temp_dir = TempDir::new().unwrap();
        let store = ThumbnailDiskStore::new(temp_dir.path()).unwrap();
        assert!(store.load("/books/none.cbz").unwrap().is_none());
    }

    #[test]
    fn test_load_corrupt_file_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let store = ThumbnailDiskStore::new(temp_dir.path()).unwrap();
        fs::write(store.path_for("/books/bad.cbz"), b"not a jpeg").unwrap();

        assert!(store.load("/books/bad.cbz").is_err());
    }

    #[test]
    fn test_store_leaves_no_temp_files() {
        let temp_dir = TempDir::new().unwrap();
        let store = ThumbnailDiskStore::new(temp_dir.path()).unwrap();
        store.store("a", &thumb()).unwrap();
        store.store("a", &thumb()).unwrap();

        let names: Vec<_> = fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec![ThumbnailDiskStore::file_name_for("a")]);
    }

    #[test]
    fn test_remove() {
        let temp_dir = TempDir::new().unwrap();
        let store = ThumbnailDiskStore::new(temp_dir.path()).unwrap();
        store.store("a", &thumb()).unwrap();

        assert!(store.remove("a").unwrap());
        assert!(!store.remove("a").unwrap());
    }

    #[test]
    fn test_cleanup_respects_retention_and_foreign_files() {
        let temp_dir = TempDir::new().unwrap();
        let store = ThumbnailDiskStore::new(temp_dir.path()).unwrap();

        let old = store.store("old", &thumb()).unwrap();
        let fresh = store.store("fresh", &thumb()).unwrap();
        let foreign = temp_dir.path().join("notes.txt");
        fs::write(&foreign, b"keep me").unwrap();
        let foreign_jpg = temp_dir.path().join("cover.jpg");
        fs::write(&foreign_jpg, b"keep me too").unwrap();

        age_file(&old, 31);
        age_file(&fresh, 29);
        age_file(&foreign, 90);
        age_file(&foreign_jpg, 90);

        let report = store.cleanup_older_than(DEFAULT_RETENTION).unwrap();

        assert!(!old.exists());
        assert!(fresh.exists());
        assert!(foreign.exists());
        assert!(foreign_jpg.exists());
        assert_eq!(report.scanned, 2);
        assert_eq!(report.deleted, 1);
        assert_eq!(report.retained, 1);
        assert_eq!(report.ignored, 2);
        assert!(report.bytes_freed > 0);
    }

    #[test]
    fn test_usage() {
        let temp_dir = TempDir::new().unwrap();
        let store = ThumbnailDiskStore::new(temp_dir.path()).unwrap();
        store.store("a", &thumb()).unwrap();
        store.store("b", &thumb()).unwrap();
        fs::write(temp_dir.path().join("other.bin"), b"x").unwrap();

        let (count, bytes) = store.usage().unwrap();
        assert_eq!(count, 2);
        assert!(bytes > 0);
    }
}
