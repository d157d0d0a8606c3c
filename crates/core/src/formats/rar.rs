//! CBR / RAR archives
//!
//! The archive is copied to a private temp file when opened and every read
//! goes through that copy, so the original may be moved or replaced while the
//! document is open. The copy lives exactly as long as the handle.

use super::MAX_ENTRY_BYTES;
use crate::error::{DocumentOpenError, PageDecodeError, ResourceReleaseError};
use crate::index::ArchiveIndex;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use unrar::Archive;

const TEMP_PREFIX: &str = "leafview_";
const TEMP_SUFFIX: &str = ".cbr";

/// Open RAR archive backing a page source
pub struct RarHandle {
    temp: Option<NamedTempFile>,
}

impl RarHandle {
    /// Copy `source` into `temp_dir` and list its pages
    ///
    /// On failure the partial copy is removed before returning.
    pub(crate) fn open(source: &Path, temp_dir: &Path) -> Result<(Self, ArchiveIndex), DocumentOpenError> {
        let mut temp = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .suffix(TEMP_SUFFIX)
            .tempfile_in(temp_dir)?;
        let mut original = File::open(source)?;
        io::copy(&mut original, temp.as_file_mut())?;
        temp.as_file_mut().flush()?;

        let listing = Archive::new(temp.path())
            .open_for_listing()
            .map_err(|err| DocumentOpenError::Rar(err.to_string()))?;

        let mut names = Vec::new();
        for header in listing {
            let header = header.map_err(|err| DocumentOpenError::Rar(err.to_string()))?;
            if header.is_file() {
                names.push(entry_name(&header.filename));
            }
        }

        tracing::debug!(
            source = %source.display(),
            copy = %temp.path().display(),
            entries = names.len(),
            "rar archive copied and listed"
        );
        Ok((Self { temp: Some(temp) }, ArchiveIndex::from_names(names)))
    }

    /// Location of the private copy while the handle is open
    pub fn temp_path(&self) -> Option<&Path> {
        self.temp.as_ref().map(|temp| temp.path())
    }

    pub(crate) fn read_entry(&self, name: &str) -> Result<Vec<u8>, PageDecodeError> {
        let temp = self.temp.as_ref().ok_or_else(|| PageDecodeError::Missing(name.to_owned()))?;

        let mut archive = Archive::new(temp.path())
            .open_for_processing()
            .map_err(|err| PageDecodeError::Rar(err.to_string()))?;

        while let Some(header) = archive.read_header().map_err(|err| PageDecodeError::Rar(err.to_string()))? {
            if header.entry().is_file() && entry_name(&header.entry().filename) == name {
                let declared = header.entry().unpacked_size as u64;
                if declared > MAX_ENTRY_BYTES {
                    return Err(PageDecodeError::TooLarge { name: name.to_owned(), size: declared });
                }
                let (bytes, _) = header.read().map_err(|err| PageDecodeError::Rar(err.to_string()))?;
                return Ok(bytes);
            }
            archive = header.skip().map_err(|err| PageDecodeError::Rar(err.to_string()))?;
        }

        Err(PageDecodeError::Missing(name.to_owned()))
    }

    /// Delete the private copy. Safe to call more than once.
    pub(crate) fn release(&mut self) -> Result<(), ResourceReleaseError> {
        match self.temp.take() {
            Some(temp) => temp.close().map_err(ResourceReleaseError::from),
            None => Ok(()),
        }
    }
}

impl Drop for RarHandle {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            tracing::error!(error = %err, "failed to release rar archive copy");
        }
    }
}

fn entry_name(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
