//! CBZ / ZIP archives

use super::read_bounded;
use crate::error::{DocumentOpenError, PageDecodeError};
use crate::index::ArchiveIndex;
use ::zip::read::read_zipfile_from_stream;
use ::zip::result::ZipError;
use ::zip::ZipArchive;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

/// How a page's bytes are located when it is decoded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ZipDecodeStrategy {
    /// Re-open the file and scan local headers up to the entry
    #[default]
    Rescan,
    /// Keep the central directory open and seek straight to the entry
    CentralDirectory,
}

/// Enumerate pages, preferring the central directory
///
/// Archives whose central directory is damaged or missing are walked header
/// by header instead.
pub(crate) fn index_archive(path: &Path) -> Result<ArchiveIndex, DocumentOpenError> {
    let file = File::open(path)?;
    match ZipArchive::new(BufReader::new(file)) {
        Ok(archive) => Ok(ArchiveIndex::from_names(archive.file_names().map(str::to_owned))),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "central directory unreadable, scanning local headers");
            scan_names(path).map(ArchiveIndex::from_names)
        }
    }
}

fn scan_names(path: &Path) -> Result<Vec<String>, DocumentOpenError> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut names = Vec::new();

    loop {
        match read_zipfile_from_stream(&mut reader) {
            Ok(Some(mut file)) => {
                if !file.is_dir() {
                    names.push(file.name().to_owned());
                }
                io::copy(&mut file, &mut io::sink())?;
            }
            Ok(None) => break,
            Err(err) if names.is_empty() => return Err(err.into()),
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, found = names.len(), "local header scan stopped early");
                break;
            }
        }
    }

    Ok(names)
}

/// Open zip archive backing a page source
pub struct ZipHandle {
    path: PathBuf,
    strategy: ZipDecodeStrategy,
    archive: Option<ZipArchive<BufReader<File>>>,
}

impl ZipHandle {
    pub(crate) fn new(path: PathBuf, strategy: ZipDecodeStrategy) -> Self {
        Self { path, strategy, archive: None }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn strategy(&self) -> ZipDecodeStrategy {
        self.strategy
    }

    /// Raw bytes of the entry called `name`
    pub(crate) fn read_entry(&mut self, name: &str) -> Result<Vec<u8>, PageDecodeError> {
        if self.strategy == ZipDecodeStrategy::Rescan {
            match self.scan_for_entry(name) {
                Ok(Some(bytes)) => return Ok(bytes),
                Ok(None) => {
                    tracing::debug!(entry = name, "entry not reached by header scan, using central directory");
                }
                Err(err) => {
                    tracing::debug!(entry = name, error = %err, "header scan failed, using central directory");
                }
            }
        }
        self.read_by_name(name)
    }

    fn scan_for_entry(&self, name: &str) -> Result<Option<Vec<u8>>, PageDecodeError> {
        let mut reader = BufReader::new(File::open(&self.path)?);
        while let Some(mut file) = read_zipfile_from_stream(&mut reader)? {
            if file.name() == name {
                let declared = file.size();
                return read_bounded(name, declared, &mut file).map(Some);
            }
            io::copy(&mut file, &mut io::sink())?;
        }
        Ok(None)
    }

    fn read_by_name(&mut self, name: &str) -> Result<Vec<u8>, PageDecodeError> {
        let archive = match self.archive.take() {
            Some(archive) => archive,
            None => ZipArchive::new(BufReader::new(File::open(&self.path)?))?,
        };
        let archive = self.archive.insert(archive);

        let bytes = match archive.by_name(name) {
            Ok(mut file) => {
                let declared = file.size();
                read_bounded(name, declared, &mut file)?
            }
            Err(ZipError::FileNotFound) => return Err(PageDecodeError::Missing(name.to_owned())),
            Err(err) => return Err(err.into()),
        };

        if self.strategy == ZipDecodeStrategy::Rescan {
            self.archive = None;
        }
        Ok(bytes)
    }
}
