//! Per-format page decoders

use crate::error::PageDecodeError;
use std::io::Read;

pub mod paged;
pub mod rar;
pub mod zip;

pub use self::paged::PagedHandle;
pub use self::rar::RarHandle;
pub use self::zip::{ZipDecodeStrategy, ZipHandle};

/// Largest archive entry read into memory as a page
pub const MAX_ENTRY_BYTES: u64 = 256 << 20;

/// Read one archive entry, refusing anything over [`MAX_ENTRY_BYTES`]
///
/// `declared` is the size recorded in the archive headers and is checked
/// before any allocation. The read itself is bounded as well.
pub(crate) fn read_bounded(name: &str, declared: u64, reader: impl Read) -> Result<Vec<u8>, PageDecodeError> {
    read_limited(name, declared, reader, MAX_ENTRY_BYTES)
}

fn read_limited(name: &str, declared: u64, reader: impl Read, limit: u64) -> Result<Vec<u8>, PageDecodeError> {
    if declared > limit {
        return Err(PageDecodeError::TooLarge { name: name.to_owned(), size: declared });
    }

    let mut bytes = Vec::with_capacity(declared as usize);
    reader.take(limit + 1).read_to_end(&mut bytes)?;
    if bytes.len() as u64 > limit {
        return Err(PageDecodeError::TooLarge { name: name.to_owned(), size: bytes.len() as u64 });
    }
    Ok(bytes)
}
