//! Memory-mapped views over recorded streams
//!
//! Recorded input and reference files are flat arrays of fixed-size
//! records. Mapping them gives the replay loop zero-copy access: the
//! kernel pages data in behind the sequential scan and nothing is
//! deserialized.

use crate::data::constants::{INPUT_RECORD_SIZE, OUTPUT_RECORD_SIZE};
use crate::data::wire::{InputRecord, OutputRecord};
use memmap2::Mmap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Errors opening or interpreting a recorded stream.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to map {path}: {source}")]
    Map {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{path}: {len} bytes is not a multiple of the {record_size}-byte record size")]
    Truncated {
        path: PathBuf,
        len: usize,
        record_size: usize,
    },

    /// A zero-length file cannot be memory mapped.
    #[error("{path}: file holds no records")]
    Empty { path: PathBuf },
}

fn map_file(path: &Path, record_size: usize) -> Result<(Mmap, usize), FeedError> {
    let file = File::open(path).map_err(|source| FeedError::Open {
        path: path.to_owned(),
        source,
    })?;
    let len = file
        .metadata()
        .map_err(|source| FeedError::Open {
            path: path.to_owned(),
            source,
        })?
        .len() as usize;
    if len == 0 {
        return Err(FeedError::Empty {
            path: path.to_owned(),
        });
    }
    if len % record_size != 0 {
        return Err(FeedError::Truncated {
            path: path.to_owned(),
            len,
            record_size,
        });
    }

    // Read-only mapping of an immutable recording.
    let map = unsafe { Mmap::map(&file) }.map_err(|source| FeedError::Map {
        path: path.to_owned(),
        source,
    })?;
    Ok((map, len / record_size))
}

/// Recorded exchange input stream (`input.bin`).
#[derive(Debug)]
pub struct InputFeed {
    map: Mmap,
    count: usize,
}

impl InputFeed {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, FeedError> {
        let (map, count) = map_file(path.as_ref(), INPUT_RECORD_SIZE)?;
        Ok(Self { map, count })
    }

    /// Typed view over the whole recording.
    ///
    /// Page-aligned mapping satisfies `InputRecord`'s alignment.
    #[inline]
    pub fn records(&self) -> &[InputRecord] {
        unsafe {
            std::slice::from_raw_parts(self.map.as_ptr() as *const InputRecord, self.count)
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Recorded reference output stream (`reference.bin`).
pub struct ReferenceFeed {
    map: Mmap,
    count: usize,
}

impl ReferenceFeed {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, FeedError> {
        let (map, count) = map_file(path.as_ref(), OUTPUT_RECORD_SIZE)?;
        Ok(Self { map, count })
    }

    /// Typed view over the recording. `OutputRecord` is packed (align 1),
    /// so any mapping base is acceptable.
    #[inline]
    pub fn records(&self) -> &[OutputRecord] {
        unsafe {
            std::slice::from_raw_parts(self.map.as_ptr() as *const OutputRecord, self.count)
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Write a recorded input stream, for fixture generation and tests.
pub fn write_input_records(
    path: impl AsRef<Path>,
    records: &[InputRecord],
) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    for rec in records {
        file.write_all(rec.as_bytes())?;
    }
    file.flush()
}
