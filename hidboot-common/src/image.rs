// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Flat flash image assembled from hex records.

use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::ops::Range;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::hex::{DigitMode, HexError, HexRecord, HexRecordReader};
use crate::protocol::BLOCK_SIZE;

/// 64 KiB of 16-bit address space plus room for one maximal record.
pub const IMAGE_CAPACITY: usize = 65536 + 256;

/// Value of erased flash; untouched image bytes keep it.
pub const ERASED_BYTE: u8 = 0xFF;

/// A record whose bytes did not sum to zero. Its data was still applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChecksumWarning {
    pub base: usize,
    pub end: usize,
}

impl fmt::Display for ChecksumWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "checksum error between address 0x{:x} and 0x{:x}",
            self.base, self.end
        )
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ImageError {
    #[error("record at 0x{address:04x} with {len} bytes overruns the {capacity}-byte image")]
    Overflow {
        address: usize,
        len: usize,
        capacity: usize,
    },
}

/// Failure to turn a hex file into an image.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("error opening {}: {source}", path.display())]
    Open { path: PathBuf, source: io::Error },

    #[error(transparent)]
    Hex(#[from] HexError),

    #[error(transparent)]
    Image(#[from] ImageError),
}

/// Addressable byte buffer plus the `[start, end)` range written so far.
///
/// Before anything is written the range is the sentinel
/// `[capacity, 0)`, which [`FlashImage::is_empty`] reports as empty.
#[derive(Clone)]
pub struct FlashImage {
    buffer: Vec<u8>,
    start: usize,
    end: usize,
}

impl Default for FlashImage {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FlashImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlashImage")
            .field("capacity", &self.buffer.len())
            .field("start", &self.start)
            .field("end", &self.end)
            .finish()
    }
}

impl FlashImage {
    pub fn new() -> Self {
        Self::with_capacity(IMAGE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: vec![ERASED_BYTE; capacity],
            start: capacity,
            end: 0,
        }
    }

    /// Decode a hex file into a fresh image.
    pub fn load(path: &Path, mode: DigitMode) -> Result<(Self, Vec<ChecksumWarning>), LoadError> {
        let file = File::open(path).map_err(|source| LoadError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        let mut image = Self::new();
        let warnings = image.decode(HexRecordReader::new(BufReader::new(file)).with_mode(mode))?;
        Ok((image, warnings))
    }

    /// Apply every record from `records`, collecting checksum warnings.
    ///
    /// Checksum mismatches are logged and decoding carries on; read errors
    /// and overflows stop it.
    pub fn decode<R: Read>(
        &mut self,
        records: HexRecordReader<R>,
    ) -> Result<Vec<ChecksumWarning>, LoadError> {
        let mut warnings = Vec::new();
        for record in records {
            if let Some(warning) = self.apply(&record?)? {
                log::warn!("{}", warning);
                warnings.push(warning);
            }
        }
        Ok(warnings)
    }

    /// Write one record into the image.
    ///
    /// Only data records are written; other types are ignored.
    pub fn apply(&mut self, record: &HexRecord) -> Result<Option<ChecksumWarning>, ImageError> {
        if !record.is_data() {
            return Ok(None);
        }

        let base = record.address as usize;
        let end = base + record.data.len();
        if end > self.buffer.len() {
            return Err(ImageError::Overflow {
                address: base,
                len: record.data.len(),
                capacity: self.buffer.len(),
            });
        }

        self.buffer[base..end].copy_from_slice(&record.data);
        self.start = self.start.min(base);
        self.end = self.end.max(end);

        if record.checksum_valid() {
            Ok(None)
        } else {
            Ok(Some(ChecksumWarning { base, end }))
        }
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    pub fn start_address(&self) -> usize {
        self.start
    }

    pub fn end_address(&self) -> usize {
        self.end
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Written range, or `0..0` when nothing has been written.
    pub fn bounds(&self) -> Range<usize> {
        if self.is_empty() {
            0..0
        } else {
            self.start..self.end
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Bytes of `range`, with [`ERASED_BYTE`] past the end of the buffer.
    pub fn padded(&self, range: Range<usize>) -> Vec<u8> {
        let mut out = vec![ERASED_BYTE; range.len()];
        let avail = range.end.min(self.buffer.len());
        if range.start < avail {
            out[..avail - range.start].copy_from_slice(&self.buffer[range.start..avail]);
        }
        out
    }

    /// One wire block starting at `address`.
    pub fn block(&self, address: usize) -> [u8; BLOCK_SIZE] {
        let mut block = [ERASED_BYTE; BLOCK_SIZE];
        block.copy_from_slice(&self.padded(address..address + BLOCK_SIZE));
        block
    }
}
