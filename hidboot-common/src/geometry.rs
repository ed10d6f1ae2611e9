// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Device flash geometry and upload range planning.

use std::ops::Range;

use thiserror::Error;

use crate::protocol::{BLOCK_SIZE, RESERVED_FLASH};

/// Flash layout reported by the bootloader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceGeometry {
    pub page_size: u32,
    pub flash_size: u32,
}

impl DeviceGeometry {
    pub fn new(page_size: u32, flash_size: u32) -> Self {
        Self {
            page_size,
            flash_size,
        }
    }

    /// Pages smaller than one wire block are handled as one block.
    pub fn alignment_mask(&self) -> usize {
        if (self.page_size as usize) < BLOCK_SIZE {
            BLOCK_SIZE - 1
        } else {
            self.page_size as usize - 1
        }
    }

    /// Bytes available to the application below the reserved area.
    pub fn usable_size(&self) -> usize {
        self.flash_size.saturating_sub(RESERVED_FLASH) as usize
    }
}

/// Page-aligned range handed to the upload engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadRange {
    pub start: usize,
    pub end: usize,
}

impl UploadRange {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Number of wire blocks covering the range.
    pub fn block_count(&self) -> usize {
        self.len() / BLOCK_SIZE
    }
}

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("data ({end} bytes) exceeds remaining flash size ({usable} bytes)")]
pub struct CapacityError {
    pub end: usize,
    pub usable: usize,
}

/// Align `raw` to the device page size.
///
/// The start is rounded down and the end rounded up. Data reaching into the
/// reserved area at the top of flash is rejected.
pub fn plan(raw: Range<usize>, geometry: &DeviceGeometry) -> Result<UploadRange, CapacityError> {
    let usable = geometry.usable_size();
    if raw.end > usable {
        return Err(CapacityError {
            end: raw.end,
            usable,
        });
    }

    let mask = geometry.alignment_mask();
    Ok(UploadRange {
        start: raw.start & !mask,
        end: (raw.end + mask) & !mask,
    })
}
