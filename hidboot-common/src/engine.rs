// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Upload state machine.
//!
//! A session goes through:
//! - Negotiating: read the device info report to learn the flash geometry
//! - Transferring: stream the planned range as 128-byte data block reports
//! - Finalizing: optionally send the mode switch report
//!
//! An image with no data skips straight to Finalizing. Any fatal error moves
//! the engine to `Failed`; `Done` and `Failed` accept no further operations.

use std::ops::Range;

use thiserror::Error;

use crate::device::{DeviceError, DeviceId, HidDevice};
use crate::geometry::{plan, CapacityError, DeviceGeometry, UploadRange};
use crate::image::FlashImage;
use crate::protocol::{Report, BLOCK_SIZE, DEVICE_INFO_ID, DEVICE_INFO_LEN, REPORT_BUFFER_LEN};

/// Engine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Negotiating,
    /// `cursor` is the address of the next block to send.
    Transferring { cursor: usize },
    Finalizing,
    Done,
    Failed,
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Error opening {id}: {source}")]
    Open { id: DeviceId, source: DeviceError },

    #[error("Error reading page size: {0}")]
    GeometryRead(#[source] DeviceError),

    #[error("Not enough bytes in device info report ({received} instead of {expected})")]
    ShortDeviceInfo { received: usize, expected: usize },

    #[error(transparent)]
    Capacity(#[from] CapacityError),

    #[error("Error uploading data block at 0x{address:05x}: {source}")]
    BlockWrite { address: usize, source: DeviceError },

    #[error("upload engine is {0:?}, no further operations allowed")]
    InvalidState(EngineState),
}

/// What happened to the mode switch request.
///
/// The device may reset before acknowledging the report, so a failed write
/// is recorded here rather than raised.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ModeSwitch {
    #[default]
    NotRequested,
    Sent,
    Unconfirmed(DeviceError),
}

/// Hooks for progress reporting. All methods default to no-ops.
pub trait UploadObserver {
    /// Called once the geometry is known and the range has been planned.
    fn planned(&mut self, _geometry: &DeviceGeometry, _range: &UploadRange) {}

    /// Called after each block write.
    fn block_sent(&mut self, _address: usize, _remaining: usize) {}
}

impl UploadObserver for () {}

/// Outcome of a completed run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UploadSummary {
    pub geometry: Option<DeviceGeometry>,
    pub range: Option<UploadRange>,
    pub blocks_sent: usize,
    pub mode_switch: ModeSwitch,
}

/// Drives one upload over an open device.
pub struct UploadEngine<D> {
    device: D,
    state: EngineState,
}

impl<D: HidDevice> UploadEngine<D> {
    pub fn new(device: D) -> Self {
        Self {
            device,
            state: EngineState::Idle,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    fn fail<T>(&mut self, err: UploadError) -> Result<T, UploadError> {
        self.state = EngineState::Failed;
        Err(err)
    }

    /// Upload the data in `image` (if any) and optionally leave the
    /// bootloader.
    pub fn run(
        &mut self,
        image: Option<&FlashImage>,
        leave_bootloader: bool,
        observer: &mut dyn UploadObserver,
    ) -> Result<UploadSummary, UploadError> {
        let mut summary = UploadSummary::default();

        if let Some(image) = image.filter(|image| !image.is_empty()) {
            let geometry = self.negotiate()?;
            let range = self.plan(image.bounds(), &geometry)?;
            observer.planned(&geometry, &range);

            summary.blocks_sent = self.transfer(image, range, observer)?;
            summary.geometry = Some(geometry);
            summary.range = Some(range);
        }

        summary.mode_switch = self.finish(leave_bootloader)?;
        Ok(summary)
    }

    /// Read the device info report.
    pub fn negotiate(&mut self) -> Result<DeviceGeometry, UploadError> {
        if self.state != EngineState::Idle {
            return Err(UploadError::InvalidState(self.state));
        }
        self.state = EngineState::Negotiating;

        let bytes = match self.device.get_feature_report(DEVICE_INFO_ID, REPORT_BUFFER_LEN) {
            Ok(bytes) => bytes,
            Err(e) => return self.fail(UploadError::GeometryRead(e)),
        };

        match Report::parse_device_info(&bytes) {
            Some(Report::DeviceInfo(geometry)) => {
                log::debug!(
                    "Page size = {} (0x{:x}), device size = {} (0x{:x}); {} bytes remaining",
                    geometry.page_size,
                    geometry.page_size,
                    geometry.flash_size,
                    geometry.flash_size,
                    geometry.usable_size()
                );
                Ok(geometry)
            }
            _ => self.fail(UploadError::ShortDeviceInfo {
                received: bytes.len(),
                expected: DEVICE_INFO_LEN,
            }),
        }
    }

    /// Align `raw` against the negotiated geometry.
    pub fn plan(
        &mut self,
        raw: Range<usize>,
        geometry: &DeviceGeometry,
    ) -> Result<UploadRange, UploadError> {
        if self.state != EngineState::Negotiating {
            return Err(UploadError::InvalidState(self.state));
        }

        match plan(raw, geometry) {
            Ok(range) => {
                log::debug!(
                    "Uploading {} (0x{:x}) bytes starting at {} (0x{:x})",
                    range.len(),
                    range.len(),
                    range.start,
                    range.start
                );
                Ok(range)
            }
            Err(e) => self.fail(e.into()),
        }
    }

    /// Send every block of `range`. Returns the number of blocks written.
    pub fn transfer(
        &mut self,
        image: &FlashImage,
        range: UploadRange,
        observer: &mut dyn UploadObserver,
    ) -> Result<usize, UploadError> {
        if self.state != EngineState::Negotiating {
            return Err(UploadError::InvalidState(self.state));
        }

        let mut sent = 0;
        let mut address = range.start;
        while address < range.end {
            self.state = EngineState::Transferring { cursor: address };

            let report = Report::DataBlock {
                address: address as u32,
                data: image.block(address),
            };
            log::trace!("0x{:05x} ... 0x{:05x}", address, address + BLOCK_SIZE);

            if let Err(source) = self.device.set_feature_report(&report.encode()) {
                return self.fail(UploadError::BlockWrite { address, source });
            }

            sent += 1;
            let next = address + BLOCK_SIZE;
            observer.block_sent(address, range.end.saturating_sub(next));
            address = next;
        }

        self.state = EngineState::Transferring { cursor: address };
        Ok(sent)
    }

    /// Finish the session, sending the mode switch if requested.
    pub fn finish(&mut self, leave_bootloader: bool) -> Result<ModeSwitch, UploadError> {
        match self.state {
            EngineState::Idle | EngineState::Negotiating | EngineState::Transferring { .. } => {}
            state => return Err(UploadError::InvalidState(state)),
        }
        self.state = EngineState::Finalizing;

        let outcome = if leave_bootloader {
            match self.device.set_feature_report(&Report::ModeSwitch.encode()) {
                Ok(()) => ModeSwitch::Sent,
                Err(e) => {
                    log::debug!("Mode switch not acknowledged (device reset?): {}", e);
                    ModeSwitch::Unconfirmed(e)
                }
            }
        } else {
            ModeSwitch::NotRequested
        };

        self.state = EngineState::Done;
        Ok(outcome)
    }
}
