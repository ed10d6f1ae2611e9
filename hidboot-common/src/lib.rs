// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Common types and logic for uploading firmware to HIDBoot-style bootloaders.
//!
//! The crate is split leaf-first:
//! - [`hex`]: streaming Intel-HEX record reader
//! - [`image`]: flat flash image assembled from hex records
//! - [`geometry`]: device flash geometry and upload range planning
//! - [`protocol`]: feature-report layouts exchanged with the bootloader
//! - [`device`]: the HID capability the engine talks through
//! - [`engine`]: negotiation / block transfer / mode switch state machine
//! - [`session`]: scoped device sessions and known device identities

pub mod device;
pub mod engine;
pub mod geometry;
pub mod hex;
pub mod image;
pub mod protocol;
pub mod session;

// Re-export commonly used types
pub use device::{DeviceError, DeviceId, HidBackend, HidDevice};
pub use engine::{EngineState, ModeSwitch, UploadEngine, UploadError, UploadObserver, UploadSummary};
pub use geometry::{plan, CapacityError, DeviceGeometry, UploadRange};
pub use hex::{DigitMode, HexError, HexRecord, HexRecordReader};
pub use image::{ChecksumWarning, FlashImage, ImageError, LoadError};
pub use protocol::{Report, BLOCK_SIZE, DEVICE_INFO_LEN, RESERVED_FLASH};
pub use session::{UploadRequest, HIDBOOT, JOYSTICK, MOUSE};
