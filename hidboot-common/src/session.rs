// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Device sessions built on a [`HidBackend`].
//!
//! Each session opens its device once and drops it before returning, so the
//! handle is released on success and on every error path.

use std::time::Duration;

use crate::device::{DeviceError, DeviceId, HidBackend, HidDevice};
use crate::engine::{UploadEngine, UploadError, UploadObserver, UploadSummary};
use crate::image::FlashImage;
use crate::protocol::Report;

// --- Known device identities ---

pub const HIDBOOT_VID: u16 = 0x16c0;
pub const HIDBOOT_PID: u16 = 0x05df;
pub const JOYSTICK_VID: u16 = 0x0810;
pub const JOYSTICK_PID: u16 = 0xe501;
pub const MOUSE_VID: u16 = 0x16c0;
pub const MOUSE_PID: u16 = 0x27da;

pub const HIDBOOT: (u16, u16) = (HIDBOOT_VID, HIDBOOT_PID);
pub const JOYSTICK: (u16, u16) = (JOYSTICK_VID, JOYSTICK_PID);
pub const MOUSE: (u16, u16) = (MOUSE_VID, MOUSE_PID);

/// Default open timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// Bootloader as it enumerates on the bus.
pub fn hidboot() -> DeviceId {
    DeviceId::new(HIDBOOT_VID, HIDBOOT_PID)
        .vendor_name("obdev.at")
        .product_name("HIDBoot")
}

/// Joystick application firmware.
pub fn joystick() -> DeviceId {
    DeviceId::new(JOYSTICK_VID, JOYSTICK_PID).vendor_name("retronicdesign.com")
}

/// Mouse application firmware.
pub fn mouse() -> DeviceId {
    DeviceId::new(MOUSE_VID, MOUSE_PID).vendor_name("retronicdesign.com")
}

/// Parameters of one upload session.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub device: DeviceId,
    pub timeout: Duration,
    pub leave_bootloader: bool,
}

impl Default for UploadRequest {
    fn default() -> Self {
        Self {
            device: hidboot(),
            timeout: DEFAULT_TIMEOUT,
            leave_bootloader: false,
        }
    }
}

/// Open the bootloader, upload `image` and optionally leave the bootloader.
pub fn upload<B: HidBackend>(
    backend: &B,
    image: Option<&FlashImage>,
    request: &UploadRequest,
    observer: &mut dyn UploadObserver,
) -> Result<UploadSummary, UploadError> {
    let device = backend
        .open(&request.device, request.timeout)
        .map_err(|source| UploadError::Open {
            id: request.device.clone(),
            source,
        })?;

    let mut engine = UploadEngine::new(device);
    engine.run(image, request.leave_bootloader, observer)
}

/// Which application identity was asked to enter the bootloader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Switched {
    Joystick,
    Mouse,
}

/// Ask running application firmware to reboot into the bootloader.
///
/// `primary` is tried first, then `fallback`. The request write is not
/// checked since the device resets while handling it.
pub fn enter_bootloader<B: HidBackend>(
    backend: &B,
    primary: &DeviceId,
    fallback: &DeviceId,
    timeout: Duration,
) -> Result<Switched, DeviceError> {
    let (mut device, switched) = match backend.open(primary, timeout) {
        Ok(device) => (device, Switched::Joystick),
        Err(e) => {
            log::debug!("{} not available ({}), trying {}", primary, e, fallback);
            (backend.open(fallback, timeout)?, Switched::Mouse)
        }
    };

    if let Err(e) = device.set_feature_report(&Report::EnterBootloader.encode()) {
        log::debug!("Bootloader request not acknowledged (device reset?): {}", e);
    }
    Ok(switched)
}

/// Count attached devices across the given identities.
pub fn count_known_devices<B: HidBackend>(
    backend: &B,
    ids: &[(u16, u16)],
) -> Result<usize, DeviceError> {
    ids.iter().try_fold(0, |total, &(vid, pid)| {
        Ok(total + backend.count_devices(vid, pid)?)
    })
}
