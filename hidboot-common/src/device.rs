// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! HID device capability consumed by the upload engine.
//!
//! The engine never talks to USB directly. A backend opens devices by
//! identity and hands out [`HidDevice`] handles that only know how to read
//! and write feature reports. Dropping a handle closes the device.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Transport-level failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("The specified device was not found")]
    NotFound,

    #[error("Access to device denied")]
    Access,

    #[error("The device is used by another application")]
    Busy,

    #[error("Communication error with device: {0}")]
    Io(String),
}

/// Which device to open.
///
/// A `None` string matches any manufacturer or product name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceId {
    pub vendor_id: u16,
    pub vendor_name: Option<String>,
    pub product_id: u16,
    pub product_name: Option<String>,
}

impl DeviceId {
    pub fn new(vendor_id: u16, product_id: u16) -> Self {
        Self {
            vendor_id,
            vendor_name: None,
            product_id,
            product_name: None,
        }
    }

    pub fn vendor_name(mut self, name: impl Into<String>) -> Self {
        self.vendor_name = Some(name.into());
        self
    }

    pub fn product_name(mut self, name: impl Into<String>) -> Self {
        self.product_name = Some(name.into());
        self
    }

    /// Replace the numeric ids, keeping the name filters.
    ///
    /// A zero in either position keeps both ids unchanged.
    pub fn with_ids(mut self, vendor_id: u16, product_id: u16) -> Self {
        if vendor_id != 0 && product_id != 0 {
            self.vendor_id = vendor_id;
            self.product_id = product_id;
        }
        self
    }

    /// Whether a device with these descriptors matches.
    pub fn matches(
        &self,
        vendor_id: u16,
        product_id: u16,
        manufacturer: Option<&str>,
        product: Option<&str>,
    ) -> bool {
        fn name_ok(want: &Option<String>, have: Option<&str>) -> bool {
            match want {
                Some(want) => have == Some(want.as_str()),
                None => true,
            }
        }

        self.vendor_id == vendor_id
            && self.product_id == product_id
            && name_ok(&self.vendor_name, manufacturer)
            && name_ok(&self.product_name, product)
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}:{:04x}", self.vendor_id, self.product_id)?;
        if let Some(name) = &self.product_name {
            write!(f, " ({})", name)?;
        }
        Ok(())
    }
}

/// An open HID device.
pub trait HidDevice {
    /// Read feature report `report_id` into a buffer of `len` bytes.
    ///
    /// The returned bytes start with the report id and may be shorter than
    /// `len`.
    fn get_feature_report(&mut self, report_id: u8, len: usize) -> Result<Vec<u8>, DeviceError>;

    /// Write a feature report. `data[0]` is the report id.
    fn set_feature_report(&mut self, data: &[u8]) -> Result<(), DeviceError>;
}

impl<D: HidDevice + ?Sized> HidDevice for &mut D {
    fn get_feature_report(&mut self, report_id: u8, len: usize) -> Result<Vec<u8>, DeviceError> {
        (**self).get_feature_report(report_id, len)
    }

    fn set_feature_report(&mut self, data: &[u8]) -> Result<(), DeviceError> {
        (**self).set_feature_report(data)
    }
}

/// Opens and enumerates HID devices.
pub trait HidBackend {
    type Device: HidDevice;

    /// Open the first device matching `id`, waiting up to `timeout` for it
    /// to appear.
    fn open(&self, id: &DeviceId, timeout: Duration) -> Result<Self::Device, DeviceError>;

    /// Number of attached devices with these ids.
    fn count_devices(&self, vendor_id: u16, product_id: u16) -> Result<usize, DeviceError>;
}
