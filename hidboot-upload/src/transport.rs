// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! USB HID transport for bootloader communication.
//!
//! Feature reports are exchanged with HID class control requests on the
//! device's HID interface, so no kernel HID driver is involved.

use std::io;
use std::thread;
use std::time::{Duration, Instant};

use nusb::transfer::{ControlIn, ControlOut, ControlType, Recipient, TransferError};
use nusb::{Device, DeviceInfo, Interface};

use hidboot_common::device::{DeviceError, DeviceId, HidBackend, HidDevice};

const HID_CLASS: u8 = 0x03;
const HID_GET_REPORT: u8 = 0x01;
const HID_SET_REPORT: u8 = 0x09;
const HID_REPORT_TYPE_FEATURE: u16 = 0x03;

/// Delay between bus scans while waiting for a device.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Backend over the `nusb` USB stack.
#[derive(Debug, Default, Clone, Copy)]
pub struct NusbBackend;

impl NusbBackend {
    fn find(id: &DeviceId) -> Result<Option<DeviceInfo>, DeviceError> {
        let mut devices = nusb::list_devices().map_err(|e| DeviceError::Io(e.to_string()))?;
        Ok(devices.find(|info| {
            id.matches(
                info.vendor_id(),
                info.product_id(),
                info.manufacturer_string(),
                info.product_string(),
            )
        }))
    }
}

impl HidBackend for NusbBackend {
    type Device = HidHandle;

    fn open(&self, id: &DeviceId, timeout: Duration) -> Result<HidHandle, DeviceError> {
        let deadline = Instant::now() + timeout;
        let info = loop {
            if let Some(info) = Self::find(id)? {
                break info;
            }
            if Instant::now() >= deadline {
                return Err(DeviceError::NotFound);
            }
            thread::sleep(POLL_INTERVAL);
        };

        let interface_number = hid_interface(
            info.interfaces().map(|iface| (iface.interface_number(), iface.class())),
        );

        log::debug!(
            "Opening {} at bus {} address {} (interface {})",
            id,
            info.bus_number(),
            info.device_address(),
            interface_number
        );

        let device = info.open().map_err(open_error)?;
        let interface = device
            .detach_and_claim_interface(interface_number)
            .map_err(claim_error)?;

        Ok(HidHandle {
            _device: device,
            interface,
            interface_number,
            id: id.clone(),
        })
    }

    fn count_devices(&self, vendor_id: u16, product_id: u16) -> Result<usize, DeviceError> {
        let devices = nusb::list_devices().map_err(|e| DeviceError::Io(e.to_string()))?;
        let mut count = 0;
        for info in devices.filter(|d| d.vendor_id() == vendor_id && d.product_id() == product_id) {
            log::info!(
                "{:04x}:{:04x} {} {} (bus {} address {})",
                info.vendor_id(),
                info.product_id(),
                info.manufacturer_string().unwrap_or("?"),
                info.product_string().unwrap_or("?"),
                info.bus_number(),
                info.device_address()
            );
            count += 1;
        }
        Ok(count)
    }
}

/// An open device with its HID interface claimed.
///
/// Dropping the handle releases the interface and closes the device.
pub struct HidHandle {
    _device: Device,
    interface: Interface,
    interface_number: u8,
    id: DeviceId,
}

impl HidHandle {
    fn report_value(report_id: u8) -> u16 {
        (HID_REPORT_TYPE_FEATURE << 8) | report_id as u16
    }
}

impl HidDevice for HidHandle {
    fn get_feature_report(&mut self, report_id: u8, len: usize) -> Result<Vec<u8>, DeviceError> {
        let completion = futures_lite::future::block_on(self.interface.control_in(ControlIn {
            control_type: ControlType::Class,
            recipient: Recipient::Interface,
            request: HID_GET_REPORT,
            value: Self::report_value(report_id),
            index: self.interface_number as u16,
            length: len.min(u16::MAX as usize) as u16,
        }));

        completion.status.map_err(transfer_error)?;
        Ok(completion.data)
    }

    fn set_feature_report(&mut self, data: &[u8]) -> Result<(), DeviceError> {
        let report_id = data.first().copied().unwrap_or(0);
        let completion = futures_lite::future::block_on(self.interface.control_out(ControlOut {
            control_type: ControlType::Class,
            recipient: Recipient::Interface,
            request: HID_SET_REPORT,
            value: Self::report_value(report_id),
            index: self.interface_number as u16,
            data,
        }));

        completion.status.map_err(transfer_error)
    }
}

impl Drop for HidHandle {
    fn drop(&mut self) {
        log::debug!("Closing {}", self.id);
    }
}

/// First HID-class interface among `(number, class)` pairs, else interface 0.
fn hid_interface(interfaces: impl IntoIterator<Item = (u8, u8)>) -> u8 {
    match interfaces.into_iter().find(|&(_, class)| class == HID_CLASS) {
        Some((number, _)) => number,
        None => {
            log::debug!("No HID-class interface found, falling back to interface 0");
            0
        }
    }
}

fn open_error(e: io::Error) -> DeviceError {
    match e.kind() {
        io::ErrorKind::PermissionDenied => DeviceError::Access,
        io::ErrorKind::NotFound => DeviceError::NotFound,
        _ => DeviceError::Io(e.to_string()),
    }
}

fn claim_error(e: io::Error) -> DeviceError {
    match e.kind() {
        io::ErrorKind::PermissionDenied => DeviceError::Access,
        _ => DeviceError::Busy,
    }
}

fn transfer_error(e: TransferError) -> DeviceError {
    match e {
        TransferError::Disconnected => DeviceError::NotFound,
        other => DeviceError::Io(other.to_string()),
    }
}
