// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! In-memory HID backend recording every report exchanged.

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use hidboot_common::device::{DeviceError, DeviceId, HidBackend, HidDevice};
use hidboot_common::geometry::DeviceGeometry;
use hidboot_common::protocol::Report;

/// Everything the backend and its devices saw.
#[derive(Debug, Default)]
pub struct Log {
    pub opened: Vec<DeviceId>,
    pub closed: usize,
    pub reads: Vec<(u8, usize)>,
    pub writes: Vec<Vec<u8>>,
}

impl Log {
    /// Writes carrying report id 2.
    pub fn data_blocks(&self) -> Vec<&Vec<u8>> {
        self.writes.iter().filter(|w| w[0] == 2).collect()
    }
}

#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Bytes returned for the device info read.
    pub info: Vec<u8>,
    pub read_error: Option<DeviceError>,
    /// Index (among all writes) of the write that fails.
    pub fail_write: Option<usize>,
    pub fail_mode_switch: bool,
    /// Ids that can be opened. `None` opens anything.
    pub present: Option<Vec<(u16, u16)>>,
    pub counts: Vec<((u16, u16), usize)>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            info: device_info(128, 4096),
            read_error: None,
            fail_write: None,
            fail_mode_switch: false,
            present: None,
            counts: Vec::new(),
        }
    }
}

pub fn device_info(page_size: u32, flash_size: u32) -> Vec<u8> {
    Report::DeviceInfo(DeviceGeometry::new(page_size, flash_size)).encode()
}

pub struct MockBackend {
    pub config: MockConfig,
    pub log: Rc<RefCell<Log>>,
}

impl MockBackend {
    pub fn new(config: MockConfig) -> Self {
        Self {
            config,
            log: Rc::new(RefCell::new(Log::default())),
        }
    }

    pub fn with_geometry(page_size: u32, flash_size: u32) -> Self {
        Self::new(MockConfig {
            info: device_info(page_size, flash_size),
            ..MockConfig::default()
        })
    }
}

impl HidBackend for MockBackend {
    type Device = MockDevice;

    fn open(&self, id: &DeviceId, _timeout: Duration) -> Result<MockDevice, DeviceError> {
        if let Some(present) = &self.config.present {
            if !present.contains(&(id.vendor_id, id.product_id)) {
                return Err(DeviceError::NotFound);
            }
        }
        self.log.borrow_mut().opened.push(id.clone());
        Ok(MockDevice {
            config: self.config.clone(),
            log: Rc::clone(&self.log),
            writes: 0,
        })
    }

    fn count_devices(&self, vendor_id: u16, product_id: u16) -> Result<usize, DeviceError> {
        Ok(self
            .config
            .counts
            .iter()
            .filter(|(ids, _)| *ids == (vendor_id, product_id))
            .map(|(_, n)| n)
            .sum())
    }
}

pub struct MockDevice {
    config: MockConfig,
    log: Rc<RefCell<Log>>,
    writes: usize,
}

impl HidDevice for MockDevice {
    fn get_feature_report(&mut self, report_id: u8, len: usize) -> Result<Vec<u8>, DeviceError> {
        self.log.borrow_mut().reads.push((report_id, len));
        match &self.config.read_error {
            Some(e) => Err(e.clone()),
            None => Ok(self.config.info.clone()),
        }
    }

    fn set_feature_report(&mut self, data: &[u8]) -> Result<(), DeviceError> {
        let index = self.writes;
        self.writes += 1;
        self.log.borrow_mut().writes.push(data.to_vec());

        if self.config.fail_write == Some(index) {
            return Err(DeviceError::Io("pipe stalled".to_string()));
        }
        if self.config.fail_mode_switch && data[0] == 1 {
            return Err(DeviceError::Io("device disconnected".to_string()));
        }
        Ok(())
    }
}

impl Drop for MockDevice {
    fn drop(&mut self) {
        self.log.borrow_mut().closed += 1;
    }
}
