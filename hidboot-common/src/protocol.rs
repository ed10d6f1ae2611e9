// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Feature-report layouts exchanged with the bootloader.
//!
//! Every report starts with its report id. The bootloader answers report 1
//! reads with its flash geometry, accepts report 2 writes as 128-byte data
//! blocks and treats a report 1 write as "leave the bootloader".

use crate::geometry::DeviceGeometry;

// --- Report ids ---

pub const DEVICE_INFO_ID: u8 = 1;
pub const DATA_BLOCK_ID: u8 = 2;
pub const MODE_SWITCH_ID: u8 = 1;
/// Application-mode firmware listens on report 0 for the bootloader request.
pub const ENTER_BOOTLOADER_ID: u8 = 0;
pub const ENTER_BOOTLOADER_MAGIC: u8 = 0x5A;

// --- Sizes ---

/// Payload bytes in one data block, independent of the device page size.
pub const BLOCK_SIZE: usize = 128;

/// Block address width on the wire.
pub const ADDRESS_LEN: usize = 3;

/// reportId + pageSize(2) + flashSize(4)
pub const DEVICE_INFO_LEN: usize = 1 + 2 + 4;

/// reportId + address(3) + data(128)
pub const DATA_BLOCK_LEN: usize = 1 + ADDRESS_LEN + BLOCK_SIZE;

/// Read buffer for the device info request, sized for the largest report.
pub const REPORT_BUFFER_LEN: usize = DATA_BLOCK_LEN;

/// Bytes at the top of flash that are never written.
pub const RESERVED_FLASH: u32 = 2048;

/// A feature report, tagged by its role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Report {
    /// Page and flash size, read from the bootloader.
    DeviceInfo(DeviceGeometry),
    /// One block of image data.
    DataBlock {
        address: u32,
        data: [u8; BLOCK_SIZE],
    },
    /// Leave the bootloader and start the application.
    ModeSwitch,
    /// Ask application firmware to reboot into the bootloader.
    EnterBootloader,
}

impl Report {
    pub fn report_id(&self) -> u8 {
        match self {
            Report::DeviceInfo(_) => DEVICE_INFO_ID,
            Report::DataBlock { .. } => DATA_BLOCK_ID,
            Report::ModeSwitch => MODE_SWITCH_ID,
            Report::EnterBootloader => ENTER_BOOTLOADER_ID,
        }
    }

    /// Serialize to the bytes handed to a feature-report write.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Report::DeviceInfo(geometry) => {
                let mut out = Vec::with_capacity(DEVICE_INFO_LEN);
                out.push(DEVICE_INFO_ID);
                out.extend_from_slice(&(geometry.page_size as u16).to_le_bytes());
                out.extend_from_slice(&geometry.flash_size.to_le_bytes());
                out
            }
            Report::DataBlock { address, data } => {
                let mut out = Vec::with_capacity(DATA_BLOCK_LEN);
                out.push(DATA_BLOCK_ID);
                out.extend_from_slice(&address.to_le_bytes()[..ADDRESS_LEN]);
                out.extend_from_slice(data);
                out
            }
            // The bootloader expects the device-info report length here
            Report::ModeSwitch => {
                let mut out = vec![0u8; DEVICE_INFO_LEN];
                out[0] = MODE_SWITCH_ID;
                out
            }
            Report::EnterBootloader => vec![ENTER_BOOTLOADER_ID, ENTER_BOOTLOADER_MAGIC],
        }
    }

    /// Parse a device info response. `None` if it is too short.
    pub fn parse_device_info(bytes: &[u8]) -> Option<Report> {
        if bytes.len() < DEVICE_INFO_LEN {
            return None;
        }
        let page_size = u16::from_le_bytes([bytes[1], bytes[2]]) as u32;
        let flash_size = u32::from_le_bytes([bytes[3], bytes[4], bytes[5], bytes[6]]);
        Some(Report::DeviceInfo(DeviceGeometry::new(page_size, flash_size)))
    }

    /// Decode a data block write, as the bootloader would see it.
    pub fn parse_data_block(bytes: &[u8]) -> Option<Report> {
        if bytes.len() < DATA_BLOCK_LEN || bytes[0] != DATA_BLOCK_ID {
            return None;
        }
        let address = u32::from_le_bytes([bytes[1], bytes[2], bytes[3], 0]);
        let mut data = [0u8; BLOCK_SIZE];
        data.copy_from_slice(&bytes[1 + ADDRESS_LEN..DATA_BLOCK_LEN]);
        Some(Report::DataBlock { address, data })
    }
}
