// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Command implementations for bootloader operations.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use crc::{Crc, CRC_32_ISO_HDLC};
use indicatif::{ProgressBar, ProgressStyle};

use hidboot_common::engine::{ModeSwitch, UploadObserver};
use hidboot_common::geometry::{DeviceGeometry, UploadRange};
use hidboot_common::hex::DigitMode;
use hidboot_common::image::FlashImage;
use hidboot_common::protocol::BLOCK_SIZE;
use hidboot_common::session::{self, Switched, UploadRequest, HIDBOOT, JOYSTICK, MOUSE};
use hidboot_common::HidBackend;

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Prints the negotiated layout and drives a progress bar.
struct Progress<'a> {
    image: Option<&'a FlashImage>,
    bar: Option<ProgressBar>,
}

impl<'a> Progress<'a> {
    fn new(image: Option<&'a FlashImage>) -> Self {
        Self { image, bar: None }
    }

    fn finish(&self, ok: bool) {
        if let Some(bar) = &self.bar {
            if ok {
                bar.finish_with_message("Upload complete");
            } else {
                bar.abandon();
            }
        }
    }
}

impl UploadObserver for Progress<'_> {
    fn planned(&mut self, geometry: &DeviceGeometry, range: &UploadRange) {
        println!(
            "Page size   = {} (0x{:x})",
            geometry.page_size, geometry.page_size
        );
        println!(
            "Device size = {} (0x{:x}); {} bytes remaining",
            geometry.flash_size,
            geometry.flash_size,
            geometry.usable_size()
        );
        let crc32 = self
            .image
            .map(|image| CRC32.checksum(&image.padded(range.start..range.end)))
            .unwrap_or(0);
        println!(
            "Uploading {} (0x{:x}) bytes starting at {} (0x{:x}), CRC32: 0x{:08x}",
            range.len(),
            range.len(),
            range.start,
            range.start,
            crc32
        );

        let bar = ProgressBar::new(range.len() as u64);
        if let Ok(style) = ProgressStyle::default_bar().template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}",
        ) {
            bar.set_style(style.progress_chars("#>-"));
        }
        self.bar = Some(bar);
    }

    fn block_sent(&mut self, address: usize, _remaining: usize) {
        if let Some(bar) = &self.bar {
            bar.inc(BLOCK_SIZE as u64);
            bar.set_message(format!("0x{:05x} ... 0x{:05x}", address, address + BLOCK_SIZE));
        }
    }
}

/// Upload a hex file (if given) and optionally leave the bootloader.
pub fn upload<B: HidBackend>(
    backend: &B,
    file: Option<&Path>,
    request: &UploadRequest,
    mode: DigitMode,
) -> Result<()> {
    let image = match file {
        Some(path) => {
            let (image, warnings) = FlashImage::load(path, mode)
                .with_context(|| format!("Failed to parse {}", path.display()))?;

            if !warnings.is_empty() {
                println!(
                    "Warning: {} record(s) failed checksum verification",
                    warnings.len()
                );
            }
            if image.is_empty() {
                println!("No data in input file, exiting.");
                return Ok(());
            }

            println!(
                "Firmware: {} (0x{:05x} ... 0x{:05x})",
                path.display(),
                image.start_address(),
                image.end_address()
            );
            Some(image)
        }
        None => None,
    };

    let mut progress = Progress::new(image.as_ref());
    let result = session::upload(backend, image.as_ref(), request, &mut progress);
    progress.finish(result.is_ok());
    let summary = result.with_context(|| format!("Upload to {} failed", request.device))?;

    if summary.blocks_sent > 0 {
        println!();
        println!("Firmware uploaded successfully!");
    }

    match summary.mode_switch {
        ModeSwitch::NotRequested => {}
        ModeSwitch::Sent | ModeSwitch::Unconfirmed(_) => println!("Device now in normal mode."),
    }

    Ok(())
}

/// Switch a joystick (or, failing that, a mouse) into the bootloader.
pub fn enter_bootloader<B: HidBackend>(
    backend: &B,
    vid: u16,
    pid: u16,
    timeout: Duration,
) -> Result<()> {
    let joystick = session::joystick().with_ids(vid, pid);
    let mouse = session::mouse();

    let switched = session::enter_bootloader(backend, &joystick, &mouse, timeout)
        .context("Error opening joystick device")?;

    match switched {
        Switched::Joystick => println!("Joystick device now in bootloader mode."),
        Switched::Mouse => println!("Mouse device now in bootloader mode."),
    }

    Ok(())
}

/// List compatible devices on the bus.
pub fn list<B: HidBackend>(backend: &B) -> Result<()> {
    println!("Compatible devices on USB bus:");
    let count = session::count_known_devices(backend, &[HIDBOOT, JOYSTICK, MOUSE])
        .context("Failed to enumerate USB devices")?;
    println!();
    println!("Devices discovered = {}", count);
    Ok(())
}
