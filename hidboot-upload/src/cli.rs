// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Command-line interface definitions.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};

use hidboot_common::hex::DigitMode;
use hidboot_common::session::{self, UploadRequest};

use crate::commands;
use crate::transport::NusbBackend;

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "hidboot-upload")]
#[command(about = "Firmware upload tool for HIDBoot USB HID bootloaders")]
pub struct Cli {
    /// USB vendor id in hex (overrides the default for the selected device)
    #[arg(long, value_parser = parse_hex_id, global = true)]
    pub vid: Option<u16>,

    /// USB product id in hex (overrides the default for the selected device)
    #[arg(long, value_parser = parse_hex_id, global = true)]
    pub pid: Option<u16>,

    /// Seconds to wait for the device to appear
    #[arg(short, long, default_value = "1", global = true)]
    pub timeout: u64,

    /// Increase verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Upload an Intel-HEX file to the bootloader
    Upload {
        /// Firmware hex file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Leave the bootloader and start the application afterwards
        #[arg(short = 'r', long)]
        leave_bootloader: bool,

        /// Reject non-hex characters in records instead of reading past them
        #[arg(long)]
        strict: bool,
    },

    /// Leave the bootloader without uploading anything
    Reset,

    /// Switch a running joystick or mouse into bootloader mode
    EnterBootloader,

    /// List compatible devices on the USB bus
    List,
}

impl Cli {
    /// Id override as given; zero means "not given".
    fn ids(&self) -> (u16, u16) {
        (self.vid.unwrap_or(0), self.pid.unwrap_or(0))
    }

    fn request(&self, leave_bootloader: bool) -> UploadRequest {
        let (vid, pid) = self.ids();
        UploadRequest {
            device: session::hidboot().with_ids(vid, pid),
            timeout: Duration::from_secs(self.timeout),
            leave_bootloader,
        }
    }
}

/// Parse a USB id such as `16c0` or `0x16C0`.
pub fn parse_hex_id(s: &str) -> Result<u16, String> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    u16::from_str_radix(digits, 16).map_err(|e| format!("invalid hex id '{}': {}", s, e))
}

/// Execute the parsed CLI command.
pub fn run(cli: Cli) -> Result<()> {
    let backend = NusbBackend;

    match &cli.command {
        Commands::Upload {
            file,
            leave_bootloader,
            strict,
        } => {
            let mode = if *strict {
                DigitMode::Strict
            } else {
                DigitMode::Lenient
            };
            commands::upload(&backend, Some(file), &cli.request(*leave_bootloader), mode)
        }
        Commands::Reset => commands::upload(&backend, None, &cli.request(true), DigitMode::Lenient),
        Commands::EnterBootloader => {
            let (vid, pid) = cli.ids();
            commands::enter_bootloader(&backend, vid, pid, Duration::from_secs(cli.timeout))
        }
        Commands::List => commands::list(&backend),
    }
}
