// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Firmware upload tool for HIDBoot USB HID bootloaders.
//!
//! Usage:
//!   hidboot-upload upload firmware.hex
//!   hidboot-upload upload firmware.hex -r --vid 16c0 --pid 05df
//!   hidboot-upload reset
//!   hidboot-upload enter-bootloader
//!   hidboot-upload list

mod cli;
mod commands;
mod transport;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let args = cli::Cli::parse();

    let default_level = match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    cli::run(args)
}
