// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Tests for the upload engine and device sessions against a mock backend.

mod mockdev;

use std::time::Duration;

use hidboot_common::device::{DeviceError, DeviceId};
use hidboot_common::engine::{EngineState, ModeSwitch, UploadEngine, UploadError, UploadObserver};
use hidboot_common::geometry::{DeviceGeometry, UploadRange};
use hidboot_common::hex::{encode_records, HexRecord, HexRecordReader};
use hidboot_common::image::FlashImage;
use hidboot_common::protocol::Report;
use hidboot_common::session::{
    self, count_known_devices, enter_bootloader, Switched, UploadRequest, HIDBOOT, JOYSTICK,
    MOUSE,
};
use hidboot_common::HidBackend;

use mockdev::{MockBackend, MockConfig};

fn image_from(text: &str) -> FlashImage {
    let mut image = FlashImage::new();
    image.decode(HexRecordReader::new(text.as_bytes())).unwrap();
    image
}

fn request(leave_bootloader: bool) -> UploadRequest {
    UploadRequest {
        leave_bootloader,
        ..UploadRequest::default()
    }
}

#[derive(Default)]
struct Recorder {
    planned: Option<(DeviceGeometry, UploadRange)>,
    blocks: Vec<(usize, usize)>,
}

impl UploadObserver for Recorder {
    fn planned(&mut self, geometry: &DeviceGeometry, range: &UploadRange) {
        self.planned = Some((*geometry, *range));
    }

    fn block_sent(&mut self, address: usize, remaining: usize) {
        self.blocks.push((address, remaining));
    }
}

// =============================================================================
// Full sessions
// =============================================================================

#[test]
fn test_minimal_file_sends_one_block() {
    let backend = MockBackend::with_geometry(128, 4096);
    let image = image_from(":02000000FEFF01\n:00000001FF\n");

    let summary = session::upload(&backend, Some(&image), &request(false), &mut ()).unwrap();

    assert_eq!(summary.geometry, Some(DeviceGeometry::new(128, 4096)));
    assert_eq!(summary.range, Some(UploadRange { start: 0, end: 128 }));
    assert_eq!(summary.blocks_sent, 1);
    assert_eq!(summary.mode_switch, ModeSwitch::NotRequested);

    let log = backend.log.borrow();
    assert_eq!(log.reads, vec![(1, 132)]);
    assert_eq!(log.writes.len(), 1);

    let block = &log.writes[0];
    assert_eq!(block.len(), 132);
    assert_eq!(&block[..4], &[2, 0, 0, 0]);
    assert_eq!(&block[4..6], &[0xFE, 0xFF]);
    assert!(block[6..].iter().all(|&b| b == 0xFF));
    assert_eq!(log.closed, 1);
}

#[test]
fn test_no_file_only_switches_mode() {
    let backend = MockBackend::with_geometry(128, 4096);

    let summary = session::upload(&backend, None, &request(true), &mut ()).unwrap();

    assert_eq!(summary.blocks_sent, 0);
    assert_eq!(summary.geometry, None);
    assert_eq!(summary.mode_switch, ModeSwitch::Sent);

    let log = backend.log.borrow();
    assert!(log.reads.is_empty());
    assert!(log.data_blocks().is_empty());
    assert_eq!(log.writes.len(), 1);
    assert_eq!(log.writes[0][0], 1);
    assert!(log.writes[0][1..].iter().all(|&b| b == 0));
    assert_eq!(log.closed, 1);
}

#[test]
fn test_empty_image_skips_negotiation() {
    let backend = MockBackend::with_geometry(128, 4096);
    let image = image_from(":00000001FF\n");

    let summary = session::upload(&backend, Some(&image), &request(false), &mut ()).unwrap();

    assert_eq!(summary.blocks_sent, 0);
    let log = backend.log.borrow();
    assert!(log.reads.is_empty());
    assert!(log.writes.is_empty());
}

#[test]
fn test_blocks_follow_page_alignment() {
    // Data from 0x1F0 to 0x310 on a 256-byte page device
    let data: Vec<u8> = (0..0x120u32).map(|i| i as u8).collect();
    let image = image_from(&encode_records(0x01F0, &data, 16));
    let backend = MockBackend::with_geometry(256, 16384);
    let mut recorder = Recorder::default();

    let summary = session::upload(&backend, Some(&image), &request(true), &mut recorder).unwrap();

    assert_eq!(summary.range, Some(UploadRange { start: 0x100, end: 0x400 }));
    assert_eq!(summary.blocks_sent, 6);
    assert_eq!(summary.mode_switch, ModeSwitch::Sent);

    let log = backend.log.borrow();
    let addresses: Vec<u32> = log
        .data_blocks()
        .iter()
        .map(|w| match Report::parse_data_block(w) {
            Some(Report::DataBlock { address, .. }) => address,
            other => panic!("not a data block: {:?}", other),
        })
        .collect();
    assert_eq!(addresses, vec![0x100, 0x180, 0x200, 0x280, 0x300, 0x380]);

    // Mode switch comes last
    assert_eq!(log.writes.last().unwrap()[0], 1);

    // Block at 0x180 starts with erased bytes then the first data byte at 0x1F0
    let second = log.data_blocks()[1];
    assert!(second[4..4 + 0x70].iter().all(|&b| b == 0xFF));
    assert_eq!(second[4 + 0x70], 0x00);
    assert_eq!(second[4 + 0x71], 0x01);

    assert_eq!(
        recorder.planned,
        Some((
            DeviceGeometry::new(256, 16384),
            UploadRange { start: 0x100, end: 0x400 }
        ))
    );
    assert_eq!(recorder.blocks.first(), Some(&(0x100, 0x280)));
    assert_eq!(recorder.blocks.last(), Some(&(0x380, 0)));
}

#[test]
fn test_upload_request_targets_device() {
    let backend = MockBackend::with_geometry(128, 4096);
    let custom = session::hidboot().with_ids(0x1234, 0x5678);
    let req = UploadRequest {
        device: custom.clone(),
        ..UploadRequest::default()
    };

    session::upload(&backend, None, &req, &mut ()).unwrap();

    let log = backend.log.borrow();
    assert_eq!(log.opened, vec![custom]);
    assert_eq!(log.opened[0].product_name.as_deref(), Some("HIDBoot"));
}

// =============================================================================
// Failures
// =============================================================================

#[test]
fn test_open_failure() {
    let backend = MockBackend::new(MockConfig {
        present: Some(vec![]),
        ..MockConfig::default()
    });

    let err = session::upload(&backend, None, &request(true), &mut ()).unwrap_err();
    assert!(matches!(
        err,
        UploadError::Open {
            source: DeviceError::NotFound,
            ..
        }
    ));
    assert_eq!(backend.log.borrow().closed, 0);
}

#[test]
fn test_geometry_read_failure_closes_device() {
    let backend = MockBackend::new(MockConfig {
        read_error: Some(DeviceError::Io("timeout".to_string())),
        ..MockConfig::default()
    });
    let image = image_from(":02000000FEFF01\n");

    let err = session::upload(&backend, Some(&image), &request(true), &mut ()).unwrap_err();

    assert!(matches!(err, UploadError::GeometryRead(_)));
    let log = backend.log.borrow();
    assert!(log.writes.is_empty());
    assert_eq!(log.closed, 1);
}

#[test]
fn test_short_device_info_is_protocol_error() {
    let backend = MockBackend::new(MockConfig {
        info: vec![1, 0x80, 0x00, 0x00],
        ..MockConfig::default()
    });
    let image = image_from(":02000000FEFF01\n");

    let err = session::upload(&backend, Some(&image), &request(true), &mut ()).unwrap_err();

    match err {
        UploadError::ShortDeviceInfo { received, expected } => {
            assert_eq!(received, 4);
            assert_eq!(expected, 7);
        }
        other => panic!("unexpected error: {}", other),
    }
    assert!(backend.log.borrow().writes.is_empty());
    assert_eq!(backend.log.borrow().closed, 1);
}

#[test]
fn test_capacity_failure_sends_nothing() {
    // 4096-byte flash leaves 2048 usable bytes
    let backend = MockBackend::with_geometry(128, 4096);
    let mut image = FlashImage::new();
    image.apply(&HexRecord::data(0x07FF, &[0x00, 0x01])).unwrap();

    let err = session::upload(&backend, Some(&image), &request(true), &mut ()).unwrap_err();

    match err {
        UploadError::Capacity(e) => {
            assert_eq!(e.end, 0x801);
            assert_eq!(e.usable, 2048);
        }
        other => panic!("unexpected error: {}", other),
    }
    let log = backend.log.borrow();
    assert!(log.writes.is_empty());
    assert_eq!(log.closed, 1);
}

#[test]
fn test_block_write_failure_reports_address() {
    let backend = MockBackend::new(MockConfig {
        fail_write: Some(2),
        ..MockConfig::default()
    });
    let image = image_from(&encode_records(0, &[0x11; 600], 32));

    let err = session::upload(&backend, Some(&image), &request(true), &mut ()).unwrap_err();

    match &err {
        UploadError::BlockWrite { address, .. } => assert_eq!(*address, 0x100),
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(
        err.to_string(),
        "Error uploading data block at 0x00100: Communication error with device: pipe stalled"
    );

    let log = backend.log.borrow();
    // No further blocks and no mode switch after the failure
    assert_eq!(log.writes.len(), 3);
    assert!(log.writes.iter().all(|w| w[0] == 2));
    assert_eq!(log.closed, 1);
}

#[test]
fn test_mode_switch_failure_is_not_fatal() {
    let backend = MockBackend::new(MockConfig {
        fail_mode_switch: true,
        ..MockConfig::default()
    });
    let image = image_from(":02000000FEFF01\n");

    let summary = session::upload(&backend, Some(&image), &request(true), &mut ()).unwrap();

    assert_eq!(summary.blocks_sent, 1);
    assert!(matches!(summary.mode_switch, ModeSwitch::Unconfirmed(_)));
    assert_eq!(backend.log.borrow().closed, 1);
}

// =============================================================================
// State machine
// =============================================================================

#[test]
fn test_engine_state_transitions() {
    let backend = MockBackend::with_geometry(128, 4096);
    let device = backend.open(&session::hidboot(), Duration::ZERO).unwrap();
    let mut engine = UploadEngine::new(device);
    let image = image_from(":02000000FEFF01\n");

    assert_eq!(engine.state(), EngineState::Idle);

    let geometry = engine.negotiate().unwrap();
    assert_eq!(engine.state(), EngineState::Negotiating);

    let range = engine.plan(image.bounds(), &geometry).unwrap();
    engine.transfer(&image, range, &mut ()).unwrap();
    assert_eq!(engine.state(), EngineState::Transferring { cursor: 128 });

    assert_eq!(engine.finish(false).unwrap(), ModeSwitch::NotRequested);
    assert_eq!(engine.state(), EngineState::Done);
}

#[test]
fn test_done_engine_rejects_operations() {
    let backend = MockBackend::with_geometry(128, 4096);
    let device = backend.open(&session::hidboot(), Duration::ZERO).unwrap();
    let mut engine = UploadEngine::new(device);

    engine.run(None, true, &mut ()).unwrap();
    assert_eq!(engine.state(), EngineState::Done);

    assert!(matches!(
        engine.negotiate(),
        Err(UploadError::InvalidState(EngineState::Done))
    ));
    assert!(matches!(
        engine.finish(true),
        Err(UploadError::InvalidState(EngineState::Done))
    ));
    // Only the first mode switch reached the device
    assert_eq!(backend.log.borrow().writes.len(), 1);
}

#[test]
fn test_failed_engine_rejects_operations() {
    let backend = MockBackend::new(MockConfig {
        read_error: Some(DeviceError::Busy),
        ..MockConfig::default()
    });
    let device = backend.open(&session::hidboot(), Duration::ZERO).unwrap();
    let mut engine = UploadEngine::new(device);

    assert!(engine.negotiate().is_err());
    assert_eq!(engine.state(), EngineState::Failed);
    assert!(matches!(
        engine.finish(true),
        Err(UploadError::InvalidState(EngineState::Failed))
    ));
}

#[test]
fn test_transfer_requires_negotiation() {
    let backend = MockBackend::with_geometry(128, 4096);
    let device = backend.open(&session::hidboot(), Duration::ZERO).unwrap();
    let mut engine = UploadEngine::new(device);
    let image = image_from(":02000000FEFF01\n");

    let err = engine
        .transfer(&image, UploadRange { start: 0, end: 128 }, &mut ())
        .unwrap_err();
    assert!(matches!(err, UploadError::InvalidState(EngineState::Idle)));
    assert!(backend.log.borrow().writes.is_empty());
}

// =============================================================================
// Enter bootloader / enumeration
// =============================================================================

#[test]
fn test_enter_bootloader_prefers_joystick() {
    let backend = MockBackend::new(MockConfig::default());

    let switched = enter_bootloader(
        &backend,
        &session::joystick(),
        &session::mouse(),
        Duration::ZERO,
    )
    .unwrap();

    assert_eq!(switched, Switched::Joystick);
    let log = backend.log.borrow();
    assert_eq!(log.opened, vec![session::joystick()]);
    assert_eq!(log.writes, vec![vec![0x00, 0x5A]]);
    assert_eq!(log.closed, 1);
}

#[test]
fn test_enter_bootloader_falls_back_to_mouse() {
    let backend = MockBackend::new(MockConfig {
        present: Some(vec![MOUSE]),
        fail_write: Some(0),
        ..MockConfig::default()
    });

    let switched = enter_bootloader(
        &backend,
        &session::joystick(),
        &session::mouse(),
        Duration::ZERO,
    )
    .unwrap();

    assert_eq!(switched, Switched::Mouse);
    assert_eq!(backend.log.borrow().writes.len(), 1);
}

#[test]
fn test_enter_bootloader_nothing_attached() {
    let backend = MockBackend::new(MockConfig {
        present: Some(vec![HIDBOOT]),
        ..MockConfig::default()
    });

    let err = enter_bootloader(
        &backend,
        &session::joystick(),
        &session::mouse(),
        Duration::ZERO,
    )
    .unwrap_err();
    assert_eq!(err, DeviceError::NotFound);
}

#[test]
fn test_count_known_devices() {
    let backend = MockBackend::new(MockConfig {
        counts: vec![(HIDBOOT, 2), (MOUSE, 1), ((0xdead, 0xbeef), 5)],
        ..MockConfig::default()
    });

    assert_eq!(
        count_known_devices(&backend, &[HIDBOOT, JOYSTICK, MOUSE]).unwrap(),
        3
    );
}

#[test]
fn test_device_id_override_and_matching() {
    let id = session::hidboot();
    assert!(id.matches(0x16c0, 0x05df, Some("obdev.at"), Some("HIDBoot")));
    assert!(!id.matches(0x16c0, 0x05df, Some("obdev.at"), None));
    assert!(!id.matches(0x16c0, 0x05de, Some("obdev.at"), Some("HIDBoot")));

    // Zero ids keep the defaults
    assert_eq!(id.clone().with_ids(0, 0x1111), id);

    let joystick = session::joystick();
    assert!(joystick.matches(0x0810, 0xe501, Some("retronicdesign.com"), Some("anything")));
    assert_eq!(DeviceId::new(0x0810, 0xe501).to_string(), "0810:e501");
}
