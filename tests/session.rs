//! End-to-end capture sessions against the simulated device

use camgrab::capture::frame::{BayerPattern, PlanarYuv, WireFormat};
use camgrab::capture::{
    CaptureSession, DropReason, FrameStatus, SessionState, SurfaceDescriptor, SurfaceSize,
};
use camgrab::device::mock::{SimulatedDevice, SimulatedMode};
use camgrab::{CaptureError, DecodeError};

fn open(device: SimulatedDevice) -> CaptureSession<SimulatedDevice> {
    CaptureSession::from_device(device, "/dev/sim0").unwrap()
}

/// A 16x16 4:2:0 frame with custom Huffman tables, padded past the empty-frame threshold.
fn mjpeg_frame(entropy: &[u8]) -> Vec<u8> {
    let mut jpeg = vec![0xff, 0xd8, 0xff, 0xfe, 0x00, 102];
    jpeg.extend([0u8; 100]);
    jpeg.extend([0xff, 0xdb, 0x00, 67, 0x00]);
    jpeg.extend([8u8; 64]);
    jpeg.extend([0xff, 0xc4, 0x00, 40, 0x00, 1, 1, 1]);
    jpeg.extend([0u8; 13]);
    jpeg.extend([0, 2, 3, 0x10, 1]);
    jpeg.extend([0u8; 15]);
    jpeg.push(0x00);
    jpeg.extend([0xff, 0xc0, 0x00, 17, 8, 0, 16, 0, 16, 3, 1, 0x22, 0, 2, 0x11, 0, 3, 0x11, 0]);
    jpeg.extend([0xff, 0xda, 0x00, 12, 3, 1, 0x00, 2, 0x00, 3, 0x00, 0, 63, 0]);
    jpeg.extend(entropy);
    jpeg.extend([0xff, 0xd9]);
    jpeg
}

#[test]
fn init_picks_closest_fps_and_crops() {
    let mut session = open(SimulatedDevice::new(vec![
        SimulatedMode::yuyv(800, 600, &[15]),
        SimulatedMode::yuyv(800, 600, &[30]),
    ]));
    assert_eq!(session.available_sizes().len(), 1);
    assert_eq!(
        session.available_frame_rates().into_iter().collect::<Vec<_>>(),
        vec![15, 30]
    );

    let output = session.init(640, 480, 30).unwrap();
    assert_eq!(output, SurfaceSize::new(640, 480));

    let geometry = *session.geometry().unwrap();
    assert_eq!(geometry.capture, SurfaceSize::new(800, 600));
    assert_eq!(geometry.fps, 30);
    assert_eq!((geometry.crop.x, geometry.crop.y), (80, 60));
    assert_eq!(session.device().frame_rate(), 30);
}

#[test]
fn short_destination_drops_without_writing() {
    let mut session = open(SimulatedDevice::new(vec![SimulatedMode::yuyv(32, 16, &[30])]));
    session.init(32, 16, 30).unwrap();
    session.start_streaming().unwrap();

    let required = 32 * 16 * 2;
    let mut short = vec![0xeeu8; required - 1];
    let status = session.grab_frame(&mut short).unwrap();
    assert!(matches!(
        status,
        FrameStatus::Dropped(DropReason::DestinationTooSmall { required: 1024, available: 1023 })
    ));
    assert!(short.iter().all(|&b| b == 0xee));
    assert_eq!(session.state(), SessionState::Streaming);
    assert_eq!(session.device().queued_count(), 4);

    let mut frame = vec![0u8; required];
    let FrameStatus::Delivered(info) = session.grab_frame(&mut frame).unwrap() else {
        panic!("second grab should deliver");
    };
    assert_eq!(info.sequence, 0);
    assert_eq!((info.width, info.height), (32, 16));
    // Row 1 of the test pattern starts at 3.
    assert_eq!(&frame[..4], &[0, 1, 2, 3]);
    assert_eq!(frame[64], 3);
}

#[test]
fn mjpeg_frames_decode_and_bad_ones_are_dropped() {
    let good = mjpeg_frame(&[0xa5, 0x20, 0x4b, 0x57]);
    let corrupt = mjpeg_frame(&[0xff, 0x00, 0xff, 0x00]);
    let header_only = vec![0xffu8, 0xd8, 0xff, 0xd9];
    let device = SimulatedDevice::new(vec![SimulatedMode::mjpeg(16, 16, &[30])])
        .with_payloads(vec![good, corrupt, header_only]);

    let mut session = open(device);
    session.init(16, 16, 30).unwrap();
    assert!(session.geometry().unwrap().wire.is_compressed());
    session.start_streaming().unwrap();

    let mut dst = vec![0u8; 16 * 16 * 2];
    assert!(session.grab_frame(&mut dst).unwrap().is_delivered());
    assert_eq!(&dst[..4], &[130, 126, 130, 133]);
    assert_eq!(&dst[16..20], &[132, 126, 132, 133]);

    assert!(matches!(
        session.grab_frame(&mut dst).unwrap(),
        FrameStatus::Dropped(DropReason::Decode(DecodeError::BadHuffmanCode))
    ));
    assert!(matches!(
        session.grab_frame(&mut dst).unwrap(),
        FrameStatus::Dropped(DropReason::Empty { bytes_used: 4 })
    ));
    assert!(session.grab_frame(&mut dst).unwrap().is_delivered());
    assert_eq!(session.state(), SessionState::Streaming);
}

#[test]
fn planar_source_with_padded_rows() {
    let device = SimulatedDevice::new(vec![SimulatedMode::new(
        WireFormat::Planar(PlanarYuv::Nv12),
        16,
        8,
        &[30],
    )])
    .with_row_padding(16);
    let mut session = open(device);
    session.init(16, 8, 30).unwrap();
    assert_eq!(session.geometry().unwrap().bytes_per_line, 32);
    session.start_streaming().unwrap();

    let mut dst = vec![0u8; 16 * 8 * 2];
    assert!(session.grab_frame(&mut dst).unwrap().is_delivered());
    // Chroma plane starts after 8 rows of 32 bytes: pattern row 8.
    assert_eq!(&dst[..4], &[0, 24, 1, 25]);
    assert_eq!(&dst[32..36], &[3, 24, 4, 25]);
    assert_eq!(&dst[64..68], &[6, 27, 7, 28]);
}

#[test]
fn bayer_source_is_demosaiced() {
    let device = SimulatedDevice::new(vec![SimulatedMode::new(
        WireFormat::Bayer(BayerPattern::Rggb),
        16,
        8,
        &[30],
    )])
    .with_frame_source(|_, buf| {
        buf.fill(128);
        buf.len()
    });
    let mut session = open(device);
    session.init(16, 8, 30).unwrap();
    session.start_streaming().unwrap();

    let mut dst = vec![0u8; 16 * 8 * 2];
    assert!(session.grab_frame(&mut dst).unwrap().is_delivered());
    // Flat grey mosaic stays grey with neutral chroma.
    for px in dst.chunks_exact(4) {
        assert!(px[0].abs_diff(128) <= 1 && px[2].abs_diff(128) <= 1, "{px:?}");
        assert!(px[1].abs_diff(128) <= 1 && px[3].abs_diff(128) <= 1, "{px:?}");
    }
}

#[test]
fn mode_change_requires_full_teardown() {
    let mut session = open(SimulatedDevice::new(vec![
        SimulatedMode::yuyv(64, 48, &[30]),
        SimulatedMode::yuyv(32, 24, &[30]),
    ]));
    session.init(64, 48, 30).unwrap();
    assert!(matches!(
        session.init(32, 24, 30),
        Err(CaptureError::InvalidState { .. })
    ));
    session.start_streaming().unwrap();
    let mut dst = vec![0u8; 64 * 48 * 2];
    assert!(session.grab_frame(&mut dst).unwrap().is_delivered());

    session.stop_streaming().unwrap();
    session.uninit().unwrap();
    assert_eq!(session.init(32, 24, 30).unwrap(), SurfaceSize::new(32, 24));
    session.start_streaming().unwrap();
    assert!(session.grab_frame(&mut dst[..32 * 24 * 2]).unwrap().is_delivered());
    session.close().unwrap();
}

#[test]
fn empty_device_fails_init_loudly() {
    let mut session = open(SimulatedDevice::new(Vec::new()));
    assert_eq!(session.best_preview_format(), SurfaceDescriptor::default());
    assert!(matches!(
        session.init(640, 480, 30),
        Err(CaptureError::NoAcceptableMode { .. })
    ));
    assert_eq!(session.state(), SessionState::Closed);
}

#[test]
fn grab_outside_streaming_is_misuse() {
    let mut session = open(SimulatedDevice::new(vec![SimulatedMode::yuyv(16, 8, &[30])]));
    let mut dst = vec![0u8; 16 * 8 * 2];
    assert!(matches!(
        session.grab_frame(&mut dst),
        Err(CaptureError::InvalidState {
            expected: SessionState::Streaming,
            actual: SessionState::Closed
        })
    ));
}
