//! Conversions through the YUYV pivot

use camgrab::capture::frame::{OutputFormat, PackedYuv, PlanarYuv, RgbOrder, WireFormat};
use camgrab::convert::{from_yuyv, to_yuyv, Geometry};
use camgrab::ConvertError;

const ALL_OUTPUTS: [OutputFormat; 13] = [
    OutputFormat::Yuyv,
    OutputFormat::Nv21,
    OutputFormat::Nv12,
    OutputFormat::Nv16,
    OutputFormat::Yv12,
    OutputFormat::I420,
    OutputFormat::Yv16,
    OutputFormat::Rgb24,
    OutputFormat::Bgr24,
    OutputFormat::Rgb32,
    OutputFormat::Bgr32,
    OutputFormat::Rgb565,
    OutputFormat::Bgr565,
];

fn ramp(width: usize, height: usize) -> Vec<u8> {
    let mut frame = vec![0u8; width * height * 2];
    for y in 0..height {
        for x in 0..width {
            let i = (y * width + x) * 2;
            frame[i] = (16 + x * 5 + y * 9) as u8;
            frame[i + 1] = if x % 2 == 0 { (90 + y * 4) as u8 } else { (170 - y * 2) as u8 };
        }
    }
    frame
}

/// Chroma close enough to neutral that YUV to RGB never clamps.
fn muted(width: usize, height: usize) -> Vec<u8> {
    let mut frame = ramp(width, height);
    for (i, px) in frame.chunks_exact_mut(2).enumerate() {
        let y = i / width;
        px[0] = 60 + px[0] / 2;
        px[1] = if i % 2 == 0 { (120 + y) as u8 } else { (136 - y) as u8 };
    }
    frame
}

fn to_output(format: OutputFormat, yuyv: &[u8], w: usize, h: usize) -> Vec<u8> {
    let mut out = vec![0u8; format.frame_size(w, h)];
    from_yuyv(format, yuyv, &mut out, Geometry::new(w, h, w * 2, format.stride(w))).unwrap();
    out
}

fn back_to_yuyv(wire: WireFormat, src: &[u8], src_stride: usize, w: usize, h: usize) -> Vec<u8> {
    let mut out = vec![0u8; w * h * 2];
    let mut scratch = Vec::new();
    to_yuyv(wire, src, &mut out, Geometry::new(w, h, src_stride, w * 2), &mut scratch).unwrap();
    out
}

#[test]
fn every_output_converts_at_its_frame_size() {
    let (w, h) = (32, 8);
    let yuyv = ramp(w, h);
    for format in ALL_OUTPUTS {
        let out = to_output(format, &yuyv, w, h);
        assert_eq!(out.len(), format.frame_size(w, h), "{format:?}");
    }
}

#[test]
fn output_is_a_pure_function_of_input() {
    let (w, h) = (16, 4);
    let yuyv = ramp(w, h);
    for format in ALL_OUTPUTS {
        let mut first = vec![0x11u8; format.frame_size(w, h)];
        let mut second = vec![0x99u8; format.frame_size(w, h)];
        let g = Geometry::new(w, h, w * 2, format.stride(w));
        from_yuyv(format, &yuyv, &mut first, g).unwrap();
        from_yuyv(format, &yuyv, &mut second, g).unwrap();
        if format != OutputFormat::Yv12 {
            // YV12 chroma rows carry alignment padding that is never written.
            assert_eq!(first, second, "{format:?}");
        }
    }
}

#[test]
fn semiplanar_round_trips_keep_luma() {
    let (w, h) = (16, 6);
    let yuyv = ramp(w, h);
    for (output, wire) in [
        (OutputFormat::Nv12, PlanarYuv::Nv12),
        (OutputFormat::Nv21, PlanarYuv::Nv21),
        (OutputFormat::I420, PlanarYuv::Yuv420),
        (OutputFormat::Nv16, PlanarYuv::Nv16),
    ] {
        let planar = to_output(output, &yuyv, w, h);
        let back = back_to_yuyv(WireFormat::Planar(wire), &planar, w, w, h);
        for (i, (&got, &want)) in back.iter().zip(&yuyv).enumerate() {
            let diff = got.abs_diff(want);
            if i % 2 == 0 {
                assert_eq!(diff, 0, "{output:?} luma byte {i}");
            } else {
                // The ramp moves chroma by at most 4 per row, so the 2-tap
                // average is off by at most 2.
                assert!(diff <= 2, "{output:?} chroma byte {i}: {got} vs {want}");
            }
        }
    }
}

#[test]
fn rgb_round_trip_is_close() {
    let (w, h) = (16, 4);
    let yuyv = muted(w, h);
    for (output, order) in [(OutputFormat::Rgb24, RgbOrder::Rgb), (OutputFormat::Bgr24, RgbOrder::Bgr)] {
        let rgb = to_output(output, &yuyv, w, h);
        let back = back_to_yuyv(WireFormat::Rgb(order), &rgb, w * 3, w, h);
        for (i, (&got, &want)) in back.iter().zip(&yuyv).enumerate().step_by(2) {
            assert!(got.abs_diff(want) <= 3, "{output:?} luma byte {i}: {got} vs {want}");
        }
    }
}

#[test]
fn packed_orders_reach_the_same_yuyv() {
    let (w, h) = (4, 2);
    let yuyv = ramp(w, h);
    let mut uyvy = yuyv.clone();
    for px in uyvy.chunks_exact_mut(4) {
        px.swap(0, 1);
        px.swap(2, 3);
    }
    assert_eq!(back_to_yuyv(WireFormat::Packed(PackedYuv::Uyvy), &uyvy, w * 2, w, h), yuyv);

    let mut yvyu = yuyv.clone();
    for px in yvyu.chunks_exact_mut(4) {
        px.swap(1, 3);
    }
    assert_eq!(back_to_yuyv(WireFormat::Packed(PackedYuv::Yvyu), &yvyu, w * 2, w, h), yuyv);
}

#[test]
fn source_row_padding_is_skipped() {
    let (w, h, stride) = (4, 3, 12);
    let mut grey = vec![0xffu8; stride * h];
    for y in 0..h {
        for x in 0..w {
            grey[y * stride + x] = (y * 10 + x) as u8;
        }
    }
    let out = back_to_yuyv(WireFormat::Grey, &grey, stride, w, h);
    assert_eq!(&out[..8], &[0, 128, 1, 128, 2, 128, 3, 128]);
    assert_eq!(&out[16..24], &[20, 128, 21, 128, 22, 128, 23, 128]);

    let y16: Vec<u8> = (0..w * h).flat_map(|i| [0x34, i as u8]).collect();
    let out = back_to_yuyv(WireFormat::Y16, &y16, w * 2, w, h);
    assert_eq!(&out[..4], &[0, 128, 1, 128]);
}

#[test]
fn destination_padding_is_untouched() {
    let (w, h, stride) = (4, 2, 12);
    let yuyv = ramp(w, h);
    let mut dst = vec![0xaau8; stride * h];
    from_yuyv(OutputFormat::Yuyv, &yuyv, &mut dst, Geometry::new(w, h, w * 2, stride)).unwrap();
    assert_eq!(&dst[..8], &yuyv[..8]);
    assert!(dst[8..12].iter().all(|&b| b == 0xaa));
    assert!(dst[20..].iter().all(|&b| b == 0xaa));
}

#[test]
fn argument_errors() {
    let yuyv = ramp(4, 2);
    let mut small = vec![0u8; 15];
    assert!(matches!(
        from_yuyv(OutputFormat::Yuyv, &yuyv, &mut small, Geometry::new(4, 2, 8, 8)),
        Err(ConvertError::BufferTooSmall { .. })
    ));

    let mut out = vec![0u8; 64];
    assert!(matches!(
        from_yuyv(OutputFormat::Nv12, &yuyv[..12], &mut out, Geometry::new(3, 2, 6, 3)),
        Err(ConvertError::OddDimensions { .. })
    ));

    let mut scratch = Vec::new();
    assert!(matches!(
        to_yuyv(
            WireFormat::Packed(PackedYuv::Yuyv),
            &yuyv,
            &mut out,
            Geometry::new(4, 2, 4, 8),
            &mut scratch
        ),
        Err(ConvertError::StrideTooShort { stride: 4, row: 8 })
    ));
}
