//! Properties of mode selection and crop geometry

use camgrab::capture::negotiate::{select_mode, CropGeometry};
use camgrab::capture::{FormatCatalog, SurfaceDescriptor, SurfaceSize};
use camgrab::device::mock::{SimulatedDevice, SimulatedMode};
use camgrab::device::CaptureDevice;
use camgrab::CaptureError;
use proptest::prelude::*;

fn descriptor() -> impl Strategy<Value = SurfaceDescriptor> {
    (1u32..64, 1u32..64, 1u32..61).prop_map(|(w, h, fps)| SurfaceDescriptor::new(w * 16, h * 16, fps))
}

fn selection_key(candidate: &SurfaceDescriptor, requested: &SurfaceDescriptor) -> (u64, u32) {
    (
        candidate.size.area() - requested.size.area(),
        candidate.fps.abs_diff(requested.fps),
    )
}

proptest! {
    /// The chosen mode covers the request and no covering mode beats it.
    #[test]
    fn selection_is_minimal(
        modes in prop::collection::vec(descriptor(), 1..24),
        requested in descriptor(),
    ) {
        let catalog = FormatCatalog::from_descriptors(modes);
        let covering: Vec<SurfaceDescriptor> = catalog
            .descriptors()
            .copied()
            .filter(|d| d.size.covers(requested.size))
            .collect();

        match select_mode(&catalog, requested) {
            Ok(selection) => {
                let chosen = selection.descriptor;
                prop_assert!(chosen.size.covers(requested.size));
                prop_assert!(chosen.size.area() >= requested.size.area());
                prop_assert_eq!(selection.needs_crop, chosen.size != requested.size);
                let best = selection_key(&chosen, &requested);
                for other in &covering {
                    prop_assert!(selection_key(other, &requested) >= best, "{} beats {}", other, chosen);
                }
            }
            Err(CaptureError::NoAcceptableMode { .. }) => prop_assert!(covering.is_empty()),
            Err(other) => prop_assert!(false, "unexpected error {}", other),
        }
    }

    /// Crop offsets are even and the crop stays inside the capture.
    #[test]
    fn crop_stays_inside_capture(
        capture_w in 2u32..2000,
        capture_h in 2u32..2000,
        requested_w in 2u32..2000,
        requested_h in 2u32..2000,
    ) {
        let capture = SurfaceSize::new(capture_w, capture_h);
        let crop = CropGeometry::compute(capture, SurfaceSize::new(requested_w, requested_h));
        prop_assert_eq!(crop.x % 2, 0);
        prop_assert_eq!(crop.y % 2, 0);
        prop_assert!(crop.x + crop.output.width <= capture.width);
        prop_assert!(crop.y + crop.output.height <= capture.height);
        prop_assert_eq!(crop.output.width, requested_w.min(capture_w));
        prop_assert_eq!(crop.output.height, requested_h.min(capture_h));
    }
}

#[test]
fn documented_crop_example() {
    let crop = CropGeometry::compute(SurfaceSize::new(128, 96), SurfaceSize::new(100, 75));
    assert_eq!((crop.x, crop.y), (14, 10));
}

#[test]
fn ties_go_to_the_first_catalog_entry() {
    // Same area delta and fps delta: catalog order (smaller width first) decides.
    let catalog = FormatCatalog::from_descriptors([
        SurfaceDescriptor::new(480, 640, 30),
        SurfaceDescriptor::new(640, 480, 30),
    ]);
    let selection = select_mode(&catalog, SurfaceDescriptor::new(320, 240, 30)).unwrap();
    assert_eq!(selection.descriptor, SurfaceDescriptor::new(480, 640, 30));
}

#[test]
fn catalog_enumeration_is_idempotent() {
    let device = SimulatedDevice::new(vec![
        SimulatedMode::yuyv(1280, 720, &[10, 5]),
        SimulatedMode::yuyv(640, 480, &[30]),
        SimulatedMode::mjpeg(1920, 1080, &[30, 15]),
    ]);
    assert!(device.query_capabilities().unwrap().streaming);
    let first = FormatCatalog::enumerate(&device);
    let second = FormatCatalog::enumerate(&device);
    assert_eq!(first, second);
    assert_eq!(first.best_preview_format(), SurfaceDescriptor::new(1920, 1080, 30));
    assert_eq!(first.best_picture_format(), SurfaceDescriptor::new(1920, 1080, 15));
}
