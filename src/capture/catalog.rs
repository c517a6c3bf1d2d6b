//! Device mode catalog: every (size, fps) pair a device advertises

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;

use tracing::{debug, info, instrument, warn};
use v4l::FourCC;

use crate::capture::frame::WireFormat;
use crate::device::{CaptureDevice, IntervalSpec, PixFormat, SizeSpec};

/// Sizes probed when a format only reports stepwise or continuous ranges.
pub const FALLBACK_SIZES: [SurfaceSize; 10] = [
    SurfaceSize::new(800, 600),
    SurfaceSize::new(768, 576),
    SurfaceSize::new(768, 480),
    SurfaceSize::new(720, 576),
    SurfaceSize::new(720, 480),
    SurfaceSize::new(704, 576),
    SurfaceSize::new(704, 480),
    SurfaceSize::new(640, 480),
    SurfaceSize::new(352, 288),
    SurfaceSize::new(320, 240),
];

/// Frame rate assumed for probed sizes.
pub const FALLBACK_FPS: u32 = 25;

/// Width and height in pixels, ordered by area
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SurfaceSize {
    pub width: u32,
    pub height: u32,
}

impl SurfaceSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn area(self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Both axes at least as large as `other`.
    pub fn covers(self, other: SurfaceSize) -> bool {
        self.width >= other.width && self.height >= other.height
    }
}

impl Ord for SurfaceSize {
    fn cmp(&self, other: &Self) -> Ordering {
        self.area()
            .cmp(&other.area())
            .then(self.width.cmp(&other.width))
            .then(self.height.cmp(&other.height))
    }
}

impl PartialOrd for SurfaceSize {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for SurfaceSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// One advertised capability. Ordered by size, then fps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurfaceDescriptor {
    pub size: SurfaceSize,
    pub fps: u32,
}

impl SurfaceDescriptor {
    pub const fn new(width: u32, height: u32, fps: u32) -> Self {
        Self {
            size: SurfaceSize::new(width, height),
            fps,
        }
    }

    /// The zero descriptor stands for "no modes available".
    pub fn is_available(&self) -> bool {
        !self.size.is_empty() && self.fps > 0
    }
}

impl fmt::Display for SurfaceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.size, self.fps)
    }
}

/// Ordered, de-duplicated set of descriptors with the best picks cached
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormatCatalog {
    descriptors: BTreeSet<SurfaceDescriptor>,
    best_preview: SurfaceDescriptor,
    best_picture: SurfaceDescriptor,
}

impl FormatCatalog {
    /// Walk every supported pixel format, size and interval the device reports.
    ///
    /// Never fails: enumeration errors are logged and leave the catalog short
    /// or empty.
    #[instrument(skip(device))]
    pub fn enumerate<D: CaptureDevice + ?Sized>(device: &D) -> Self {
        let mut catalog = Self::default();

        let formats = match device.enumerate_pixel_formats() {
            Ok(formats) => formats,
            Err(e) => {
                warn!("Pixel format enumeration failed: {}", e);
                return catalog;
            }
        };

        for fourcc in formats {
            let Some(wire) = WireFormat::from_fourcc(fourcc) else {
                debug!("Skipping unsupported pixel format {}", fourcc);
                continue;
            };

            let sizes = device.enumerate_frame_sizes(fourcc).unwrap_or_else(|e| {
                debug!("No frame sizes for {}: {}", wire, e);
                Vec::new()
            });

            let mut discrete = 0;
            for spec in sizes {
                match spec {
                    SizeSpec::Discrete(size) if !size.is_empty() => {
                        discrete += 1;
                        catalog.add_intervals(device, fourcc, size);
                    }
                    SizeSpec::Discrete(_) => {}
                    SizeSpec::Stepwise { min, max, step } => {
                        debug!("{}: stepwise sizes {} to {} step {}", wire, min, max, step);
                    }
                }
            }

            if discrete == 0 {
                catalog.probe_fallback_sizes(device, fourcc);
            }
        }

        info!(
            "Catalog: {} modes, best preview {}, best picture {}",
            catalog.len(),
            catalog.best_preview,
            catalog.best_picture
        );
        catalog
    }

    pub fn from_descriptors<I>(descriptors: I) -> Self
    where
        I: IntoIterator<Item = SurfaceDescriptor>,
    {
        let mut catalog = Self::default();
        for descriptor in descriptors {
            catalog.insert(descriptor);
        }
        catalog
    }

    /// Insert a descriptor; zero fps is normalized to 1, empty sizes are ignored.
    pub fn insert(&mut self, mut descriptor: SurfaceDescriptor) {
        if descriptor.size.is_empty() {
            return;
        }
        descriptor.fps = descriptor.fps.max(1);

        let preview = &self.best_preview;
        if descriptor.fps > preview.fps
            || (descriptor.fps == preview.fps && descriptor.size > preview.size)
        {
            self.best_preview = descriptor;
        }

        // Lower fps at equal size is assumed to mean less binning. Heuristic only.
        let picture = &self.best_picture;
        if descriptor.size > picture.size
            || (descriptor.size == picture.size && descriptor.fps < picture.fps)
        {
            self.best_picture = descriptor;
        }

        self.descriptors.insert(descriptor);
    }

    fn add_intervals<D: CaptureDevice + ?Sized>(
        &mut self,
        device: &D,
        fourcc: FourCC,
        size: SurfaceSize,
    ) {
        let intervals = device
            .enumerate_frame_intervals(fourcc, size.width, size.height)
            .unwrap_or_default();

        let mut added = 0;
        for interval in intervals {
            if let IntervalSpec::Discrete(interval) = interval {
                self.insert(SurfaceDescriptor {
                    size,
                    fps: interval.fps(),
                });
                added += 1;
            }
        }

        if added == 0 {
            self.insert(SurfaceDescriptor { size, fps: 1 });
        }
    }

    fn probe_fallback_sizes<D: CaptureDevice + ?Sized>(&mut self, device: &D, fourcc: FourCC) {
        debug!("Probing standard sizes for {}", fourcc);
        for size in FALLBACK_SIZES {
            let request = PixFormat::request(fourcc, size.width, size.height);
            match device.try_format(&request) {
                Ok(actual) if actual.fourcc == fourcc => {
                    self.insert(SurfaceDescriptor {
                        size: actual.size(),
                        fps: FALLBACK_FPS,
                    });
                }
                Ok(_) => {}
                Err(e) => debug!("{} rejected {}: {}", fourcc, size, e),
            }
        }
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &SurfaceDescriptor> {
        self.descriptors.iter()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Highest fps, ties broken by the larger size.
    pub fn best_preview_format(&self) -> SurfaceDescriptor {
        self.best_preview
    }

    /// Largest size, ties broken by the lower fps.
    pub fn best_picture_format(&self) -> SurfaceDescriptor {
        self.best_picture
    }

    pub fn available_sizes(&self) -> BTreeSet<SurfaceSize> {
        self.descriptors.iter().map(|d| d.size).collect()
    }

    pub fn available_frame_rates(&self) -> BTreeSet<u32> {
        self.descriptors.iter().map(|d| d.fps).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::mock::{SimulatedDevice, SimulatedMode};

    #[test]
    fn size_orders_by_area_first() {
        let wide = SurfaceSize::new(640, 120);
        let square = SurfaceSize::new(320, 320);
        assert!(wide < square);
        assert!(SurfaceSize::new(480, 640) < SurfaceSize::new(640, 480));
    }

    #[test]
    fn best_picks() {
        let catalog = FormatCatalog::from_descriptors([
            SurfaceDescriptor::new(640, 480, 30),
            SurfaceDescriptor::new(1280, 720, 10),
            SurfaceDescriptor::new(1280, 720, 5),
            SurfaceDescriptor::new(320, 240, 30),
            SurfaceDescriptor::new(640, 480, 30),
        ]);
        assert_eq!(catalog.len(), 4);
        assert_eq!(
            catalog.best_preview_format(),
            SurfaceDescriptor::new(640, 480, 30)
        );
        assert_eq!(
            catalog.best_picture_format(),
            SurfaceDescriptor::new(1280, 720, 5)
        );
        assert_eq!(
            catalog.available_frame_rates().into_iter().collect::<Vec<_>>(),
            vec![5, 10, 30]
        );
        assert_eq!(catalog.available_sizes().len(), 3);
    }

    #[test]
    fn zero_fps_is_normalized() {
        let catalog = FormatCatalog::from_descriptors([
            SurfaceDescriptor::new(640, 480, 0),
            SurfaceDescriptor::new(0, 480, 30),
        ]);
        let all: Vec<_> = catalog.descriptors().copied().collect();
        assert_eq!(all, vec![SurfaceDescriptor::new(640, 480, 1)]);
    }

    #[test]
    fn empty_device_yields_zero_descriptors() {
        let device = SimulatedDevice::new(Vec::new());
        let catalog = FormatCatalog::enumerate(&device);
        assert!(catalog.is_empty());
        assert_eq!(catalog.best_preview_format(), SurfaceDescriptor::default());
        assert!(!catalog.best_picture_format().is_available());
    }

    #[test]
    fn sizes_without_intervals_get_one_fps() {
        let device = SimulatedDevice::new(vec![SimulatedMode::yuyv(640, 480, &[])]);
        let catalog = FormatCatalog::enumerate(&device);
        let all: Vec<_> = catalog.descriptors().copied().collect();
        assert_eq!(all, vec![SurfaceDescriptor::new(640, 480, 1)]);
    }

    #[test]
    fn stepwise_devices_are_probed() {
        let device = SimulatedDevice::new(vec![SimulatedMode::yuyv(640, 480, &[30])]).stepwise();
        let catalog = FormatCatalog::enumerate(&device);
        // The simulated driver clamps every probe to its only mode.
        let all: Vec<_> = catalog.descriptors().copied().collect();
        assert_eq!(all, vec![SurfaceDescriptor::new(640, 480, FALLBACK_FPS)]);
    }

    #[test]
    fn enumeration_is_repeatable() {
        let device = SimulatedDevice::new(vec![
            SimulatedMode::yuyv(640, 480, &[30, 15]),
            SimulatedMode::mjpeg(1280, 720, &[30]),
        ]);
        let first = FormatCatalog::enumerate(&device);
        let second = FormatCatalog::enumerate(&device);
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
        assert_eq!(
            first.best_preview_format(),
            SurfaceDescriptor::new(1280, 720, 30)
        );
    }
}
