//! Mode selection, crop geometry and wire format negotiation

use tracing::{debug, info, instrument, warn};

use crate::capture::catalog::{FormatCatalog, SurfaceDescriptor, SurfaceSize};
use crate::capture::frame::WireFormat;
use crate::device::{CaptureDevice, PixFormat};
use crate::error::CaptureError;

/// Descriptor picked for a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeSelection {
    pub descriptor: SurfaceDescriptor,
    /// The chosen size differs from the requested one
    pub needs_crop: bool,
}

/// Smallest mode covering the requested size, closest frame rate second.
///
/// Candidates are scanned in catalog order and only a strictly better
/// `(area delta, fps delta)` pair replaces the current pick.
pub fn select_mode(
    catalog: &FormatCatalog,
    requested: SurfaceDescriptor,
) -> Result<ModeSelection, CaptureError> {
    let no_mode = |reason: &str| CaptureError::NoAcceptableMode {
        width: requested.size.width,
        height: requested.size.height,
        fps: requested.fps,
        reason: reason.to_owned(),
    };

    if catalog.is_empty() {
        return Err(no_mode("device advertises no modes"));
    }

    let mut best: Option<((u64, u32), SurfaceDescriptor)> = None;
    for candidate in catalog.descriptors() {
        if !candidate.size.covers(requested.size) {
            continue;
        }
        let key = (
            candidate.size.area() - requested.size.area(),
            candidate.fps.abs_diff(requested.fps),
        );
        if best.map_or(true, |(current, _)| key < current) {
            best = Some((key, *candidate));
        }
    }

    let (_, descriptor) = best.ok_or_else(|| no_mode("every mode is smaller than requested"))?;
    Ok(ModeSelection {
        descriptor,
        needs_crop: descriptor.size != requested.size,
    })
}

/// Centered sub-rectangle of the capture that becomes the output frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropGeometry {
    pub x: u32,
    pub y: u32,
    pub output: SurfaceSize,
}

impl CropGeometry {
    /// Center `requested` inside `capture` on even coordinates.
    ///
    /// An axis where the capture came out smaller than requested is not an
    /// error: the output shrinks to the capture on that axis.
    pub fn compute(capture: SurfaceSize, requested: SurfaceSize) -> Self {
        let (x, width) = crop_axis("width", capture.width, requested.width);
        let (y, height) = crop_axis("height", capture.height, requested.height);
        Self {
            x,
            y,
            output: SurfaceSize::new(width, height),
        }
    }

    /// Output anchored at the origin, for layouts that cannot be offset.
    pub fn top_left(capture: SurfaceSize, requested: SurfaceSize) -> Self {
        let (_, width) = crop_axis("width", capture.width, requested.width);
        let (_, height) = crop_axis("height", capture.height, requested.height);
        Self {
            x: 0,
            y: 0,
            output: SurfaceSize::new(width, height),
        }
    }

    pub fn is_identity(&self, capture: SurfaceSize) -> bool {
        self.x == 0 && self.y == 0 && self.output == capture
    }
}

fn crop_axis(axis: &str, capture: u32, requested: u32) -> (u32, u32) {
    if capture < requested {
        warn!(
            "Device {} {} is below the requested {}, shrinking output",
            axis, capture, requested
        );
        return (0, capture);
    }
    (((capture - requested) / 2) & !1, requested)
}

/// Find the first wire format in priority order the device accepts at the
/// chosen size.
///
/// Formats that cannot be cropped in software are skipped when the selection
/// needs a crop. A first pass insists on the exact size; if nothing matches,
/// a second pass takes any format the device keeps, whatever size it adjusts
/// to.
#[instrument(skip(device))]
pub fn negotiate_wire_format<D: CaptureDevice + ?Sized>(
    device: &D,
    selection: &ModeSelection,
) -> Result<(WireFormat, PixFormat), CaptureError> {
    let size = selection.descriptor.size;
    let candidates: Vec<WireFormat> = WireFormat::PRIORITY
        .iter()
        .copied()
        .filter(|wire| !selection.needs_crop || wire.traits().crop_safe)
        .collect();

    let mut adjusted = None;
    for &wire in &candidates {
        let request = PixFormat::request(wire.fourcc(), size.width, size.height);
        match device.try_format(&request) {
            Ok(actual) if actual.fourcc != request.fourcc => {
                debug!("{} rejected, driver offered {}", wire, actual.fourcc);
            }
            Ok(actual) if actual.size() == size => {
                info!("Negotiated {} at {}", wire, size);
                return Ok((wire, actual));
            }
            Ok(actual) => {
                debug!("{} accepted at {} instead of {}", wire, actual.size(), size);
                adjusted.get_or_insert((wire, actual));
            }
            Err(e) => debug!("{} rejected at {}: {}", wire, size, e),
        }
    }

    if let Some((wire, actual)) = adjusted {
        warn!(
            "No format matches {} exactly, falling back to {} at {}",
            size,
            wire,
            actual.size()
        );
        return Ok((wire, actual));
    }

    Err(CaptureError::NoAcceptableMode {
        width: size.width,
        height: size.height,
        fps: selection.descriptor.fps,
        reason: if selection.needs_crop {
            "no crop-safe wire format accepted".into()
        } else {
            "no wire format accepted".into()
        },
    })
}
