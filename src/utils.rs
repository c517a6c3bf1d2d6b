use std::path::Path;

use tracing::{debug, info};
use v4l::FourCC;

use crate::capture::frame::WireFormat;
use crate::device::{CaptureDevice, V4l2Device};
use crate::error::CaptureError;

/// Highest device node probed by [`auto_detect_device`].
const MAX_VIDEO_NODES: u32 = 64;

/// A capture device worth opening
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundDevice {
    pub path: String,
    pub card: String,
    /// Supported wire formats, best first
    pub formats: Vec<WireFormat>,
}

/// Wire formats among `fourccs` that can be converted, in negotiation order.
pub fn rank_formats(fourccs: &[FourCC]) -> Vec<WireFormat> {
    WireFormat::PRIORITY
        .iter()
        .copied()
        .filter(|wire| fourccs.contains(&wire.fourcc()))
        .collect()
}

/// First `/dev/videoN` that captures, streams and offers a convertible format.
pub fn auto_detect_device() -> Result<FoundDevice, CaptureError> {
    info!("Auto-detecting capture devices...");

    for i in 0..MAX_VIDEO_NODES {
        let path = format!("/dev/video{}", i);
        if !Path::new(&path).exists() {
            continue;
        }

        let device = match V4l2Device::open(&path) {
            Ok(device) => device,
            Err(e) => {
                debug!("Skipping {}: {}", path, e);
                continue;
            }
        };
        let Ok(caps) = device.query_capabilities() else {
            continue;
        };
        if !caps.video_capture || !caps.streaming {
            debug!("Skipping {} ({}): not a streaming capture node", path, caps.card);
            continue;
        }

        let formats = rank_formats(&device.enumerate_pixel_formats().unwrap_or_default());
        if let Some(best) = formats.first() {
            info!("Found {} device: {} - {}", best, path, caps.card);
            return Ok(FoundDevice {
                path,
                card: caps.card,
                formats,
            });
        }
        debug!("Skipping {} ({}): no supported pixel format", path, caps.card);
    }

    Err(CaptureError::DeviceUnavailable {
        path: "/dev/video*".into(),
        reason: "no suitable capture device found".into(),
    })
}
