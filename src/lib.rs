//! V4L2 camera capture with mode negotiation, pixel conversion and a
//! baseline MJPEG decoder.

pub mod capture;
pub mod convert;
pub mod device;
pub mod error;
pub mod jpeg;
pub mod pipeline;
pub mod utils;

use std::path::{Path, PathBuf};

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

use crate::capture::frame::OutputFormat;

pub use capture::{CaptureSession, Frame, FrameStatus};
pub use error::{CaptureError, ConvertError, DecodeError};

/// Active configuration, swapped atomically when reloaded
pub static CONFIG: once_cell::sync::Lazy<ArcSwap<Config>> =
    once_cell::sync::Lazy::new(|| ArcSwap::from_pointee(Config::default()));

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub capture: CaptureConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Device node; empty picks the first usable `/dev/video*`
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub buffer_count: u32,
    pub output_format: OutputFormat,
    pub max_dequeue_failures: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Frames in flight between the capture worker and the consumer
    pub channel_capacity: usize,
    pub ring_buffer_size: usize,
    pub pin_core: Option<usize>,
    pub frame_limit: Option<u64>,
    pub stats_interval_ms: u64,
    /// Append every converted frame to this file
    pub dump_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capture: CaptureConfig {
                device: String::new(),
                width: 640,
                height: 480,
                fps: 30,
                buffer_count: 4,
                output_format: OutputFormat::Yuyv,
                max_dequeue_failures: 8,
            },
            pipeline: PipelineConfig {
                channel_capacity: 4,
                ring_buffer_size: 8,
                pin_core: None,
                frame_limit: None,
                stats_interval_ms: 5000,
                dump_path: None,
            },
        }
    }
}

impl Config {
    /// Defaults, overlaid by the TOML file at `path` if it exists, overlaid
    /// by `CAMGRAB__SECTION__KEY` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder().add_source(config::Config::try_from(&Config::default())?);
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        builder
            .add_source(
                config::Environment::with_prefix("CAMGRAB")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[capture]\nwidth = 1280\nheight = 720\noutput_format = \"nv21\"\n\n[pipeline]\nframe_limit = 10"
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.capture.width, 1280);
        assert_eq!(config.capture.height, 720);
        assert_eq!(config.capture.output_format, OutputFormat::Nv21);
        assert_eq!(config.capture.fps, 30);
        assert_eq!(config.pipeline.frame_limit, Some(10));
        assert_eq!(config.pipeline.dump_path, None);
    }

    #[test]
    fn missing_file_keeps_defaults() {
        let config = Config::load(Some(Path::new("/nonexistent/camgrab.toml"))).unwrap();
        assert_eq!(config, Config::default());
    }
}
