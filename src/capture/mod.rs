pub mod catalog;
pub mod frame;
pub mod negotiate;
pub mod ring;
pub mod session;

pub use catalog::{FormatCatalog, SurfaceDescriptor, SurfaceSize};
pub use frame::{Frame, FrameMetadata, OutputFormat, WireFormat};
pub use negotiate::{CropGeometry, ModeSelection};
pub use session::{CaptureSession, DropReason, FrameInfo, FrameStatus, SessionOptions, SessionState};
