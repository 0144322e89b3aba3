//! Camera hardware boundary.
//!
//! This module describes what the session controller needs from a camera
//! driver and from the host's render-target registry, plus the data that
//! crosses that boundary: descriptors, presets and frames. The controller
//! never talks to hardware except through [`CameraBackend`] and
//! [`CameraDevice`].

mod descriptor;
mod driver;
mod frame;
mod mock;
mod render;
#[cfg(feature = "camera")]
mod webcam;

pub use descriptor::{CameraDescriptor, LensDirection, Resolution, ResolutionPreset, UnknownPreset};
pub use driver::{
    CameraBackend, CameraDevice, DriverCallback, DriverCapabilities, DriverError, DriverEvent,
    DriverMessage, OpenRequest,
};
pub use frame::{Frame, ImageFormat, Plane};
pub use mock::{MockBackend, MockConfig, MockControl};
pub use render::{InMemoryRenderTargets, RenderTargetError, RenderTargets, TextureId};
#[cfg(feature = "camera")]
pub use webcam::NokhwaBackend;
