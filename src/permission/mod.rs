//! Camera and microphone permission gating.
//!
//! The platform's permission store is reached through [`PermissionHost`];
//! [`PermissionGate`] sits on top of it and makes requests single-flight.

mod gate;
mod host;

pub use gate::{PermissionDenied, PermissionGate, PermissionOutcome, PERMISSION_ERROR_CODE};
pub use host::{PermissionHost, PermissionRequest, ScriptedPermissionHost};
