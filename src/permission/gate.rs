//! Single-flight permission requests.

use super::{PermissionHost, PermissionRequest};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;

/// Error code carried by every permission denial.
pub const PERMISSION_ERROR_CODE: &str = "cameraPermission";

/// Why a permission request did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PermissionDenied {
    /// Stable error code.
    pub code: &'static str,
    /// Human-readable reason.
    pub description: String,
}

impl PermissionDenied {
    fn new(description: &str) -> Self {
        Self {
            code: PERMISSION_ERROR_CODE,
            description: description.to_string(),
        }
    }

    fn camera() -> Self {
        Self::new("MediaRecorderCamera permission not granted")
    }

    fn audio() -> Self {
        Self::new("MediaRecorderAudio permission not granted")
    }

    fn ongoing() -> Self {
        Self::new("Camera permission request ongoing")
    }
}

/// Result of a permission request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionOutcome {
    /// Everything requested is granted.
    Granted,
    /// At least one requested permission is missing.
    Denied(PermissionDenied),
}

impl PermissionOutcome {
    /// Returns true for [`PermissionOutcome::Granted`].
    pub fn is_granted(&self) -> bool {
        matches!(self, PermissionOutcome::Granted)
    }
}

#[derive(Debug)]
struct InFlight {
    id: u64,
    covers_audio: bool,
    done: broadcast::Sender<()>,
}

#[derive(Debug, Default)]
struct Slot {
    next_id: u64,
    in_flight: Option<InFlight>,
}

enum Role {
    Lead { id: u64, done: broadcast::Sender<()> },
    Join(broadcast::Receiver<()>),
}

/// Answers permission queries and drives the request-and-wait flow.
///
/// Requests are single-flight. While a prompt is open, a second request
/// whose needs the open prompt covers waits for it instead of prompting
/// again; one that needs more (audio on top of a camera-only prompt) is
/// rejected. Every caller evaluates the host's grants itself once the
/// prompt has resolved, so each receives exactly one outcome.
pub struct PermissionGate {
    host: Arc<dyn PermissionHost>,
    slot: Mutex<Slot>,
}

/// Clears the in-flight slot if the leading request is dropped mid-prompt.
struct LeadGuard<'a> {
    gate: &'a PermissionGate,
    id: u64,
}

impl Drop for LeadGuard<'_> {
    fn drop(&mut self) {
        let mut slot = self.gate.lock();
        if slot.in_flight.as_ref().is_some_and(|f| f.id == self.id) {
            slot.in_flight = None;
        }
    }
}

impl PermissionGate {
    /// Creates a gate over a host.
    pub fn new(host: Arc<dyn PermissionHost>) -> Self {
        Self {
            host,
            slot: Mutex::new(Slot::default()),
        }
    }

    /// Camera access is granted.
    pub fn has_camera_permission(&self) -> bool {
        self.host.has_camera_permission()
    }

    /// Microphone access is granted.
    pub fn has_audio_permission(&self) -> bool {
        self.host.has_audio_permission()
    }

    /// Returns true if a prompt is currently open.
    pub fn is_request_pending(&self) -> bool {
        self.lock().in_flight.is_some()
    }

    /// Requests camera access, and microphone access if `needs_audio`.
    ///
    /// Short-circuits to `Granted` without prompting when everything is
    /// already granted.
    pub async fn request_permissions(&self, needs_audio: bool) -> PermissionOutcome {
        if self.evaluate(needs_audio).is_granted() {
            return PermissionOutcome::Granted;
        }

        let role = {
            let mut slot = self.lock();
            match slot.in_flight.as_ref() {
                Some(in_flight) if in_flight.covers_audio || !needs_audio => {
                    Role::Join(in_flight.done.subscribe())
                }
                Some(_) => {
                    tracing::warn!("permission request rejected, another request is ongoing");
                    return PermissionOutcome::Denied(PermissionDenied::ongoing());
                }
                None => {
                    slot.next_id += 1;
                    let id = slot.next_id;
                    let (done, _) = broadcast::channel(1);
                    slot.in_flight = Some(InFlight {
                        id,
                        covers_audio: needs_audio,
                        done: done.clone(),
                    });
                    Role::Lead { id, done }
                }
            }
        };

        match role {
            Role::Join(mut done) => {
                tracing::debug!("joining in-flight permission request");
                // Closed means the leader was dropped; the grants are read
                // back either way.
                let _ = done.recv().await;
            }
            Role::Lead { id, done } => {
                let _guard = LeadGuard { gate: self, id };
                let request = PermissionRequest {
                    camera: !self.host.has_camera_permission(),
                    audio: needs_audio && !self.host.has_audio_permission(),
                };
                tracing::info!(
                    camera = request.camera,
                    audio = request.audio,
                    "prompting for permissions"
                );
                self.host.prompt(request).await;

                let mut slot = self.lock();
                if slot.in_flight.as_ref().is_some_and(|f| f.id == id) {
                    slot.in_flight = None;
                }
                let _ = done.send(());
            }
        }

        let outcome = self.evaluate(needs_audio);
        match &outcome {
            PermissionOutcome::Granted => tracing::info!(audio = needs_audio, "permissions granted"),
            PermissionOutcome::Denied(denied) => {
                tracing::warn!(reason = %denied.description, "permissions denied")
            }
        }
        outcome
    }

    fn evaluate(&self, needs_audio: bool) -> PermissionOutcome {
        if !self.host.has_camera_permission() {
            PermissionOutcome::Denied(PermissionDenied::camera())
        } else if needs_audio && !self.host.has_audio_permission() {
            PermissionOutcome::Denied(PermissionDenied::audio())
        } else {
            PermissionOutcome::Granted
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(|e| {
            tracing::error!("permission gate mutex poisoned: {e}");
            e.into_inner()
        })
    }
}

impl std::fmt::Debug for PermissionGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionGate")
            .field("request_pending", &self.is_request_pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permission::ScriptedPermissionHost;

    fn gate(host: &ScriptedPermissionHost) -> Arc<PermissionGate> {
        Arc::new(PermissionGate::new(Arc::new(host.clone())))
    }

    #[tokio::test]
    async fn test_already_granted_short_circuits() {
        let host = ScriptedPermissionHost::granted();
        let gate = gate(&host);

        assert_eq!(gate.request_permissions(true).await, PermissionOutcome::Granted);
        assert_eq!(host.prompt_count(), 0);
    }

    #[tokio::test]
    async fn test_prompt_grants_camera() {
        let host = ScriptedPermissionHost::new(false, false);
        let gate = gate(&host);

        assert!(gate.request_permissions(false).await.is_granted());
        assert_eq!(host.prompt_count(), 1);
        assert!(gate.has_camera_permission());
        assert!(!gate.has_audio_permission());
    }

    #[tokio::test]
    async fn test_denied_audio_reports_audio() {
        let host = ScriptedPermissionHost::new(false, false);
        host.answer_with(true, false);
        let gate = gate(&host);

        match gate.request_permissions(true).await {
            PermissionOutcome::Denied(denied) => {
                assert_eq!(denied.code, PERMISSION_ERROR_CODE);
                assert_eq!(denied.description, "MediaRecorderAudio permission not granted");
            }
            other => panic!("expected denial, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_concurrent_requests_coalesce() {
        let host = ScriptedPermissionHost::new(false, false);
        host.hold_prompts(true);
        let gate = gate(&host);

        let first = tokio::spawn({
            let gate = Arc::clone(&gate);
            async move { gate.request_permissions(true).await }
        });
        while !gate.is_request_pending() {
            tokio::task::yield_now().await;
        }
        let second = tokio::spawn({
            let gate = Arc::clone(&gate);
            async move { gate.request_permissions(false).await }
        });
        tokio::task::yield_now().await;

        host.release(1);
        assert!(first.await.unwrap().is_granted());
        assert!(second.await.unwrap().is_granted());
        assert_eq!(host.prompt_count(), 1);
        assert!(!gate.is_request_pending());
    }

    #[tokio::test]
    async fn test_wider_request_during_prompt_is_rejected() {
        let host = ScriptedPermissionHost::new(false, false);
        host.hold_prompts(true);
        let gate = gate(&host);

        let first = tokio::spawn({
            let gate = Arc::clone(&gate);
            async move { gate.request_permissions(false).await }
        });
        while !gate.is_request_pending() {
            tokio::task::yield_now().await;
        }

        assert_eq!(
            gate.request_permissions(true).await,
            PermissionOutcome::Denied(PermissionDenied::ongoing())
        );

        host.release(1);
        assert!(first.await.unwrap().is_granted());
        assert_eq!(host.prompt_count(), 1);
    }

    #[tokio::test]
    async fn test_dropped_leader_frees_slot() {
        let host = ScriptedPermissionHost::new(false, false);
        host.hold_prompts(true);
        let gate = gate(&host);

        let leader = tokio::spawn({
            let gate = Arc::clone(&gate);
            async move { gate.request_permissions(false).await }
        });
        while !gate.is_request_pending() {
            tokio::task::yield_now().await;
        }
        leader.abort();
        let _ = leader.await;

        assert!(!gate.is_request_pending());
    }
}
