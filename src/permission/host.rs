//! Host-side permission prompt.

use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Semaphore;

/// The permissions a prompt asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionRequest {
    /// Ask for camera access.
    pub camera: bool,
    /// Ask for microphone access.
    pub audio: bool,
}

/// Platform permission store and prompt.
///
/// Implemented by the embedding application. `prompt` shows whatever
/// user-facing dialog the platform has and resolves once the user has
/// answered; the gate reads the outcome back through the `has_*` queries.
#[async_trait]
pub trait PermissionHost: Send + Sync {
    /// Camera access is currently granted.
    fn has_camera_permission(&self) -> bool;

    /// Microphone access is currently granted.
    fn has_audio_permission(&self) -> bool;

    /// Prompts for the requested permissions.
    async fn prompt(&self, request: PermissionRequest);
}

#[derive(Debug)]
struct HostState {
    camera: bool,
    audio: bool,
    grant_camera: bool,
    grant_audio: bool,
    hold: bool,
    prompts: u32,
}

/// Permission host with scripted answers.
///
/// Used by the demo binary and the tests. Clones share state.
#[derive(Debug, Clone)]
pub struct ScriptedPermissionHost {
    state: Arc<Mutex<HostState>>,
    released: Arc<Semaphore>,
}

impl ScriptedPermissionHost {
    /// Host where both permissions are already granted.
    pub fn granted() -> Self {
        Self::new(true, true)
    }

    /// Host with the given current grants. Prompts grant everything
    /// unless changed with [`ScriptedPermissionHost::answer_with`].
    pub fn new(camera: bool, audio: bool) -> Self {
        Self {
            state: Arc::new(Mutex::new(HostState {
                camera,
                audio,
                grant_camera: true,
                grant_audio: true,
                hold: false,
                prompts: 0,
            })),
            released: Arc::new(Semaphore::new(0)),
        }
    }

    /// Sets what the user answers when prompted.
    pub fn answer_with(&self, grant_camera: bool, grant_audio: bool) {
        let mut state = self.lock();
        state.grant_camera = grant_camera;
        state.grant_audio = grant_audio;
    }

    /// Keeps prompts open until [`ScriptedPermissionHost::release`].
    pub fn hold_prompts(&self, hold: bool) {
        self.lock().hold = hold;
    }

    /// Lets `count` held prompts resolve.
    pub fn release(&self, count: usize) {
        self.released.add_permits(count);
    }

    /// Revokes camera access.
    pub fn revoke_camera(&self) {
        self.lock().camera = false;
    }

    /// Number of prompts shown.
    pub fn prompt_count(&self) -> u32 {
        self.lock().prompts
    }

    fn lock(&self) -> MutexGuard<'_, HostState> {
        self.state.lock().unwrap_or_else(|e| {
            tracing::error!("permission host mutex poisoned: {e}");
            e.into_inner()
        })
    }
}

#[async_trait]
impl PermissionHost for ScriptedPermissionHost {
    fn has_camera_permission(&self) -> bool {
        self.lock().camera
    }

    fn has_audio_permission(&self) -> bool {
        self.lock().audio
    }

    async fn prompt(&self, request: PermissionRequest) {
        let hold = {
            let mut state = self.lock();
            state.prompts += 1;
            state.hold
        };
        if hold {
            match self.released.acquire().await {
                Ok(permit) => permit.forget(),
                Err(_) => return,
            }
        }

        let mut state = self.lock();
        if request.camera && state.grant_camera {
            state.camera = true;
        }
        if request.audio && state.grant_audio {
            state.audio = true;
        }
        tracing::debug!(
            camera = state.camera,
            audio = state.audio,
            "permission prompt answered"
        );
    }
}
