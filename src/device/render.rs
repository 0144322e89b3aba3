//! Render-target allocation.
//!
//! The surface the preview is drawn into belongs to the host; the
//! controller only allocates one per session and releases it on teardown.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Opaque id of an allocated render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TextureId(pub u64);

impl fmt::Display for TextureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "texture-{}", self.0)
    }
}

/// Render target allocation failed.
#[derive(Debug, Clone, Error)]
#[error("failed to allocate render target: {0}")]
pub struct RenderTargetError(pub String);

/// Allocates and releases preview surfaces.
pub trait RenderTargets: Send {
    /// Allocates a new surface.
    fn allocate(&mut self) -> Result<TextureId, RenderTargetError>;

    /// Releases a surface. Releasing an unknown id is a no-op.
    fn release(&mut self, texture: TextureId);
}

#[derive(Debug, Default)]
struct Registry {
    next_id: u64,
    live: HashSet<TextureId>,
    exhausted: bool,
}

/// Process-local render target registry.
///
/// Clones share the same registry, so a test or host can keep one clone
/// to inspect which surfaces are still live.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRenderTargets {
    inner: Arc<Mutex<Registry>>,
}

impl InMemoryRenderTargets {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of currently allocated surfaces.
    pub fn live_count(&self) -> usize {
        self.lock().live.len()
    }

    /// Returns true if `texture` is allocated.
    pub fn is_live(&self, texture: TextureId) -> bool {
        self.lock().live.contains(&texture)
    }

    /// Makes every further allocation fail.
    pub fn set_exhausted(&self, exhausted: bool) {
        self.lock().exhausted = exhausted;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Registry> {
        self.inner.lock().unwrap_or_else(|e| {
            tracing::error!("render target registry mutex poisoned: {e}");
            e.into_inner()
        })
    }
}

impl RenderTargets for InMemoryRenderTargets {
    fn allocate(&mut self) -> Result<TextureId, RenderTargetError> {
        let mut registry = self.lock();
        if registry.exhausted {
            return Err(RenderTargetError("no surfaces available".to_string()));
        }
        registry.next_id += 1;
        let texture = TextureId(registry.next_id);
        registry.live.insert(texture);
        tracing::debug!(%texture, "render target allocated");
        Ok(texture)
    }

    fn release(&mut self, texture: TextureId) {
        if self.lock().live.remove(&texture) {
            tracing::debug!(%texture, "render target released");
        }
    }
}
