// Graphics module - backend-agnostic rendering contract
//
// Design: callers program against the GraphicsBackend trait only;
// one concrete backend per native API lives in a submodule (vulkan).

pub mod context;
pub mod geometry;
pub mod mesh;
pub mod vulkan;

pub use context::{PipelineBindings, PrimitiveTopology, RenderContext};
pub use geometry::Geometry;
pub use vulkan::VulkanBackend;

use anyhow::{bail, Result};
use glam::Mat4;

/// Caller-supplied rendering callback, executed inside a backend-managed
/// frame scope and kept as the "last render operation" for replay on redraw.
pub type RenderOperation<C> = Box<dyn FnMut(&mut C) -> Result<()>>;

/// Lifecycle contract a concrete rendering backend must satisfy.
///
/// State machine: Uninitialized -> Initialized -> (resize* | frame*) -> ShutDown.
/// Render operations before `initialize` or after `shutdown` are errors.
pub trait GraphicsBackend {
    /// Per-frame recording context handed to render operations.
    type Context: RenderContext;

    /// Acquire backend resources. Must be called exactly once before any
    /// render operation; device-creation failure is returned, not hidden.
    fn initialize(&mut self) -> Result<()>;

    /// Recreate size-dependent resources (swapchain, depth buffer,
    /// framebuffers). Callable any number of times after `initialize`.
    fn handle_resize(&mut self) -> Result<()>;

    /// Run one frame's present cycle, replaying the last render operation.
    fn redraw(&mut self) -> Result<()>;

    /// Execute `operation` within a frame scope and store it as the last
    /// render operation for later `redraw` calls.
    fn render(&mut self, operation: RenderOperation<Self::Context>) -> Result<()>;

    /// Release all backend resources. Idempotent; the object must remain
    /// safe to drop afterwards. Terminal: no rendering after shutdown.
    fn shutdown(&mut self) -> Result<()>;

    /// Toggle whether rendering should proceed. Used to suspend rendering
    /// (minimized window) without tearing down resources.
    fn set_render_active(&mut self, active: bool);

    fn is_render_active(&self) -> bool;

    /// Extension point for wiring an immediate-mode UI overlay. Invoked by
    /// `initialize` as its final step; applications do not call this.
    fn init_ui_overlay(&mut self) -> Result<()>;
}

/// Where a backend is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendPhase {
    Uninitialized,
    Initialized,
    ShutDown,
}

impl BackendPhase {
    /// Error unless the backend has been initialized and not shut down.
    pub fn ensure_operational(self) -> Result<()> {
        match self {
            BackendPhase::Initialized => Ok(()),
            BackendPhase::Uninitialized => bail!("backend not initialized"),
            BackendPhase::ShutDown => bail!("backend already shut down"),
        }
    }

    /// Error unless `initialize` has never run.
    pub fn ensure_uninitialized(self) -> Result<()> {
        match self {
            BackendPhase::Uninitialized => Ok(()),
            BackendPhase::Initialized => bail!("backend already initialized"),
            BackendPhase::ShutDown => bail!("backend already shut down"),
        }
    }
}

/// Perspective projection from vertical field of view (radians), aspect
/// ratio and near/far planes. Pure: no backend state involved.
pub fn perspective_projection(fov_y: f32, aspect_ratio: f32, near: f32, far: f32) -> Mat4 {
    Mat4::perspective_rh(fov_y, aspect_ratio, near, far)
}

/// Orthographic projection centered on the origin: x in [-width/2, width/2],
/// y in [-height/2, height/2]. Pure.
pub fn orthographic_projection(width: f32, height: f32, near: f32, far: f32) -> Mat4 {
    let half_width = width / 2.0;
    let half_height = height / 2.0;
    Mat4::orthographic_rh(-half_width, half_width, -half_height, half_height, near, far)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perspective_is_pure() {
        let a = perspective_projection(1.0, 16.0 / 9.0, 0.1, 100.0);
        let b = perspective_projection(1.0, 16.0 / 9.0, 0.1, 100.0);
        assert_eq!(a.to_cols_array(), b.to_cols_array());
    }

    #[test]
    fn perspective_matches_glam() {
        let m = perspective_projection(0.8, 1.5, 0.5, 50.0);
        assert_eq!(
            m.to_cols_array(),
            Mat4::perspective_rh(0.8, 1.5, 0.5, 50.0).to_cols_array()
        );
    }

    #[test]
    fn orthographic_bounds_are_centered() {
        let m = orthographic_projection(8.0, 6.0, 0.1, 10.0);
        let expected = Mat4::orthographic_rh(-4.0, 4.0, -3.0, 3.0, 0.1, 10.0);
        assert_eq!(m.to_cols_array(), expected.to_cols_array());

        let again = orthographic_projection(8.0, 6.0, 0.1, 10.0);
        assert_eq!(m.to_cols_array(), again.to_cols_array());
    }

    #[test]
    fn phase_guards() {
        assert!(BackendPhase::Uninitialized.ensure_operational().is_err());
        assert!(BackendPhase::Initialized.ensure_operational().is_ok());
        assert!(BackendPhase::ShutDown.ensure_operational().is_err());

        assert!(BackendPhase::Uninitialized.ensure_uninitialized().is_ok());
        assert!(BackendPhase::Initialized.ensure_uninitialized().is_err());
        assert!(BackendPhase::ShutDown.ensure_uninitialized().is_err());
    }
}
