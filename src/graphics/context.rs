// Pipeline binding state and the per-frame render context
//
// Native APIs keep "what is currently bound" as implicit global state.
// Here it is an explicit value owned by the frame's context, so draw
// sequencing is visible and misuse is a defined error.

use anyhow::{bail, Result};

/// Primitive topology requested for subsequent draw calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveTopology {
    TriangleList,
    LineList,
    PointList,
}

/// Current pipeline bindings for one frame's recording scope.
///
/// Bindings never outlive the scope; `Geometry::draw` clears what it bound
/// before returning.
#[derive(Debug, Default, Clone, Copy)]
pub struct PipelineBindings {
    shader_bound: bool,
    vertex_bound: bool,
    index_bound: bool,
    topology: Option<PrimitiveTopology>,
}

impl PipelineBindings {
    pub fn bind_shader(&mut self) {
        self.shader_bound = true;
    }

    pub fn bind_vertex(&mut self) {
        self.vertex_bound = true;
    }

    pub fn bind_index(&mut self) {
        self.index_bound = true;
    }

    pub fn unbind_vertex(&mut self) {
        self.vertex_bound = false;
    }

    pub fn unbind_index(&mut self) {
        self.index_bound = false;
    }

    pub fn set_topology(&mut self, topology: PrimitiveTopology) {
        self.topology = Some(topology);
    }

    pub fn topology(&self) -> Option<PrimitiveTopology> {
        self.topology
    }

    pub fn is_clean(&self) -> bool {
        !self.shader_bound && !self.vertex_bound && !self.index_bound
    }

    /// An indexed draw needs shader, vertex buffer, index buffer and a
    /// topology all bound.
    pub fn ensure_drawable(&self) -> Result<()> {
        if !self.shader_bound {
            bail!("draw issued with no shader bound");
        }
        if !self.vertex_bound {
            bail!("draw issued with no vertex buffer bound");
        }
        if !self.index_bound {
            bail!("draw issued with no index buffer bound");
        }
        if self.topology.is_none() {
            bail!("draw issued with no primitive topology set");
        }
        Ok(())
    }
}

/// One frame's recording scope. The concrete Vulkan context writes into the
/// active command buffer; tests substitute a recording stand-in.
pub trait RenderContext {
    fn bindings(&self) -> &PipelineBindings;

    fn bindings_mut(&mut self) -> &mut PipelineBindings;

    /// Select the topology for subsequent draws.
    fn set_primitive_topology(&mut self, topology: PrimitiveTopology);

    /// Issue one indexed draw over `index_count` indices. Errors if the
    /// pipeline bindings are incomplete.
    fn draw_indexed(&mut self, index_count: u32) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draw_requires_full_bindings() {
        let mut bindings = PipelineBindings::default();
        assert!(bindings.ensure_drawable().is_err());

        bindings.bind_shader();
        bindings.bind_vertex();
        assert!(bindings.ensure_drawable().is_err());

        bindings.bind_index();
        assert!(bindings.ensure_drawable().is_err()); // still no topology

        bindings.set_topology(PrimitiveTopology::TriangleList);
        assert!(bindings.ensure_drawable().is_ok());
    }

    #[test]
    fn unbind_clears_state() {
        let mut bindings = PipelineBindings::default();
        assert!(bindings.is_clean());

        bindings.bind_shader();
        bindings.bind_vertex();
        bindings.bind_index();
        assert!(!bindings.is_clean());

        bindings.unbind_index();
        bindings.unbind_vertex();
        // Shader binding has no unbind in the original API; only buffer
        // bindings are cleared after a draw.
        assert!(!bindings.is_clean());
        assert!(bindings.ensure_drawable().is_err());
    }
}
