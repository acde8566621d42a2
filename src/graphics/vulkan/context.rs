// Per-frame render context
//
// Fills the role the original API's immediate device context played: the
// recording target for one frame, carrying the explicit pipeline binding
// state alongside the native command buffer.

use anyhow::{bail, Result};
use ash::vk;
use std::sync::Arc;

use crate::graphics::context::{PipelineBindings, PrimitiveTopology, RenderContext};

use super::VulkanDevice;

pub struct VulkanContext {
    device: Arc<VulkanDevice>,
    cmd: vk::CommandBuffer,
    bindings: PipelineBindings,
}

impl VulkanContext {
    pub(crate) fn new(device: Arc<VulkanDevice>, cmd: vk::CommandBuffer) -> Self {
        Self {
            device,
            cmd,
            bindings: PipelineBindings::default(),
        }
    }

    pub(crate) fn command_buffer(&self) -> vk::CommandBuffer {
        self.cmd
    }
}

impl RenderContext for VulkanContext {
    fn bindings(&self) -> &PipelineBindings {
        &self.bindings
    }

    fn bindings_mut(&mut self) -> &mut PipelineBindings {
        &mut self.bindings
    }

    fn set_primitive_topology(&mut self, topology: PrimitiveTopology) {
        // Topology is baked into the bound pipeline; the request is tracked
        // here and validated when the draw is issued
        self.bindings.set_topology(topology);
    }

    fn draw_indexed(&mut self, index_count: u32) -> Result<()> {
        self.bindings.ensure_drawable()?;
        if self.bindings.topology() != Some(PrimitiveTopology::TriangleList) {
            bail!("bound pipeline renders triangle lists only");
        }
        unsafe {
            self.device
                .device
                .cmd_draw_indexed(self.cmd, index_count, 1, 0, 0, 0);
        }
        Ok(())
    }
}
