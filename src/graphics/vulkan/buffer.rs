// Vertex and index buffers
//
// Host-visible allocations through the device allocator; data staged on
// the CPU side uploads on create(), so a rebake after set_data rebuilds
// the GPU copy.

use anyhow::{bail, Context, Result};
use ash::vk;
use bytemuck::Pod;
use gpu_allocator::vulkan::Allocation;
use gpu_allocator::MemoryLocation;
use std::sync::Arc;

use crate::graphics::context::RenderContext;
use crate::graphics::geometry::{IndexBuffer, VertexBuffer};
use crate::graphics::mesh::{Indices, VertexArray};

use super::context::VulkanContext;
use super::VulkanDevice;

/// A buffer handle plus its backing allocation.
struct GpuBuffer {
    buffer: vk::Buffer,
    allocation: Option<Allocation>,
}

impl GpuBuffer {
    /// Create a host-visible buffer and copy `data` into it.
    fn with_data<T: Pod>(
        device: &Arc<VulkanDevice>,
        usage: vk::BufferUsageFlags,
        name: &str,
        data: &[T],
    ) -> Result<Self> {
        let size = std::mem::size_of_val(data) as vk::DeviceSize;

        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe {
            device
                .device
                .create_buffer(&buffer_info, None)
                .context("Failed to create buffer")?
        };

        let requirements = unsafe { device.device.get_buffer_memory_requirements(buffer) };

        let mut allocation = match device.allocate(name, requirements, MemoryLocation::CpuToGpu, true)
        {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        unsafe {
            device
                .device
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
                .context("Failed to bind buffer memory")?;
        }

        let bytes = bytemuck::cast_slice(data);
        allocation
            .mapped_slice_mut()
            .context("Buffer memory not host mappable")?[..bytes.len()]
            .copy_from_slice(bytes);

        Ok(Self {
            buffer,
            allocation: Some(allocation),
        })
    }

    fn destroy(mut self, device: &VulkanDevice) {
        unsafe { device.device.destroy_buffer(self.buffer, None) };
        if let Some(allocation) = self.allocation.take() {
            device.free(allocation);
        }
    }
}

/// GPU vertex buffer with CPU-side staging.
pub struct VulkanVertexBuffer {
    device: Arc<VulkanDevice>,
    staged: VertexArray,
    gpu: Option<GpuBuffer>,
}

impl VulkanVertexBuffer {
    pub fn new(device: Arc<VulkanDevice>) -> Self {
        Self {
            device,
            staged: Vec::new(),
            gpu: None,
        }
    }
}

impl VertexBuffer<VulkanContext> for VulkanVertexBuffer {
    fn create(&mut self) -> Result<()> {
        if self.staged.is_empty() {
            bail!("vertex buffer created with no staged data");
        }
        self.release();
        let gpu = GpuBuffer::with_data(
            &self.device,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            "vertex buffer",
            &self.staged,
        )?;
        log::debug!("Vertex buffer created with {} vertices", self.staged.len());
        self.gpu = Some(gpu);
        Ok(())
    }

    fn bind(&mut self, ctx: &mut VulkanContext) -> Result<()> {
        let gpu = self.gpu.as_ref().context("vertex buffer not created")?;
        unsafe {
            self.device.device.cmd_bind_vertex_buffers(
                ctx.command_buffer(),
                0,
                &[gpu.buffer],
                &[0],
            );
        }
        ctx.bindings_mut().bind_vertex();
        Ok(())
    }

    fn unbind(&mut self, ctx: &mut VulkanContext) {
        // Vulkan has no unbind; the binding expires with the command buffer
        ctx.bindings_mut().unbind_vertex();
    }

    fn set_data(&mut self, vertices: VertexArray) {
        self.staged = vertices;
    }

    fn release(&mut self) {
        if let Some(gpu) = self.gpu.take() {
            gpu.destroy(&self.device);
        }
    }
}

impl Drop for VulkanVertexBuffer {
    fn drop(&mut self) {
        self.release();
    }
}

/// GPU index buffer with CPU-side staging.
pub struct VulkanIndexBuffer {
    device: Arc<VulkanDevice>,
    staged: Indices,
    gpu: Option<GpuBuffer>,
}

impl VulkanIndexBuffer {
    pub fn new(device: Arc<VulkanDevice>) -> Self {
        Self {
            device,
            staged: Vec::new(),
            gpu: None,
        }
    }
}

impl IndexBuffer<VulkanContext> for VulkanIndexBuffer {
    fn create(&mut self) -> Result<()> {
        if self.staged.is_empty() {
            bail!("index buffer created with no staged data");
        }
        self.release();
        let gpu = GpuBuffer::with_data(
            &self.device,
            vk::BufferUsageFlags::INDEX_BUFFER,
            "index buffer",
            &self.staged,
        )?;
        log::debug!("Index buffer created with {} indices", self.staged.len());
        self.gpu = Some(gpu);
        Ok(())
    }

    fn bind(&mut self, ctx: &mut VulkanContext) -> Result<()> {
        let gpu = self.gpu.as_ref().context("index buffer not created")?;
        unsafe {
            self.device.device.cmd_bind_index_buffer(
                ctx.command_buffer(),
                gpu.buffer,
                0,
                vk::IndexType::UINT32,
            );
        }
        ctx.bindings_mut().bind_index();
        Ok(())
    }

    fn unbind(&mut self, ctx: &mut VulkanContext) {
        ctx.bindings_mut().unbind_index();
    }

    fn set_data(&mut self, indices: Indices) {
        self.staged = indices;
    }

    fn index_count(&self) -> u32 {
        self.staged.len() as u32
    }

    fn release(&mut self) {
        if let Some(gpu) = self.gpu.take() {
            gpu.destroy(&self.device);
        }
    }
}

impl Drop for VulkanIndexBuffer {
    fn drop(&mut self) {
        self.release();
    }
}
