// Vulkan backend - concrete GraphicsBackend implementation
//
// Owns device, surface, swapchain, per-frame commands and sync, and runs
// stored render operations inside a frame scope.

pub mod buffer;
pub mod context;
pub mod device;
pub mod pass;
pub mod shader;
pub mod swapchain;
pub mod sync;

pub use context::VulkanContext;
pub use device::VulkanDevice;
pub use swapchain::Swapchain;

use anyhow::{Context, Result};
use ash::vk;
use std::path::PathBuf;
use std::sync::Arc;
use winit::window::Window;

use crate::config::Config;
use crate::graphics::geometry::Geometry;
use crate::graphics::{BackendPhase, GraphicsBackend, RenderOperation};

use buffer::{VulkanIndexBuffer, VulkanVertexBuffer};
use pass::DepthBuffer;
use shader::VulkanShader;
use sync::FrameSync;

/// Geometry wired to the Vulkan collaborators.
pub type VulkanGeometry = Geometry<VulkanContext>;

pub struct VulkanBackend {
    // Settings captured from configuration
    title: String,
    clear_color: [f32; 4],
    present_mode: vk::PresentModeKHR,
    max_frames_in_flight: usize,
    enable_validation: bool,

    // Window & surface
    window: Arc<Window>,
    surface: Option<vk::SurfaceKHR>,
    surface_loader: Option<ash::extensions::khr::Surface>,

    // Vulkan core
    device: Option<Arc<VulkanDevice>>,
    swapchain: Option<Swapchain>,
    depth: Option<DepthBuffer>,
    render_pass: Option<vk::RenderPass>,
    framebuffers: Vec<vk::Framebuffer>,

    // Commands: one buffer per frame in flight, re-recorded each frame
    command_pool: Option<vk::CommandPool>,
    command_buffers: Vec<vk::CommandBuffer>,

    // Synchronization
    frame_sync: Vec<FrameSync>,
    current_frame: usize,

    // Lifecycle & frame state
    phase: BackendPhase,
    render_active: bool,
    last_render_operation: Option<RenderOperation<VulkanContext>>,
    needs_resize: bool,
    is_minimized: bool,

    // UI overlay extension point
    overlay_pool: Option<vk::DescriptorPool>,
}

impl VulkanBackend {
    pub fn new(window: Arc<Window>, config: &Config) -> Self {
        Self {
            title: config.window.title.clone(),
            clear_color: config.graphics.clear_color,
            present_mode: config.graphics.present_mode(),
            max_frames_in_flight: config.graphics.max_frames_in_flight,
            enable_validation: config.debug.validation_layers,
            window,
            surface: None,
            surface_loader: None,
            device: None,
            swapchain: None,
            depth: None,
            render_pass: None,
            framebuffers: Vec::new(),
            command_pool: None,
            command_buffers: Vec::new(),
            frame_sync: Vec::new(),
            current_frame: 0,
            phase: BackendPhase::Uninitialized,
            render_active: true,
            last_render_operation: None,
            needs_resize: false,
            is_minimized: false,
            overlay_pool: None,
        }
    }

    /// Build a geometry bound to this backend's device and render pass.
    /// Shader paths start empty; set them before `create`.
    pub fn create_geometry(&self) -> Result<VulkanGeometry> {
        self.phase.ensure_operational()?;
        let device = self.device.as_ref().context("Device not initialized")?;
        let render_pass = self.render_pass.context("Render pass not initialized")?;

        let shader = VulkanShader::new(
            device.clone(),
            render_pass,
            PathBuf::new(),
            PathBuf::new(),
        );
        let vertex_buffer = VulkanVertexBuffer::new(device.clone());
        let index_buffer = VulkanIndexBuffer::new(device.clone());

        Ok(Geometry::new(
            Box::new(shader),
            Box::new(vertex_buffer),
            Box::new(index_buffer),
        ))
    }

    /// Block until the GPU is idle. Required before rebaking resources
    /// that may still be referenced by in-flight frames.
    pub fn wait_idle(&self) -> Result<()> {
        self.device
            .as_ref()
            .context("Device not initialized")?
            .wait_idle()
    }

    /// Create swapchain, depth target and framebuffers for the current
    /// window size. Separated from `initialize` because resize runs it
    /// again.
    fn create_swapchain_resources(&mut self) -> Result<()> {
        let device = self
            .device
            .as_ref()
            .context("Device not initialized")?
            .clone();
        let surface = self.surface.context("Surface not initialized")?;
        let surface_loader = self
            .surface_loader
            .clone()
            .context("Surface loader not initialized")?;

        let size = self.window.inner_size();

        // No swapchain while minimized (zero-sized surface)
        if size.width == 0 || size.height == 0 {
            self.is_minimized = true;
            return Ok(());
        }
        self.is_minimized = false;

        // The surface can only have one swapchain at a time: destroy the
        // old size-dependent resources before creating replacements
        self.destroy_framebuffers(&device);
        if let Some(mut depth) = self.depth.take() {
            depth.destroy(&device);
        }
        self.swapchain = None;

        let swapchain = Swapchain::new(
            device.clone(),
            surface,
            &surface_loader,
            size.width,
            size.height,
            self.present_mode,
        )?;

        // The render pass depends only on the surface format; create once
        // and keep it so shader pipelines survive resizes
        let render_pass = match self.render_pass {
            Some(render_pass) => render_pass,
            None => {
                let render_pass = pass::create_render_pass(&device, swapchain.format)?;
                self.render_pass = Some(render_pass);
                render_pass
            }
        };

        let depth = DepthBuffer::new(&device, swapchain.extent)?;
        let framebuffers = pass::create_framebuffers(
            &device,
            &swapchain.image_views,
            depth.view,
            render_pass,
            swapchain.extent,
        )?;

        self.swapchain = Some(swapchain);
        self.depth = Some(depth);
        self.framebuffers = framebuffers;
        self.needs_resize = false;

        Ok(())
    }

    fn destroy_framebuffers(&mut self, device: &VulkanDevice) {
        for framebuffer in self.framebuffers.drain(..) {
            unsafe { device.device.destroy_framebuffer(framebuffer, None) };
        }
    }

    /// One frame: acquire, record the stored render operation, submit,
    /// present. Skips cleanly while inactive or minimized.
    fn draw_frame(&mut self) -> Result<()> {
        self.phase.ensure_operational()?;

        if !self.render_active {
            return Ok(());
        }

        if self.needs_resize || self.is_minimized {
            self.wait_idle()?;
            self.create_swapchain_resources()?;
            if self.is_minimized {
                return Ok(());
            }
        }

        let device = self
            .device
            .as_ref()
            .context("Device not initialized")?
            .clone();

        // Wait for the frame that last used this sync slot. The fence is
        // rearmed only after recording succeeds, so a failed frame leaves
        // the slot reusable.
        self.frame_sync[self.current_frame].wait(&device)?;

        let (image_index, suboptimal) = {
            let swapchain = self.swapchain.as_ref().context("Swapchain not initialized")?;
            let sync = &self.frame_sync[self.current_frame];
            match swapchain.acquire_next_image(u64::MAX, sync.image_available) {
                Ok(result) => result,
                Err(e) => {
                    if e.to_string().contains("out of date") {
                        self.needs_resize = true;
                        return Ok(());
                    }
                    return Err(e);
                }
            }
        };
        if suboptimal {
            self.needs_resize = true;
        }

        let cmd = self.command_buffers[self.current_frame];
        let render_pass = self.render_pass.context("Render pass not initialized")?;
        let framebuffer = self.framebuffers[image_index as usize];
        let extent = self
            .swapchain
            .as_ref()
            .context("Swapchain not initialized")?
            .extent;

        // Take the operation out so recording can borrow it mutably
        let mut operation = self.last_render_operation.take();
        let recorded = record_frame(
            &device,
            cmd,
            render_pass,
            framebuffer,
            extent,
            self.clear_color,
            operation.as_mut(),
        );
        self.last_render_operation = operation;
        recorded?;

        let sync = &self.frame_sync[self.current_frame];
        sync.reset(&device)?;

        let wait_semaphores = [sync.image_available];
        let signal_semaphores = [sync.render_finished];
        let command_buffers = [cmd];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            device.device.queue_submit(
                device.graphics_queue,
                &[submit_info.build()],
                sync.in_flight,
            )?;
        }

        let present_result = self
            .swapchain
            .as_ref()
            .context("Swapchain not initialized")?
            .present(device.graphics_queue, image_index, &[sync.render_finished]);

        match present_result {
            Ok(suboptimal) => {
                if suboptimal {
                    self.needs_resize = true;
                }
            }
            Err(_) => {
                self.needs_resize = true;
            }
        }

        self.current_frame = (self.current_frame + 1) % self.max_frames_in_flight;

        Ok(())
    }
}

impl GraphicsBackend for VulkanBackend {
    type Context = VulkanContext;

    fn initialize(&mut self) -> Result<()> {
        self.phase.ensure_uninitialized()?;
        log::info!("Initializing Vulkan backend...");

        // Validation layers only in debug builds, and only if configured
        let enable_validation = cfg!(debug_assertions) && self.enable_validation;
        let device = VulkanDevice::new(&self.title, enable_validation)?;

        let surface_loader =
            ash::extensions::khr::Surface::new(&device.entry, &device.instance);
        let surface = create_surface(&device, &self.window)?;

        let surface_support = unsafe {
            surface_loader.get_physical_device_surface_support(
                device.physical_device,
                device.graphics_queue_family,
                surface,
            )?
        };
        if !surface_support {
            anyhow::bail!("GPU doesn't support presenting to this surface");
        }

        self.device = Some(device.clone());
        self.surface = Some(surface);
        self.surface_loader = Some(surface_loader);

        self.create_swapchain_resources()?;

        let pool_info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(device.graphics_queue_family)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

        let command_pool = unsafe { device.device.create_command_pool(&pool_info, None)? };
        self.command_pool = Some(command_pool);

        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(self.max_frames_in_flight as u32);

        self.command_buffers = unsafe { device.device.allocate_command_buffers(&alloc_info)? };

        self.frame_sync = (0..self.max_frames_in_flight)
            .map(|_| FrameSync::new(&device))
            .collect::<Result<Vec<_>>>()?;

        self.init_ui_overlay()?;

        self.phase = BackendPhase::Initialized;
        log::info!("Vulkan backend initialized");
        Ok(())
    }

    fn handle_resize(&mut self) -> Result<()> {
        self.phase.ensure_operational()?;
        self.wait_idle()?;
        self.create_swapchain_resources()
    }

    fn redraw(&mut self) -> Result<()> {
        self.draw_frame()
    }

    fn render(&mut self, operation: RenderOperation<VulkanContext>) -> Result<()> {
        self.phase.ensure_operational()?;
        self.last_render_operation = Some(operation);
        self.draw_frame()
    }

    fn shutdown(&mut self) -> Result<()> {
        if self.phase == BackendPhase::ShutDown {
            return Ok(());
        }
        log::info!("Shutting down Vulkan backend...");

        self.last_render_operation = None;

        if let Some(device) = self.device.take() {
            let _ = device.wait_idle();

            if let Some(pool) = self.overlay_pool.take() {
                unsafe { device.device.destroy_descriptor_pool(pool, None) };
            }

            self.destroy_framebuffers(&device);
            if let Some(mut depth) = self.depth.take() {
                depth.destroy(&device);
            }
            if let Some(render_pass) = self.render_pass.take() {
                unsafe { device.device.destroy_render_pass(render_pass, None) };
            }

            for sync in self.frame_sync.drain(..) {
                sync.destroy(&device.device);
            }

            // Destroying the pool frees its command buffers
            self.command_buffers.clear();
            if let Some(pool) = self.command_pool.take() {
                unsafe { device.device.destroy_command_pool(pool, None) };
            }

            self.swapchain = None;

            if let (Some(surface), Some(loader)) =
                (self.surface.take(), self.surface_loader.take())
            {
                unsafe { loader.destroy_surface(surface, None) };
            }
        }

        self.phase = BackendPhase::ShutDown;
        log::info!("Vulkan backend shut down");
        Ok(())
    }

    fn set_render_active(&mut self, active: bool) {
        self.render_active = active;
    }

    fn is_render_active(&self) -> bool {
        self.render_active
    }

    fn init_ui_overlay(&mut self) -> Result<()> {
        let device = self.device.as_ref().context("Device not initialized")?;

        // Descriptor budget for an immediate-mode overlay (font atlas,
        // per-frame uniforms); an overlay renderer plugs into this pool
        let pool_sizes = [
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                descriptor_count: 64,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                descriptor_count: 64,
            },
        ];
        let pool_info = vk::DescriptorPoolCreateInfo::builder()
            .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
            .max_sets(64)
            .pool_sizes(&pool_sizes);

        let pool = unsafe { device.device.create_descriptor_pool(&pool_info, None)? };
        self.overlay_pool = Some(pool);
        log::debug!("UI overlay descriptor pool ready");
        Ok(())
    }
}

impl Drop for VulkanBackend {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            log::error!("Shutdown during drop failed: {e:?}");
        }
    }
}

/// Record one frame's commands: clear, viewport/scissor, then the caller's
/// render operation inside the render pass.
fn record_frame(
    device: &Arc<VulkanDevice>,
    cmd: vk::CommandBuffer,
    render_pass: vk::RenderPass,
    framebuffer: vk::Framebuffer,
    extent: vk::Extent2D,
    clear_color: [f32; 4],
    operation: Option<&mut RenderOperation<VulkanContext>>,
) -> Result<()> {
    let begin_info = vk::CommandBufferBeginInfo::builder();
    unsafe {
        // Implicit reset: the pool carries RESET_COMMAND_BUFFER
        device.device.begin_command_buffer(cmd, &begin_info)?;
    }

    let clear_values = [
        vk::ClearValue {
            color: vk::ClearColorValue {
                float32: clear_color,
            },
        },
        vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue {
                depth: 1.0,
                stencil: 0,
            },
        },
    ];

    let pass_info = vk::RenderPassBeginInfo::builder()
        .render_pass(render_pass)
        .framebuffer(framebuffer)
        .render_area(vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        })
        .clear_values(&clear_values);

    unsafe {
        device
            .device
            .cmd_begin_render_pass(cmd, &pass_info, vk::SubpassContents::INLINE);

        // Negative-height viewport keeps the projection helpers' Y-up
        // convention without flipping matrices
        let viewport = vk::Viewport {
            x: 0.0,
            y: extent.height as f32,
            width: extent.width as f32,
            height: -(extent.height as f32),
            min_depth: 0.0,
            max_depth: 1.0,
        };
        device.device.cmd_set_viewport(cmd, 0, &[viewport]);

        let scissor = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };
        device.device.cmd_set_scissor(cmd, 0, &[scissor]);
    }

    let mut ctx = VulkanContext::new(device.clone(), cmd);
    let op_result = match operation {
        Some(operation) => operation(&mut ctx),
        None => Ok(()),
    };

    // Close the pass and the buffer even when the operation failed, so the
    // command buffer stays resettable
    unsafe {
        device.device.cmd_end_render_pass(cmd);
        device.device.end_command_buffer(cmd)?;
    }

    op_result
}

/// Create a window surface from raw handles.
fn create_surface(device: &VulkanDevice, window: &Window) -> Result<vk::SurfaceKHR> {
    use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle, RawWindowHandle};

    let window_handle = window
        .window_handle()
        .context("Failed to get window handle")?
        .as_raw();
    let display_handle = window
        .display_handle()
        .context("Failed to get display handle")?
        .as_raw();

    unsafe {
        match (display_handle, window_handle) {
            #[cfg(target_os = "windows")]
            (RawDisplayHandle::Windows(_), RawWindowHandle::Win32(handle)) => {
                let hinstance = handle.hinstance.map(|h| h.get()).unwrap_or(0)
                    as *const std::ffi::c_void;
                let hwnd = handle.hwnd.get() as *const std::ffi::c_void;
                let create_info = vk::Win32SurfaceCreateInfoKHR::builder()
                    .hinstance(hinstance)
                    .hwnd(hwnd);
                let loader =
                    ash::extensions::khr::Win32Surface::new(&device.entry, &device.instance);
                Ok(loader.create_win32_surface(&create_info, None)?)
            }

            #[cfg(target_os = "linux")]
            (RawDisplayHandle::Xlib(display), RawWindowHandle::Xlib(handle)) => {
                let dpy = display
                    .display
                    .map(|d| d.as_ptr())
                    .unwrap_or(std::ptr::null_mut());
                let create_info = vk::XlibSurfaceCreateInfoKHR::builder()
                    .dpy(dpy.cast())
                    .window(handle.window);
                let loader =
                    ash::extensions::khr::XlibSurface::new(&device.entry, &device.instance);
                Ok(loader.create_xlib_surface(&create_info, None)?)
            }

            #[cfg(target_os = "linux")]
            (RawDisplayHandle::Wayland(display), RawWindowHandle::Wayland(handle)) => {
                let create_info = vk::WaylandSurfaceCreateInfoKHR::builder()
                    .display(display.display.as_ptr())
                    .surface(handle.surface.as_ptr());
                let loader =
                    ash::extensions::khr::WaylandSurface::new(&device.entry, &device.instance);
                Ok(loader.create_wayland_surface(&create_info, None)?)
            }

            _ => anyhow::bail!("Unsupported window handle type"),
        }
    }
}
