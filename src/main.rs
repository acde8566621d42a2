// =============================================================================
// KESTREL - small Vulkan rendering backend
// =============================================================================
//
// The application shell drives the backend exclusively through the
// GraphicsBackend trait: initialize once, hand it a render operation, then
// redraw/resize/suspend as the window dictates.
//
// FRAME FLOW:
// 1. Poll the shader watcher; rebake geometry on change
// 2. backend.redraw() replays the stored render operation
// 3. The operation updates transforms and draws the scene geometry
// 4. The backend brackets it in an acquire/submit/present frame scope

mod config;
mod graphics;
mod watch;

use anyhow::Result;
use config::Config;
use glam::{Mat4, Vec3};
use graphics::vulkan::{VulkanContext, VulkanGeometry};
use graphics::{GraphicsBackend, VulkanBackend};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;
use watch::ShaderWatcher;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::{Fullscreen, Window, WindowAttributes},
};

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    // Load configuration from config.toml
    let config = Config::load();

    init_logging();
    log::info!("Starting Kestrel");
    log::info!(
        "Window: {}x{} ({})",
        config.window.width,
        config.window.height,
        if config.window.fullscreen {
            "fullscreen"
        } else {
            "windowed"
        }
    );
    log::info!("Present mode: {}", config.graphics.present_mode);

    let event_loop = EventLoop::new()?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;
    Ok(())
}

fn init_logging() {
    use env_logger::Builder;
    use log::LevelFilter;

    let mut builder = Builder::from_default_env();
    builder.filter_level(LevelFilter::Info);
    builder.init();
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

/// Field order matters for Drop: the scene releases its GPU resources
/// before the backend tears the rest down.
struct App {
    config: Config,
    window: Option<Arc<Window>>,
    scene: Option<Arc<Mutex<VulkanGeometry>>>,
    backend: Option<VulkanBackend>,
    watcher: Option<ShaderWatcher>,
    is_fullscreen: bool,

    // FPS tracking
    start_time: Instant,
    frame_count: u32,
    last_fps_update: Instant,
    last_frame_time: Instant,
}

impl App {
    fn new(config: Config) -> Self {
        let is_fullscreen = config.window.fullscreen;
        let now = Instant::now();
        Self {
            config,
            window: None,
            scene: None,
            backend: None,
            watcher: None,
            is_fullscreen,
            start_time: now,
            frame_count: 0,
            last_fps_update: now,
            last_frame_time: now,
        }
    }

    /// Bring up the backend and the demo scene, then render the first
    /// frame so the operation is stored for later redraws.
    fn setup(&mut self, window: Arc<Window>) -> Result<()> {
        let mut backend = VulkanBackend::new(window.clone(), &self.config);
        backend.initialize()?;

        let mut geometry = backend.create_geometry()?;
        geometry.set_vertex_path(&self.config.shaders.vertex);
        geometry.set_fragment_path(&self.config.shaders.fragment);

        let (vertices, indices) = graphics::mesh::cube();
        geometry.set_data(vertices, indices);
        geometry.create()?;

        let scene = Arc::new(Mutex::new(geometry));

        if self.config.shaders.hot_reload {
            match ShaderWatcher::new(&[
                self.config.shaders.vertex.as_path(),
                self.config.shaders.fragment.as_path(),
            ]) {
                Ok(watcher) => self.watcher = Some(watcher),
                Err(e) => log::warn!("Shader hot reload disabled: {e}"),
            }
        }

        backend.render(self.render_operation(scene.clone(), window))?;

        self.scene = Some(scene);
        self.backend = Some(backend);
        Ok(())
    }

    /// The stored render operation: per-frame transforms, then one draw.
    fn render_operation(
        &self,
        scene: Arc<Mutex<VulkanGeometry>>,
        window: Arc<Window>,
    ) -> graphics::RenderOperation<VulkanContext> {
        let start = self.start_time;
        let fov_y = self.config.graphics.fov_y_degrees.to_radians();
        let near = self.config.graphics.near_plane;
        let far = self.config.graphics.far_plane;
        let orthographic = self.config.graphics.use_orthographic();

        Box::new(move |ctx| {
            let size = window.inner_size();
            let aspect = size.width as f32 / size.height.max(1) as f32;

            let mut scene = scene.lock();
            scene.set_world_matrix(Mat4::from_rotation_y(
                start.elapsed().as_secs_f32() * 0.6,
            ));
            scene.set_view_matrix(Mat4::look_at_rh(
                Vec3::new(2.0, 2.0, 2.0),
                Vec3::ZERO,
                Vec3::Y,
            ));
            scene.set_projection_matrix(if orthographic {
                graphics::orthographic_projection(4.0 * aspect, 4.0, near, far)
            } else {
                graphics::perspective_projection(fov_y, aspect, near, far)
            });
            scene.draw(ctx)
        })
    }

    /// Rebake the scene after a shader edit. The GPU must be idle before
    /// in-flight pipelines are replaced.
    fn rebake_scene(&self) {
        let (Some(backend), Some(scene)) = (&self.backend, &self.scene) else {
            return;
        };
        log::info!("Shader change detected, rebaking geometry");
        let result = backend.wait_idle().and_then(|_| scene.lock().rebake());
        if let Err(e) = result {
            log::error!("Rebake failed: {e:?}");
        }
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        log::info!("Shutting down...");
        self.watcher = None;
        self.scene = None;
        if let Some(mut backend) = self.backend.take() {
            if let Err(e) = backend.shutdown() {
                log::error!("Backend shutdown failed: {e:?}");
            }
        }
        event_loop.exit();
    }

    // =========================================================================
    // FULLSCREEN TOGGLE
    // =========================================================================

    fn toggle_fullscreen(&mut self) {
        if let Some(ref window) = self.window {
            self.is_fullscreen = !self.is_fullscreen;

            if self.is_fullscreen {
                window.set_fullscreen(Some(Fullscreen::Borderless(None)));
                log::info!("Entered fullscreen mode");
            } else {
                window.set_fullscreen(None);
                log::info!("Exited fullscreen mode");
            }
        }
    }

    // =========================================================================
    // FPS TRACKING
    // =========================================================================

    fn update_fps(&mut self) {
        if !self.config.debug.show_fps {
            return;
        }

        let now = Instant::now();
        let frame_time = now.duration_since(self.last_frame_time).as_secs_f32();
        self.last_frame_time = now;
        self.frame_count += 1;

        // Update title every second
        if now.duration_since(self.last_fps_update).as_secs_f32() >= 1.0 {
            let elapsed = now.duration_since(self.last_fps_update).as_secs_f32();
            let fps = self.frame_count as f32 / elapsed;

            if let Some(ref window) = self.window {
                let mode = if self.is_fullscreen {
                    "fullscreen"
                } else {
                    "windowed"
                };
                window.set_title(&format!(
                    "{} - {:.0} FPS ({:.2}ms) [{}]",
                    self.config.window.title,
                    fps,
                    frame_time * 1000.0,
                    mode
                ));
            }

            self.frame_count = 0;
            self.last_fps_update = now;
        }
    }
}

// =============================================================================
// EVENT HANDLING
// =============================================================================

impl ApplicationHandler for App {
    /// Called when the application is ready to create windows.
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let mut window_attributes = WindowAttributes::default()
            .with_title(&self.config.window.title)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ));

        if self.config.window.fullscreen {
            window_attributes =
                window_attributes.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }

        let window = match event_loop.create_window(window_attributes) {
            Ok(w) => Arc::new(w),
            Err(e) => {
                log::error!("Failed to create window: {:?}", e);
                event_loop.exit();
                return;
            }
        };

        if let Err(e) = self.setup(window.clone()) {
            log::error!("Failed to initialize rendering: {:?}", e);
            event_loop.exit();
            return;
        }

        self.window = Some(window);
    }

    /// Handle window events.
    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                self.shutdown(event_loop);
            }

            WindowEvent::Resized(size) => {
                log::debug!("Window resized to {}x{}", size.width, size.height);

                let Some(backend) = &mut self.backend else {
                    return;
                };

                if size.width == 0 || size.height == 0 {
                    // Minimized: suspend rendering, keep every resource
                    backend.set_render_active(false);
                } else {
                    backend.set_render_active(true);
                    if let Err(e) = backend.handle_resize() {
                        log::error!("Resize failed: {e:?}");
                    }
                }
            }

            WindowEvent::RedrawRequested => {
                if let Some(watcher) = &self.watcher {
                    if watcher.take_dirty() {
                        self.rebake_scene();
                    }
                }

                let Some(backend) = &mut self.backend else {
                    return;
                };

                match backend.redraw() {
                    Ok(()) => {
                        if backend.is_render_active() {
                            self.update_fps();
                        }
                    }
                    Err(e) => {
                        // Skip the frame; rendering resumes on the next one
                        log::error!("Render error: {:?}", e);
                    }
                }
            }

            WindowEvent::KeyboardInput { event, .. } => {
                use winit::keyboard::{KeyCode, PhysicalKey};

                if event.state.is_pressed() {
                    if let PhysicalKey::Code(key) = event.physical_key {
                        match key {
                            // ESC - Quit application
                            KeyCode::Escape => {
                                log::info!("ESC pressed, exiting...");
                                self.shutdown(event_loop);
                            }
                            // F11 - Toggle fullscreen
                            KeyCode::F11 => {
                                self.toggle_fullscreen();
                            }
                            _ => {}
                        }
                    }
                }
            }

            _ => {}
        }
    }

    /// Called when the event loop is about to block waiting for events.
    /// Request continuous redraws to keep the scene animating.
    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }
}
