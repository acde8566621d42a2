// Geometry - one drawable unit
//
// Pairs mesh data (vertex + index buffer) with a shader and the
// world/view/projection transforms, and owns the draw-call sequencing.

use anyhow::{bail, Result};
use glam::Mat4;
use std::path::Path;

use super::context::{PrimitiveTopology, RenderContext};
use super::mesh::{Indices, VertexArray};

/// Shader program owned by a geometry. Bound once per draw, after the
/// current transforms have been pushed into it.
pub trait ShaderProgram<C> {
    /// Create (or re-create) GPU program state. Prior state is replaced.
    fn create(&mut self) -> Result<()>;

    fn bind(&mut self, ctx: &mut C) -> Result<()>;

    fn set_transform_matrices(&mut self, world: Mat4, view: Mat4, projection: Mat4);

    fn set_vertex_path(&mut self, path: &Path);

    fn set_fragment_path(&mut self, path: &Path);

    /// Free GPU program state. Idempotent.
    fn release(&mut self);
}

/// Vertex buffer owned by a geometry.
pub trait VertexBuffer<C> {
    /// Upload the staged data into a fresh GPU buffer.
    fn create(&mut self) -> Result<()>;

    fn bind(&mut self, ctx: &mut C) -> Result<()>;

    fn unbind(&mut self, ctx: &mut C);

    /// Stage vertex data; upload happens on the next `create`.
    fn set_data(&mut self, vertices: VertexArray);

    /// Free the GPU buffer. Idempotent.
    fn release(&mut self);
}

/// Index buffer owned by a geometry.
pub trait IndexBuffer<C> {
    fn create(&mut self) -> Result<()>;

    fn bind(&mut self, ctx: &mut C) -> Result<()>;

    fn unbind(&mut self, ctx: &mut C);

    fn set_data(&mut self, indices: Indices);

    /// Number of indices the next draw covers.
    fn index_count(&self) -> u32;

    fn release(&mut self);
}

/// A drawable mesh: one shader, one vertex buffer, one index buffer, and
/// the transform matrices pushed into the shader on every draw.
///
/// `create` must run before `draw`; drawing an uncreated geometry is a
/// defined error and leaves pipeline state untouched. `release` frees all
/// owned GPU resources and `Drop` guarantees it.
pub struct Geometry<C> {
    shader: Box<dyn ShaderProgram<C>>,
    vertex_buffer: Box<dyn VertexBuffer<C>>,
    index_buffer: Box<dyn IndexBuffer<C>>,
    world: Mat4,
    view: Mat4,
    projection: Mat4,
    created: bool,
}

impl<C> Geometry<C> {
    pub fn new(
        shader: Box<dyn ShaderProgram<C>>,
        vertex_buffer: Box<dyn VertexBuffer<C>>,
        index_buffer: Box<dyn IndexBuffer<C>>,
    ) -> Self {
        Self {
            shader,
            vertex_buffer,
            index_buffer,
            world: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            created: false,
        }
    }

    /// Create GPU resources: shader first (buffer layouts reference the
    /// program's input signature), then vertex and index buffers.
    pub fn create(&mut self) -> Result<()> {
        self.shader.create()?;
        self.vertex_buffer.create()?;
        self.index_buffer.create()?;
        self.created = true;
        Ok(())
    }

    /// Re-create all GPU resources after the underlying data changed.
    pub fn rebake(&mut self) -> Result<()> {
        self.create()
    }

    /// Stage mesh data. No GPU upload here; that happens on the next
    /// `create`.
    pub fn set_data(&mut self, vertices: VertexArray, indices: Indices) {
        self.vertex_buffer.set_data(vertices);
        self.index_buffer.set_data(indices);
    }

    /// Free all owned GPU resources. A released geometry can be re-created.
    pub fn release(&mut self) {
        self.shader.release();
        self.vertex_buffer.release();
        self.index_buffer.release();
        self.created = false;
    }

    pub fn set_vertex_path(&mut self, path: &Path) {
        self.shader.set_vertex_path(path);
    }

    pub fn set_fragment_path(&mut self, path: &Path) {
        self.shader.set_fragment_path(path);
    }

    pub fn set_world_matrix(&mut self, world: Mat4) {
        self.world = world;
    }

    pub fn set_view_matrix(&mut self, view: Mat4) {
        self.view = view;
    }

    pub fn set_projection_matrix(&mut self, projection: Mat4) {
        self.projection = projection;
    }

    pub fn set_transform_matrices(&mut self, world: Mat4, view: Mat4, projection: Mat4) {
        self.world = world;
        self.view = view;
        self.projection = projection;
    }
}

impl<C: RenderContext> Geometry<C> {
    /// Issue one indexed draw: bind shader (with current transforms), bind
    /// vertex then index buffer, set triangle-list topology, draw the full
    /// index count, then unbind in reverse order. Bindings do not persist
    /// past this call.
    pub fn draw(&mut self, ctx: &mut C) -> Result<()> {
        if !self.created {
            bail!("geometry drawn before create");
        }

        self.shader
            .set_transform_matrices(self.world, self.view, self.projection);
        self.shader.bind(ctx)?;
        self.vertex_buffer.bind(ctx)?;
        self.index_buffer.bind(ctx)?;
        ctx.set_primitive_topology(PrimitiveTopology::TriangleList);
        ctx.draw_indexed(self.index_buffer.index_count())?;
        self.index_buffer.unbind(ctx);
        self.vertex_buffer.unbind(ctx);
        Ok(())
    }
}

impl<C> Drop for Geometry<C> {
    fn drop(&mut self) {
        if self.created {
            self.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphics::context::PipelineBindings;
    use crate::graphics::mesh::Vertex;
    use std::cell::RefCell;
    use std::rc::Rc;

    type CallLog = Rc<RefCell<Vec<String>>>;

    struct TestContext {
        bindings: PipelineBindings,
        log: CallLog,
    }

    impl TestContext {
        fn new(log: CallLog) -> Self {
            Self {
                bindings: PipelineBindings::default(),
                log,
            }
        }
    }

    impl RenderContext for TestContext {
        fn bindings(&self) -> &PipelineBindings {
            &self.bindings
        }

        fn bindings_mut(&mut self) -> &mut PipelineBindings {
            &mut self.bindings
        }

        fn set_primitive_topology(&mut self, topology: PrimitiveTopology) {
            self.bindings.set_topology(topology);
            self.log.borrow_mut().push(format!("topology:{topology:?}"));
        }

        fn draw_indexed(&mut self, index_count: u32) -> Result<()> {
            self.bindings.ensure_drawable()?;
            self.log.borrow_mut().push(format!("draw_indexed:{index_count}"));
            Ok(())
        }
    }

    struct MockShader {
        log: CallLog,
        last_matrices: Rc<RefCell<Option<(Mat4, Mat4, Mat4)>>>,
        releases: Rc<RefCell<u32>>,
    }

    impl ShaderProgram<TestContext> for MockShader {
        fn create(&mut self) -> Result<()> {
            self.log.borrow_mut().push("shader.create".into());
            Ok(())
        }

        fn bind(&mut self, ctx: &mut TestContext) -> Result<()> {
            ctx.bindings_mut().bind_shader();
            self.log.borrow_mut().push("shader.bind".into());
            Ok(())
        }

        fn set_transform_matrices(&mut self, world: Mat4, view: Mat4, projection: Mat4) {
            *self.last_matrices.borrow_mut() = Some((world, view, projection));
            self.log.borrow_mut().push("shader.set_matrices".into());
        }

        fn set_vertex_path(&mut self, _path: &Path) {}

        fn set_fragment_path(&mut self, _path: &Path) {}

        fn release(&mut self) {
            *self.releases.borrow_mut() += 1;
        }
    }

    struct MockVertexBuffer {
        log: CallLog,
        releases: Rc<RefCell<u32>>,
    }

    impl VertexBuffer<TestContext> for MockVertexBuffer {
        fn create(&mut self) -> Result<()> {
            self.log.borrow_mut().push("vertex.create".into());
            Ok(())
        }

        fn bind(&mut self, ctx: &mut TestContext) -> Result<()> {
            ctx.bindings_mut().bind_vertex();
            self.log.borrow_mut().push("vertex.bind".into());
            Ok(())
        }

        fn unbind(&mut self, ctx: &mut TestContext) {
            ctx.bindings_mut().unbind_vertex();
            self.log.borrow_mut().push("vertex.unbind".into());
        }

        fn set_data(&mut self, vertices: VertexArray) {
            self.log
                .borrow_mut()
                .push(format!("vertex.set_data:{}", vertices.len()));
        }

        fn release(&mut self) {
            *self.releases.borrow_mut() += 1;
        }
    }

    struct MockIndexBuffer {
        log: CallLog,
        count: u32,
        releases: Rc<RefCell<u32>>,
    }

    impl IndexBuffer<TestContext> for MockIndexBuffer {
        fn create(&mut self) -> Result<()> {
            self.log.borrow_mut().push("index.create".into());
            Ok(())
        }

        fn bind(&mut self, ctx: &mut TestContext) -> Result<()> {
            ctx.bindings_mut().bind_index();
            self.log.borrow_mut().push("index.bind".into());
            Ok(())
        }

        fn unbind(&mut self, ctx: &mut TestContext) {
            ctx.bindings_mut().unbind_index();
            self.log.borrow_mut().push("index.unbind".into());
        }

        fn set_data(&mut self, indices: Indices) {
            self.count = indices.len() as u32;
            self.log
                .borrow_mut()
                .push(format!("index.set_data:{}", indices.len()));
        }

        fn index_count(&self) -> u32 {
            self.count
        }

        fn release(&mut self) {
            *self.releases.borrow_mut() += 1;
        }
    }

    struct Harness {
        log: CallLog,
        matrices: Rc<RefCell<Option<(Mat4, Mat4, Mat4)>>>,
        shader_releases: Rc<RefCell<u32>>,
        vertex_releases: Rc<RefCell<u32>>,
        index_releases: Rc<RefCell<u32>>,
        geometry: Geometry<TestContext>,
    }

    fn harness() -> Harness {
        let log: CallLog = Rc::new(RefCell::new(Vec::new()));
        let matrices = Rc::new(RefCell::new(None));
        let shader_releases = Rc::new(RefCell::new(0));
        let vertex_releases = Rc::new(RefCell::new(0));
        let index_releases = Rc::new(RefCell::new(0));

        let geometry = Geometry::new(
            Box::new(MockShader {
                log: log.clone(),
                last_matrices: matrices.clone(),
                releases: shader_releases.clone(),
            }),
            Box::new(MockVertexBuffer {
                log: log.clone(),
                releases: vertex_releases.clone(),
            }),
            Box::new(MockIndexBuffer {
                log: log.clone(),
                count: 0,
                releases: index_releases.clone(),
            }),
        );

        Harness {
            log,
            matrices,
            shader_releases,
            vertex_releases,
            index_releases,
            geometry,
        }
    }

    fn triangle() -> (VertexArray, Indices) {
        let vertices = vec![
            Vertex {
                position: [0.0, 0.5, 0.0],
                normal: [0.0, 0.0, 1.0],
                color: [1.0, 0.0, 0.0],
            },
            Vertex {
                position: [-0.5, -0.5, 0.0],
                normal: [0.0, 0.0, 1.0],
                color: [0.0, 1.0, 0.0],
            },
            Vertex {
                position: [0.5, -0.5, 0.0],
                normal: [0.0, 0.0, 1.0],
                color: [0.0, 0.0, 1.0],
            },
        ];
        (vertices, vec![0, 1, 2])
    }

    #[test]
    fn draw_before_create_is_an_error_and_binds_nothing() {
        let mut h = harness();
        let mut ctx = TestContext::new(h.log.clone());

        assert!(h.geometry.draw(&mut ctx).is_err());
        assert!(h.log.borrow().is_empty());
        assert!(ctx.bindings().is_clean());
    }

    #[test]
    fn draw_sequence_is_fixed() {
        let mut h = harness();
        let (vertices, indices) = triangle();
        h.geometry.set_data(vertices, indices);
        h.geometry.create().unwrap();
        h.log.borrow_mut().clear();

        let mut ctx = TestContext::new(h.log.clone());
        h.geometry.draw(&mut ctx).unwrap();

        assert_eq!(
            *h.log.borrow(),
            vec![
                "shader.set_matrices",
                "shader.bind",
                "vertex.bind",
                "index.bind",
                "topology:TriangleList",
                "draw_indexed:3",
                "index.unbind",
                "vertex.unbind",
            ]
        );
    }

    #[test]
    fn create_is_repeatable() {
        let mut h = harness();
        let (vertices, indices) = triangle();
        h.geometry.set_data(vertices, indices);

        h.geometry.create().unwrap();
        let mut ctx = TestContext::new(h.log.clone());
        h.geometry.draw(&mut ctx).unwrap();

        h.geometry.rebake().unwrap();
        let mut ctx = TestContext::new(h.log.clone());
        h.geometry.draw(&mut ctx).unwrap();

        let draws = h
            .log
            .borrow()
            .iter()
            .filter(|entry| entry.starts_with("draw_indexed"))
            .count();
        assert_eq!(draws, 2);
    }

    #[test]
    fn draw_pushes_last_set_matrices() {
        let mut h = harness();
        let (vertices, indices) = triangle();
        h.geometry.set_data(vertices, indices);
        h.geometry.create().unwrap();

        let world = Mat4::from_translation(glam::Vec3::new(1.0, 2.0, 3.0));
        let view = Mat4::from_rotation_y(0.5);
        let projection = crate::graphics::perspective_projection(1.0, 1.5, 0.1, 100.0);

        h.geometry.set_world_matrix(world);
        h.geometry.set_view_matrix(view);
        h.geometry.set_projection_matrix(projection);

        let mut ctx = TestContext::new(h.log.clone());
        h.geometry.draw(&mut ctx).unwrap();

        let (w, v, p) = h.matrices.borrow().unwrap();
        assert_eq!(w.to_cols_array(), world.to_cols_array());
        assert_eq!(v.to_cols_array(), view.to_cols_array());
        assert_eq!(p.to_cols_array(), projection.to_cols_array());
    }

    #[test]
    fn release_then_drop_releases_each_resource_once() {
        let mut h = harness();
        let (vertices, indices) = triangle();
        h.geometry.set_data(vertices, indices);
        h.geometry.create().unwrap();

        h.geometry.release();
        let shader_releases = h.shader_releases.clone();
        let vertex_releases = h.vertex_releases.clone();
        let index_releases = h.index_releases.clone();
        drop(h);

        assert_eq!(*shader_releases.borrow(), 1);
        assert_eq!(*vertex_releases.borrow(), 1);
        assert_eq!(*index_releases.borrow(), 1);
    }

    #[test]
    fn drop_without_release_frees_resources() {
        let mut h = harness();
        let (vertices, indices) = triangle();
        h.geometry.set_data(vertices, indices);
        h.geometry.create().unwrap();

        let shader_releases = h.shader_releases.clone();
        drop(h);
        assert_eq!(*shader_releases.borrow(), 1);
    }
}
