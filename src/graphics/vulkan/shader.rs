// Shader program
//
// Loads SPIR-V from the configured paths and owns the graphics pipeline
// built from the two stages. Transforms reach the GPU as push constants
// (MVP + world, 128 bytes, the guaranteed minimum push-constant budget).

use anyhow::{Context, Result};
use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::Mat4;
use std::ffi::CStr;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::graphics::context::RenderContext;
use crate::graphics::geometry::ShaderProgram;
use crate::graphics::mesh::Vertex;

use super::context::VulkanContext;
use super::VulkanDevice;

const SHADER_ENTRY: &CStr = c"main";

/// Push-constant block consumed by the vertex stage.
#[derive(Clone, Copy, Pod, Zeroable)]
#[repr(C)]
struct PushTransforms {
    mvp: Mat4,
    world: Mat4,
}

/// Vertex + fragment program pair bound as one graphics pipeline.
pub struct VulkanShader {
    device: Arc<VulkanDevice>,
    render_pass: vk::RenderPass,
    vertex_path: PathBuf,
    fragment_path: PathBuf,
    world: Mat4,
    view: Mat4,
    projection: Mat4,
    pipeline: Option<(vk::Pipeline, vk::PipelineLayout)>,
}

impl VulkanShader {
    pub fn new(
        device: Arc<VulkanDevice>,
        render_pass: vk::RenderPass,
        vertex_path: PathBuf,
        fragment_path: PathBuf,
    ) -> Self {
        Self {
            device,
            render_pass,
            vertex_path,
            fragment_path,
            world: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            pipeline: None,
        }
    }

    fn load_module(&self, path: &Path) -> Result<vk::ShaderModule> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read SPIR-V shader {:?}", path))?;
        let words = ash::util::read_spv(&mut Cursor::new(&bytes))
            .with_context(|| format!("Invalid SPIR-V in {:?}", path))?;

        let create_info = vk::ShaderModuleCreateInfo::builder().code(&words);

        unsafe {
            self.device
                .device
                .create_shader_module(&create_info, None)
                .with_context(|| format!("Failed to create shader module for {:?}", path))
        }
    }

    fn build_pipeline(
        &self,
        vert_module: vk::ShaderModule,
        frag_module: vk::ShaderModule,
    ) -> Result<(vk::Pipeline, vk::PipelineLayout)> {
        let vert_stage = vk::PipelineShaderStageCreateInfo::builder()
            .stage(vk::ShaderStageFlags::VERTEX)
            .module(vert_module)
            .name(SHADER_ENTRY)
            .build();

        let frag_stage = vk::PipelineShaderStageCreateInfo::builder()
            .stage(vk::ShaderStageFlags::FRAGMENT)
            .module(frag_module)
            .name(SHADER_ENTRY)
            .build();

        let shader_stages = &[vert_stage, frag_stage];

        // Interleaved position + normal + color, matching mesh::Vertex
        let binding = vk::VertexInputBindingDescription::builder()
            .binding(0)
            .stride(std::mem::size_of::<Vertex>() as u32)
            .input_rate(vk::VertexInputRate::VERTEX)
            .build();

        let attributes = [
            vk::VertexInputAttributeDescription::builder()
                .binding(0)
                .location(0)
                .format(vk::Format::R32G32B32_SFLOAT)
                .offset(0)
                .build(),
            vk::VertexInputAttributeDescription::builder()
                .binding(0)
                .location(1)
                .format(vk::Format::R32G32B32_SFLOAT)
                .offset(12)
                .build(),
            vk::VertexInputAttributeDescription::builder()
                .binding(0)
                .location(2)
                .format(vk::Format::R32G32B32_SFLOAT)
                .offset(24)
                .build(),
        ];

        let bindings = [binding];
        let vertex_input_info = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&bindings)
            .vertex_attribute_descriptions(&attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        // Viewport and scissor are dynamic so resizes never rebuild pipelines
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&dynamic_states);

        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(vk::CullModeFlags::BACK)
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .depth_bias_enable(false);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(true)
            .depth_write_enable(true)
            .depth_compare_op(vk::CompareOp::LESS)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        let color_blend_attachment = vk::PipelineColorBlendAttachmentState::builder()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(false)
            .build();

        let color_blend_attachments = &[color_blend_attachment];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .attachments(color_blend_attachments);

        let push_constant_range = vk::PushConstantRange::builder()
            .stage_flags(vk::ShaderStageFlags::VERTEX)
            .offset(0)
            .size(std::mem::size_of::<PushTransforms>() as u32)
            .build();

        let push_constant_ranges = &[push_constant_range];

        let layout_info =
            vk::PipelineLayoutCreateInfo::builder().push_constant_ranges(push_constant_ranges);

        let pipeline_layout = unsafe {
            self.device
                .device
                .create_pipeline_layout(&layout_info, None)
                .context("Failed to create pipeline layout")?
        };

        let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(shader_stages)
            .vertex_input_state(&vertex_input_info)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .dynamic_state(&dynamic_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blending)
            .layout(pipeline_layout)
            .render_pass(self.render_pass)
            .subpass(0)
            .build();

        let pipelines = unsafe {
            self.device
                .device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
                .map_err(|(_, e)| e)
                .context("Failed to create graphics pipeline")
        };

        let pipelines = match pipelines {
            Ok(pipelines) => pipelines,
            Err(e) => {
                unsafe {
                    self.device
                        .device
                        .destroy_pipeline_layout(pipeline_layout, None)
                };
                return Err(e);
            }
        };

        Ok((pipelines[0], pipeline_layout))
    }
}

impl ShaderProgram<VulkanContext> for VulkanShader {
    fn create(&mut self) -> Result<()> {
        self.release();

        let vert_module = self.load_module(&self.vertex_path)?;
        let frag_module = match self.load_module(&self.fragment_path) {
            Ok(module) => module,
            Err(e) => {
                unsafe { self.device.device.destroy_shader_module(vert_module, None) };
                return Err(e);
            }
        };

        let result = self.build_pipeline(vert_module, frag_module);

        // Modules are only needed during pipeline construction
        unsafe {
            self.device.device.destroy_shader_module(vert_module, None);
            self.device.device.destroy_shader_module(frag_module, None);
        }

        self.pipeline = Some(result?);
        log::debug!(
            "Shader created from {:?} / {:?}",
            self.vertex_path,
            self.fragment_path
        );
        Ok(())
    }

    fn bind(&mut self, ctx: &mut VulkanContext) -> Result<()> {
        let (pipeline, layout) = self.pipeline.context("shader not created")?;

        let push = PushTransforms {
            mvp: self.projection * self.view * self.world,
            world: self.world,
        };

        unsafe {
            self.device.device.cmd_bind_pipeline(
                ctx.command_buffer(),
                vk::PipelineBindPoint::GRAPHICS,
                pipeline,
            );
            self.device.device.cmd_push_constants(
                ctx.command_buffer(),
                layout,
                vk::ShaderStageFlags::VERTEX,
                0,
                bytemuck::bytes_of(&push),
            );
        }
        ctx.bindings_mut().bind_shader();
        Ok(())
    }

    fn set_transform_matrices(&mut self, world: Mat4, view: Mat4, projection: Mat4) {
        self.world = world;
        self.view = view;
        self.projection = projection;
    }

    fn set_vertex_path(&mut self, path: &Path) {
        self.vertex_path = path.to_path_buf();
    }

    fn set_fragment_path(&mut self, path: &Path) {
        self.fragment_path = path.to_path_buf();
    }

    fn release(&mut self) {
        if let Some((pipeline, layout)) = self.pipeline.take() {
            unsafe {
                self.device.device.destroy_pipeline(pipeline, None);
                self.device.device.destroy_pipeline_layout(layout, None);
            }
        }
    }
}

impl Drop for VulkanShader {
    fn drop(&mut self) {
        self.release();
    }
}
