//! Masked screen-space distortion.

use std::sync::Arc;

use crate::builtin;
use crate::context::Context;
use crate::post_processing::post_processing_effect::{PostProcessingContext, PostProcessingEffect};
use crate::resource::{RenderTarget, Texture};
use bytemuck::{Pod, Zeroable};
use glamx::Vec2;

/// Vertex data for full-screen quad.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct QuadVertex {
    position: [f32; 2],
}

/// Uniforms for the distortion effect.
///
/// Layout must match the `DistortionUniforms` struct in distortion.wgsl:
/// the vec2 starts at offset 8.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct DistortionUniforms {
    distortion_scale: f32,
    _padding: f32,
    noise_uv_scale: [f32; 2],
}

/// Which fragment entry point the effect renders with.
///
/// The variant is fixed when the pipeline is built, so the per-pixel path
/// never branches on it.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DistortionMode {
    /// Masked UV-offset distortion.
    Normal,
    /// Pass the source image through untouched.
    Bypass,
    /// Replicate the distortion strength to all channels, for tuning masks.
    VisualizeMask,
}

impl DistortionMode {
    fn fragment_entry_point(self) -> &'static str {
        match self {
            DistortionMode::Normal => "fs_main",
            DistortionMode::Bypass => "fs_bypass",
            DistortionMode::VisualizeMask => "fs_mask",
        }
    }
}

/// Scalar parameters of the distortion effect.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DistortionParams {
    /// Multiplies the noise-derived offset magnitude.
    pub distortion_scale: f32,
    /// Scales the UV coordinates used to sample the noise texture, tiling
    /// or zooming the noise pattern.
    pub noise_uv_scale: Vec2,
}

impl Default for DistortionParams {
    fn default() -> Self {
        DistortionParams {
            distortion_scale: 0.02,
            noise_uv_scale: Vec2::new(1.0, 1.0),
        }
    }
}

impl DistortionParams {
    /// Builds parameters from optional overrides; `None` keeps the default.
    pub fn merged(noise_uv_scale: Option<Vec2>, distortion_scale: Option<f32>) -> Self {
        let mut params = DistortionParams::default();
        if let Some(uv_scale) = noise_uv_scale {
            params.noise_uv_scale = uv_scale;
        }
        if let Some(scale) = distortion_scale {
            params.distortion_scale = scale;
        }
        params
    }
}

/// GPU state of the effect, one set per effect instance.
struct GpuState {
    pipeline: wgpu::RenderPipeline,
    screen_bind_group_layout: wgpu::BindGroupLayout,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    source_bind_group: wgpu::BindGroup,
    vertex_buffer: wgpu::Buffer,
}

/// Post-processing effect which displaces the rendered scene by a noise
/// texture, gated per pixel by a mask texture.
///
/// For each pixel, the mask's squared magnitude (clamped to 1) scales a
/// 2-channel noise sample into a UV offset, and the scene is re-sampled at
/// the offset coordinate. Each instance owns its parameters and pipeline;
/// only the shader source is shared.
///
/// ```no_run
/// use distort3d::post_processing::Distortion;
/// use distort3d::resource::{Texture, TextureWrapping};
///
/// let noise = Texture::from_file("noise.png".as_ref(), TextureWrapping::Repeat);
/// let mask = Texture::from_file("mask.png".as_ref(), TextureWrapping::ClampToEdge);
/// let effect = Distortion::new(noise, mask);
/// // Hand `effect` to the host render loop as a `PostProcessingEffect`.
/// ```
pub struct Distortion {
    noise: Arc<Texture>,
    mask: Arc<Texture>,
    params: DistortionParams,
    mode: DistortionMode,
    gpu: Option<GpuState>,
}

impl Distortion {
    /// Creates a new distortion effect with the default parameters
    /// (`distortion_scale = 0.02`, `noise_uv_scale = (1, 1)`).
    pub fn new(noise: Arc<Texture>, mask: Arc<Texture>) -> Distortion {
        Self::with_mode(noise, None, mask, None, DistortionMode::Normal)
    }

    /// Creates a new distortion effect with optional parameter overrides.
    ///
    /// A `None` override leaves the corresponding default in effect.
    pub fn with_params(
        noise: Arc<Texture>,
        noise_uv_scale: Option<Vec2>,
        mask: Arc<Texture>,
        distortion_scale: Option<f32>,
    ) -> Distortion {
        Self::with_mode(
            noise,
            noise_uv_scale,
            mask,
            distortion_scale,
            DistortionMode::Normal,
        )
    }

    /// Creates a new distortion effect rendering with the given mode.
    pub fn with_mode(
        noise: Arc<Texture>,
        noise_uv_scale: Option<Vec2>,
        mask: Arc<Texture>,
        distortion_scale: Option<f32>,
        mode: DistortionMode,
    ) -> Distortion {
        let params = DistortionParams::merged(noise_uv_scale, distortion_scale);

        // The noise data must reach the device before the first frame
        // samples it.
        noise.mark_needs_upload();

        let gpu = if Context::is_initialized() {
            Some(Self::build_gpu(&noise, &mask, mode))
        } else {
            log::error!(
                "distortion effect created without an initialized rendering context; \
                 GPU state is deferred to the first draw"
            );
            None
        };

        Distortion {
            noise,
            mask,
            params,
            mode,
            gpu,
        }
    }

    /// The current offset magnitude multiplier.
    pub fn distortion_scale(&self) -> f32 {
        self.params.distortion_scale
    }

    /// Sets the offset magnitude multiplier.
    pub fn set_distortion_scale(&mut self, scale: f32) {
        self.params.distortion_scale = scale;
    }

    /// The current noise UV scale.
    pub fn noise_uv_scale(&self) -> Vec2 {
        self.params.noise_uv_scale
    }

    /// Sets the noise UV scale.
    pub fn set_noise_uv_scale(&mut self, scale: Vec2) {
        self.params.noise_uv_scale = scale;
    }

    /// The mode this effect renders with.
    pub fn mode(&self) -> DistortionMode {
        self.mode
    }

    /// The current parameters.
    pub fn params(&self) -> DistortionParams {
        self.params
    }

    fn build_gpu(noise: &Texture, mask: &Texture, mode: DistortionMode) -> GpuState {
        let ctxt = Context::get();

        // Create bind group layout for the screen texture + sampler
        let screen_bind_group_layout =
            ctxt.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("distortion_screen_bind_group_layout"),
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Float { filterable: true },
                            view_dimension: wgpu::TextureViewDimension::D2,
                            multisampled: false,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                        count: None,
                    },
                ],
            });

        // Create bind group layout for uniforms. The vertex stage reads
        // noise_uv_scale, so the buffer is visible to both stages.
        let uniform_bind_group_layout =
            ctxt.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("distortion_uniform_bind_group_layout"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                }],
            });

        // Create bind group layout for the noise + mask textures
        let source_bind_group_layout =
            ctxt.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("distortion_source_bind_group_layout"),
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Float { filterable: true },
                            view_dimension: wgpu::TextureViewDimension::D2,
                            multisampled: false,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 2,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Float { filterable: true },
                            view_dimension: wgpu::TextureViewDimension::D2,
                            multisampled: false,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 3,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                        count: None,
                    },
                ],
            });

        let pipeline_layout = ctxt.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("distortion_pipeline_layout"),
            bind_group_layouts: &[
                &screen_bind_group_layout,
                &uniform_bind_group_layout,
                &source_bind_group_layout,
            ],
            push_constant_ranges: &[],
        });

        // Load shader
        let shader = ctxt.create_shader_module(Some("distortion_shader"), builtin::DISTORTION_SRC);

        // Vertex buffer layout
        let vertex_buffer_layout = wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<QuadVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[wgpu::VertexAttribute {
                offset: 0,
                shader_location: 0,
                format: wgpu::VertexFormat::Float32x2,
            }],
        };

        let pipeline = ctxt.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("distortion_pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[vertex_buffer_layout],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some(mode.fragment_entry_point()),
                targets: &[Some(wgpu::ColorTargetState {
                    format: ctxt.surface_format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleStrip,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState {
                count: 1,
                mask: !0,
                alpha_to_coverage_enabled: false,
            },
            multiview: None,
            cache: None,
        });

        // Create full-screen quad vertices
        let vertices = [
            QuadVertex {
                position: [-1.0, -1.0],
            },
            QuadVertex {
                position: [1.0, -1.0],
            },
            QuadVertex {
                position: [-1.0, 1.0],
            },
            QuadVertex {
                position: [1.0, 1.0],
            },
        ];

        let vertex_buffer = ctxt.create_buffer_init(
            Some("distortion_vertex_buffer"),
            bytemuck::cast_slice(&vertices),
            wgpu::BufferUsages::VERTEX,
        );

        // Create uniform buffer
        let uniform_buffer = ctxt.create_buffer_simple(
            Some("distortion_uniform_buffer"),
            std::mem::size_of::<DistortionUniforms>() as u64,
            wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        );

        // Create uniform bind group
        let uniform_bind_group = ctxt.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("distortion_uniform_bind_group"),
            layout: &uniform_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        // The noise and mask textures live for the whole effect, so their
        // bind group is built once here (binding them creates the GPU
        // textures and performs any pending upload).
        noise.upload_if_needed();
        mask.upload_if_needed();

        let source_bind_group = ctxt.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("distortion_source_bind_group"),
            layout: &source_bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(noise.view()),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(noise.sampler()),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(mask.view()),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::Sampler(mask.sampler()),
                },
            ],
        });

        GpuState {
            pipeline,
            screen_bind_group_layout,
            uniform_buffer,
            uniform_bind_group,
            source_bind_group,
            vertex_buffer,
        }
    }
}

impl PostProcessingEffect for Distortion {
    fn update(&mut self, _: f32, _: f32, _: f32, _: f32, _: f32) {}

    fn draw(&mut self, target: &RenderTarget, context: &mut PostProcessingContext) {
        if self.gpu.is_none() {
            if !Context::is_initialized() {
                log::error!(
                    "distortion effect drawn without an initialized rendering context; \
                     skipping the pass"
                );
                return;
            }
            self.gpu = Some(Self::build_gpu(&self.noise, &self.mask, self.mode));
        }
        let gpu = match self.gpu.as_ref() {
            Some(gpu) => gpu,
            None => return,
        };

        let ctxt = Context::get();

        // Get the source texture and sampler from the render target
        let (color_view, sampler) = match target {
            RenderTarget::Offscreen(o) => (&o.color_view, &o.sampler),
            RenderTarget::Screen => return, // Can't post-process the screen directly
        };

        // Re-send any texture data marked dirty since the last frame
        self.noise.upload_if_needed();
        self.mask.upload_if_needed();

        // Update uniforms
        let uniforms = DistortionUniforms {
            distortion_scale: self.params.distortion_scale,
            _padding: 0.0,
            noise_uv_scale: [self.params.noise_uv_scale.x, self.params.noise_uv_scale.y],
        };
        ctxt.write_buffer(&gpu.uniform_buffer, 0, bytemuck::bytes_of(&uniforms));

        // Create the screen texture bind group for this frame
        let screen_bind_group = ctxt.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("distortion_screen_bind_group"),
            layout: &gpu.screen_bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(color_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        });

        // Create render pass to the output view
        {
            let mut render_pass = context
                .encoder
                .begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("distortion_render_pass"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: context.output_view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                            store: wgpu::StoreOp::Store,
                        },
                        depth_slice: None,
                    })],
                    depth_stencil_attachment: None,
                    timestamp_writes: None,
                    occlusion_query_set: None,
                });

            render_pass.set_pipeline(&gpu.pipeline);
            render_pass.set_bind_group(0, &screen_bind_group, &[]);
            render_pass.set_bind_group(1, &gpu.uniform_bind_group, &[]);
            render_pass.set_bind_group(2, &gpu.source_bind_group, &[]);
            render_pass.set_vertex_buffer(0, gpu.vertex_buffer.slice(..));
            render_pass.draw(0..4, 0..1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::TextureWrapping;

    fn test_texture() -> Arc<Texture> {
        Texture::from_pixels(2, 2, vec![128; 16], TextureWrapping::Repeat)
    }

    #[test]
    fn omitted_parameters_keep_defaults() {
        let params = DistortionParams::merged(None, None);
        assert_eq!(params.distortion_scale, 0.02);
        assert_eq!(params.noise_uv_scale, Vec2::new(1.0, 1.0));
    }

    #[test]
    fn supplied_scale_is_bound_exactly() {
        let params = DistortionParams::merged(None, Some(0.325));
        assert_eq!(params.distortion_scale, 0.325);
        // Extreme values pass through unrounded and unclamped.
        assert_eq!(
            DistortionParams::merged(None, Some(1.0e-9)).distortion_scale,
            1.0e-9
        );
        assert_eq!(
            DistortionParams::merged(None, Some(-4.0)).distortion_scale,
            -4.0
        );
    }

    #[test]
    fn one_override_leaves_the_other_default() {
        let params = DistortionParams::merged(Some(Vec2::new(4.0, 2.0)), None);
        assert_eq!(params.noise_uv_scale, Vec2::new(4.0, 2.0));
        assert_eq!(params.distortion_scale, 0.02);
    }

    #[test]
    fn uniform_layout_matches_wgsl() {
        // WGSL: f32 at 0, vec2<f32> aligned to 8, struct size 16.
        assert_eq!(std::mem::size_of::<DistortionUniforms>(), 16);
        assert_eq!(
            std::mem::offset_of!(DistortionUniforms, distortion_scale),
            0
        );
        assert_eq!(std::mem::offset_of!(DistortionUniforms, noise_uv_scale), 8);
    }

    #[test]
    fn modes_select_distinct_entry_points() {
        assert_eq!(DistortionMode::Normal.fragment_entry_point(), "fs_main");
        assert_eq!(DistortionMode::Bypass.fragment_entry_point(), "fs_bypass");
        assert_eq!(
            DistortionMode::VisualizeMask.fragment_entry_point(),
            "fs_mask"
        );
    }

    #[test]
    fn shader_source_contains_all_entry_points() {
        for entry_point in ["vs_main", "fs_main", "fs_bypass", "fs_mask"] {
            assert!(
                builtin::DISTORTION_SRC.contains(&format!("fn {}", entry_point)),
                "missing entry point {}",
                entry_point
            );
        }
    }

    #[test]
    fn construction_without_context_is_non_fatal() {
        // No rendering context exists on this thread: construction must
        // still hand back a usable effect, with GPU state deferred.
        let noise = test_texture();
        let effect = Distortion::new(noise.clone(), test_texture());

        assert!(effect.gpu.is_none());
        assert_eq!(effect.distortion_scale(), 0.02);
        assert_eq!(effect.noise_uv_scale(), Vec2::new(1.0, 1.0));
        assert_eq!(effect.mode(), DistortionMode::Normal);
        // Construction requested a fresh upload of the noise data.
        assert!(noise.needs_upload());
    }

    #[test]
    fn parameters_are_per_instance() {
        let mut first = Distortion::with_params(test_texture(), None, test_texture(), Some(0.5));
        let second = Distortion::new(test_texture(), test_texture());

        first.set_distortion_scale(0.75);
        first.set_noise_uv_scale(Vec2::new(8.0, 8.0));

        assert_eq!(first.distortion_scale(), 0.75);
        assert_eq!(second.distortion_scale(), 0.02);
        assert_eq!(second.noise_uv_scale(), Vec2::new(1.0, 1.0));
    }
}
