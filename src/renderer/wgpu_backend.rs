// SPDX-License-Identifier: GPL-3.0-only

//! wgpu implementation of the render backend
//!
//! Owns the GPU device, the offscreen render target and the live surface
//! swapchain. Frames arrive through the [`HardwareBuffer`] boundary; this
//! backend uploads them into an input texture and draws them into the
//! offscreen target with orientation/mirror correction, then composites the
//! offscreen target onto the surface on present. Platform-specific zero-copy
//! buffer import lives behind the same boundary and does not leak into the
//! rest of the pipeline.

use super::RenderBackend;
use crate::errors::RenderError;
use crate::session::types::{CameraFrame, HardwareBuffer, RenderSurface};
use std::sync::Arc;
use tracing::{debug, info};

/// Resolves an opaque surface token to a platform wgpu surface.
///
/// View-tree attachment is outside this crate; the embedding layer supplies
/// the resolver that knows how to turn a [`RenderSurface`] token into an
/// actual window surface.
pub trait SurfaceSource: Send {
    /// Create a wgpu surface for the given render surface token
    fn create_surface(
        &mut self,
        instance: &wgpu::Instance,
        surface: &RenderSurface,
    ) -> Result<wgpu::Surface<'static>, String>;
}

/// Uniform parameters for the blit shader
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct BlitParams {
    rotation: u32,
    mirrored: u32,
    _pad0: u32,
    _pad1: u32,
}

const OFFSCREEN_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

struct Texture2d {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    width: u32,
    height: u32,
}

struct BoundSurface {
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
}

/// wgpu render backend: offscreen target plus live surface binding
pub struct WgpuRenderBackend {
    instance: wgpu::Instance,
    adapter: wgpu::Adapter,
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    surface_source: Box<dyn SurfaceSource>,

    shader_module: wgpu::ShaderModule,
    pipeline_layout: wgpu::PipelineLayout,
    /// Blit pipeline targeting the offscreen format
    pipeline: wgpu::RenderPipeline,
    /// Blit pipeline targeting the bound surface's format, when it differs
    surface_pipeline: Option<(wgpu::TextureFormat, wgpu::RenderPipeline)>,
    bind_group_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    frame_params: wgpu::Buffer,
    present_params: wgpu::Buffer,

    input: Option<Texture2d>,
    input_bind_group: Option<wgpu::BindGroup>,
    offscreen: Option<Texture2d>,
    offscreen_bind_group: Option<wgpu::BindGroup>,
    bound: Option<BoundSurface>,
}

impl WgpuRenderBackend {
    /// Create a GPU device and the blit pipeline.
    ///
    /// # Arguments
    /// * `surface_source` - platform resolver for output surface tokens
    pub async fn new(surface_source: Box<dyn SurfaceSource>) -> Result<Self, String> {
        info!("Creating GPU device for preview rendering");

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::VULKAN,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| format!("Failed to find suitable GPU adapter: {}", e))?;

        let adapter_info = adapter.get_info();
        info!(
            adapter = %adapter_info.name,
            backend = ?adapter_info.backend,
            "GPU adapter selected for preview"
        );

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Preview Renderer Device"),
                required_features: wgpu::Features::empty(),
                required_limits: adapter.limits(),
                memory_hints: wgpu::MemoryHints::Performance,
                ..Default::default()
            })
            .await
            .map_err(|e| format!("Failed to create GPU device: {}", e))?;

        let shader_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Preview Blit Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("blit.wgsl").into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Preview Blit Bind Group Layout"),
            entries: &[
                // Source texture
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
                // Sampler
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                // Params uniform
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Preview Blit Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = build_blit_pipeline(&device, &pipeline_layout, &shader_module, OFFSCREEN_FORMAT);

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Preview Blit Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let frame_params = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Frame Blit Params"),
            size: std::mem::size_of::<BlitParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let present_params = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Present Blit Params"),
            size: std::mem::size_of::<BlitParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        // The composite pass is always an identity blit
        queue.write_buffer(
            &present_params,
            0,
            bytemuck::bytes_of(&BlitParams {
                rotation: 0,
                mirrored: 0,
                _pad0: 0,
                _pad1: 0,
            }),
        );

        Ok(Self {
            instance,
            adapter,
            device: Arc::new(device),
            queue: Arc::new(queue),
            surface_source,
            shader_module,
            pipeline_layout,
            pipeline,
            surface_pipeline: None,
            bind_group_layout,
            sampler,
            frame_params,
            present_params,
            input: None,
            input_bind_group: None,
            offscreen: None,
            offscreen_bind_group: None,
            bound: None,
        })
    }

    /// Blocking constructor for callers without an async runtime
    pub fn new_blocking(surface_source: Box<dyn SurfaceSource>) -> Result<Self, String> {
        pollster::block_on(Self::new(surface_source))
    }

    fn create_texture(&self, label: &str, width: u32, height: u32, render_target: bool) -> Texture2d {
        let usage = if render_target {
            wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING
        } else {
            wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST
        };
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: OFFSCREEN_FORMAT,
            usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Texture2d {
            texture,
            view,
            width,
            height,
        }
    }

    fn make_bind_group(&self, label: &str, view: &wgpu::TextureView, params: &wgpu::Buffer) -> wgpu::BindGroup {
        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: params.as_entire_binding(),
                },
            ],
        })
    }

    /// Reallocate the input texture if the buffer dimensions changed
    fn ensure_input(&mut self, buffer: &dyn HardwareBuffer) {
        let (width, height) = (buffer.width(), buffer.height());
        let stale = !matches!(&self.input, Some(t) if t.width == width && t.height == height);
        if stale {
            debug!(width, height, "Allocating frame input texture");
            let texture = self.create_texture("Frame Input Texture", width, height, false);
            self.input_bind_group =
                Some(self.make_bind_group("Frame Bind Group", &texture.view, &self.frame_params));
            self.input = Some(texture);
        }
    }

    fn blit(
        &self,
        label: &str,
        pipeline: &wgpu::RenderPipeline,
        bind_group: &wgpu::BindGroup,
        target: &wgpu::TextureView,
    ) {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(label),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, bind_group, &[]);
            pass.draw(0..3, 0..1);
        }
        self.queue.submit(Some(encoder.finish()));
    }
}

impl RenderBackend for WgpuRenderBackend {
    fn resize_offscreen(&mut self, width: u32, height: u32) -> Result<(), RenderError> {
        debug!(width, height, "Allocating offscreen target");
        let texture = self.create_texture("Offscreen Target", width, height, true);
        self.offscreen_bind_group = Some(self.make_bind_group(
            "Offscreen Bind Group",
            &texture.view,
            &self.present_params,
        ));
        self.offscreen = Some(texture);
        Ok(())
    }

    fn draw_frame(&mut self, frame: &CameraFrame) -> Result<(), RenderError> {
        self.ensure_input(frame.buffer.as_ref());
        let (Some(offscreen), Some(input), Some(bind_group)) =
            (&self.offscreen, &self.input, &self.input_bind_group)
        else {
            return Err(RenderError::DrawFailed("no offscreen target".into()));
        };

        // Upload through the buffer boundary; platform zero-copy import
        // replaces this inside a platform SurfaceSource/buffer pairing
        let pixels = frame.buffer.map_pixels();
        let expected = (input.width * input.height * 4) as usize;
        if pixels.len() < expected {
            return Err(RenderError::ImportFailed(format!(
                "buffer too small: {} < {}",
                pixels.len(),
                expected
            )));
        }
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &input.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &pixels[..expected],
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(input.width * 4),
                rows_per_image: Some(input.height),
            },
            wgpu::Extent3d {
                width: input.width,
                height: input.height,
                depth_or_array_layers: 1,
            },
        );

        self.queue.write_buffer(
            &self.frame_params,
            0,
            bytemuck::bytes_of(&BlitParams {
                rotation: frame.orientation.gpu_rotation_code(),
                mirrored: frame.mirrored as u32,
                _pad0: 0,
                _pad1: 0,
            }),
        );

        self.blit("Frame Offscreen Draw", &self.pipeline, bind_group, &offscreen.view);
        Ok(())
    }

    fn composite(&mut self) -> Result<(), RenderError> {
        let bound = self.bound.as_ref().ok_or(RenderError::NoSurface)?;
        let bind_group = self
            .offscreen_bind_group
            .as_ref()
            .ok_or_else(|| RenderError::DrawFailed("no offscreen target".into()))?;

        let frame = match bound.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Lost) | Err(wgpu::SurfaceError::Outdated) => {
                debug!("Surface lost or outdated, reconfiguring");
                bound.surface.configure(&self.device, &bound.config);
                bound
                    .surface
                    .get_current_texture()
                    .map_err(|e| RenderError::SurfaceLost(e.to_string()))?
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                return Err(RenderError::ContextLost("out of GPU memory".into()));
            }
            Err(e) => return Err(RenderError::SurfaceLost(e.to_string())),
        };

        let pipeline = match &self.surface_pipeline {
            Some((_, pipeline)) => pipeline,
            None => &self.pipeline,
        };
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        self.blit("Preview Composite", pipeline, bind_group, &view);
        frame.present();
        Ok(())
    }

    fn bind_surface(&mut self, surface: &RenderSurface) -> Result<(), RenderError> {
        // Rebind replaces any existing surface
        self.release_surface();

        let wgpu_surface = self
            .surface_source
            .create_surface(&self.instance, surface)
            .map_err(RenderError::SurfaceLost)?;

        let caps = wgpu_surface.get_capabilities(&self.adapter);
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|f| !f.is_srgb())
            .unwrap_or_else(|| caps.formats[0]);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: surface.width,
            height: surface.height,
            present_mode: wgpu::PresentMode::Fifo,
            desired_maximum_frame_latency: 2,
            alpha_mode: caps.alpha_modes[0],
            view_formats: vec![],
        };
        wgpu_surface.configure(&self.device, &config);

        // The composite pass must target the surface's own format
        if format != OFFSCREEN_FORMAT {
            let matches_cached = matches!(&self.surface_pipeline, Some((f, _)) if *f == format);
            if !matches_cached {
                let pipeline = build_blit_pipeline(
                    &self.device,
                    &self.pipeline_layout,
                    &self.shader_module,
                    format,
                );
                self.surface_pipeline = Some((format, pipeline));
            }
        } else {
            self.surface_pipeline = None;
        }

        info!(width = surface.width, height = surface.height, format = ?format, "Output surface bound");
        self.bound = Some(BoundSurface {
            surface: wgpu_surface,
            config,
        });
        Ok(())
    }

    fn release_surface(&mut self) {
        if self.bound.take().is_some() {
            debug!("Releasing output surface resources");
            self.surface_pipeline = None;
            // Dropping the wgpu surface releases the swapchain; wait for
            // submitted work so no GPU handle outlives the view
            let _ = self.device.poll(wgpu::PollType::wait_indefinitely());
        }
    }

    fn has_surface(&self) -> bool {
        self.bound.is_some()
    }
}

fn build_blit_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    shader_module: &wgpu::ShaderModule,
    format: wgpu::TextureFormat,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("Preview Blit Pipeline"),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: shader_module,
            entry_point: Some("vs_main"),
            compilation_options: Default::default(),
            buffers: &[],
        },
        fragment: Some(wgpu::FragmentState {
            module: shader_module,
            entry_point: Some("fs_main"),
            compilation_options: Default::default(),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        primitive: wgpu::PrimitiveState::default(),
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

impl std::fmt::Debug for WgpuRenderBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WgpuRenderBackend")
            .field(
                "offscreen",
                &self.offscreen.as_ref().map(|t| (t.width, t.height)),
            )
            .field("surface_bound", &self.bound.is_some())
            .finish()
    }
}
