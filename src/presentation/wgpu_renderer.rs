// SPDX-License-Identifier: GPL-3.0-only

//! wgpu render backend
//!
//! Drawables are offscreen `Rgba8Unorm` textures. Each frame uploads the
//! filtered image, draws a fullscreen triangle whose fragment shader maps
//! every drawable pixel back through the inverse display transform, and
//! submits. A drawable becomes idle again once the queue reports the
//! submission done.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

use super::{FramePresenter, HostFactory, PresentationSurface, RenderBackend, SurfaceFactory, SurfaceRequest};
use crate::errors::{PipelineError, RenderError, RenderResult};
use crate::filters::FilteredImage;
use crate::gpu::{self, GpuDeviceInfo, wgpu};
use crate::pipeline::geometry::Transform;
use crate::shaders::{CachedDimensions, PRESENT_SHADER, PresentParams, padded_bytes_per_row, read_buffer_async};

const DRAWABLE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// One offscreen render target
pub struct WgpuDrawable {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    width: u32,
    height: u32,
    idle: Arc<AtomicBool>,
}

pub struct WgpuRenderer {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    info: GpuDeviceInfo,
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    uniform_buffer: wgpu::Buffer,
    // Source texture reused while frame dimensions match
    source_dims: CachedDimensions,
    source_texture: Option<wgpu::Texture>,
    pending: Option<wgpu::CommandBuffer>,
}

impl WgpuRenderer {
    /// Create a device and build the render pipeline
    pub fn new() -> Result<Self, String> {
        let (device, queue, info) = pollster::block_on(gpu::create_device("fxcam-present"))?;
        info!(
            adapter_name = %info.adapter_name,
            adapter_backend = ?info.backend,
            "GPU device created for presentation"
        );
        Ok(Self::with_device(device, queue, info))
    }

    pub fn with_device(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>, info: GpuDeviceInfo) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("present_shader"),
            source: wgpu::ShaderSource::Wgsl(PRESENT_SHADER.into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("present_bind_group_layout"),
            entries: &[
                // Source image
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
                // Inverse transform and extent
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
            label: Some("present_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("present_pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[],
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: DRAWABLE_FORMAT,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("present_sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("present_uniform_buffer"),
            size: std::mem::size_of::<PresentParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self {
            device,
            queue,
            info,
            pipeline,
            bind_group_layout,
            sampler,
            uniform_buffer,
            source_dims: CachedDimensions::default(),
            source_texture: None,
            pending: None,
        }
    }

    pub fn info(&self) -> &GpuDeviceInfo {
        &self.info
    }

    fn ensure_source(&mut self, width: u32, height: u32) {
        if self.source_texture.is_some() && !self.source_dims.needs_update(width, height) {
            return;
        }
        debug!(width, height, "Allocating presentation source texture");
        self.source_texture = Some(self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("present_source_texture"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        }));
        self.source_dims.update(width, height);
    }
}

impl RenderBackend for WgpuRenderer {
    type Target = WgpuDrawable;

    fn create_target(&mut self, width: u32, height: u32, slot: usize) -> RenderResult<WgpuDrawable> {
        let limit = self.device.limits().max_texture_dimension_2d;
        if width > limit || height > limit {
            return Err(RenderError(format!(
                "drawable {}x{} exceeds texture limit {}",
                width, height, limit
            )));
        }
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&format!("present_drawable_{}", slot)),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DRAWABLE_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Ok(WgpuDrawable {
            texture,
            view,
            width,
            height,
            idle: Arc::new(AtomicBool::new(true)),
        })
    }

    fn render(
        &mut self,
        target: &WgpuDrawable,
        image: &FilteredImage,
        transform: &Transform,
    ) -> RenderResult<()> {
        let inverse = transform
            .inverse()
            .ok_or_else(|| RenderError("transform is not invertible".to_string()))?;
        let (width, height) = (image.width(), image.height());
        if width == 0 || height == 0 {
            return Err(RenderError("empty source image".to_string()));
        }

        self.ensure_source(width, height);
        let source_texture = self
            .source_texture
            .as_ref()
            .ok_or_else(|| RenderError("source texture not allocated".to_string()))?;

        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: source_texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            image.pixels.as_raw(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(width * 4),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );

        let params = PresentParams::new(&inverse, &image.extent, target.width, target.height);
        self.queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&params));

        let source_view = source_texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("present_bind_group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&source_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: self.uniform_buffer.as_entire_binding(),
                },
            ],
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("present_encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("present_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                ..Default::default()
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, Some(&bind_group), &[]);
            pass.draw(0..3, 0..1);
        }

        self.pending = Some(encoder.finish());
        Ok(())
    }

    fn present(&mut self, target: &WgpuDrawable) -> RenderResult<()> {
        let commands = self
            .pending
            .take()
            .ok_or_else(|| RenderError("nothing rendered to present".to_string()))?;

        target.idle.store(false, Ordering::Release);
        self.queue.submit(std::iter::once(commands));

        let idle = Arc::clone(&target.idle);
        self.queue.on_submitted_work_done(move || {
            idle.store(true, Ordering::Release);
        });
        Ok(())
    }

    fn is_idle(&self, target: &WgpuDrawable) -> bool {
        target.idle.load(Ordering::Acquire)
    }

    fn maintain(&mut self) {
        // Drives the work-done callbacks
        let _ = self.device.poll(wgpu::PollType::Poll);
    }

    fn read_back(&mut self, target: &WgpuDrawable) -> Option<Vec<u8>> {
        let padded = padded_bytes_per_row(target.width);
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("present_readback_buffer"),
            size: padded as u64 * target.height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("present_readback_encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &target.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(target.height),
                },
            },
            wgpu::Extent3d {
                width: target.width,
                height: target.height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let padded_data = match pollster::block_on(read_buffer_async(&self.device, &staging)) {
            Ok(data) => data,
            Err(e) => {
                debug!(error = %e, "Drawable read-back failed");
                return None;
            }
        };

        let row_bytes = (target.width * 4) as usize;
        let mut pixels = Vec::with_capacity(row_bytes * target.height as usize);
        for row in padded_data.chunks_exact(padded as usize) {
            pixels.extend_from_slice(&row[..row_bytes]);
        }
        Some(pixels)
    }
}

/// Surface factory rendering with wgpu
///
/// Device creation failure surfaces as [`PipelineError::GpuContextUnavailable`].
pub fn wgpu_surface_factory(make_host: HostFactory) -> SurfaceFactory {
    Arc::new(move |request: SurfaceRequest| {
        let renderer = WgpuRenderer::new().map_err(PipelineError::GpuContextUnavailable)?;
        let surface = PresentationSurface::new(renderer, request.drawable_count, make_host());
        Ok(Box::new(surface) as Box<dyn FramePresenter>)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn test_render_and_read_back() {
        // Requires a GPU, skipped when none is available
        let mut renderer = match WgpuRenderer::new() {
            Ok(r) => r,
            Err(e) => {
                println!("Skipping test (no GPU): {}", e);
                return;
            }
        };

        let target = renderer.create_target(8, 8, 0).unwrap();
        let image = FilteredImage::at_origin(RgbaImage::from_pixel(4, 4, Rgba([255, 0, 0, 255])));
        let transform = Transform {
            rotation: 0.0,
            sx: 1.0,
            sy: 1.0,
            tx: 0.0,
            ty: 0.0,
            raw_scale: 1.0,
        };
        renderer.render(&target, &image, &transform).unwrap();
        renderer.present(&target).unwrap();

        let pixels = renderer.read_back(&target).unwrap();
        assert_eq!(pixels.len(), 8 * 8 * 4);
        assert_eq!(&pixels[0..4], &[255, 0, 0, 255]);
        // Pixel (7, 7) lies outside the 4x4 extent
        let last = (7 * 8 + 7) * 4;
        assert_eq!(&pixels[last..last + 4], &[0, 0, 0, 255]);
    }
}
