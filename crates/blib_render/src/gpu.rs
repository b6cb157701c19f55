// gpu.rs - wgpu device, descriptor buffer uploads and render targets

use crate::descriptors::{BufferSink, BufferTarget};
use crate::graph::{Asset, InitContext, TargetSize};
use crate::scene::SceneId;
use crate::{GpuError, GraphError};
use blib_core::math::UVec2;
use std::collections::HashMap;
use std::sync::Arc;

/// Headless device and queue.
pub struct GpuContext {
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

impl GpuContext {
    /// Open the default adapter without a surface. Blocks until the device
    /// is ready.
    pub fn new_headless() -> Result<Self, GpuError> {
        pollster::block_on(Self::request())
    }

    async fn request() -> Result<Self, GpuError> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or(GpuError::NoAdapter)?;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("blib device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::downlevel_defaults(),
                    memory_hints: wgpu::MemoryHints::default(),
                },
                None,
            )
            .await?;

        let info = adapter.get_info();
        tracing::info!(adapter = %info.name, backend = ?info.backend, "gpu device ready");
        Ok(Self {
            adapter,
            device,
            queue,
        })
    }
}

struct GpuBuffer {
    buffer: wgpu::Buffer,
    size: u64,
}

/// Uploads descriptor ranges into storage buffers with
/// [`wgpu::Queue::write_buffer`]. Buffers grow to the next power of two
/// and keep their previous contents.
pub struct GpuBufferSink {
    gpu: Arc<GpuContext>,
    buffers: HashMap<BufferTarget, GpuBuffer>,
}

const MIN_BUFFER_SIZE: u64 = 256;

impl GpuBufferSink {
    pub fn new(gpu: Arc<GpuContext>) -> Self {
        Self {
            gpu,
            buffers: HashMap::new(),
        }
    }

    pub fn buffer(&self, target: &BufferTarget) -> Option<&wgpu::Buffer> {
        self.buffers.get(target).map(|b| &b.buffer)
    }

    fn ensure_size(&mut self, target: BufferTarget, size: u64) -> &wgpu::Buffer {
        let grow = self.buffers.get(&target).map_or(true, |b| b.size < size);
        if grow {
            let new_size = size.next_power_of_two().max(MIN_BUFFER_SIZE);
            let buffer = self.gpu.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(target.kind),
                size: new_size,
                usage: wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::COPY_DST
                    | wgpu::BufferUsages::COPY_SRC,
                mapped_at_creation: false,
            });
            if let Some(old) = self.buffers.get(&target) {
                let mut encoder =
                    self.gpu
                        .device
                        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                            label: Some("descriptor buffer growth"),
                        });
                encoder.copy_buffer_to_buffer(&old.buffer, 0, &buffer, 0, old.size);
                self.gpu.queue.submit(Some(encoder.finish()));
            }
            tracing::debug!(kind = target.kind, speed = ?target.speed, size = new_size, "descriptor buffer allocated");
            self.buffers.insert(
                target,
                GpuBuffer {
                    buffer,
                    size: new_size,
                },
            );
        }
        &self.buffers[&target].buffer
    }
}

impl BufferSink for GpuBufferSink {
    fn upload(&mut self, target: BufferTarget, offset: u64, bytes: &[u8]) {
        let end = offset + bytes.len() as u64;
        let gpu = self.gpu.clone();
        let buffer = self.ensure_size(target, end);
        gpu.queue.write_buffer(buffer, offset, bytes);
    }

    fn release_scene(&mut self, scene: SceneId) {
        self.buffers.retain(|target, _| target.scene != scene);
    }
}

/// Color render target sized by a [`TargetSize`] policy.
///
/// Without a device only the size is tracked, so graphs can be built and
/// executed headless.
pub struct TextureTargetAsset {
    label: &'static str,
    policy: TargetSize,
    format: wgpu::TextureFormat,
    size: UVec2,
    texture: Option<wgpu::Texture>,
    view: Option<wgpu::TextureView>,
    allocations: u32,
}

impl TextureTargetAsset {
    pub fn new(label: &'static str, policy: TargetSize) -> Self {
        Self {
            label,
            policy,
            format: wgpu::TextureFormat::Rgba8Unorm,
            size: UVec2::ZERO,
            texture: None,
            view: None,
            allocations: 0,
        }
    }

    pub fn with_format(mut self, format: wgpu::TextureFormat) -> Self {
        self.format = format;
        self
    }

    pub fn size(&self) -> UVec2 {
        self.size
    }

    pub fn policy(&self) -> TargetSize {
        self.policy
    }

    pub fn texture(&self) -> Option<&wgpu::Texture> {
        self.texture.as_ref()
    }

    pub fn view(&self) -> Option<&wgpu::TextureView> {
        self.view.as_ref()
    }

    /// How many times storage was (re)allocated.
    pub fn allocations(&self) -> u32 {
        self.allocations
    }

    fn allocate(&mut self, ctx: &InitContext, size: UVec2) {
        self.size = size;
        self.allocations += 1;
        let Some(gpu) = ctx.gpu else {
            return;
        };
        let texture = gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(self.label),
            size: wgpu::Extent3d {
                width: size.x,
                height: size.y,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: self.format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        self.view = Some(texture.create_view(&wgpu::TextureViewDescriptor::default()));
        self.texture = Some(texture);
    }
}

impl Asset for TextureTargetAsset {
    fn create(&mut self, ctx: &InitContext) -> Result<(), GraphError> {
        let size = self.policy.resolve(ctx.observer_size);
        self.allocate(ctx, size);
        Ok(())
    }

    fn on_resize(&mut self, ctx: &InitContext) {
        let size = self.policy.resolve(ctx.observer_size);
        if size != self.size {
            self.allocate(ctx, size);
        }
    }
}
