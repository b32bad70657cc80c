use std::borrow::Cow;

use tracing::{debug, info};
use wgpu::util::DeviceExt;

use crate::backend::{GpuBackendKind, RenderBackend, Vertex, BYTES_PER_PIXEL};
use crate::{GpuError, GpuResult};

const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24Plus;

const SHADER: &str = r#"
struct VertexInput {
  @location(0) pos: vec3<f32>,
};

@vertex
fn vs_main(in: VertexInput) -> @builtin(position) vec4<f32> {
  return vec4<f32>(in.pos, 1.0);
}

@fragment
fn fs_main() -> @location(0) vec4<f32> {
  return vec4<f32>(1.0, 0.0, 0.0, 1.0);
}
"#;

/// Headless `wgpu` renderer.
///
/// Fields drop in declaration order, so pipeline and targets are released before the device.
pub struct WgpuBackend {
    pipeline: wgpu::RenderPipeline,
    staging: wgpu::Buffer,
    depth_view: wgpu::TextureView,
    color_view: wgpu::TextureView,
    color: wgpu::Texture,
    width: u32,
    height: u32,
    padded_bytes_per_row: u32,
    queue: wgpu::Queue,
    device: wgpu::Device,
}

impl WgpuBackend {
    /// Acquires an adapter, device and every render target for a `width` x `height` surface.
    ///
    /// Any failure drops whatever was already acquired.
    pub fn new(width: u32, height: u32) -> GpuResult<Self> {
        pollster::block_on(Self::new_async(width, height))
    }

    async fn new_async(width: u32, height: u32) -> GpuResult<Self> {
        ensure_xdg_runtime_dir();

        let adapter = request_adapter()
            .await
            .ok_or_else(|| GpuError::BackendInit("no suitable wgpu adapter found".into()))?;
        let info = adapter.get_info();

        let max = adapter.limits().max_texture_dimension_2d;
        if width == 0 || height == 0 || width > max || height > max {
            return Err(GpuError::InvalidSurfaceSize { width, height, max });
        }

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("hostvm gpu device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::downlevel_defaults()
                        .using_resolution(adapter.limits()),
                },
                None,
            )
            .await
            .map_err(|err| GpuError::BackendInit(format!("request_device failed: {err}")))?;

        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("hostvm solid-colour shader"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(SHADER)),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("hostvm pipeline layout"),
            bind_group_layouts: &[],
            push_constant_ranges: &[],
        });

        const ATTRS: [wgpu::VertexAttribute; 1] = [wgpu::VertexAttribute {
            format: wgpu::VertexFormat::Float32x3,
            offset: 0,
            shader_location: 0,
        }];

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("hostvm triangle pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: "vs_main",
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &ATTRS,
                }],
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: "fs_main",
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: COLOR_FORMAT,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: Default::default(),
                bias: Default::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
        });

        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let color = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("hostvm colour target"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: COLOR_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let depth = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("hostvm depth target"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let color_view = color.create_view(&wgpu::TextureViewDescriptor::default());
        let depth_view = depth.create_view(&wgpu::TextureViewDescriptor::default());

        let unpadded_bytes_per_row = width * BYTES_PER_PIXEL as u32;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded_bytes_per_row = unpadded_bytes_per_row.div_ceil(align) * align;
        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("hostvm readback staging"),
            size: padded_bytes_per_row as u64 * height as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        if let Some(err) = device.pop_error_scope().await {
            return Err(GpuError::BackendInit(format!(
                "pipeline/target creation failed: {err}"
            )));
        }

        info!(
            adapter = %info.name,
            backend = ?info.backend,
            width,
            height,
            "wgpu backend initialized"
        );

        Ok(Self {
            pipeline,
            staging,
            depth_view,
            color_view,
            color,
            width,
            height,
            padded_bytes_per_row,
            queue,
            device,
        })
    }

    fn readback(&self, out: &mut [u8]) -> GpuResult<()> {
        let slice = self.staging.slice(..);
        let (sender, receiver) = futures_intrusive::channel::shared::oneshot_channel();
        slice.map_async(wgpu::MapMode::Read, move |v| {
            sender.send(v).ok();
        });
        self.device.poll(wgpu::Maintain::Wait);

        pollster::block_on(receiver.receive())
            .ok_or_else(|| GpuError::Readback("map_async callback dropped".into()))?
            .map_err(|err| GpuError::Readback(err.to_string()))?;

        let row_bytes = self.width as usize * BYTES_PER_PIXEL;
        {
            let mapped = slice.get_mapped_range();
            for (row, dst) in out.chunks_exact_mut(row_bytes).enumerate() {
                let start = row * self.padded_bytes_per_row as usize;
                dst.copy_from_slice(&mapped[start..start + row_bytes]);
            }
        }
        self.staging.unmap();
        Ok(())
    }
}

impl RenderBackend for WgpuBackend {
    fn kind(&self) -> GpuBackendKind {
        GpuBackendKind::Wgpu
    }

    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn draw(&mut self, vertices: &[Vertex], out: &mut [u8]) -> GpuResult<()> {
        let vertex_buffer = (!vertices.is_empty()).then(|| {
            self.device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("hostvm vertex buffer"),
                    contents: bytemuck::cast_slice(vertices),
                    usage: wgpu::BufferUsages::VERTEX,
                })
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("hostvm render encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("hostvm render pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.color_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            if let Some(buffer) = vertex_buffer.as_ref() {
                pass.set_pipeline(&self.pipeline);
                pass.set_vertex_buffer(0, buffer.slice(..));
                pass.draw(0..vertices.len() as u32, 0..1);
            }
        }

        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &self.color,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &self.staging,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(self.padded_bytes_per_row),
                    rows_per_image: Some(self.height),
                },
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit([encoder.finish()]);
        debug!(vertices = vertices.len(), "frame submitted");

        self.readback(out)
    }
}

async fn request_adapter() -> Option<wgpu::Adapter> {
    // Prefer GL on Linux; some Vulkan software adapters crash in headless environments.
    let backends = if cfg!(target_os = "linux") {
        [wgpu::Backends::GL, wgpu::Backends::PRIMARY]
    } else {
        [wgpu::Backends::PRIMARY, wgpu::Backends::empty()]
    };

    for backends in backends.into_iter().filter(|b| !b.is_empty()) {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends,
            ..Default::default()
        });
        for force_fallback_adapter in [false, true] {
            let adapter = instance
                .request_adapter(&wgpu::RequestAdapterOptions {
                    power_preference: wgpu::PowerPreference::HighPerformance,
                    compatible_surface: None,
                    force_fallback_adapter,
                })
                .await;
            if adapter.is_some() {
                return adapter;
            }
        }
    }
    None
}

/// GL stacks on Linux warn or fail when `XDG_RUNTIME_DIR` is missing or world-readable; point it
/// at a private per-process directory.
fn ensure_xdg_runtime_dir() {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        use std::sync::OnceLock;

        static INIT: OnceLock<()> = OnceLock::new();
        INIT.get_or_init(|| {
            let needs_runtime_dir = match std::env::var("XDG_RUNTIME_DIR") {
                Ok(dir) if !dir.is_empty() => match std::fs::metadata(&dir) {
                    Ok(meta) => !meta.is_dir() || (meta.permissions().mode() & 0o077) != 0,
                    Err(_) => true,
                },
                _ => true,
            };
            if needs_runtime_dir {
                let dir = std::env::temp_dir()
                    .join(format!("hostvm-xdg-runtime-{}", std::process::id()));
                let _ = std::fs::create_dir_all(&dir);
                let _ = std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o700));
                std::env::set_var("XDG_RUNTIME_DIR", &dir);
            }
        });
    }
}
