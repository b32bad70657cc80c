use hostvm_types::EngineState;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::backend::{GpuBackendKind, RenderBackend, Vertex, BYTES_PER_PIXEL};
use crate::{GpuError, GpuResult, SoftwareBackend, WgpuBackend};

/// The triangle a freshly started host draws: bottom-left, bottom-right, top-centre.
pub const DEFAULT_TRIANGLE: [f32; 9] = [-1.0, -1.0, 0.0, 1.0, -1.0, 0.0, 0.0, 1.0, 0.0];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GpuConfig {
    pub width: u32,
    pub height: u32,
    pub backend: GpuBackendKind,
}

impl Default for GpuConfig {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            backend: GpuBackendKind::Auto,
        }
    }
}

struct Surface {
    backend: Box<dyn RenderBackend>,
    color: Vec<u8>,
}

/// Offscreen render engine: `Uninitialized <-> Initialized`.
pub struct GpuEngine {
    kind: GpuBackendKind,
    surface: Option<Surface>,
    frames: u64,
}

impl Default for GpuEngine {
    fn default() -> Self {
        Self::new(GpuBackendKind::default())
    }
}

impl GpuEngine {
    pub fn new(kind: GpuBackendKind) -> Self {
        Self {
            kind,
            surface: None,
            frames: 0,
        }
    }

    pub fn with_config(config: &GpuConfig) -> GpuResult<Self> {
        let mut engine = Self::new(config.backend);
        engine.initialize(config.width, config.height)?;
        Ok(engine)
    }

    pub fn lifecycle(&self) -> EngineState {
        if self.surface.is_some() {
            EngineState::Initialized
        } else {
            EngineState::Uninitialized
        }
    }

    /// The backend actually in use, once initialised. `Auto` resolves to `Wgpu` or `Software`.
    pub fn backend_kind(&self) -> Option<GpuBackendKind> {
        self.surface.as_ref().map(|s| s.backend.kind())
    }

    pub fn size(&self) -> Option<(u32, u32)> {
        self.surface.as_ref().map(|s| s.backend.size())
    }

    /// Frames rendered since the last initialise.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Acquires the surface and pipeline. A no-op when already initialised.
    ///
    /// On failure nothing stays acquired and the engine remains uninitialised.
    pub fn initialize(&mut self, width: u32, height: u32) -> GpuResult<()> {
        if let Some((w, h)) = self.size() {
            if (w, h) != (width, height) {
                warn!(
                    current = ?(w, h),
                    requested = ?(width, height),
                    "gpu already initialized; cleanup first to resize"
                );
            }
            return Ok(());
        }

        let backend = open_backend(self.kind, width, height).map_err(|err| {
            error!(backend = self.kind.as_str(), width, height, "{err}");
            err
        })?;
        let len = width as usize * height as usize * BYTES_PER_PIXEL;
        info!(
            backend = backend.kind().as_str(),
            width, height, "gpu engine initialized"
        );
        self.surface = Some(Surface {
            backend,
            color: vec![0; len],
        });
        self.frames = 0;
        Ok(())
    }

    /// Clears, draws the first `count` vertices as a triangle list and reads the frame back.
    ///
    /// `vertices` holds packed `x, y, z` floats. Trailing vertices that do not complete a triangle
    /// are ignored.
    pub fn render(&mut self, vertices: &[f32], count: usize) -> GpuResult<()> {
        let Some(surface) = self.surface.as_mut() else {
            return Err(GpuError::InvalidState {
                state: EngineState::Uninitialized,
                op: "render",
            });
        };

        let needed = count.checked_mul(3).ok_or(GpuError::Capacity {
            count,
            needed: usize::MAX,
            len: vertices.len(),
        })?;
        if vertices.len() < needed {
            return Err(GpuError::Capacity {
                count,
                needed,
                len: vertices.len(),
            });
        }

        let whole = count - count % 3;
        let batch: &[Vertex] = bytemuck::cast_slice(&vertices[..whole * 3]);
        surface.backend.draw(batch, &mut surface.color)?;
        self.frames += 1;
        debug!(vertices = whole, frame = self.frames, "frame rendered");
        Ok(())
    }

    /// The most recent readback; all zeroes before the first `render`.
    pub fn color_buffer(&self) -> Option<&[u8]> {
        self.surface.as_ref().map(|s| s.color.as_slice())
    }

    /// Releases every backend resource. Safe to call repeatedly.
    pub fn cleanup(&mut self) {
        if self.surface.take().is_some() {
            info!("gpu engine cleaned up");
        }
        self.frames = 0;
    }
}

fn open_backend(kind: GpuBackendKind, width: u32, height: u32) -> GpuResult<Box<dyn RenderBackend>> {
    match kind {
        GpuBackendKind::Software => Ok(Box::new(SoftwareBackend::new(width, height)?)),
        GpuBackendKind::Wgpu => Ok(Box::new(WgpuBackend::new(width, height)?)),
        GpuBackendKind::Auto => match WgpuBackend::new(width, height) {
            Ok(backend) => Ok(Box::new(backend)),
            Err(err @ GpuError::InvalidSurfaceSize { .. }) => Err(err),
            Err(err) => {
                warn!("{err}; falling back to software rasterizer");
                Ok(Box::new(SoftwareBackend::new(width, height)?))
            }
        },
    }
}
