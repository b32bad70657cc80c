use serde::{Deserialize, Serialize};

use crate::GpuResult;

/// One vertex position in normalized device coordinates.
pub type Vertex = [f32; 3];

pub const BYTES_PER_PIXEL: usize = 4;

/// Colour every pixel has after the clear: transparent black.
pub const CLEAR_RGBA: [u8; 4] = [0, 0, 0, 0];

/// Colour written by the fragment stage: opaque red.
pub const FRAGMENT_RGBA: [u8; 4] = [0xFF, 0, 0, 0xFF];

/// Which renderer a [`crate::GpuEngine`] drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GpuBackendKind {
    /// Headless `wgpu`, falling back to the software rasterizer when no adapter is available.
    #[default]
    Auto,
    Wgpu,
    Software,
}

impl GpuBackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            GpuBackendKind::Auto => "auto",
            GpuBackendKind::Wgpu => "wgpu",
            GpuBackendKind::Software => "software",
        }
    }
}

/// A renderer bound to one fixed-size colour + depth target.
///
/// Dropping a backend releases its resources.
pub trait RenderBackend: Send {
    fn kind(&self) -> GpuBackendKind;

    fn size(&self) -> (u32, u32);

    /// Clears colour and depth, draws `vertices` as a triangle list and reads the colour target
    /// back into `out` (`width * height * 4` bytes, RGBA8, rows top to bottom).
    ///
    /// `vertices.len()` is always a multiple of 3.
    fn draw(&mut self, vertices: &[Vertex], out: &mut [u8]) -> GpuResult<()>;
}
