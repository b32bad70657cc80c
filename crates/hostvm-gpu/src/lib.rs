//! Offscreen GPU engine.
//!
//! [`GpuEngine`] owns one colour surface and renders triangle lists into it with a fixed
//! pipeline: pass-through vertex positions (normalized device coordinates) and a solid red
//! fragment. Every `render` call is a synchronous clear, draw and readback; afterwards
//! [`GpuEngine::color_buffer`] holds `width * height * 4` bytes of RGBA8, rows top to bottom.
//!
//! Two backends produce that same layout: a headless `wgpu` device ([`WgpuBackend`]) and a CPU
//! rasterizer ([`SoftwareBackend`]) for hosts without an adapter.

#![forbid(unsafe_code)]

mod backend;
mod engine;
mod error;
mod software;
mod wgpu_backend;

pub use backend::{GpuBackendKind, RenderBackend, Vertex, BYTES_PER_PIXEL, CLEAR_RGBA, FRAGMENT_RGBA};
pub use engine::{GpuConfig, GpuEngine, DEFAULT_TRIANGLE};
pub use error::{GpuError, GpuResult};
pub use software::SoftwareBackend;
pub use wgpu_backend::WgpuBackend;
