use crate::backend::{GpuBackendKind, RenderBackend, Vertex, BYTES_PER_PIXEL, CLEAR_RGBA, FRAGMENT_RGBA};
use crate::{GpuError, GpuResult};

/// Largest surface dimension the software rasterizer accepts.
pub(crate) const MAX_DIMENSION: u32 = 16384;

/// CPU rasterizer matching the `wgpu` pipeline's observable output.
///
/// Coverage is sampled at pixel centres; both windings are drawn (no culling). Fragments whose
/// interpolated depth falls outside `[0, 1]` are clipped, and a `Less` depth test against a buffer
/// cleared to `1.0` decides overlaps.
pub struct SoftwareBackend {
    width: u32,
    height: u32,
    depth: Vec<f32>,
}

impl SoftwareBackend {
    pub fn new(width: u32, height: u32) -> GpuResult<Self> {
        if width == 0 || height == 0 || width > MAX_DIMENSION || height > MAX_DIMENSION {
            return Err(GpuError::InvalidSurfaceSize {
                width,
                height,
                max: MAX_DIMENSION,
            });
        }
        Ok(Self {
            width,
            height,
            depth: vec![1.0; width as usize * height as usize],
        })
    }

    /// NDC to framebuffer space: x right, y down, origin at the top-left corner.
    fn to_screen(&self, v: Vertex) -> [f32; 3] {
        let w = self.width as f32;
        let h = self.height as f32;
        [(v[0] + 1.0) * 0.5 * w, (1.0 - v[1]) * 0.5 * h, v[2]]
    }

    fn raster_triangle(&mut self, tri: &[Vertex], out: &mut [u8]) {
        let a = self.to_screen(tri[0]);
        let b = self.to_screen(tri[1]);
        let c = self.to_screen(tri[2]);

        let area = edge(a, b, c);
        if area == 0.0 || !area.is_finite() {
            return;
        }

        let min_x = a[0].min(b[0]).min(c[0]).floor().max(0.0) as u32;
        let min_y = a[1].min(b[1]).min(c[1]).floor().max(0.0) as u32;
        let max_x = (a[0].max(b[0]).max(c[0]).ceil().max(0.0) as u32).min(self.width);
        let max_y = (a[1].max(b[1]).max(c[1]).ceil().max(0.0) as u32).min(self.height);

        for y in min_y..max_y {
            for x in min_x..max_x {
                let p = [x as f32 + 0.5, y as f32 + 0.5, 0.0];
                let w0 = edge(b, c, p) / area;
                let w1 = edge(c, a, p) / area;
                let w2 = edge(a, b, p) / area;
                if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                    continue;
                }

                let z = w0 * a[2] + w1 * b[2] + w2 * c[2];
                if !(0.0..=1.0).contains(&z) {
                    continue;
                }
                let idx = y as usize * self.width as usize + x as usize;
                if z >= self.depth[idx] {
                    continue;
                }
                self.depth[idx] = z;

                let off = idx * BYTES_PER_PIXEL;
                out[off..off + BYTES_PER_PIXEL].copy_from_slice(&FRAGMENT_RGBA);
            }
        }
    }
}

fn edge(a: [f32; 3], b: [f32; 3], p: [f32; 3]) -> f32 {
    (b[0] - a[0]) * (p[1] - a[1]) - (b[1] - a[1]) * (p[0] - a[0])
}

impl RenderBackend for SoftwareBackend {
    fn kind(&self) -> GpuBackendKind {
        GpuBackendKind::Software
    }

    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn draw(&mut self, vertices: &[Vertex], out: &mut [u8]) -> GpuResult<()> {
        for px in out.chunks_exact_mut(BYTES_PER_PIXEL) {
            px.copy_from_slice(&CLEAR_RGBA);
        }
        self.depth.fill(1.0);

        for tri in vertices.chunks_exact(3) {
            self.raster_triangle(tri, out);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pixel(buf: &[u8], width: u32, x: u32, y: u32) -> [u8; 4] {
        let off = (y as usize * width as usize + x as usize) * BYTES_PER_PIXEL;
        buf[off..off + 4].try_into().unwrap()
    }

    #[test]
    fn rejects_degenerate_sizes() {
        assert!(matches!(
            SoftwareBackend::new(0, 4),
            Err(GpuError::InvalidSurfaceSize { .. })
        ));
        assert!(SoftwareBackend::new(MAX_DIMENSION + 1, 1).is_err());
    }

    #[test]
    fn full_screen_quad_covers_every_pixel() {
        let mut backend = SoftwareBackend::new(8, 8).unwrap();
        let mut out = vec![0xAA; 8 * 8 * 4];
        let quad = [
            [-1.0, -1.0, 0.0],
            [1.0, -1.0, 0.0],
            [1.0, 1.0, 0.0],
            [-1.0, -1.0, 0.0],
            [1.0, 1.0, 0.0],
            [-1.0, 1.0, 0.0],
        ];
        backend.draw(&quad, &mut out).unwrap();
        assert!(out.chunks_exact(4).all(|px| px == FRAGMENT_RGBA));
    }

    #[test]
    fn top_half_triangle_lands_in_top_rows() {
        let mut backend = SoftwareBackend::new(16, 16).unwrap();
        let mut out = vec![0; 16 * 16 * 4];
        // Covers only y > 0 in NDC, which is the top half of the framebuffer.
        let tri = [[-1.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
        backend.draw(&tri, &mut out).unwrap();

        assert_eq!(pixel(&out, 16, 8, 2), FRAGMENT_RGBA);
        assert_eq!(pixel(&out, 16, 8, 12), CLEAR_RGBA);
    }

    #[test]
    fn both_windings_are_drawn() {
        let mut backend = SoftwareBackend::new(8, 8).unwrap();
        let mut out = vec![0; 8 * 8 * 4];
        let cw = [[-1.0, -1.0, 0.0], [0.0, 1.0, 0.0], [1.0, -1.0, 0.0]];
        backend.draw(&cw, &mut out).unwrap();
        assert_eq!(pixel(&out, 8, 4, 5), FRAGMENT_RGBA);
    }

    #[test]
    fn depth_outside_unit_range_is_clipped() {
        let mut backend = SoftwareBackend::new(8, 8).unwrap();
        let mut out = vec![0; 8 * 8 * 4];
        let far = [[-1.0, -1.0, 2.0], [1.0, -1.0, 2.0], [0.0, 1.0, 2.0]];
        backend.draw(&far, &mut out).unwrap();
        assert!(out.chunks_exact(4).all(|px| px == CLEAR_RGBA));
    }
}
