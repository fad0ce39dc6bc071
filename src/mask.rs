//! Polygon clip masks for displaying garments without their background
//!
//! The server returns a garment silhouette as normalized points. This module
//! scales them to the render size and either produces a closed [`ClipPath`]
//! or falls back to the unmasked image when the polygon is degenerate.

use std::fmt::Write;

use crate::error::Error;
use crate::garment::Point;

/// A vertex in target-pixel space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelPoint {
    pub x: f64,
    pub y: f64,
}

/// A closed polygon in target-pixel space, implicitly closed back to its
/// first vertex
#[derive(Debug, Clone, PartialEq)]
pub struct ClipPath {
    vertices: Vec<PixelPoint>,
}

/// How a garment image should be drawn
#[derive(Debug, Clone, PartialEq)]
pub enum MaskRender {
    /// Reveal only the pixels inside the path
    Masked(ClipPath),
    /// Show the full image on a plain backdrop
    Unmasked,
}

impl MaskRender {
    pub fn clip_path(&self) -> Option<&ClipPath> {
        match self {
            MaskRender::Masked(path) => Some(path),
            MaskRender::Unmasked => None,
        }
    }
}

/// Scale a normalized polygon to `width` x `height`.
///
/// Fewer than three points, or a non-positive size, yields
/// [`MaskRender::Unmasked`]. Points outside the unit square are clamped.
pub fn render_mask(points: Option<&[Point]>, width: f64, height: f64) -> MaskRender {
    let points = match points {
        Some(points) if points.len() >= 3 => points,
        _ => return MaskRender::Unmasked,
    };
    if !(width.is_finite() && height.is_finite() && width > 0.0 && height > 0.0) {
        return MaskRender::Unmasked;
    }

    let vertices = points
        .iter()
        .map(|point| {
            let point = point.clamped();
            PixelPoint {
                x: point.x * width,
                y: point.y * height,
            }
        })
        .collect();

    MaskRender::Masked(ClipPath { vertices })
}

impl ClipPath {
    pub fn vertices(&self) -> &[PixelPoint] {
        &self.vertices
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// SVG path data, `Mx,y Lx,y ... Z`
    pub fn to_svg_path(&self) -> String {
        let mut path = String::new();
        for (i, vertex) in self.vertices.iter().enumerate() {
            let command = if i == 0 { 'M' } else { 'L' };
            let _ = write!(path, "{}{},{} ", command, vertex.x, vertex.y);
        }
        path.push('Z');
        path
    }

    /// Even-odd point-in-polygon test
    pub fn contains(&self, x: f64, y: f64) -> bool {
        let mut inside = false;
        let n = self.vertices.len();
        let mut j = n.wrapping_sub(1);
        for i in 0..n {
            let (a, b) = (self.vertices[i], self.vertices[j]);
            if (a.y > y) != (b.y > y) && x < (b.x - a.x) * (y - a.y) / (b.y - a.y) + a.x {
                inside = !inside;
            }
            j = i;
        }
        inside
    }

    /// Replace every pixel whose center lies outside the path with
    /// `backdrop`. `pixels` is tightly packed RGBA, row-major.
    pub fn apply_rgba(
        &self,
        pixels: &mut [u8],
        width: usize,
        height: usize,
        backdrop: [u8; 4],
    ) -> Result<(), Error> {
        let expected = width
            .checked_mul(height)
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| Error::general("image dimensions overflow"))?;
        if pixels.len() != expected {
            return Err(Error::general(format!(
                "expected {} bytes for a {}x{} RGBA image, got {}",
                expected,
                width,
                height,
                pixels.len()
            )));
        }

        for (index, pixel) in pixels.chunks_exact_mut(4).enumerate() {
            let x = (index % width) as f64 + 0.5;
            let y = (index / width) as f64 + 0.5;
            if !self.contains(x, y) {
                pixel.copy_from_slice(&backdrop);
            }
        }
        Ok(())
    }
}
