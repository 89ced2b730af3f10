// normal.rs — Per-pixel surface normals and the RGB normal visualization.
//
// A normal is stored as (x, y, z, w): (x, y, z) is unit length when the
// pixel is valid, and w is the validity flag — 0 for border pixels,
// out-of-range pixels and degenerate stencils, 1 otherwise. The struct is
// `#[repr(C)]` and `bytemuck::Pod` so a whole field casts directly to a
// `vec4<f32>` storage buffer for the compute path.

use std::fmt;

use bytemuck::{Pod, Zeroable};

/// One surface-normal sample: unit direction plus validity flag.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct Normal {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    /// 1.0 for a valid normal, 0.0 for border/invalid pixels.
    pub w: f32,
}

impl Normal {
    pub const INVALID: Normal = Normal { x: 0.0, y: 0.0, z: 0.0, w: 0.0 };

    #[inline]
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Normal { x, y, z, w: 1.0 }
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.w != 0.0
    }

    /// Dot product of the direction parts; w does not participate.
    #[inline]
    pub fn dot(&self, other: &Normal) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// Euclidean length of the direction part.
    #[inline]
    pub fn norm(&self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

/// A W×H grid of [`Normal`] samples, row-major.
#[derive(Clone)]
pub struct NormalField {
    data: Vec<Normal>,
    width: usize,
    height: usize,
}

impl NormalField {
    /// Create a field of invalid (all-zero) normals.
    pub fn new(width: usize, height: usize) -> Self {
        NormalField {
            data: vec![Normal::INVALID; width * height],
            width,
            height,
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> Normal {
        assert!(
            x < self.width && y < self.height,
            "normal ({x},{y}) out of bounds for field {}×{}",
            self.width,
            self.height,
        );
        self.data[y * self.width + x]
    }

    /// # Safety
    /// Caller must guarantee x < width and y < height.
    #[inline(always)]
    pub unsafe fn get_unchecked(&self, x: usize, y: usize) -> Normal {
        debug_assert!(x < self.width && y < self.height);
        *self.data.get_unchecked(y * self.width + x)
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, n: Normal) {
        assert!(
            x < self.width && y < self.height,
            "normal ({x},{y}) out of bounds for field {}×{}",
            self.width,
            self.height,
        );
        self.data[y * self.width + x] = n;
    }

    /// # Safety
    /// Caller must guarantee x < width and y < height.
    #[inline(always)]
    pub unsafe fn set_unchecked(&mut self, x: usize, y: usize, n: Normal) {
        debug_assert!(x < self.width && y < self.height);
        *self.data.get_unchecked_mut(y * self.width + x) = n;
    }

    pub fn as_slice(&self) -> &[Normal] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [Normal] {
        &mut self.data
    }

    pub fn copy_from(&mut self, src: &NormalField) {
        assert_eq!(self.width, src.width, "copy_from width mismatch");
        assert_eq!(self.height, src.height, "copy_from height mismatch");
        self.data.copy_from_slice(&src.data);
    }
}

impl fmt::Debug for NormalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let valid = self.data.iter().filter(|n| n.is_valid()).count();
        write!(
            f,
            "NormalField {{ {}×{}, {} valid }}",
            self.width, self.height, valid
        )
    }
}

/// Interleaved 8-bit RGB image for the world-normal visualization.
#[derive(Clone)]
pub struct Rgb8Image {
    data: Vec<u8>,
    width: usize,
    height: usize,
}

impl Rgb8Image {
    pub fn new(width: usize, height: usize) -> Self {
        Rgb8Image {
            data: vec![0u8; width * height * 3],
            width,
            height,
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> [u8; 3] {
        let i = (y * self.width + x) * 3;
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, rgb: [u8; 3]) {
        let i = (y * self.width + x) * 3;
        self.data[i..i + 3].copy_from_slice(&rgb);
    }

    /// Interleaved RGB bytes, row-major — the layout `image::RgbImage`
    /// accepts directly for PNG export.
    pub fn as_raw(&self) -> &[u8] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_constant() {
        assert!(!Normal::INVALID.is_valid());
        assert_eq!(Normal::INVALID.norm(), 0.0);
    }

    #[test]
    fn test_dot_ignores_w() {
        let a = Normal::new(1.0, 0.0, 0.0);
        let mut b = Normal::new(1.0, 0.0, 0.0);
        b.w = 0.0;
        assert_eq!(a.dot(&b), 1.0);
    }

    #[test]
    fn test_field_new_all_invalid() {
        let f = NormalField::new(4, 3);
        for y in 0..3 {
            for x in 0..4 {
                assert_eq!(f.get(x, y), Normal::INVALID);
            }
        }
    }

    #[test]
    fn test_field_set_get() {
        let mut f = NormalField::new(4, 3);
        let n = Normal::new(0.0, 0.0, 1.0);
        f.set(2, 1, n);
        assert_eq!(f.get(2, 1), n);
        assert!(f.get(2, 1).is_valid());
    }

    #[test]
    fn test_normal_pod_layout() {
        // The GPU path relies on Normal casting cleanly to 4 floats.
        assert_eq!(std::mem::size_of::<Normal>(), 16);
        let n = Normal::new(1.0, 2.0, 3.0);
        let floats: &[f32] = bytemuck::cast_slice(std::slice::from_ref(&n));
        assert_eq!(floats, &[1.0, 2.0, 3.0, 1.0]);
    }

    #[test]
    fn test_rgb_image_interleaved() {
        let mut img = Rgb8Image::new(2, 2);
        img.set(1, 0, [10, 20, 30]);
        assert_eq!(img.get(1, 0), [10, 20, 30]);
        assert_eq!(&img.as_raw()[3..6], &[10, 20, 30]);
    }
}
