// world.rs — Rotate normals into world coordinates and render the RGB view.
//
// The camera pose is a 4×4 transformation; only its upper-left 3×3 rotation
// block matters here. Each valid camera-space normal n becomes
//
//   w = -(Rᵀ · n)
//
// (the transpose undoes the camera rotation, the sign flip orients normals
// away from the sensor). Pixels whose raw depth equals the sentinel, or
// whose normal is invalid, produce (0,0,0,0) and a black RGB pixel.
// The visualization channels are |w.{x,y,z}|·255, so they are insensitive
// to the sign flip.

use nalgebra::{Matrix3, Matrix4, Vector3};

use crate::image::Image;
use crate::normal::{Normal, NormalField, Rgb8Image};

/// Compute world-space normals and the RGB visualization in one pass.
///
/// # Panics
/// Panics if any raster dimension differs from `normals`.
pub fn world_normals(
    normals: &NormalField,
    raw_depth: &Image<f32>,
    pose: &Matrix4<f32>,
    sentinel: f32,
    out: &mut NormalField,
    rgb: &mut Rgb8Image,
) {
    let w = normals.width();
    let h = normals.height();
    assert_eq!(raw_depth.width(), w, "world_normals depth width mismatch");
    assert_eq!(raw_depth.height(), h, "world_normals depth height mismatch");
    assert_eq!(out.width(), w, "world_normals out width mismatch");
    assert_eq!(out.height(), h, "world_normals out height mismatch");
    assert_eq!(rgb.width(), w, "world_normals rgb width mismatch");
    assert_eq!(rgb.height(), h, "world_normals rgb height mismatch");

    let rot_t: Matrix3<f32> = pose.fixed_view::<3, 3>(0, 0).transpose().into();

    for y in 0..h {
        for x in 0..w {
            let n = normals.get(x, y);
            if raw_depth.get(x, y) == sentinel || !n.is_valid() {
                out.set(x, y, Normal::INVALID);
                rgb.set(x, y, [0, 0, 0]);
                continue;
            }
            let rotated = rot_t * Vector3::new(n.x, n.y, n.z);
            out.set(x, y, Normal::new(-rotated.x, -rotated.y, -rotated.z));
            rgb.set(
                x,
                y,
                [
                    channel_byte(rotated.x),
                    channel_byte(rotated.y),
                    channel_byte(rotated.z),
                ],
            );
        }
    }
}

#[inline]
fn channel_byte(v: f32) -> u8 {
    (v.abs() * 255.0).clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn valid_field(w: usize, h: usize, n: Normal) -> NormalField {
        let mut f = NormalField::new(w, h);
        for y in 0..h {
            for x in 0..w {
                f.set(x, y, n);
            }
        }
        f
    }

    #[test]
    fn test_identity_pose_negates() {
        let f = valid_field(4, 4, Normal::new(0.0, 0.0, 1.0));
        let depth = Image::from_vec(4, 4, vec![100.0; 16]);
        let mut out = NormalField::new(4, 4);
        let mut rgb = Rgb8Image::new(4, 4);
        world_normals(&f, &depth, &Matrix4::identity(), 2047.0, &mut out, &mut rgb);

        let n = out.get(1, 1);
        assert_relative_eq!(n.x, 0.0);
        assert_relative_eq!(n.y, 0.0);
        assert_relative_eq!(n.z, -1.0);
        assert!(n.is_valid());
        // |(-1)| * 255 on the blue channel regardless of the sign flip.
        assert_eq!(rgb.get(1, 1), [0, 0, 255]);
    }

    #[test]
    fn test_rotation_transpose_applied() {
        // Pose rotates 90° about z: R maps x→y. Rᵀ maps y→x, so a normal
        // along +y lands on -x after the sign flip... along +x before it.
        let mut pose = Matrix4::<f32>::identity();
        // R = [[0,-1,0],[1,0,0],[0,0,1]] (90° about z), column-major slots.
        pose[(0, 0)] = 0.0;
        pose[(0, 1)] = -1.0;
        pose[(1, 0)] = 1.0;
        pose[(1, 1)] = 0.0;

        let f = valid_field(3, 3, Normal::new(0.0, 1.0, 0.0));
        let depth = Image::from_vec(3, 3, vec![5.0; 9]);
        let mut out = NormalField::new(3, 3);
        let mut rgb = Rgb8Image::new(3, 3);
        world_normals(&f, &depth, &pose, 2047.0, &mut out, &mut rgb);

        let n = out.get(1, 1);
        assert_relative_eq!(n.x, -1.0, epsilon = 1e-6);
        assert_relative_eq!(n.y, 0.0, epsilon = 1e-6);
        assert_relative_eq!(n.z, 0.0, epsilon = 1e-6);
        assert_eq!(rgb.get(1, 1), [255, 0, 0]);
    }

    #[test]
    fn test_sentinel_pixels_invalidated() {
        let f = valid_field(3, 3, Normal::new(1.0, 0.0, 0.0));
        let mut depth = Image::from_vec(3, 3, vec![10.0; 9]);
        depth.set(1, 1, 2047.0);
        let mut out = NormalField::new(3, 3);
        let mut rgb = Rgb8Image::new(3, 3);
        world_normals(&f, &depth, &Matrix4::identity(), 2047.0, &mut out, &mut rgb);

        assert_eq!(out.get(1, 1), Normal::INVALID);
        assert_eq!(rgb.get(1, 1), [0, 0, 0]);
        assert!(out.get(0, 0).is_valid());
    }

    #[test]
    fn test_invalid_normals_stay_invalid() {
        let mut f = valid_field(3, 3, Normal::new(1.0, 0.0, 0.0));
        f.set(2, 2, Normal::INVALID);
        let depth = Image::from_vec(3, 3, vec![10.0; 9]);
        let mut out = NormalField::new(3, 3);
        let mut rgb = Rgb8Image::new(3, 3);
        world_normals(&f, &depth, &Matrix4::identity(), 2047.0, &mut out, &mut rgb);

        assert_eq!(out.get(2, 2), Normal::INVALID);
        assert_eq!(rgb.get(2, 2), [0, 0, 0]);
    }
}
