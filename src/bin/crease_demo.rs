// crease_demo — run the pipeline on a synthetic depth scene and write the
// intermediate rasters as PNGs.
//
// Usage: crease_demo [output-dir]
//
// The scene is a flat floor with a raised box, so the mask should show the
// box outline as black crease lines on a white (flat) background. Run with
// RUST_LOG=debug to see which backend was picked.

use std::env;
use std::error::Error;
use std::path::Path;

use nalgebra::Matrix4;

use depthedge::{DepthEdgeDetector, EdgeDetectorConfig, Image, Resolution};

const W: usize = 320;
const H: usize = 240;

/// Flat floor at 1200 depth units with a box 200 units closer.
fn synthetic_scene() -> Image<f32> {
    let mut depth = Image::new(W, H);
    for y in 0..H {
        for x in 0..W {
            let on_box = (100..220).contains(&x) && (70..170).contains(&y);
            depth.set(x, y, if on_box { 1000.0 } else { 1200.0 });
        }
    }
    depth
}

fn save_gray_f32(img: &Image<f32>, path: &Path) -> Result<(), Box<dyn Error>> {
    let max = img.as_slice().iter().cloned().fold(f32::MIN, f32::max);
    let min = img.as_slice().iter().cloned().fold(f32::MAX, f32::min);
    let span = if max > min { max - min } else { 1.0 };
    let bytes: Vec<u8> = img
        .as_slice()
        .iter()
        .map(|v| (((v - min) / span) * 255.0) as u8)
        .collect();
    let out = image::GrayImage::from_raw(W as u32, H as u32, bytes)
        .ok_or("gray buffer size mismatch")?;
    out.save(path)?;
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let out_dir = env::args().nth(1).unwrap_or_else(|| "out".to_string());
    let out_dir = Path::new(&out_dir);
    std::fs::create_dir_all(out_dir)?;

    let mut detector = DepthEdgeDetector::new(Resolution::Qvga, EdgeDetectorConfig::default())?;
    println!(
        "backend: {}",
        if detector.is_acceleration_enabled() { "accelerated" } else { "cpu" }
    );

    let depth = synthetic_scene();
    detector.calculate(&depth, true, true, false);
    detector.apply_world_normal_calculation(&Matrix4::identity());

    save_gray_f32(detector.angle_image(), &out_dir.join("angle.png"))?;

    let mask = detector.binarized_angle_image();
    let mask_png = image::GrayImage::from_raw(W as u32, H as u32, mask.as_slice().to_vec())
        .ok_or("mask buffer size mismatch")?;
    mask_png.save(out_dir.join("mask.png"))?;

    let rgb = detector.rgb_normal_image();
    let rgb_png = image::RgbImage::from_raw(W as u32, H as u32, rgb.as_raw().to_vec())
        .ok_or("rgb buffer size mismatch")?;
    rgb_png.save(out_dir.join("normals.png"))?;

    println!("wrote {}", out_dir.display());
    Ok(())
}
