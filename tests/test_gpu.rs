// tests/test_gpu.rs — CPU/GPU equivalence for the full detector.
//
// All tests here need a working compute device and are #[ignore]d by
// default; run them with `cargo test -- --ignored` on a machine with a GPU
// (a software Vulkan implementation such as lavapipe also works).

use depthedge::{DepthEdgeDetector, EdgeDetectorConfig, Image, Resolution, SmoothingMode};

const W: usize = 96;
const H: usize = 64;

fn detector(accelerated: bool, smoothing: SmoothingMode) -> DepthEdgeDetector {
    let config = EdgeDetectorConfig {
        acceleration_enabled: accelerated,
        smoothing,
        ..Default::default()
    };
    DepthEdgeDetector::new(Resolution::Custom { width: W, height: H }, config)
        .expect("valid configuration")
}

/// Floor plus a raised box plus a gentle slope, so every stage has
/// non-trivial work.
fn scene() -> Image<f32> {
    let mut depth = Image::new(W, H);
    for y in 0..H {
        for x in 0..W {
            let on_box = (30..66).contains(&x) && (20..44).contains(&y);
            let base = if on_box { 950.0 } else { 1150.0 };
            depth.set(x, y, base + 0.3 * x as f32 + 0.1 * y as f32);
        }
    }
    depth
}

#[test]
#[ignore = "requires a real GPU"]
fn accelerated_pipeline_matches_cpu() {
    for smoothing in [
        SmoothingMode::None,
        SmoothingMode::BoxAverage,
        SmoothingMode::BinomialBlur,
    ] {
        let mut gpu = detector(true, smoothing);
        assert!(gpu.is_acceleration_enabled(), "no compute device available");
        let mut cpu = detector(false, smoothing);

        let depth = scene();
        let smooth = smoothing != SmoothingMode::None;
        let binomial = smoothing == SmoothingMode::BinomialBlur;
        gpu.calculate(&depth, true, smooth, binomial);
        cpu.calculate(&depth, true, smooth, binomial);

        // The angle image may differ by float rounding; the comparison
        // budget also covers pixels that flip across the threshold.
        let mut mask_diffs = 0usize;
        for (a, b) in gpu
            .angle_image()
            .as_slice()
            .iter()
            .zip(cpu.angle_image().as_slice())
        {
            assert!((a - b).abs() < 1e-3, "{smoothing:?}: angle {a} vs {b}");
        }
        for (a, b) in gpu
            .binarized_angle_image()
            .as_slice()
            .iter()
            .zip(cpu.binarized_angle_image().as_slice())
        {
            if a != b {
                mask_diffs += 1;
            }
        }
        assert!(
            mask_diffs <= (W * H) / 1000,
            "{smoothing:?}: {mask_diffs} mask pixels flipped across the threshold"
        );
    }
}

#[test]
#[ignore = "requires a real GPU"]
fn oversized_median_window_falls_back_to_cpu() {
    // 11×11 exceeds the shader's fixed window; the stage must silently use
    // the CPU filter and still produce the exact CPU result.
    let mut gpu = detector(true, SmoothingMode::BoxAverage);
    assert!(gpu.is_acceleration_enabled(), "no compute device available");
    let mut cpu = detector(false, SmoothingMode::BoxAverage);
    gpu.set_median_filter_size(11).unwrap();
    cpu.set_median_filter_size(11).unwrap();

    let depth = scene();
    gpu.set_depth_image(&depth);
    cpu.set_depth_image(&depth);
    gpu.apply_median_filter();
    cpu.apply_median_filter();

    assert_eq!(
        gpu.filtered_depth_image().as_slice(),
        cpu.filtered_depth_image().as_slice()
    );
}

#[test]
#[ignore = "requires a real GPU"]
fn acceleration_toggle_switches_paths() {
    let mut det = detector(true, SmoothingMode::BoxAverage);
    assert!(det.is_acceleration_enabled(), "no compute device available");

    det.set_acceleration_enabled(false);
    assert!(!det.is_acceleration_enabled());

    // Both paths on the same detector produce matching masks.
    let depth = scene();
    det.calculate(&depth, true, true, false);
    let cpu_mask: Vec<u8> = det.binarized_angle_image().as_slice().to_vec();

    det.set_acceleration_enabled(true);
    assert!(det.is_acceleration_enabled());
    det.calculate(&depth, true, true, false);

    let flips = det
        .binarized_angle_image()
        .as_slice()
        .iter()
        .zip(&cpu_mask)
        .filter(|(a, b)| a != b)
        .count();
    assert!(flips <= (W * H) / 1000, "{flips} mask pixels differ");
}
