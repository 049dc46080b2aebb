//! Runs the distortion effect on the CPU reference path and writes one PNG
//! per mode into the working directory.

use distort3d::glamx::Vec2;
use distort3d::post_processing::{distort_image, DistortionMode, DistortionParams};
use image::{Rgba, RgbaImage};
use rand::Rng;

const SIZE: u32 = 256;

fn test_card() -> RgbaImage {
    RgbaImage::from_fn(SIZE, SIZE, |x, y| {
        let checker = ((x / 32) + (y / 32)) % 2 == 0;
        let base = if checker { 220 } else { 60 };
        Rgba([base, (x * 255 / SIZE) as u8, (y * 255 / SIZE) as u8, 255])
    })
}

fn noise_texture() -> RgbaImage {
    let mut rng = rand::rng();
    RgbaImage::from_fn(SIZE, SIZE, |_, _| {
        Rgba([rng.random::<u8>(), rng.random::<u8>(), 0, 255])
    })
}

fn radial_mask() -> RgbaImage {
    let center = Vec2::new(SIZE as f32 / 2.0, SIZE as f32 / 2.0);
    let radius = SIZE as f32 / 3.0;
    RgbaImage::from_fn(SIZE, SIZE, |x, y| {
        let d = (Vec2::new(x as f32, y as f32) - center).length();
        let m = ((1.0 - d / radius).clamp(0.0, 1.0) * 255.0) as u8;
        Rgba([m, m, m, 255])
    })
}

fn main() {
    env_logger::init();

    let screen = test_card();
    let noise = noise_texture();
    let mask = radial_mask();

    let params = DistortionParams {
        distortion_scale: 0.05,
        noise_uv_scale: Vec2::new(4.0, 4.0),
    };

    for (mode, path) in [
        (DistortionMode::Normal, "distorted.png"),
        (DistortionMode::Bypass, "bypass.png"),
        (DistortionMode::VisualizeMask, "mask_view.png"),
    ] {
        let out = distort_image(&screen, &noise, &mask, &params, mode);
        out.save(path).expect("Failed to write output image");
        println!("wrote {}", path);
    }
}
