//! CPU reference implementation of the distortion fragment stage.
//!
//! Runs the same per-pixel computation as `distortion.wgsl` on an
//! `image::RgbaImage`, with bilinear filtering and the same addressing as
//! the GPU samplers (clamp-to-edge for screen and mask, repeat for noise).
//! Useful for golden-image generation and for verifying the shader math
//! without a device.

use crate::post_processing::distortion::{DistortionMode, DistortionParams};
use crate::resource::TextureWrapping;
use glamx::Vec2;
use image::{Rgba, RgbaImage};

/// Applies the distortion effect to `screen` on the CPU.
///
/// The output has the dimensions of `screen`. Channel values are treated
/// as raw data in [0, 1] (no color-space conversion), matching the GPU
/// path.
pub fn distort_image(
    screen: &RgbaImage,
    noise: &RgbaImage,
    mask: &RgbaImage,
    params: &DistortionParams,
    mode: DistortionMode,
) -> RgbaImage {
    let (w, h) = screen.dimensions();
    let mut out = RgbaImage::new(w, h);

    for y in 0..h {
        for x in 0..w {
            let uv = Vec2::new((x as f32 + 0.5) / w as f32, (y as f32 + 0.5) / h as f32);

            let color = match mode {
                DistortionMode::Bypass => {
                    sample_bilinear(screen, uv, TextureWrapping::ClampToEdge)
                }
                DistortionMode::VisualizeMask => {
                    let strength = strength_at(mask, uv);
                    [strength, strength, strength, 1.0]
                }
                DistortionMode::Normal => {
                    let strength = strength_at(mask, uv);
                    let noise_uv = params.noise_uv_scale * uv;
                    let n = sample_bilinear(noise, noise_uv, TextureWrapping::Repeat);
                    let offset = Vec2::new(n[0], n[1]) * params.distortion_scale * strength;
                    let c = sample_bilinear(screen, uv + offset, TextureWrapping::ClampToEdge);
                    [c[0], c[1], c[2], 1.0]
                }
            };

            out.put_pixel(x, y, Rgba(to_rgba8(color)));
        }
    }

    out
}

/// The distortion strength at `uv`: the mask's squared magnitude, clamped
/// to 1.
fn strength_at(mask: &RgbaImage, uv: Vec2) -> f32 {
    let m = sample_bilinear(mask, uv, TextureWrapping::ClampToEdge);
    let dot = m[0] * m[0] + m[1] * m[1] + m[2] * m[2];
    dot.min(1.0)
}

fn wrap_texel(i: i64, n: u32, wrapping: TextureWrapping) -> u32 {
    let n = n as i64;
    let wrapped = match wrapping {
        TextureWrapping::Repeat => i.rem_euclid(n),
        TextureWrapping::ClampToEdge => i.clamp(0, n - 1),
        TextureWrapping::MirroredRepeat => {
            let m = i.rem_euclid(2 * n);
            if m < n {
                m
            } else {
                2 * n - 1 - m
            }
        }
    };
    wrapped as u32
}

/// Bilinear sample at normalized coordinates, texel centers at half-texel
/// offsets, channels in [0, 1].
fn sample_bilinear(image: &RgbaImage, uv: Vec2, wrapping: TextureWrapping) -> [f32; 4] {
    let (w, h) = image.dimensions();
    let x = uv.x * w as f32 - 0.5;
    let y = uv.y * h as f32 - 0.5;
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;
    let x0 = x0 as i64;
    let y0 = y0 as i64;

    let mut out = [0.0f32; 4];
    for (weight, xi, yi) in [
        ((1.0 - fx) * (1.0 - fy), x0, y0),
        (fx * (1.0 - fy), x0 + 1, y0),
        ((1.0 - fx) * fy, x0, y0 + 1),
        (fx * fy, x0 + 1, y0 + 1),
    ] {
        let texel = image.get_pixel(wrap_texel(xi, w, wrapping), wrap_texel(yi, h, wrapping));
        for c in 0..4 {
            out[c] += weight * texel.0[c] as f32 / 255.0;
        }
    }

    out
}

fn to_rgba8(color: [f32; 4]) -> [u8; 4] {
    let mut out = [0u8; 4];
    for c in 0..4 {
        out[c] = (color[c].clamp(0.0, 1.0) * 255.0).round() as u8;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_screen(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, y| {
            Rgba([(x * 20) as u8, (y * 20) as u8, 0, 255])
        })
    }

    fn solid(w: u32, h: u32, rgba: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba(rgba))
    }

    #[test]
    fn bypass_ignores_mask_and_noise() {
        let screen = RgbaImage::from_fn(8, 8, |x, y| {
            Rgba([(x * 30) as u8, (y * 30) as u8, 17, 128])
        });
        let wild_noise = solid(8, 8, [255, 0, 255, 255]);
        let wild_mask = solid(8, 8, [255, 255, 255, 255]);

        let out = distort_image(
            &screen,
            &wild_noise,
            &wild_mask,
            &DistortionParams::default(),
            DistortionMode::Bypass,
        );

        assert_eq!(out, screen);
    }

    #[test]
    fn zero_scale_is_identity() {
        let screen = gradient_screen(8, 8);
        let noise = solid(8, 8, [255, 255, 0, 255]);
        let mask = solid(8, 8, [255, 255, 255, 255]);

        let params = DistortionParams {
            distortion_scale: 0.0,
            ..Default::default()
        };
        let out = distort_image(&screen, &noise, &mask, &params, DistortionMode::Normal);

        assert_eq!(out, screen);
    }

    #[test]
    fn zero_mask_suppresses_distortion() {
        let screen = gradient_screen(8, 8);
        let noise = solid(8, 8, [255, 255, 0, 255]);
        let mask = solid(8, 8, [0, 0, 0, 255]);

        let params = DistortionParams {
            distortion_scale: 0.5,
            ..Default::default()
        };
        let out = distort_image(&screen, &noise, &mask, &params, DistortionMode::Normal);

        assert_eq!(out, screen);
    }

    #[test]
    fn mask_view_saturates_to_white_and_black() {
        let screen = gradient_screen(4, 4);
        let noise = solid(4, 4, [0, 0, 0, 255]);

        // dot(m, m) = 3 for a white mask, clamped to 1.
        let white = distort_image(
            &screen,
            &noise,
            &solid(4, 4, [255, 255, 255, 255]),
            &DistortionParams::default(),
            DistortionMode::VisualizeMask,
        );
        assert_eq!(white.get_pixel(1, 1), &Rgba([255, 255, 255, 255]));

        // A single saturated channel already reaches dot(m, m) = 1.
        let red = distort_image(
            &screen,
            &noise,
            &solid(4, 4, [255, 0, 0, 255]),
            &DistortionParams::default(),
            DistortionMode::VisualizeMask,
        );
        assert_eq!(red.get_pixel(1, 1), &Rgba([255, 255, 255, 255]));

        let black = distort_image(
            &screen,
            &noise,
            &solid(4, 4, [0, 0, 0, 255]),
            &DistortionParams::default(),
            DistortionMode::VisualizeMask,
        );
        assert_eq!(black.get_pixel(1, 1), &Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn mask_view_reports_intermediate_strength() {
        let screen = gradient_screen(4, 4);
        let noise = solid(4, 4, [0, 0, 0, 255]);
        let mid = distort_image(
            &screen,
            &noise,
            &solid(4, 4, [128, 128, 128, 255]),
            &DistortionParams::default(),
            DistortionMode::VisualizeMask,
        );

        // 3 * (128/255)^2 ~= 0.756
        let expected = (3.0f32 * (128.0 / 255.0) * (128.0 / 255.0) * 255.0).round() as i32;
        let got = mid.get_pixel(2, 2).0[0] as i32;
        assert!((got - expected).abs() <= 1, "got {}, expected {}", got, expected);
    }

    #[test]
    fn full_strength_offset_shifts_by_whole_pixels() {
        // 10x10 image; offset = noise(1,1) * 0.1 * strength(1) = one texel
        // diagonally.
        let screen = gradient_screen(10, 10);
        let noise = solid(10, 10, [255, 255, 0, 255]);
        let mask = solid(10, 10, [255, 255, 255, 255]);

        let params = DistortionParams {
            distortion_scale: 0.1,
            ..Default::default()
        };
        let out = distort_image(&screen, &noise, &mask, &params, DistortionMode::Normal);

        let shifted = out.get_pixel(2, 2);
        let source = screen.get_pixel(3, 3);
        assert_eq!(shifted.0[0], source.0[0]);
        assert_eq!(shifted.0[1], source.0[1]);
    }

    #[test]
    fn sampling_clamps_to_edge() {
        // Offsets past the border re-read the edge texel instead of wrapping.
        let screen = gradient_screen(10, 10);
        let noise = solid(10, 10, [255, 255, 0, 255]);
        let mask = solid(10, 10, [255, 255, 255, 255]);

        let params = DistortionParams {
            distortion_scale: 10.0,
            ..Default::default()
        };
        let out = distort_image(&screen, &noise, &mask, &params, DistortionMode::Normal);

        let corner = out.get_pixel(5, 5);
        let edge = screen.get_pixel(9, 9);
        assert_eq!(corner.0[0], edge.0[0]);
        assert_eq!(corner.0[1], edge.0[1]);
    }

    #[test]
    fn normal_mode_forces_opaque_alpha() {
        let screen = RgbaImage::from_pixel(4, 4, Rgba([10, 20, 30, 77]));
        let noise = solid(4, 4, [0, 0, 0, 255]);
        let mask = solid(4, 4, [0, 0, 0, 255]);

        let out = distort_image(
            &screen,
            &noise,
            &mask,
            &DistortionParams::default(),
            DistortionMode::Normal,
        );
        assert_eq!(out.get_pixel(0, 0).0[3], 255);
    }

    #[test]
    fn noise_sampling_wraps() {
        // A noise texture sampled with a uv scale of 2 repeats; both
        // halves of the output read identical noise values.
        let screen = solid(8, 8, [100, 100, 100, 255]);
        let mask = solid(8, 8, [255, 255, 255, 255]);
        let noise = RgbaImage::from_fn(8, 8, |x, _| Rgba([(x * 32) as u8, 0, 0, 255]));

        let params = DistortionParams {
            distortion_scale: 0.25,
            noise_uv_scale: Vec2::new(2.0, 2.0),
        };
        let out = distort_image(&screen, &noise, &mask, &params, DistortionMode::Normal);

        // The screen is uniform, so distorted output stays uniform; this
        // exercises the wrap path without panicking on out-of-range UVs.
        assert_eq!(out.get_pixel(0, 0), out.get_pixel(7, 7));
    }
}
