//! Image preprocessing variants.

use gait_models::Variant;
use image::{imageops, RgbImage};

const BLUR_SIGMA: f32 = 1.5;
const BRIGHTNESS: i32 = 20;
const CONTRAST: f32 = 25.0;

/// Produce the image the detector sees for `variant`.
pub fn apply(variant: Variant, frame: &RgbImage) -> RgbImage {
    match variant {
        Variant::Identity => frame.clone(),
        Variant::EnhancedLowerBody => enhance_lower_body(frame),
        Variant::GaussianBlur => imageops::blur(frame, BLUR_SIGMA),
        Variant::BrightnessContrast => brightness_contrast(frame),
        Variant::Mirror => imageops::flip_horizontal(frame),
        Variant::EnhancedLowerBodyMirror => imageops::flip_horizontal(&enhance_lower_body(frame)),
        Variant::BlurBrightness => {
            let blurred = imageops::blur(frame, BLUR_SIGMA);
            imageops::brighten(&blurred, BRIGHTNESS)
        }
    }
}

fn brightness_contrast(frame: &RgbImage) -> RgbImage {
    let brightened = imageops::brighten(frame, BRIGHTNESS);
    imageops::contrast(&brightened, CONTRAST)
}

/// Per-channel contrast stretch of the lower half of the frame.
fn enhance_lower_body(frame: &RgbImage) -> RgbImage {
    let mut out = frame.clone();
    let (width, height) = out.dimensions();
    let top = height / 2;
    if width == 0 || top >= height {
        return out;
    }

    let mut lo = [u8::MAX; 3];
    let mut hi = [u8::MIN; 3];
    for y in top..height {
        for x in 0..width {
            let px = out.get_pixel(x, y);
            for c in 0..3 {
                lo[c] = lo[c].min(px[c]);
                hi[c] = hi[c].max(px[c]);
            }
        }
    }

    for y in top..height {
        for x in 0..width {
            let px = out.get_pixel_mut(x, y);
            for c in 0..3 {
                let range = hi[c].saturating_sub(lo[c]);
                if range == 0 {
                    continue;
                }
                let stretched = (px[c] - lo[c]) as u32 * 255 / range as u32;
                px[c] = stretched as u8;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn gradient() -> RgbImage {
        RgbImage::from_fn(8, 8, |x, y| Rgb([100 + x as u8 * 4, 100 + y as u8 * 2, 120]))
    }

    #[test]
    fn test_identity_is_unchanged() {
        let frame = gradient();
        assert_eq!(apply(Variant::Identity, &frame), frame);
    }

    #[test]
    fn test_mirror_flips_columns() {
        let frame = gradient();
        let mirrored = apply(Variant::Mirror, &frame);
        assert_eq!(mirrored.get_pixel(0, 3), frame.get_pixel(7, 3));
    }

    #[test]
    fn test_lower_body_stretch_leaves_top_half() {
        let frame = gradient();
        let enhanced = apply(Variant::EnhancedLowerBody, &frame);
        assert_eq!(enhanced.get_pixel(2, 1), frame.get_pixel(2, 1));
        // Lower half spans full range after stretching
        assert_eq!(enhanced.get_pixel(0, 7)[0], 0);
        assert_eq!(enhanced.get_pixel(7, 7)[0], 255);
    }

    #[test]
    fn test_all_variants_keep_dimensions() {
        let frame = gradient();
        for variant in Variant::ALL {
            assert_eq!(apply(*variant, &frame).dimensions(), (8, 8), "{}", variant);
        }
    }
}
