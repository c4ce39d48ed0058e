//! Per-item transforms.
//!
//! [`TransformLibrary`] is the seam between the pipeline and whatever does
//! the pixel work. [`ImageTransforms`] is the shipped implementation over
//! [`DynamicImage`], built on `image` and `imageproc`.

use image::{DynamicImage, GenericImageView, GrayImage, Rgba, RgbaImage, imageops};
use imageproc::geometric_transformations::{Interpolation, rotate_about_center};

use crate::core::{FlipAxis, Operation};
use crate::utils::TransformError;

const BRIGHTNESS_STEP: i32 = 100;
const LOW_CONTRAST_GAIN: f32 = 0.5;
const BLUR_SIGMA: f32 = 2.0;
const CANNY_LOW: f32 = 80.0;
const CANNY_HIGH: f32 = 240.0;

/// Kept hue/saturation/value window for background removal, hue on a 0..180 scale.
const BACKGROUND_KEEP_HUE: (f32, f32) = (0.0, 10.0);
const BACKGROUND_KEEP_SATURATION: (f32, f32) = (100.0, 255.0);
const BACKGROUND_KEEP_VALUE: (f32, f32) = (100.0, 255.0);

/// Applies one resolved operation to one item.
///
/// Implementations must not keep references to the input; the pipeline
/// replaces the item with the returned value before the next step.
pub trait TransformLibrary: Send + Sync {
    type Item: Send;

    fn transform(&self, op: &Operation, item: &Self::Item) -> Result<Self::Item, TransformError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ImageTransforms;

impl TransformLibrary for ImageTransforms {
    type Item = DynamicImage;

    fn transform(
        &self,
        op: &Operation,
        item: &DynamicImage,
    ) -> Result<DynamicImage, TransformError> {
        if item.width() == 0 || item.height() == 0 {
            return Err(TransformError::new(format!("{} on an empty image", op)));
        }

        let out = match *op {
            Operation::Grayscale => item.grayscale(),
            Operation::Flip { axis } => match axis {
                FlipAxis::Vertical => item.flipv(),
                FlipAxis::Horizontal => item.fliph(),
                FlipAxis::Both => item.rotate180(),
            },
            Operation::Rotate { degrees } => rotate_anticlockwise(item, degrees),
            Operation::HighContrast => equalize_luma(item),
            Operation::LowContrast => scale_channels(item, LOW_CONTRAST_GAIN),
            Operation::HighBrightness => item.brighten(BRIGHTNESS_STEP),
            Operation::LowBrightness => item.brighten(-BRIGHTNESS_STEP),
            Operation::GaussianBlur => item.blur(BLUR_SIGMA),
            Operation::EdgeDetect => {
                let edges = imageproc::edges::canny(&item.to_luma8(), CANNY_LOW, CANNY_HIGH);
                DynamicImage::ImageLuma8(edges)
            }
            Operation::BackgroundRemove => remove_background(item),
        };
        Ok(out)
    }
}

fn rotate_anticlockwise(item: &DynamicImage, degrees: u16) -> DynamicImage {
    match degrees % 360 {
        0 => item.clone(),
        90 => item.rotate270(),
        180 => item.rotate180(),
        270 => item.rotate90(),
        other => rotate_expanded(item, other),
    }
}

/// Arbitrary-angle rotation on a canvas large enough to hold every corner.
fn rotate_expanded(item: &DynamicImage, degrees: u16) -> DynamicImage {
    let (w, h) = item.dimensions();
    let theta = (degrees as f32).to_radians();
    let (sin, cos) = (theta.sin().abs(), theta.cos().abs());
    let out_w = (w as f32 * cos + h as f32 * sin).ceil() as u32;
    let out_h = (w as f32 * sin + h as f32 * cos).ceil() as u32;

    let mut canvas = RgbaImage::new(out_w.max(1), out_h.max(1));
    let x = (out_w as i64 - w as i64) / 2;
    let y = (out_h as i64 - h as i64) / 2;
    imageops::overlay(&mut canvas, &item.to_rgba8(), x, y);

    // imageproc rotates clockwise for positive angles
    let rotated = rotate_about_center(&canvas, -theta, Interpolation::Bilinear, Rgba([0, 0, 0, 0]));
    DynamicImage::ImageRgba8(rotated)
}

/// Histogram equalization of luma; chroma is preserved by shifting every
/// colour channel by the change in luma.
fn equalize_luma(item: &DynamicImage) -> DynamicImage {
    let luma: GrayImage = item.to_luma8();
    let equalized = imageproc::contrast::equalize_histogram(&luma);

    if item.color().has_color() {
        let mut rgba = item.to_rgba8();
        for (x, y, px) in rgba.enumerate_pixels_mut() {
            let delta = equalized.get_pixel(x, y)[0] as i16 - luma.get_pixel(x, y)[0] as i16;
            for c in &mut px.0[..3] {
                *c = (*c as i16 + delta).clamp(0, 255) as u8;
            }
        }
        DynamicImage::ImageRgba8(rgba)
    } else {
        DynamicImage::ImageLuma8(equalized)
    }
}

fn scale_channels(item: &DynamicImage, gain: f32) -> DynamicImage {
    let mut rgba = item.to_rgba8();
    for px in rgba.pixels_mut() {
        for c in &mut px.0[..3] {
            *c = (*c as f32 * gain).round().clamp(0.0, 255.0) as u8;
        }
    }
    DynamicImage::ImageRgba8(rgba)
}

/// Keeps pixels inside the HSV window and blacks out the rest.
fn remove_background(item: &DynamicImage) -> DynamicImage {
    let mut rgba = item.to_rgba8();
    for px in rgba.pixels_mut() {
        let (h, s, v) = hsv(px.0[0], px.0[1], px.0[2]);
        let keep = within(h, BACKGROUND_KEEP_HUE)
            && within(s, BACKGROUND_KEEP_SATURATION)
            && within(v, BACKGROUND_KEEP_VALUE);
        if !keep {
            px.0[..3].fill(0);
        }
    }
    DynamicImage::ImageRgba8(rgba)
}

fn within(value: f32, (low, high): (f32, f32)) -> bool {
    value >= low && value <= high
}

/// Hue in `0..180`, saturation and value in `0..=255`.
fn hsv(r: u8, g: u8, b: u8) -> (f32, f32, f32) {
    let (r, g, b) = (r as f32, g as f32, b as f32);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let s = if max > 0.0 { delta / max * 255.0 } else { 0.0 };
    let h = if delta == 0.0 {
        0.0
    } else if max == r {
        60.0 * ((g - b) / delta)
    } else if max == g {
        60.0 * ((b - r) / delta) + 120.0
    } else {
        60.0 * ((r - g) / delta) + 240.0
    };
    let h = if h < 0.0 { h + 360.0 } else { h };
    (h / 2.0, s, max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb, RgbImage};

    fn marker() -> DynamicImage {
        // 3x2, only the top-left pixel is lit
        let mut img = GrayImage::new(3, 2);
        img.put_pixel(0, 0, Luma([255]));
        DynamicImage::ImageLuma8(img)
    }

    fn lit(img: &DynamicImage) -> Vec<(u32, u32)> {
        let gray = img.to_luma8();
        gray.enumerate_pixels()
            .filter(|(_, _, p)| p[0] > 127)
            .map(|(x, y, _)| (x, y))
            .collect()
    }

    #[test]
    fn right_angle_rotation_is_anticlockwise() {
        let out = ImageTransforms.transform(&Operation::rotate(90), &marker()).unwrap();
        assert_eq!(out.dimensions(), (2, 3));
        // top-left moves to bottom-left
        assert_eq!(lit(&out), vec![(0, 2)]);
    }

    #[test]
    fn flip_codes_select_axis() {
        let t = ImageTransforms;
        assert_eq!(lit(&t.transform(&Operation::flip(0), &marker()).unwrap()), vec![(0, 1)]);
        assert_eq!(lit(&t.transform(&Operation::flip(1), &marker()).unwrap()), vec![(2, 0)]);
        assert_eq!(lit(&t.transform(&Operation::flip(-1), &marker()).unwrap()), vec![(2, 1)]);
    }

    #[test]
    fn odd_angles_expand_the_canvas() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(10, 4));
        let out = ImageTransforms.transform(&Operation::rotate(45), &img).unwrap();
        assert!(out.width() > 10 && out.height() > 4);
    }

    #[test]
    fn brightness_moves_in_both_directions() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(1, 1, Rgb([120, 120, 120])));
        let up = ImageTransforms.transform(&Operation::HighBrightness, &img).unwrap();
        let down = ImageTransforms.transform(&Operation::LowBrightness, &img).unwrap();
        assert_eq!(up.to_rgb8().get_pixel(0, 0).0, [220, 220, 220]);
        assert_eq!(down.to_rgb8().get_pixel(0, 0).0, [20, 20, 20]);
    }

    #[test]
    fn low_contrast_halves_channels() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(1, 1, Rgb([200, 100, 10])));
        let out = ImageTransforms.transform(&Operation::LowContrast, &img).unwrap();
        assert_eq!(out.to_rgb8().get_pixel(0, 0).0, [100, 50, 5]);
    }

    #[test]
    fn background_removal_keeps_saturated_red() {
        let mut img = RgbImage::new(2, 1);
        img.put_pixel(0, 0, Rgb([220, 30, 20]));
        img.put_pixel(1, 0, Rgb([30, 200, 40]));
        let out = ImageTransforms
            .transform(&Operation::BackgroundRemove, &DynamicImage::ImageRgb8(img))
            .unwrap()
            .to_rgb8();
        assert_eq!(out.get_pixel(0, 0).0, [220, 30, 20]);
        assert_eq!(out.get_pixel(1, 0).0, [0, 0, 0]);
    }

    #[test]
    fn edge_detect_yields_single_channel() {
        let out = ImageTransforms.transform(&Operation::EdgeDetect, &marker()).unwrap();
        assert!(matches!(out, DynamicImage::ImageLuma8(_)));
    }

    #[test]
    fn empty_images_are_rejected() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(0, 0));
        assert!(ImageTransforms.transform(&Operation::Grayscale, &img).is_err());
    }
}
