//! Owned RGB images and the pixel operations the pipeline needs.
//!
//! Only three operations are required by the two-stage pipeline: aspect-preserving resize with
//! centered padding (letterboxing), rotated square cropping, and conversion to a normalized input
//! tensor. Everything else (drawing, display, camera input) is out of scope.

use image::{imageops, Rgb, RgbImage};

use crate::nn::Tensor;
use crate::rect::RotatedRect;

/// Width and height of an image, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    width: u32,
    height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }
}

/// An image decoding error.
#[derive(Debug, thiserror::Error)]
#[error("failed to decode image: {0}")]
pub struct DecodeError(#[from] image::ImageError);

/// Scale and padding applied by [`Image::letterbox`].
///
/// Needed to map network outputs from the padded square back into the un-padded source image.
#[derive(Debug, Clone, Copy)]
pub struct Letterbox {
    /// Resize factor applied along the X axis.
    pub scale_x: f32,
    /// Resize factor applied along the Y axis.
    pub scale_y: f32,
    /// Padding added on the left edge, in target pixels.
    pub pad_x: f32,
    /// Padding added on the top edge, in target pixels.
    pub pad_y: f32,
}

/// An owned 8-bit RGB image.
#[derive(Clone)]
pub struct Image {
    buf: RgbImage,
}

impl Image {
    /// Creates a black image of the given size.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            buf: RgbImage::new(width, height),
        }
    }

    /// Decodes an image from its encoded byte representation (JPEG, PNG or GIF).
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let buf = image::load_from_memory(bytes)?.to_rgb8();
        Ok(Self { buf })
    }

    /// Wraps an already decoded [`RgbImage`].
    pub fn from_rgb(buf: RgbImage) -> Self {
        Self { buf }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.buf.width()
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.buf.height()
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width(), self.height())
    }

    /// Returns the RGB value of the pixel at `(x, y)`.
    #[inline]
    pub fn get(&self, x: u32, y: u32) -> [u8; 3] {
        self.buf.get_pixel(x, y).0
    }

    pub fn set(&mut self, x: u32, y: u32, rgb: [u8; 3]) {
        self.buf.put_pixel(x, y, Rgb(rgb));
    }

    /// Resizes the image into a `target`×`target` square, preserving the aspect ratio and padding
    /// the remainder with black, centered.
    ///
    /// Returns the padded square together with the scale and pad offsets that were applied, which
    /// are required to undo the transform on network outputs.
    pub fn letterbox(&self, target: u32) -> (Image, Letterbox) {
        let (w, h) = (self.width() as f32, self.height() as f32);
        let scale = target as f32 / w.max(h);
        let scaled_w = (w * scale).round().max(1.0) as u32;
        let scaled_h = (h * scale).round().max(1.0) as u32;
        let pad_x = (target as f32 - w * scale) * 0.5;
        let pad_y = (target as f32 - h * scale) * 0.5;

        let resized = imageops::resize(&self.buf, scaled_w, scaled_h, imageops::FilterType::Triangle);
        let mut out = RgbImage::new(target, target);
        imageops::replace(&mut out, &resized, pad_x as i64, pad_y as i64);

        (
            Image { buf: out },
            Letterbox {
                scale_x: scale,
                scale_y: scale,
                pad_x,
                pad_y,
            },
        )
    }

    /// Samples the image at a fractional pixel position with bilinear filtering.
    ///
    /// Positions outside the image read as black, matching the border behavior of the warp the
    /// reference pipeline uses.
    fn sample_bilinear(&self, x: f32, y: f32) -> [u8; 3] {
        let read = |ix: i64, iy: i64| -> [f32; 3] {
            if ix < 0 || iy < 0 || ix >= self.width() as i64 || iy >= self.height() as i64 {
                [0.0; 3]
            } else {
                let px = self.get(ix as u32, iy as u32);
                [px[0] as f32, px[1] as f32, px[2] as f32]
            }
        };

        let x0 = x.floor();
        let y0 = y.floor();
        let fx = x - x0;
        let fy = y - y0;
        let (x0, y0) = (x0 as i64, y0 as i64);

        let mut out = [0u8; 3];
        let (tl, tr) = (read(x0, y0), read(x0 + 1, y0));
        let (bl, br) = (read(x0, y0 + 1), read(x0 + 1, y0 + 1));
        for c in 0..3 {
            let top = tl[c] + (tr[c] - tl[c]) * fx;
            let bottom = bl[c] + (br[c] - bl[c]) * fx;
            out[c] = (top + (bottom - top) * fy).round().clamp(0.0, 255.0) as u8;
        }
        out
    }

    /// Extracts the content of a rotated square region as an un-rotated square image.
    ///
    /// The output has a side length of `rect.size()` rounded to whole pixels. Every output pixel
    /// is sampled through [`RotatedRect::map_crop_point`], so landmark coordinates measured in the
    /// returned crop can be mapped back with the same transform.
    ///
    /// Returns `None` if the region's size is not positive; callers skip such regions.
    pub fn rotated_crop(&self, rect: &RotatedRect) -> Option<Image> {
        let side = rect.size().round();
        if !(side > 0.0) {
            return None;
        }
        let side_px = side as u32;

        let mut out = RgbImage::new(side_px, side_px);
        for v in 0..side_px {
            for u in 0..side_px {
                let src = rect.map_crop_point(u as f32 + 0.5, v as f32 + 0.5, side, side);
                let rgb = self.sample_bilinear(src.x - 0.5, src.y - 0.5);
                out.put_pixel(u, v, Rgb(rgb));
            }
        }
        Some(Image { buf: out })
    }

    /// Converts the image to a `1×H×W×3` float tensor with values scaled to `0.0..=1.0`.
    pub fn to_tensor(&self) -> Tensor {
        let (w, h) = (self.width() as usize, self.height() as usize);
        let mut data = Vec::with_capacity(w * h * 3);
        for px in self.buf.pixels() {
            data.extend(px.0.iter().map(|&v| v as f32 / 255.0));
        }
        Tensor::new([1, h, w, 3], data)
    }
}

impl std::fmt::Debug for Image {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Image({}x{})", self.width(), self.height())
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn gradient(width: u32, height: u32) -> Image {
        let mut img = Image::new(width, height);
        for y in 0..height {
            for x in 0..width {
                img.set(x, y, [(x % 256) as u8, (y % 256) as u8, 0]);
            }
        }
        img
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(Image::decode(&[0, 1, 2, 3]).is_err());
    }

    #[test]
    fn letterbox_tall_image_pads_horizontally() {
        let img = gradient(50, 100);
        let (square, lb) = img.letterbox(192);
        assert_eq!(square.resolution(), Resolution::new(192, 192));
        assert_relative_eq!(lb.scale_x, 1.92, epsilon = 1e-4);
        assert_relative_eq!(lb.scale_y, 1.92, epsilon = 1e-4);
        assert_relative_eq!(lb.pad_x, 48.0, epsilon = 1e-3);
        assert!(lb.pad_y.abs() < 1e-3);
        // padded columns are black
        assert_eq!(square.get(0, 96), [0, 0, 0]);
        assert_eq!(square.get(191, 96), [0, 0, 0]);
    }

    #[test]
    fn letterbox_square_image_is_pure_resize() {
        let img = gradient(100, 100);
        let (_, lb) = img.letterbox(224);
        assert!(lb.pad_x.abs() < 1e-3);
        assert!(lb.pad_y.abs() < 1e-3);
        assert_relative_eq!(lb.scale_x, 2.24, epsilon = 1e-4);
    }

    #[test]
    fn rotated_crop_degenerate_size_is_none() {
        let img = gradient(10, 10);
        assert!(img
            .rotated_crop(&RotatedRect::new(5.0, 5.0, 0.0, 0.0))
            .is_none());
        assert!(img
            .rotated_crop(&RotatedRect::new(5.0, 5.0, -3.0, 0.0))
            .is_none());
    }

    #[test]
    fn unrotated_crop_copies_pixels() {
        let img = gradient(64, 64);
        let crop = img
            .rotated_crop(&RotatedRect::new(32.0, 32.0, 16.0, 0.0))
            .unwrap();
        assert_eq!(crop.resolution(), Resolution::new(16, 16));
        // crop origin sits at (24, 24) in the source
        assert_eq!(crop.get(0, 0), img.get(24, 24));
        assert_eq!(crop.get(15, 15), img.get(39, 39));
    }

    #[test]
    fn tensor_layout_is_nhwc() {
        let mut img = Image::new(2, 1);
        img.set(0, 0, [255, 0, 0]);
        img.set(1, 0, [0, 255, 0]);
        let t = img.to_tensor();
        assert_eq!(t.shape(), &[1, 1, 2, 3]);
        assert_eq!(t.as_slice(), &[1.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
    }
}
