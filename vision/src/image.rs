//! Image primitives and utilities.
//!
//! The crate uses a lightweight owned RGB image type (`OwnedImage`) that is
//! optimized for repeated cropping of screen captures.
//!
//! For most operations we borrow a view (`Image<'a>`) instead of copying
//! pixels. This keeps the parsing pipeline fast while still allowing easy
//! conversion to owned images when needed (OCR preprocessing, debug
//! snapshots, etc.).

use anyhow::{Context, Result};

/// Packed bitset mask (row-major, one bit per pixel).
pub struct OwnedMask(pub Vec<u8>);

pub struct Mask<'a>(pub &'a [u8]);

impl OwnedMask {
    pub fn as_mask(&self) -> Mask<'_> {
        Mask(&self.0)
    }
}

impl<'a> Mask<'a> {
    #[inline(always)]
    pub fn get(&self, i: usize) -> bool {
        ((self.0[i / 8] >> (i % 8)) & 1) == 1
    }
}

/// Owned RGB image (no alpha).
#[derive(Clone, Debug)]
pub struct OwnedImage {
    width: u32,
    height: u32,
    data: Vec<Color>,
}

impl OwnedImage {
    /// Build an `OwnedImage` from RGBA bytes (alpha is discarded).
    ///
    /// The buffer is expected to be tightly packed: `width * height * 4` bytes.
    pub fn from_rgba(width: usize, bytes: &[u8]) -> Self {
        let height = bytes.len() / width / 4;
        let data = bytes
            .chunks_exact(4)
            .map(|v| Color::new(v[0], v[1], v[2]))
            .collect::<Vec<_>>();

        Self {
            width: width as u32,
            height: height as u32,
            data,
        }
    }

    pub fn from_pixels(width: u32, height: u32, data: Vec<Color>) -> Self {
        debug_assert_eq!(data.len(), (width * height) as usize);
        Self {
            width,
            height,
            data,
        }
    }

    /// Load an RGBA PNG and return an `(OwnedImage, Option<OwnedMask>)` pair.
    ///
    /// The mask is a packed bitset (row-major) where each bit indicates whether
    /// the original alpha value was >= `alpha_threshold`. If the PNG is fully
    /// opaque no mask is returned, matching the convention that an absent mask
    /// means "match every pixel".
    pub fn from_png_mask(bytes: &[u8], alpha_threshold: u8) -> Result<(Self, Option<OwnedMask>)> {
        let img = image::load_from_memory(bytes)
            .context("decode png (with alpha)")?
            .to_rgba8();
        let (width, height) = img.dimensions();
        let mut data = Vec::with_capacity((width * height) as usize);
        let mut mask = vec![0u8; (width * height) as usize / 8 + 1];
        let mut any_transparent = false;

        for (i, p) in img.pixels().enumerate() {
            let [r, g, b, a] = p.0;
            data.push(Color::new(r, g, b));
            if a >= alpha_threshold {
                mask[i / 8] |= 1 << (i % 8);
            } else {
                any_transparent = true;
            }
        }

        Ok((
            Self {
                width,
                height,
                data,
            },
            any_transparent.then_some(OwnedMask(mask)),
        ))
    }

    /// Resize this image to the given height (preserving aspect ratio).
    ///
    /// Uses `fast_image_resize` (SIMD-optimized) and keeps output in `Vec<Color>`.
    pub fn resize_h(&mut self, height: u32) {
        if self.height == height {
            return;
        }

        let height = height.max(1);
        let width = (self.width as u64 * height as u64 / self.height.max(1) as u64) as u32;

        // SAFETY: `Color` is `#[repr(C)]` with 3 x `u8`, so it is layout-compatible
        // with `fast_image_resize::pixels::U8x3` (alignment 1).
        let src_pixels = unsafe {
            std::slice::from_raw_parts(
                self.data.as_ptr() as *const fast_image_resize::pixels::U8x3,
                self.data.len(),
            )
        };

        let src = fast_image_resize::images::ImageRef::from_pixels(self.width, self.height, src_pixels)
            .expect("fast_image_resize: ImageRef::from_pixels failed");

        let mut dst = fast_image_resize::images::Image::new(width, height, fast_image_resize::PixelType::U8x3);

        let mut resizer = fast_image_resize::Resizer::new();
        let options = fast_image_resize::ResizeOptions::new().resize_alg(
            fast_image_resize::ResizeAlg::Interpolation(fast_image_resize::FilterType::CatmullRom),
        );

        resizer
            .resize(&src, &mut dst, &Some(options))
            .expect("fast_image_resize: resize failed");

        let bytes: Vec<u8> = dst.into_vec();
        let mut data = Vec::with_capacity((width * height) as usize);
        for px in bytes.chunks_exact(3) {
            data.push(Color::new(px[0], px[1], px[2]));
        }

        self.width = width;
        self.height = height;
        self.data = data;
    }

    #[inline]
    pub fn resized_h(mut self, height: u32) -> Self {
        self.resize_h(height);
        self
    }

    pub fn map_pixels(&mut self, f: impl Fn(&mut Color)) {
        for v in &mut self.data {
            f(v);
        }
    }

    /// Create a borrowed view of this entire image.
    pub fn as_image(&self) -> Image<'_> {
        Image {
            x1: 0,
            y1: 0,
            x2: self.width,
            y2: self.height,
            true_width: self.width,
            data: &self.data,
        }
    }

    /// Convert to a grayscale `GrayImage` (luma).
    pub fn to_gray_image(&self) -> image::GrayImage {
        use image::{GrayImage, Luma};
        let mut out = GrayImage::new(self.width, self.height);
        for y in 0..self.height {
            for x in 0..self.width {
                let c = self.data[(x + y * self.width) as usize];
                out.put_pixel(x, y, Luma([c.luma()]));
            }
        }
        out
    }

    /// Create an RGB `OwnedImage` from a grayscale image (each pixel repeated into RGB).
    pub fn from_gray_as_rgb(gray: &image::GrayImage) -> Self {
        let (w, h) = gray.dimensions();
        let mut data = Vec::with_capacity((w * h) as usize);
        for p in gray.pixels() {
            let v = p.0[0];
            data.push(Color::new(v, v, v));
        }
        Self {
            width: w,
            height: h,
            data,
        }
    }

    /// Paint every pixel inside `band` with `replacement`.
    ///
    /// Used to blank out the "unusable" red overlay before OCR, which
    /// otherwise bleeds into the glyph strokes and ruins recognition.
    pub fn paint_band(&mut self, band: &HsvRange, replacement: Color) {
        self.map_pixels(|c| {
            if band.contains(*c) {
                *c = replacement;
            }
        });
    }
}

// ----------

/// Axis-aligned rectangle in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl Rect {
    pub const fn new(x: u32, y: u32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }

    pub fn right(&self) -> u32 {
        self.x + self.w
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.h
    }

    pub fn center(&self) -> (u32, u32) {
        (self.x + self.w / 2, self.y + self.h / 2)
    }
}

// ----------

/// Borrowed image view into an `OwnedImage`.
#[derive(Clone, Copy)]
pub struct Image<'a> {
    x1: u32,
    y1: u32,
    x2: u32,
    y2: u32,
    true_width: u32,
    data: &'a [Color],
}

impl<'a> Image<'a> {
    #[inline(always)]
    pub fn width(&self) -> u32 {
        self.x2 - self.x1
    }

    #[inline(always)]
    pub fn height(&self) -> u32 {
        self.y2 - self.y1
    }

    #[inline(always)]
    pub fn pixel(&self, x: u32, y: u32) -> &Color {
        &self.data[(self.x1 + x + (self.y1 + y) * self.true_width) as usize]
    }

    pub fn to_owned_image(self) -> OwnedImage {
        let mut data = Vec::with_capacity((self.width() * self.height()) as usize);
        for y in 0..self.height() {
            for x in 0..self.width() {
                data.push(*self.pixel(x, y));
            }
        }

        OwnedImage {
            width: self.width(),
            height: self.height(),
            data,
        }
    }

    pub fn get_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![0; (self.width() * self.height() * 3) as usize];
        let mut i = 0;
        for y in 0..self.height() {
            for x in 0..self.width() {
                let clr = self.pixel(x, y);
                bytes[i] = clr.r;
                bytes[i + 1] = clr.g;
                bytes[i + 2] = clr.b;
                i += 3;
            }
        }
        bytes
    }

    pub fn save_png<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let bytes = self.get_bytes();
        let img = image::RgbImage::from_raw(self.width(), self.height(), bytes)
            .context("RgbImage::from_raw failed")?;
        img.save_with_format(path, image::ImageFormat::Png)
            .context("save png")?;
        Ok(())
    }

    /// Create an arbitrary subimage (relative coordinates, clamped to bounds).
    pub fn sub_image(&self, x: u32, y: u32, width: u32, height: u32) -> Self {
        let x = x.min(self.width());
        let y = y.min(self.height());
        let width = width.min(self.width() - x);
        let height = height.min(self.height() - y);

        Self {
            x1: self.x1 + x,
            y1: self.y1 + y,
            x2: self.x1 + x + width,
            y2: self.y1 + y + height,
            true_width: self.true_width,
            data: self.data,
        }
    }

    pub fn crop(&self, rect: Rect) -> Self {
        self.sub_image(rect.x, rect.y, rect.w, rect.h)
    }

    /// Binary mask of pixels inside the given HSV band (255 inside, 0 outside).
    pub fn band_mask(&self, band: &HsvRange) -> image::GrayImage {
        use image::Luma;
        let mut out = image::GrayImage::new(self.width(), self.height());
        for y in 0..self.height() {
            for x in 0..self.width() {
                let inside = band.contains(*self.pixel(x, y));
                out.put_pixel(x, y, Luma([if inside { 255 } else { 0 }]));
            }
        }
        out
    }

    /// Fraction of pixels inside the given HSV band, scaled to 0..255.
    ///
    /// Matches the "mean of the in-range mask" heuristic used to flag
    /// dominant-color crops (e.g. the material tint of a tooltip header).
    pub fn band_mean(&self, band: &HsvRange) -> f32 {
        let count = (self.width() * self.height()) as f32;
        if count == 0.0 {
            return 0.0;
        }
        let mut sum = 0u64;
        for y in 0..self.height() {
            for x in 0..self.width() {
                if band.contains(*self.pixel(x, y)) {
                    sum += 255;
                }
            }
        }
        sum as f32 / count
    }
}

// ----------

/// Pre-processing knobs applied before OCR.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct PreProcess {
    /// Color band to paint out before recognition (e.g. the "unusable" red tint).
    pub blocked_band: Option<HsvRange>,
    /// Replacement tone for painted-out pixels.
    pub backdrop: Color,
    /// Gamma for the correction LUT (1.0 = identity).
    pub gamma: f32,
}

impl Default for PreProcess {
    fn default() -> Self {
        Self {
            blocked_band: None,
            backdrop: Color::new(235, 235, 235),
            gamma: 1.4,
        }
    }
}

/// Prepare a crop for OCR: paint out the blocked color band, convert to
/// grayscale, apply gamma correction, then a dilate-erode pass to thicken
/// thin glyph strokes.
pub fn pre_process(image: Image, opts: &PreProcess) -> OwnedImage {
    use imageproc::distance_transform::Norm;
    use imageproc::morphology::{dilate, erode};

    let mut owned = image.to_owned_image();
    if let Some(band) = &opts.blocked_band {
        owned.paint_band(band, opts.backdrop);
    }

    let mut gray = owned.to_gray_image();

    if (opts.gamma - 1.0).abs() > f32::EPSILON {
        let lut: Vec<u8> = (0..=255u32)
            .map(|v| {
                let norm = (v as f32 / 255.0).powf(1.0 / opts.gamma);
                (norm * 255.0).round().clamp(0.0, 255.0) as u8
            })
            .collect();
        for p in gray.pixels_mut() {
            p.0[0] = lut[p.0[0] as usize];
        }
    }

    // Tooltip glyphs are light-on-dark; dilating first thickens the strokes,
    // the erode afterwards restores the outline without reopening gaps.
    let closed = erode(&dilate(&gray, Norm::LInf, 1), Norm::LInf, 1);
    OwnedImage::from_gray_as_rgb(&closed)
}

// ----------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[repr(C)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const WHITE: Self = Self::new(255, 255, 255);
    pub const BLACK: Self = Self::new(0, 0, 0);

    #[inline]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Compute luma (grayscale intensity).
    pub fn luma(&self) -> u8 {
        let r = self.r as u32;
        let g = self.g as u32;
        let b = self.b as u32;
        ((299 * r + 587 * g + 114 * b) / 1000) as u8
    }

    /// HSV with hue in 0..360, saturation and value in 0..=255.
    pub fn to_hsv(&self) -> (f32, u8, u8) {
        let r = self.r as f32 / 255.0;
        let g = self.g as f32 / 255.0;
        let b = self.b as f32 / 255.0;

        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        let delta = max - min;

        let h = if delta == 0.0 {
            0.0
        } else if max == r {
            60.0 * (((g - b) / delta).rem_euclid(6.0))
        } else if max == g {
            60.0 * ((b - r) / delta + 2.0)
        } else {
            60.0 * ((r - g) / delta + 4.0)
        };

        let s = if max == 0.0 { 0.0 } else { delta / max };
        (h, (s * 255.0).round() as u8, (max * 255.0).round() as u8)
    }
}

/// Inclusive HSV band, hue in degrees 0..360.
///
/// A band whose `h_min > h_max` wraps around 0 (e.g. reds at 350..=10).
#[derive(Debug, Clone, Copy, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct HsvRange {
    pub h_min: f32,
    pub h_max: f32,
    pub s_min: u8,
    pub s_max: u8,
    pub v_min: u8,
    pub v_max: u8,
}

impl HsvRange {
    pub fn contains(&self, color: Color) -> bool {
        let (h, s, v) = color.to_hsv();
        let hue_ok = if self.h_min <= self.h_max {
            (self.h_min..=self.h_max).contains(&h)
        } else {
            h >= self.h_min || h <= self.h_max
        };
        hue_ok && (self.s_min..=self.s_max).contains(&s) && (self.v_min..=self.v_max).contains(&v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hsv_red_wraps_around_zero() {
        let band = HsvRange {
            h_min: 350.0,
            h_max: 10.0,
            s_min: 100,
            s_max: 255,
            v_min: 100,
            v_max: 255,
        };
        assert!(band.contains(Color::new(255, 0, 0)));
        assert!(!band.contains(Color::new(0, 255, 0)));
    }

    #[test]
    fn band_mean_counts_fraction() {
        let band = HsvRange {
            h_min: 100.0,
            h_max: 140.0,
            s_min: 100,
            s_max: 255,
            v_min: 100,
            v_max: 255,
        };
        // Left half green, right half black.
        let mut data = Vec::new();
        for _y in 0..4 {
            for x in 0..4 {
                data.push(if x < 2 { Color::new(0, 255, 0) } else { Color::BLACK });
            }
        }
        let img = OwnedImage::from_pixels(4, 4, data);
        let mean = img.as_image().band_mean(&band);
        assert!((mean - 127.5).abs() < 0.01);
    }

    #[test]
    fn paint_band_blanks_matching_pixels() {
        let band = HsvRange {
            h_min: 100.0,
            h_max: 140.0,
            s_min: 100,
            s_max: 255,
            v_min: 100,
            v_max: 255,
        };
        let mut img = OwnedImage::from_pixels(2, 1, vec![Color::new(0, 255, 0), Color::BLACK]);
        img.paint_band(&band, Color::WHITE);
        let view = img.as_image();
        assert_eq!(*view.pixel(0, 0), Color::WHITE);
        assert_eq!(*view.pixel(1, 0), Color::BLACK);
    }

    #[test]
    fn sub_image_clamps_to_bounds() {
        let img = OwnedImage::from_pixels(4, 4, vec![Color::BLACK; 16]);
        let view = img.as_image().sub_image(2, 2, 10, 10);
        assert_eq!(view.width(), 2);
        assert_eq!(view.height(), 2);
    }
}
