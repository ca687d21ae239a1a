//! OCR wrapper.
//!
//! The crate relies on `ocr-rs` (Rust PaddleOCR bindings). OCR engines are
//! sensitive to input quality, so crops are routed through
//! [`crate::image::pre_process`] before recognition where it helps.
//!
//! Everything downstream of recognition goes through the [`TextRecognizer`]
//! trait so the parsing pipeline can be exercised with a scripted engine in
//! tests.

use std::path::Path;

use anyhow::{Context, Result};

use crate::image::{Image, Rect};

/// Recognized text for one region.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OcrResult {
    pub text: String,
    /// One confidence per whitespace-separated word of `text`, in 0..=1.
    pub word_confidences: Vec<f32>,
    pub mean_confidence: f32,
    /// Per-line boxes when line segmentation was requested, top-to-bottom.
    pub lines: Vec<TextLine>,
}

impl OcrResult {
    pub fn from_text(text: impl Into<String>) -> Self {
        let text = text.into();
        let words = text.split_whitespace().count();
        Self {
            word_confidences: vec![1.0; words],
            mean_confidence: if words > 0 { 1.0 } else { 0.0 },
            lines: Vec::new(),
            text,
        }
    }
}

/// One detected text line with its bounding box in crop coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct TextLine {
    pub text: String,
    pub rect: Rect,
}

/// Seam between the parsing pipeline and the OCR engine.
pub trait TextRecognizer {
    /// Recognize the whole crop as free-form text.
    fn recognize(&self, image: Image) -> OcrResult;

    /// Segment the crop into text lines and recognize each one; the result
    /// carries one bounding box per line, ordered top-to-bottom.
    fn recognize_lines(&self, image: Image) -> OcrResult;
}

pub struct Ocr {
    engine: ocr_rs::OcrEngine,
}

impl Ocr {
    /// Initialize the OCR engine with the given model paths.
    pub fn try_new(
        detection: impl AsRef<Path>,
        recognition: impl AsRef<Path>,
        charset: impl AsRef<Path>,
    ) -> Result<Self> {
        let thread_count = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        let engine = ocr_rs::OcrEngine::new(
            detection,
            recognition,
            charset,
            Some(ocr_rs::OcrEngineConfig {
                backend: ocr_rs::Backend::CPU,
                thread_count: thread_count as i32,
                // Accuracy-focused: preprocessing is usually more important
                // than the precision mode, but High generally improves
                // results on small stylized fonts at a CPU cost.
                precision_mode: ocr_rs::PrecisionMode::High,
                enable_parallel: thread_count > 1,
                min_result_confidence: 0.5,
                ..Default::default()
            }),
        )
        .context("failed to initialize OCR engine")?;

        Ok(Self { engine })
    }

    fn raw_text(&self, image: Image) -> String {
        let image = ocr_rs::preprocess::rgb_to_image(&image.get_bytes(), image.width(), image.height());

        match self.engine.recognize(&image) {
            Ok(results) => results
                .into_iter()
                .map(|v| v.text)
                .collect::<Vec<_>>()
                .join(" "),
            Err(_) => String::new(),
        }
    }
}

impl TextRecognizer for Ocr {
    fn recognize(&self, image: Image) -> OcrResult {
        // Small crops recognize noticeably better when upscaled.
        const MIN_H: u32 = 80;
        if image.height() < MIN_H && image.height() > 0 {
            let upscaled = image.to_owned_image().resized_h(MIN_H);
            return OcrResult::from_text(self.raw_text(upscaled.as_image()));
        }
        // The engine drops results below `min_result_confidence` and does
        // not expose per-word scores, so surviving words count as full
        // confidence.
        OcrResult::from_text(self.raw_text(image))
    }

    fn recognize_lines(&self, image: Image) -> OcrResult {
        let gray = image.to_owned_image().to_gray_image();
        let mut lines = Vec::new();
        let mut texts = Vec::new();
        let mut confidences = Vec::new();

        for rect in segment_text_lines(&gray) {
            let crop = image.crop(rect);
            let line = self.recognize(crop);
            confidences.extend(line.word_confidences.iter().copied());
            texts.push(line.text.clone());
            lines.push(TextLine {
                text: line.text,
                rect,
            });
        }

        let mean = if confidences.is_empty() {
            0.0
        } else {
            confidences.iter().sum::<f32>() / confidences.len() as f32
        };
        OcrResult {
            text: texts.join("\n"),
            word_confidences: confidences,
            mean_confidence: mean,
            lines,
        }
    }
}

/// Find text-line bands by horizontal projection of an Otsu binarization.
///
/// Glyph pixels are assumed to be the minority population; single-row gaps
/// (broken ascenders) are bridged. Bands are returned top-to-bottom with
/// their horizontal extent trimmed to the leftmost/rightmost glyph pixel.
pub fn segment_text_lines(gray: &image::GrayImage) -> Vec<Rect> {
    use imageproc::contrast::{otsu_level, threshold, ThresholdType};

    let (w, h) = gray.dimensions();
    if w == 0 || h == 0 {
        return Vec::new();
    }

    let level = otsu_level(gray);
    let bin = threshold(gray, level, ThresholdType::Binary);

    let white = bin.pixels().filter(|p| p.0[0] > 0).count() as u32;
    let glyphs_are_white = white * 2 <= w * h;
    let is_glyph = |x: u32, y: u32| (bin.get_pixel(x, y).0[0] > 0) == glyphs_are_white;

    let row_counts: Vec<u32> = (0..h)
        .map(|y| (0..w).filter(|&x| is_glyph(x, y)).count() as u32)
        .collect();
    // A couple of stray pixels in a row is noise, not text.
    let min_row = 2u32.max(w / 200);

    let mut bands: Vec<(u32, u32)> = Vec::new();
    let mut start: Option<u32> = None;
    let mut gap = 0u32;
    for y in 0..h {
        if row_counts[y as usize] >= min_row {
            if start.is_none() {
                start = Some(y);
            }
            gap = 0;
        } else if let Some(s) = start {
            gap += 1;
            if gap > 1 {
                bands.push((s, y - gap + 1));
                start = None;
                gap = 0;
            }
        }
    }
    if let Some(s) = start {
        bands.push((s, h));
    }

    bands
        .into_iter()
        .filter(|(top, bottom)| bottom > top)
        .map(|(top, bottom)| {
            let mut min_x = w;
            let mut max_x = 0;
            for y in top..bottom {
                for x in 0..w {
                    if is_glyph(x, y) {
                        min_x = min_x.min(x);
                        max_x = max_x.max(x + 1);
                    }
                }
            }
            if min_x >= max_x {
                Rect::new(0, top, w, bottom - top)
            } else {
                Rect::new(min_x, top, max_x - min_x, bottom - top)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    fn text_band(img: &mut GrayImage, y: u32, h: u32, x: u32, w: u32) {
        for yy in y..y + h {
            for xx in x..x + w {
                img.put_pixel(xx, yy, Luma([255]));
            }
        }
    }

    #[test]
    fn segments_bands_top_to_bottom() {
        let mut img = GrayImage::new(120, 90);
        text_band(&mut img, 10, 8, 5, 80);
        text_band(&mut img, 40, 8, 12, 60);
        text_band(&mut img, 70, 8, 5, 90);

        let lines = segment_text_lines(&img);
        assert_eq!(lines.len(), 3);
        assert!(lines[0].y < lines[1].y && lines[1].y < lines[2].y);
        assert_eq!(lines[1].x, 12);
    }

    #[test]
    fn empty_image_yields_no_lines() {
        let img = GrayImage::new(40, 20);
        assert!(segment_text_lines(&img).is_empty());
    }

    #[test]
    fn from_text_counts_word_confidences() {
        let res = OcrResult::from_text("item power 725");
        assert_eq!(res.word_confidences.len(), 3);
        assert_eq!(res.mean_confidence, 1.0);
    }
}
