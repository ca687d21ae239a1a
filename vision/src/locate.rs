//! Region locator: normalized-correlation search for small reference
//! bitmaps inside a captured frame.
//!
//! Templates are loaded once into a `TemplateStore` and referenced by name.
//! A search crops the frame to a region of interest, computes a normalized
//! cross-correlation score map per template (optionally on grayscale or an
//! HSV-band binarization, optionally restricted by the template's alpha
//! mask) and thresholds it. Failure is a `SearchResult` with `success =
//! false` and no matches, never a panic.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use crate::image::{HsvRange, Image, OwnedImage, OwnedMask, Rect};

/// A named reference bitmap plus optional alpha mask.
pub struct Template {
    pub name: String,
    pub image: OwnedImage,
    pub mask: Option<OwnedMask>,
}

/// Template bitmaps keyed by upper-cased name.
///
/// Constructed once per detected resolution and passed into the parser
/// explicitly; there is deliberately no process-wide template cache.
#[derive(Default)]
pub struct TemplateStore {
    templates: BTreeMap<String, Template>,
}

impl TemplateStore {
    /// Load every `*.png` in a directory; the key is the upper-cased file
    /// stem. Pixels with alpha below 127 are excluded from matching.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let mut store = Self::default();
        let dir = dir.as_ref();
        let entries = std::fs::read_dir(dir).with_context(|| format!("read templates {dir:?}"))?;
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("png") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let bytes = std::fs::read(&path).with_context(|| format!("read {path:?}"))?;
            let (image, mask) = OwnedImage::from_png_mask(&bytes, 127)
                .with_context(|| format!("decode {path:?}"))?;
            store.insert(stem, image, mask);
        }
        Ok(store)
    }

    pub fn insert(&mut self, name: &str, image: OwnedImage, mask: Option<OwnedMask>) {
        let name = name.to_uppercase();
        self.templates.insert(
            name.clone(),
            Template {
                name,
                image,
                mask,
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<&Template> {
        self.templates.get(&name.to_uppercase())
    }

    /// Resolve names to templates, preserving declaration order. Unknown
    /// names are logged and skipped rather than failing the search.
    fn resolve<'a>(&'a self, names: &[&str]) -> Vec<&'a Template> {
        let mut out = Vec::with_capacity(names.len());
        for name in names {
            match self.get(name) {
                Some(t) => out.push(t),
                None => tracing::warn!(template = %name, "template not defined"),
            }
        }
        out
    }
}

// ----------

/// A located occurrence of a template within a frame.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateMatch {
    pub name: String,
    pub score: f32,
    pub center: (u32, u32),
    pub region: Rect,
}

#[derive(Debug, Clone, Default)]
pub struct SearchResult {
    pub success: bool,
    pub matches: Vec<TemplateMatch>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchMode {
    /// Single match from the earliest-declared template that clears the
    /// threshold. Every template is still scored so the outcome does not
    /// depend on worker scheduling.
    #[default]
    First,
    /// Single highest-scoring match across all templates.
    Best,
    /// Every non-overlapping match across all templates.
    All,
}

#[derive(Debug, Clone, Default)]
pub struct SearchParams {
    pub threshold: f32,
    /// Pixel sub-rectangle bounding the search; `None` scans the whole
    /// frame. Named, resolution-scaled regions resolve to a `Rect` via
    /// [`crate::layout::UiLayout::region`].
    pub roi: Option<Rect>,
    pub mode: SearchMode,
    /// Match on luma instead of all three channels (faster, and more robust
    /// for monochrome glyphs).
    pub grayscale: bool,
    /// Binarize both frame and template to an HSV in-range mask before
    /// matching. Takes precedence over `grayscale`.
    pub color_band: Option<HsvRange>,
}

impl SearchParams {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            ..Default::default()
        }
    }

    pub fn roi(mut self, roi: Rect) -> Self {
        self.roi = Some(roi);
        self
    }

    pub fn mode(mut self, mode: SearchMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn grayscale(mut self) -> Self {
        self.grayscale = true;
        self
    }

    pub fn color_band(mut self, band: HsvRange) -> Self {
        self.color_band = Some(band);
        self
    }
}

/// Search for templates in a frame.
///
/// Templates are scored concurrently on a bounded worker pool. Matches are
/// merged and sorted by descending score; ties break on template
/// declaration order, which keeps results reproducible across runs.
pub fn search(store: &TemplateStore, names: &[&str], frame: Image, params: &SearchParams) -> SearchResult {
    let templates = store.resolve(names);
    if templates.is_empty() {
        return SearchResult::default();
    }

    let roi = params.roi.unwrap_or(Rect::new(0, 0, frame.width(), frame.height()));
    let cropped = frame.crop(roi);
    let frame_planes = Planes::of(cropped, params);

    let workers = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(templates.len());
    let chunk_len = templates.len().div_ceil(workers);

    let mut per_template: Vec<Vec<TemplateMatch>> = Vec::new();
    std::thread::scope(|scope| {
        let mut handles = Vec::new();
        for chunk in templates.chunks(chunk_len) {
            let frame_planes = &frame_planes;
            handles.push(scope.spawn(move || {
                chunk
                    .iter()
                    .map(|t| score_template(t, frame_planes, roi, params))
                    .collect::<Vec<_>>()
            }));
        }
        for handle in handles {
            per_template.extend(handle.join().expect("search worker panicked"));
        }
    });

    let mut indexed: Vec<(usize, TemplateMatch)> = per_template
        .into_iter()
        .enumerate()
        .flat_map(|(i, ms)| ms.into_iter().map(move |m| (i, m)))
        .collect();
    indexed.sort_by(|a, b| {
        b.1.score
            .partial_cmp(&a.1.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });

    let matches: Vec<TemplateMatch> = match params.mode {
        SearchMode::All => indexed.into_iter().map(|(_, m)| m).collect(),
        SearchMode::Best => indexed.into_iter().take(1).map(|(_, m)| m).collect(),
        SearchMode::First => indexed
            .into_iter()
            .min_by_key(|(i, _)| *i)
            .map(|(_, m)| m)
            .into_iter()
            .collect(),
    };

    SearchResult {
        success: !matches.is_empty(),
        matches,
    }
}

/// Retry the whole search against freshly supplied frames until it succeeds
/// or the deadline elapses. Runs at least once.
pub fn search_until(
    store: &TemplateStore,
    names: &[&str],
    mut next_frame: impl FnMut() -> OwnedImage,
    timeout: Duration,
    params: &SearchParams,
) -> SearchResult {
    let deadline = Instant::now() + timeout;
    loop {
        let frame = next_frame();
        let result = search(store, names, frame.as_image(), params);
        if result.success || Instant::now() >= deadline {
            return result;
        }
    }
}

// ----------

/// Per-channel f32 planes of an image, in the representation selected by the
/// search params (full RGB, luma, or HSV-band binarization).
struct Planes {
    width: u32,
    height: u32,
    data: Vec<Vec<f32>>,
}

impl Planes {
    fn of(image: Image, params: &SearchParams) -> Self {
        let (w, h) = (image.width(), image.height());
        let mut data: Vec<Vec<f32>>;

        if let Some(band) = &params.color_band {
            let mut plane = Vec::with_capacity((w * h) as usize);
            for y in 0..h {
                for x in 0..w {
                    plane.push(if band.contains(*image.pixel(x, y)) { 255.0 } else { 0.0 });
                }
            }
            data = vec![plane];
        } else if params.grayscale {
            let mut plane = Vec::with_capacity((w * h) as usize);
            for y in 0..h {
                for x in 0..w {
                    plane.push(image.pixel(x, y).luma() as f32);
                }
            }
            data = vec![plane];
        } else {
            data = vec![Vec::with_capacity((w * h) as usize); 3];
            for y in 0..h {
                for x in 0..w {
                    let c = image.pixel(x, y);
                    data[0].push(c.r as f32);
                    data[1].push(c.g as f32);
                    data[2].push(c.b as f32);
                }
            }
        }

        Self {
            width: w,
            height: h,
            data,
        }
    }
}

fn score_template(template: &Template, frame: &Planes, roi: Rect, params: &SearchParams) -> Vec<TemplateMatch> {
    let tpl = Planes::of(template.image.as_image(), params);
    if tpl.width > frame.width || tpl.height > frame.height || tpl.width == 0 || tpl.height == 0 {
        tracing::debug!(template = %template.name, "template larger than search region");
        return Vec::new();
    }

    let mut map = ncc_map(frame, &tpl, template.mask.as_ref());
    let mut matches = Vec::new();

    // `All` mode repeatedly takes the peak and blanks its region in the
    // local score map; each round removes at least the peak pixel, so the
    // loop is bounded by the map size.
    loop {
        let Some((x, y, score)) = map.peak() else { break };
        if score < params.threshold {
            break;
        }
        let region = Rect::new(roi.x + x, roi.y + y, tpl.width, tpl.height);
        matches.push(TemplateMatch {
            name: template.name.clone(),
            score,
            center: region.center(),
            region,
        });
        if params.mode != SearchMode::All {
            break;
        }
        map.blank(x, y, tpl.width, tpl.height);
    }

    matches
}

/// Dense normalized cross-correlation score map (one score per valid
/// template offset). Scores are in `-1.0..=1.0`; degenerate windows (zero
/// variance on either side) score 0, matching the convention of treating
/// NaN correlation as "no match".
struct ScoreMap {
    width: u32,
    height: u32,
    data: Vec<f32>,
}

impl ScoreMap {
    fn peak(&self) -> Option<(u32, u32, f32)> {
        let mut best: Option<(u32, u32, f32)> = None;
        for y in 0..self.height {
            for x in 0..self.width {
                let score = self.data[(x + y * self.width) as usize];
                if best.is_none_or(|(_, _, b)| score > b) {
                    best = Some((x, y, score));
                }
            }
        }
        best
    }

    /// Blank the half-template-padded neighborhood of a match so overlapping
    /// re-detections of the same icon are suppressed.
    fn blank(&mut self, x: u32, y: u32, tw: u32, th: u32) {
        let x1 = x.saturating_sub(tw / 2);
        let y1 = y.saturating_sub(th / 2);
        let x2 = (x + tw).min(self.width.saturating_sub(1));
        let y2 = (y + th).min(self.height.saturating_sub(1));
        for yy in y1..=y2 {
            for xx in x1..=x2 {
                self.data[(xx + yy * self.width) as usize] = f32::MIN;
            }
        }
    }
}

fn ncc_map(frame: &Planes, tpl: &Planes, mask: Option<&OwnedMask>) -> ScoreMap {
    let out_w = frame.width - tpl.width + 1;
    let out_h = frame.height - tpl.height + 1;

    // Masked sample positions within the template, shared across planes.
    let samples: Vec<(u32, u32)> = (0..tpl.height)
        .flat_map(|y| (0..tpl.width).map(move |x| (x, y)))
        .filter(|(x, y)| {
            mask.is_none_or(|m| m.as_mask().get((x + y * tpl.width) as usize))
        })
        .collect();
    let n = (samples.len() * tpl.data.len()) as f32;
    if n == 0.0 {
        return ScoreMap {
            width: out_w,
            height: out_h,
            data: vec![0.0; (out_w * out_h) as usize],
        };
    }

    // Template residuals are offset-independent; compute them once.
    let tpl_mean: f32 = tpl
        .data
        .iter()
        .map(|plane| {
            samples
                .iter()
                .map(|&(x, y)| plane[(x + y * tpl.width) as usize])
                .sum::<f32>()
        })
        .sum::<f32>()
        / n;
    let tpl_res: Vec<Vec<f32>> = tpl
        .data
        .iter()
        .map(|plane| {
            samples
                .iter()
                .map(|&(x, y)| plane[(x + y * tpl.width) as usize] - tpl_mean)
                .collect()
        })
        .collect();
    let tpl_norm: f32 = tpl_res.iter().flatten().map(|v| v * v).sum();

    let mut data = vec![0.0f32; (out_w * out_h) as usize];
    for oy in 0..out_h {
        for ox in 0..out_w {
            let mut sum = 0.0f32;
            for plane in &frame.data {
                for &(x, y) in &samples {
                    sum += plane[(ox + x + (oy + y) * frame.width) as usize];
                }
            }
            let mean = sum / n;

            let mut cov = 0.0f32;
            let mut frame_norm = 0.0f32;
            for (plane, res) in frame.data.iter().zip(&tpl_res) {
                for (&(x, y), &t) in samples.iter().zip(res) {
                    let f = plane[(ox + x + (oy + y) * frame.width) as usize] - mean;
                    cov += f * t;
                    frame_norm += f * f;
                }
            }

            let denom = (frame_norm * tpl_norm).sqrt();
            data[(ox + oy * out_w) as usize] = if denom > f32::EPSILON { cov / denom } else { 0.0 };
        }
    }

    ScoreMap {
        width: out_w,
        height: out_h,
        data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::{Color, OwnedImage};

    fn checker(size: u32) -> OwnedImage {
        let mut data = Vec::new();
        for y in 0..size {
            for x in 0..size {
                data.push(if (x + y) % 2 == 0 { Color::WHITE } else { Color::BLACK });
            }
        }
        OwnedImage::from_pixels(size, size, data)
    }

    fn frame_with_icons(w: u32, h: u32, icon: &OwnedImage, at: &[(u32, u32)]) -> OwnedImage {
        let mut data = vec![Color::new(40, 40, 40); (w * h) as usize];
        let view = icon.as_image();
        for &(ix, iy) in at {
            for y in 0..view.height() {
                for x in 0..view.width() {
                    data[((ix + x) + (iy + y) * w) as usize] = *view.pixel(x, y);
                }
            }
        }
        OwnedImage::from_pixels(w, h, data)
    }

    fn store_with(name: &str, icon: OwnedImage) -> TemplateStore {
        let mut store = TemplateStore::default();
        store.insert(name, icon, None);
        store
    }

    #[test]
    fn all_mode_finds_each_non_overlapping_icon() {
        let icon = checker(6);
        let frame = frame_with_icons(64, 64, &icon, &[(4, 4), (30, 10), (12, 40)]);
        let store = store_with("icon", icon);

        let params = SearchParams::new(0.9).mode(SearchMode::All).grayscale();
        let result = search(&store, &["icon"], frame.as_image(), &params);

        assert!(result.success);
        assert_eq!(result.matches.len(), 3);
        // Non-overlap: pairwise center distance exceeds the template size.
        for a in &result.matches {
            for b in &result.matches {
                if a.region != b.region {
                    let dx = a.center.0.abs_diff(b.center.0);
                    let dy = a.center.1.abs_diff(b.center.1);
                    assert!(dx.max(dy) >= 6);
                }
            }
        }
    }

    #[test]
    fn first_mode_prefers_declaration_order_on_tie() {
        let icon = checker(6);
        let frame = frame_with_icons(32, 32, &icon, &[(8, 8)]);
        let mut store = TemplateStore::default();
        store.insert("second", icon.clone(), None);
        store.insert("prime", icon, None);

        let params = SearchParams::new(0.9).grayscale();
        // Both templates are identical, so both score 1.0; the declared
        // order (not the store's alphabetical order) must win.
        let result = search(&store, &["prime", "second"], frame.as_image(), &params);
        assert!(result.success);
        assert_eq!(result.matches.len(), 1);
        assert_eq!(result.matches[0].name, "PRIME");
    }

    #[test]
    fn miss_returns_empty_result() {
        let store = store_with("icon", checker(6));
        let frame = OwnedImage::from_pixels(32, 32, vec![Color::new(40, 40, 40); 1024]);

        let result = search(&store, &["icon"], frame.as_image(), &SearchParams::new(0.9).grayscale());
        assert!(!result.success);
        assert!(result.matches.is_empty());

        // Unknown template names degrade the same way.
        let result = search(&store, &["missing"], frame.as_image(), &SearchParams::new(0.9));
        assert!(!result.success);
    }

    #[test]
    fn roi_offsets_match_coordinates_back_to_frame_space() {
        let icon = checker(6);
        let frame = frame_with_icons(64, 64, &icon, &[(40, 40)]);
        let store = store_with("icon", icon);

        let params = SearchParams::new(0.9)
            .roi(Rect::new(32, 32, 32, 32))
            .grayscale();
        let result = search(&store, &["icon"], frame.as_image(), &params);
        assert!(result.success);
        assert_eq!(result.matches[0].region.x, 40);
        assert_eq!(result.matches[0].region.y, 40);
    }

    #[test]
    fn search_until_retries_with_fresh_frames() {
        let icon = checker(6);
        let hit = frame_with_icons(32, 32, &icon, &[(8, 8)]);
        let miss = OwnedImage::from_pixels(32, 32, vec![Color::new(40, 40, 40); 1024]);
        let store = store_with("icon", icon);

        let mut calls = 0;
        let result = search_until(
            &store,
            &["icon"],
            || {
                calls += 1;
                if calls < 3 { miss.clone() } else { hit.clone() }
            },
            Duration::from_secs(5),
            &SearchParams::new(0.9).grayscale(),
        );
        assert!(result.success);
        assert_eq!(calls, 3);
    }
}
