//! Affix extraction: crop the bullet column text, regroup OCR lines into
//! per-bullet paragraphs and resolve each paragraph to a canonical affix.

use std::sync::LazyLock;

use regex::Regex;
use vision::{Image, PreProcess, TemplateMatch, pre_process};
use vocab::{DEFAULT_MIN_SCORE, Dictionary, OcrText, clean_str, closest_match, find_number, remove_text_after_first_keyword};

use crate::context::ParseContext;
use crate::item::{Affix, AffixType};
use crate::parser::texture::bullet_affix_type;

static ROLL_RANGE_REGEX: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"\[(\d+(?:\.\d+)?) *- *(\d+(?:\.\d+)?)\]").expect("roll range pattern"));

/// Extract one affix per bullet between the first bullet and `bottom_limit`.
///
/// Returns a diagnostic string when a paragraph cannot be resolved against
/// the vocabulary; that aborts extraction for the whole item, since a partial
/// affix list would silently weaken every downstream filter decision.
pub fn find_affixes(
	ctx: &ParseContext,
	panel: Image,
	bullets: &[TemplateMatch],
	bottom_limit: u32,
	is_sigil: bool,
	is_inherent: bool,
	preprocess: bool,
) -> Result<Vec<Affix>, String> {
	if bullets.is_empty() {
		return Ok(Vec::new());
	}

	let line_height = ctx.layout.line_height();
	let x0 = bullets[0].center.0 + (line_height as f32 * 0.3) as u32;
	let y0 = bullets[0].center.1.saturating_sub((line_height as f32 * 0.6) as u32);
	let height = bottom_limit
		.saturating_sub(y0)
		.saturating_sub((line_height as f32 * 0.75) as u32);
	if x0 >= panel.width() || height == 0 {
		return Err("affix crop is empty".to_string());
	}
	let crop = panel.sub_image(x0, y0, panel.width() - x0, height);

	let result = if is_sigil || !preprocess {
		ctx.ocr.recognize_lines(crop)
	} else {
		let processed = pre_process(crop, &PreProcess::default());
		ctx.ocr.recognize_lines(processed.as_image())
	};

	let lines: Vec<(String, vision::Rect)> = result
		.lines
		.into_iter()
		.map(|line| (line.text.to_lowercase(), line.rect))
		.filter(|(text, _)| !text.trim().is_empty())
		.collect();
	let lines = collapse_duplicate_rows(lines);

	let mut paragraphs = group_paragraphs(&lines, bullets, y0, line_height / 2);
	if is_sigil && is_inherent {
		// The inherent sigil block also lists revive rules and monster level;
		// only the first paragraph is the location affix.
		paragraphs.truncate(1);
	}

	let sigil_keys: Dictionary = if is_sigil {
		// With advanced tooltips off sigils show only the bare key.
		ctx.vocab.sigil_affixes.keys().map(|k| (k.clone(), k.clone())).collect()
	} else {
		Dictionary::new()
	};

	let corrector = ctx.vocab.corrector(&ctx.word_list);
	let mut affixes = Vec::new();
	for (i, paragraph) in paragraphs.iter().enumerate() {
		let corrected = corrector.process(OcrText::from_text(paragraph.as_str())).text;
		let mut cleaned = clean_str(&corrected, &ctx.vocab.filter_after_keywords, &ctx.vocab.filter_words);
		if is_sigil && is_inherent {
			// Location affixes read "<dungeon> in <region>".
			cleaned = remove_text_after_first_keyword(&cleaned, &[" in ".to_string()]).to_string();
		}

		let found_key = if is_sigil {
			closest_match(&cleaned, &ctx.vocab.sigil_affixes, DEFAULT_MIN_SCORE)
				.or_else(|| closest_match(&cleaned, &sigil_keys, DEFAULT_MIN_SCORE))
		} else {
			closest_match(&cleaned, &ctx.vocab.affixes, DEFAULT_MIN_SCORE)
		};
		let Some(found_key) = found_key else {
			return Err(format!("no affix for [cleaned] {cleaned} [raw] {corrected}"));
		};

		let (min_value, max_value) = roll_range(&corrected);
		affixes.push(Affix {
			name: found_key.to_string(),
			value: find_number(&corrected, 0, &ctx.vocab.filter_after_keywords),
			min_value,
			max_value,
			kind: if is_inherent {
				AffixType::Inherent
			} else {
				bullets.get(i).map_or(AffixType::Normal, |b| bullet_affix_type(&b.name))
			},
			text: corrected,
			loc: bullets.get(i).map(|b| (bullets[0].center.0, b.center.1.saturating_sub(2))),
		});
	}

	Ok(affixes)
}

/// OCR sometimes reports the same visual row twice; keep the leftmost box
/// among lines whose y differs by at most 2 pixels.
fn collapse_duplicate_rows(lines: Vec<(String, vision::Rect)>) -> Vec<(String, vision::Rect)> {
	let mut kept: Vec<(String, vision::Rect)> = Vec::new();
	for (text, rect) in lines {
		match kept.last_mut() {
			Some((kept_text, kept_rect)) if (kept_rect.y as i64 - rect.y as i64).abs() <= 2 => {
				if rect.x < kept_rect.x {
					*kept_text = text;
					*kept_rect = rect;
				}
			}
			_ => kept.push((text, rect)),
		}
	}
	kept
}

/// A line whose center sits within `threshold` of a bullet center starts a
/// new paragraph; other lines continue the current one.
fn group_paragraphs(
	lines: &[(String, vision::Rect)],
	bullets: &[TemplateMatch],
	crop_top: u32,
	threshold: u32,
) -> Vec<String> {
	let mut paragraphs = Vec::new();
	let mut current = String::new();

	for (text, rect) in lines {
		let line_y = (rect.y + rect.h / 2) as i64;
		let starts_paragraph = bullets.iter().any(|bullet| {
			let bullet_y = bullet.center.1 as i64 - crop_top as i64;
			(line_y - bullet_y).abs() < threshold as i64
		});
		if starts_paragraph {
			if !current.is_empty() {
				paragraphs.push(current.clone());
			}
			current = text.clone();
		} else if current.is_empty() {
			current = text.clone();
		} else {
			current.push(' ');
			current.push_str(text);
		}
	}
	// OCR occasionally emits stray fragments like "% :" on their own row.
	if current.len() > 3 {
		paragraphs.push(current.trim().to_string());
	}

	paragraphs
}

/// Advanced tooltips show the roll window as "[min - max]".
fn roll_range(text: &str) -> (Option<f64>, Option<f64>) {
	match ROLL_RANGE_REGEX.captures(text) {
		Some(captures) => (
			captures.get(1).and_then(|m| m.as_str().parse().ok()),
			captures.get(2).and_then(|m| m.as_str().parse().ok()),
		),
		None => (None, None),
	}
}
