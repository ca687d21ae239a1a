//! Aspect extraction for legendary and unique items.

use vision::{Image, PreProcess, Rect, TemplateMatch, pre_process};
use vocab::{DEFAULT_MIN_SCORE, aspect_number_index, clean_str, closest_match, find_number};

use crate::context::{ParseContext, UNIQUE_GOLD};
use crate::item::{Aspect, Item, ItemRarity};

/// Unique descriptions are fuzzy-matched on this prefix; the tail is flavor.
const ASPECT_MATCH_PREFIX: usize = 45;

/// This aspect's percent sign is routinely glued to the value ("19%"
/// reading as 199).
const MISREAD_KEY: &str = "of_inner_calm";

/// Read the aspect paragraph next to the aspect bullet.
///
/// Returns the cleaned text as the diagnostic when no vocabulary entry gets
/// close enough.
pub fn find_aspect(ctx: &ParseContext, panel: Image, bullet: &TemplateMatch, item: &Item, preprocess: bool) -> Result<Aspect, String> {
	let crop = aspect_crop(ctx, panel, bullet);

	let result = if preprocess {
		let processed = pre_process(crop, &PreProcess::default());
		ctx.ocr.recognize(processed.as_image())
	} else {
		ctx.ocr.recognize(crop)
	};
	let text = result.text.to_lowercase().replace('\n', " ");

	let mut cleaned = clean_str(&text, &ctx.vocab.filter_after_keywords, &ctx.vocab.filter_words);
	cleaned.truncate(cleaned.char_indices().nth(ASPECT_MATCH_PREFIX).map_or(cleaned.len(), |(i, _)| i));

	let dictionary = if item.rarity == ItemRarity::Legendary {
		&ctx.vocab.aspects
	} else {
		&ctx.vocab.unique_aspects
	};
	let Some(key) = closest_match(&cleaned, dictionary, DEFAULT_MIN_SCORE) else {
		return Err(cleaned);
	};

	let mut value = find_number(&text, aspect_number_index(key), &ctx.vocab.filter_after_keywords);
	if key == MISREAD_KEY && value == Some(199.0) {
		value = Some(19.0);
	}
	if let (Some(v), Some(item_type)) = (value, item.item_type) {
		let divisor = item_type.aspect_value_divisor();
		if divisor != 1.0 {
			value = Some(v / divisor);
		}
	}

	tracing::debug!(key, ?value, "aspect");
	Ok(Aspect {
		name: key.to_string(),
		value,
		text,
		loc: Some((bullet.center.0, bullet.center.1.saturating_sub(2))),
	})
}

/// Crop to the right of the aspect bullet, trimmed at the bottom to the
/// lowest gold-toned pixel so following panel chrome stays out of the OCR.
fn aspect_crop<'a>(ctx: &ParseContext, panel: Image<'a>, bullet: &TemplateMatch) -> Image<'a> {
	let line_height = ctx.layout.line_height();
	let x = bullet.center.0 + line_height / 5;
	let top = bullet.center.1.saturating_sub((line_height as f32 * 0.8) as u32);
	let width = ((panel.width() as f32 * 0.99) as u32).saturating_sub(x);
	let mut height = ((panel.height() as f32 * 0.95) as u32).saturating_sub(top);

	let crop = panel.crop(Rect::new(x, top, width, height));
	let gold = crop.band_mask(&UNIQUE_GOLD);
	let lowest_gold = gold
		.enumerate_pixels()
		.filter(|(_, _, p)| p.0[0] > 0)
		.map(|(_, y, _)| y)
		.max();
	if let Some(lowest) = lowest_gold {
		height = lowest + (line_height as f32 * 0.4) as u32;
	}
	panel.crop(Rect::new(x, top, width, height))
}

#[cfg(test)]
mod tests {
	use super::*;
	use vision::{Color, OcrResult, OwnedImage, TemplateStore, TextRecognizer, UiLayout};
	use vocab::Vocabulary;

	use crate::item::ItemType;

	struct ScriptedOcr(String);

	impl TextRecognizer for ScriptedOcr {
		fn recognize(&self, _image: Image) -> OcrResult {
			OcrResult::from_text(self.0.clone())
		}

		fn recognize_lines(&self, image: Image) -> OcrResult {
			self.recognize(image)
		}
	}

	fn read(text: &str, desc: &str, item_type: ItemType) -> Aspect {
		let templates = TemplateStore::default();
		let mut vocab = Vocabulary::default();
		vocab.aspects.insert("of_inner_calm".into(), desc.into());
		let ocr = ScriptedOcr(text.to_string());
		let ctx = ParseContext::new(&templates, &vocab, &ocr, UiLayout::for_height(1080));

		let panel = OwnedImage::from_pixels(400, 400, vec![Color::BLACK; 160_000]);
		let bullet = TemplateMatch {
			name: "ASPECT_BULLET".into(),
			score: 0.9,
			center: (12, 200),
			region: Rect::new(7, 195, 10, 10),
		};
		let mut item = Item::new(ItemRarity::Legendary);
		item.item_type = Some(item_type);
		find_aspect(&ctx, panel.as_image(), &bullet, &item, false).expect("aspect should resolve")
	}

	const DESC: &str = "aspect of inner calm deal increased damage";

	#[test]
	fn misread_199_reads_as_19() {
		let aspect = read("aspect of inner calm deal 199 increased damage", DESC, ItemType::Ring);
		assert_eq!(aspect.name, "of_inner_calm");
		assert_eq!(aspect.value, Some(19.0));
	}

	#[test]
	fn amulet_values_rescale() {
		let aspect = read("aspect of inner calm deal 45 increased damage", DESC, ItemType::Amulet);
		assert_eq!(aspect.value, Some(30.0));
	}
}
