//! Header classification: rarity, item type, power or sigil tier, and the
//! material/consumable terminal states.

use vision::{Image, PanelRegion, PreProcess, pre_process};

use crate::context::{MATERIAL_BLUE, ParseContext, UNUSABLE_RED};
use crate::item::{Item, ItemRarity, ItemType};

const CONSUMABLE_KEYWORDS: &[&str] = &[
	"consumable",
	"grand cache",
	"reputation cache",
	"treasure goblin cache",
	"whispering key",
];

/// Mask mean above which the header crop is dominated by the material tint.
const MATERIAL_MEAN_THRESHOLD: f32 = 2.0;

/// Read the header region above the separator and classify the item.
///
/// A rarity token in the text overrides any externally supplied guess; the
/// in-panel text is more reliable than frame-level detection. Returns the
/// header text as the diagnostic when power or type cannot be read.
pub fn classify(ctx: &ParseContext, panel: Image, sep_top: u32, item: &mut Item, preprocess: bool) -> Result<(), String> {
	let roi = ctx.layout.region(PanelRegion::Header(sep_top), panel);
	let crop = panel.crop(roi);

	let mut text = header_text(ctx, crop, preprocess, None);

	if let Some(rarity) = find_rarity(&text) {
		item.rarity = rarity;
	}

	let tier_marker = ctx.vocab.tooltips.item_tier.as_str();
	if text.contains("sigil") && text.contains(tier_marker) {
		item.item_type = Some(ItemType::Sigil);
	} else if CONSUMABLE_KEYWORDS.iter().any(|k| text.contains(k)) {
		item.item_type = Some(ItemType::Material);
		return Ok(());
	} else if matches!(item.rarity, ItemRarity::Common | ItemRarity::Legendary) && !text.contains("elixir") {
		// Material headers carry a dominant tint no gear header has.
		if crop.band_mean(&MATERIAL_BLUE) > MATERIAL_MEAN_THRESHOLD {
			item.item_type = Some(ItemType::Material);
			return Ok(());
		}
		if item.rarity == ItemRarity::Common {
			return Ok(());
		}
	}

	if item.item_type == Some(ItemType::Sigil) {
		item.power = find_sigil_tier(&text, tier_marker);
	} else {
		find_power_and_type(ctx, &text, item);
		if item.item_type.is_none() {
			// Unusable items overlay the header in red; paint it out and retry.
			text = header_text(ctx, crop, true, Some(UNUSABLE_RED));
			find_power_and_type(ctx, &text, item);
		}
	}

	let non_magic_or_sigil = item.rarity != ItemRarity::Magic || item.is_sigil();
	let power_allowed_missing = matches!(item.item_type, Some(ItemType::Elixir | ItemType::TemperManual));
	let power_or_type_bad = (item.power.is_none() && !power_allowed_missing) || item.item_type.is_none();
	if non_magic_or_sigil && power_or_type_bad {
		return Err(text);
	}

	Ok(())
}

fn header_text(ctx: &ParseContext, crop: Image, preprocess: bool, blocked: Option<vision::HsvRange>) -> String {
	let result = if preprocess || blocked.is_some() {
		let opts = PreProcess {
			blocked_band: blocked,
			..Default::default()
		};
		let processed = pre_process(crop, &opts);
		ctx.ocr.recognize(processed.as_image())
	} else {
		ctx.ocr.recognize(crop)
	};
	let text = result.text.to_lowercase().replace('\n', " ");
	ctx.vocab.apply_error_phrases(&text)
}

fn find_rarity(text: &str) -> Option<ItemRarity> {
	ItemRarity::ALL.iter().copied().find(|r| text.contains(r.marker()))
}

/// Tier is the word right after the tier marker ("tier 60").
fn find_sigil_tier(text: &str, tier_marker: &str) -> Option<u32> {
	let idx = text.find(tier_marker)?;
	let mut words = text[idx..].split_whitespace();
	words.next();
	words.next()?.parse().ok()
}

fn find_power_and_type(ctx: &ParseContext, text: &str, item: &mut Item) {
	if let Some(idx) = text.find(ctx.vocab.tooltips.item_power.as_str()) {
		if let Some(preceding) = text[..idx].split_whitespace().next_back() {
			item.power = parse_power(preceding);
		}
	}

	// Type names can contain one another ("sword" inside "two-handed sword"),
	// so keep the candidate whose occurrence ends last, preferring the longer
	// name on equal endings.
	let mut last_end = 0usize;
	let mut best_len = 0usize;
	for (key, type_name) in &ctx.vocab.item_types {
		let Some(found) = text.rfind(type_name.as_str()) else {
			continue;
		};
		let end = found + type_name.len();
		if end >= last_end && (end > last_end || type_name.len() > best_len) {
			if let Some(item_type) = ItemType::from_key(key) {
				item.item_type = Some(item_type);
				last_end = end;
				best_len = type_name.len();
			}
		}
	}

	// "Armor" often wraps onto its own line and the joined text misses the
	// full type name.
	if item.item_type.is_none() && (text.contains("chest") || text.contains("armor")) {
		item.item_type = Some(ItemType::ChestArmor);
	}

	let two_handed_marker = ["two -handed", "two handed", "two- handed", "two-handed"]
		.iter()
		.any(|m| text.contains(m));
	if two_handed_marker {
		if let Some(upgraded) = item.item_type.and_then(|t| t.two_handed()) {
			item.item_type = Some(upgraded);
		}
	}
}

/// "725" or a misread "700+25" composition.
fn parse_power(word: &str) -> Option<u32> {
	if let Ok(power) = word.parse() {
		return Some(power);
	}
	let (a, b) = word.split_once('+')?;
	Some(a.parse::<u32>().ok()? + b.parse::<u32>().ok()?)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn sigil_tier_follows_marker() {
		assert_eq!(find_sigil_tier("nightmare sigil tier 61 west", "tier"), Some(61));
		assert_eq!(find_sigil_tier("nightmare sigil", "tier"), None);
	}

	#[test]
	fn power_parses_plain_and_composed() {
		assert_eq!(parse_power("725"), Some(725));
		assert_eq!(parse_power("700+25"), Some(725));
		assert_eq!(parse_power("7oo"), None);
	}

	#[test]
	fn rarity_from_header_substring() {
		assert_eq!(find_rarity("ancestral legendary sword"), Some(ItemRarity::Legendary));
		assert_eq!(find_rarity("a mysterious thing"), None);
	}
}
