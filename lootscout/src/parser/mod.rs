//! Item description parsing.
//!
//! Drives the region locator, OCR and fuzzy matcher through a fixed state
//! sequence: separator, header classification, bullet location, affix
//! extraction and (for aspect rarities) aspect extraction. Early terminal
//! states keep the cheap items cheap: materials and Common/Magic non-sigil
//! gear never reach the bullet stages.

mod affixes;
mod aspect;
mod header;
mod texture;

use vision::{Image, TemplateMatch};

use crate::context::ParseContext;
use crate::item::{Item, ItemRarity, ItemType};

/// Where in the state sequence a parse attempt stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStage {
	Separator,
	Header,
	Affixes,
	Aspect,
}

impl std::fmt::Display for ParseStage {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let name = match self {
			Self::Separator => "separator",
			Self::Header => "header",
			Self::Affixes => "affixes",
			Self::Aspect => "aspect",
		};
		f.write_str(name)
	}
}

/// A failed parse attempt. Never fatal to the caller: retryable misses are
/// worth re-running against a fresh frame, the rest mean this panel will not
/// parse no matter how many frames are captured.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseMiss {
	pub stage: ParseStage,
	pub diagnostic: String,
}

impl ParseMiss {
	/// Whether a new frame could plausibly fix the miss. A missing
	/// separator or an unknown affix paragraph will not get better with
	/// another capture of the same panel.
	pub fn retryable(&self) -> bool {
		!matches!(self.stage, ParseStage::Separator | ParseStage::Header | ParseStage::Affixes)
	}
}

impl std::fmt::Display for ParseMiss {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "parse miss at {}: {}", self.stage, self.diagnostic)
	}
}

impl std::error::Error for ParseMiss {}

/// Parse one item description panel.
///
/// `rarity_hint` is the frame-level guess from panel border detection; the
/// header text overrides it whenever a rarity token is readable.
pub fn parse(ctx: &ParseContext, panel: Image, rarity_hint: Option<ItemRarity>) -> Result<Item, ParseMiss> {
	let mut item = Item::new(rarity_hint.unwrap_or(ItemRarity::Common));

	let Some(separator) = texture::find_separator(ctx, panel) else {
		return Err(miss(panel, ParseStage::Separator, "no short separator in the top band"));
	};

	if let Err(diagnostic) = header::classify(ctx, panel, separator.region.y, &mut item, false)
		&& let Err(diagnostic2) = header::classify(ctx, panel, separator.region.y, &mut item, true)
	{
		tracing::warn!(first = %diagnostic, "header classification failed");
		return Err(miss(panel, ParseStage::Header, &diagnostic2));
	}

	if matches!(
		item.item_type,
		Some(ItemType::Material | ItemType::TemperManual | ItemType::Elixir | ItemType::Incense)
	) {
		return Ok(item);
	}
	if matches!(item.rarity, ItemRarity::Common | ItemRarity::Magic) && !item.is_sigil() {
		return Ok(item);
	}

	let sep_y = separator.center.1;
	let bullets = texture::find_affix_bullets(ctx, panel, sep_y);
	let sockets = texture::find_empty_sockets(ctx, panel, sep_y);
	let aspect_bullet = if item.rarity.has_aspect() {
		texture::find_aspect_bullet(ctx, panel, sep_y)
	} else {
		None
	};

	let inherent_count = item.item_type.map_or(0, |t| t.inherent_bullet_count()).min(bullets.len());
	let (inherent_bullets, rolled_bullets) = bullets.split_at(inherent_count);

	let line_height = ctx.layout.line_height();
	let rolled_bottom = bottom_limit(panel, aspect_bullet.as_ref(), &sockets, rolled_bullets, line_height);
	let inherent_bottom = rolled_bullets
		.first()
		.map_or(rolled_bottom, |b| b.center.1.saturating_sub(line_height / 2));

	item.inherent = extract_pool(ctx, panel, inherent_bullets, inherent_bottom, item.is_sigil(), true)
		.map_err(|d| miss(panel, ParseStage::Affixes, &d))?;
	item.affixes = extract_pool(ctx, panel, rolled_bullets, rolled_bottom, item.is_sigil(), false)
		.map_err(|d| miss(panel, ParseStage::Affixes, &d))?;

	if item.rarity.has_aspect() {
		let Some(bullet) = aspect_bullet.as_ref() else {
			return Err(miss(panel, ParseStage::Aspect, "no aspect bullet"));
		};
		let found = aspect::find_aspect(ctx, panel, bullet, &item, true)
			.or_else(|_| aspect::find_aspect(ctx, panel, bullet, &item, false));
		item.aspect = Some(found.map_err(|d| miss(panel, ParseStage::Aspect, &d))?);
	}

	item.codex_upgrade = texture::find_codex_upgrade_icon(ctx, panel, aspect_bullet.as_ref());

	Ok(item)
}

/// Bottom edge for the rolled affix crop: the aspect bullet, the first empty
/// socket below the pool, or the panel edge.
fn bottom_limit(
	panel: Image,
	aspect_bullet: Option<&TemplateMatch>,
	sockets: &[TemplateMatch],
	rolled_bullets: &[TemplateMatch],
	line_height: u32,
) -> u32 {
	if let Some(bullet) = aspect_bullet {
		return bullet.center.1.saturating_sub(line_height / 2);
	}
	let pool_top = rolled_bullets.first().map_or(0, |b| b.center.1);
	if let Some(socket) = sockets.iter().find(|s| s.center.1 > pool_top) {
		return socket.center.1.saturating_sub(line_height / 2);
	}
	panel.height()
}

fn extract_pool(
	ctx: &ParseContext,
	panel: Image,
	bullets: &[TemplateMatch],
	bottom: u32,
	is_sigil: bool,
	is_inherent: bool,
) -> Result<Vec<crate::item::Affix>, String> {
	affixes::find_affixes(ctx, panel, bullets, bottom, is_sigil, is_inherent, true)
		.or_else(|_| affixes::find_affixes(ctx, panel, bullets, bottom, is_sigil, is_inherent, false))
}

fn miss(panel: Image, stage: ParseStage, diagnostic: &str) -> ParseMiss {
	tracing::debug!(%stage, diagnostic, "parse miss");
	// Optional debug snapshots, same switch as the OCR crops.
	if std::env::var("LOOTSCOUT_WRITE_IMAGE").as_deref() == Ok("1") {
		let _ = panel.save_png(format!("./debug_parse_{stage}.png"));
	}
	ParseMiss {
		stage,
		diagnostic: diagnostic.to_string(),
	}
}

#[cfg(test)]
mod tests {
	use std::collections::VecDeque;
	use std::sync::Mutex;

	use vision::{Color, OcrResult, OwnedImage, Rect, TemplateStore, TextLine, TextRecognizer, UiLayout};
	use vocab::Vocabulary;

	use super::*;

	/// Pops one scripted result per OCR call, in parse order.
	struct ScriptedOcr(Mutex<VecDeque<OcrResult>>);

	impl ScriptedOcr {
		fn new(results: Vec<OcrResult>) -> Self {
			Self(Mutex::new(results.into()))
		}
	}

	impl TextRecognizer for ScriptedOcr {
		fn recognize(&self, _image: Image) -> OcrResult {
			self.0.lock().expect("ocr script").pop_front().unwrap_or_default()
		}

		fn recognize_lines(&self, image: Image) -> OcrResult {
			self.recognize(image)
		}
	}

	fn checker(width: u32, height: u32) -> OwnedImage {
		let pixels = (0..width * height)
			.map(|i| {
				let (x, y) = (i % width, i / width);
				if (x + y) % 2 == 0 { Color::WHITE } else { Color::BLACK }
			})
			.collect();
		OwnedImage::from_pixels(width, height, pixels)
	}

	fn stripes(width: u32, height: u32) -> OwnedImage {
		let pixels = (0..width * height)
			.map(|i| if (i / width) % 2 == 0 { Color::WHITE } else { Color::BLACK })
			.collect();
		OwnedImage::from_pixels(width, height, pixels)
	}

	fn paint(panel: &mut [Color], panel_w: u32, stamp: &OwnedImage, x0: u32, y0: u32) {
		let view = stamp.as_image();
		for y in 0..view.height() {
			for x in 0..view.width() {
				panel[((y0 + y) * panel_w + x0 + x) as usize] = *view.pixel(x, y);
			}
		}
	}

	fn line_result(lines: &[(&str, u32)]) -> OcrResult {
		let lines: Vec<TextLine> = lines
			.iter()
			.map(|(text, y)| TextLine {
				text: text.to_string(),
				rect: Rect::new(0, *y, 150, 20),
			})
			.collect();
		OcrResult {
			text: lines.iter().map(|l| l.text.clone()).collect::<Vec<_>>().join("\n"),
			word_confidences: Vec::new(),
			mean_confidence: 1.0,
			lines,
		}
	}

	fn test_vocab() -> Vocabulary {
		let mut vocab = Vocabulary::default();
		vocab.affixes.insert("movement_speed".into(), "movement speed".into());
		vocab.affixes.insert("maximum_life".into(), "maximum life".into());
		vocab.item_types.insert("Boots".into(), "boots".into());
		vocab.aspects.insert("ghostwalker".into(), "ghostwalker for seconds gain movement speed".into());
		vocab
	}

	fn test_store() -> TemplateStore {
		let mut store = TemplateStore::default();
		store.insert("SEPARATOR_SHORT_RARE", checker(16, 4), None);
		store.insert("AFFIX_BULLET", checker(8, 8), None);
		store.insert("ASPECT_BULLET", stripes(8, 8), None);
		store
	}

	fn test_panel() -> OwnedImage {
		let (w, h) = (400u32, 400u32);
		let mut pixels = vec![Color::BLACK; (w * h) as usize];
		let store_sep = checker(16, 4);
		let bullet = checker(8, 8);
		let aspect = stripes(8, 8);
		paint(&mut pixels, w, &store_sep, 4, 30);
		paint(&mut pixels, w, &bullet, 8, 80);
		paint(&mut pixels, w, &bullet, 8, 110);
		paint(&mut pixels, w, &aspect, 8, 160);
		OwnedImage::from_pixels(w, h, pixels)
	}

	#[test]
	fn magic_non_sigil_terminates_without_affixes() {
		let store = test_store();
		let vocab = test_vocab();
		let ocr = ScriptedOcr::new(vec![OcrResult::from_text("magic boots")]);
		let ctx = ParseContext::new(&store, &vocab, &ocr, UiLayout::for_height(1080));
		let panel = test_panel();

		let item = parse(&ctx, panel.as_image(), None).expect("magic items parse");
		assert_eq!(item.rarity, ItemRarity::Magic);
		assert!(item.affixes.is_empty());
		assert!(item.inherent.is_empty());
		assert!(item.aspect.is_none());
	}

	#[test]
	fn missing_separator_is_a_hard_miss() {
		let store = test_store();
		let vocab = test_vocab();
		let ocr = ScriptedOcr::new(Vec::new());
		let ctx = ParseContext::new(&store, &vocab, &ocr, UiLayout::for_height(1080));
		let blank = OwnedImage::from_pixels(400, 400, vec![Color::BLACK; 160_000]);

		let err = parse(&ctx, blank.as_image(), None).expect_err("blank frame cannot parse");
		assert_eq!(err.stage, ParseStage::Separator);
		assert!(!err.retryable());
	}

	#[test]
	fn legendary_boots_parse_end_to_end() {
		let store = test_store();
		let vocab = test_vocab();
		// Parse order: header, inherent pool, rolled pool, aspect.
		let ocr = ScriptedOcr::new(vec![
			OcrResult::from_text("ancestral legendary boots 725 item power"),
			line_result(&[("+4% movement speed", 5)]),
			line_result(&[("+12.5% maximum life", 5)]),
			OcrResult::from_text("ghostwalker for 3 seconds gain 25 movement speed"),
		]);
		let ctx = ParseContext::new(&store, &vocab, &ocr, UiLayout::for_height(1080));
		let panel = test_panel();

		let item = parse(&ctx, panel.as_image(), Some(ItemRarity::Legendary)).expect("full parse");
		assert_eq!(item.rarity, ItemRarity::Legendary);
		assert_eq!(item.item_type, Some(ItemType::Boots));
		assert_eq!(item.power, Some(725));

		assert_eq!(item.inherent.len(), 1);
		assert_eq!(item.inherent[0].name, "movement_speed");
		assert_eq!(item.inherent[0].value, Some(4.0));
		assert_eq!(item.inherent[0].kind, crate::item::AffixType::Inherent);

		assert_eq!(item.affixes.len(), 1);
		assert_eq!(item.affixes[0].name, "maximum_life");
		assert_eq!(item.affixes[0].value, Some(12.5));

		let aspect = item.aspect.expect("legendary aspect");
		assert_eq!(aspect.name, "ghostwalker");
		// Second numeral carries the roll for this aspect key.
		assert_eq!(aspect.value, Some(25.0));
	}
}
