//! Reference-graphic lookups inside the description panel: separators,
//! affix bullets, sockets, the aspect bullet and the codex upgrade icon.

use vision::{Image, PanelRegion, SearchMode, SearchParams, TemplateMatch, search};

use crate::context::ParseContext;
use crate::item::AffixType;

const SEPARATOR_TEMPLATES: &[&str] = &["SEPARATOR_SHORT_RARE", "SEPARATOR_SHORT_LEGENDARY"];
const AFFIX_BULLET_TEMPLATES: &[&str] = &[
	"AFFIX_BULLET_MEDIUM",
	"GREATER_AFFIX_BULLET_MEDIUM",
	"REROLLED_BULLET_MEDIUM",
	"TEMPERED_AFFIX_BULLET_MEDIUM",
	"AFFIX_BULLET",
	"GREATER_AFFIX_BULLET",
	"REROLLED_BULLET",
	"TEMPERED_AFFIX_BULLET",
];
const EMPTY_SOCKET_TEMPLATES: &[&str] = &["EMPTY_SOCKET_MEDIUM", "EMPTY_SOCKET"];
const ASPECT_BULLET_TEMPLATES: &[&str] = &[
	"ASPECT_BULLET_MEDIUM",
	"UNIQUE_BULLET_MEDIUM",
	"ASPECT_BULLET",
	"UNIQUE_BULLET",
];

/// Affix type encoded by the bullet graphic that anchors the line.
pub fn bullet_affix_type(template_name: &str) -> AffixType {
	if template_name.contains("GREATER") {
		AffixType::Greater
	} else if template_name.contains("REROLLED") {
		AffixType::Rerolled
	} else if template_name.contains("TEMPERED") {
		AffixType::Tempered
	} else {
		AffixType::Normal
	}
}

/// Locate the short divider under the header. Its y position anchors all
/// later crop math; without it the panel cannot be parsed at all.
pub fn find_separator(ctx: &ParseContext, panel: Image) -> Option<TemplateMatch> {
	let roi = ctx.layout.region(PanelRegion::SeparatorTop, panel);
	let params = SearchParams::new(0.62).roi(roi).grayscale().mode(SearchMode::All);
	let result = search(ctx.templates, SEPARATOR_TEMPLATES, panel, &params);
	result
		.matches
		.into_iter()
		.min_by_key(|m| m.center.1)
}

/// All affix bullets below the separator, top to bottom.
pub fn find_affix_bullets(ctx: &ParseContext, panel: Image, sep_y: u32) -> Vec<TemplateMatch> {
	find_bullets(ctx, panel, sep_y, AFFIX_BULLET_TEMPLATES, 0.8)
}

/// Empty gem sockets below the separator, top to bottom.
pub fn find_empty_sockets(ctx: &ParseContext, panel: Image, sep_y: u32) -> Vec<TemplateMatch> {
	find_bullets(ctx, panel, sep_y, EMPTY_SOCKET_TEMPLATES, 0.8)
}

/// The single aspect bullet, when the rarity carries one.
pub fn find_aspect_bullet(ctx: &ParseContext, panel: Image, sep_y: u32) -> Option<TemplateMatch> {
	find_bullets(ctx, panel, sep_y, ASPECT_BULLET_TEMPLATES, 0.8)
		.into_iter()
		.next()
}

/// Whether the codex upgrade arrow shows in the lower-left quadrant (or
/// below the aspect bullet when one is known).
pub fn find_codex_upgrade_icon(ctx: &ParseContext, panel: Image, aspect_bullet: Option<&TemplateMatch>) -> bool {
	let top = aspect_bullet.map_or(panel.height() / 2, |m| m.center.1);
	let crop = panel.sub_image(0, top, panel.width() / 2, panel.height().saturating_sub(top));
	let params = SearchParams::new(0.78).grayscale();
	for name in ["CODEX_UPGRADE_ICON_MEDIUM", "CODEX_UPGRADE_ICON"] {
		if search(ctx.templates, &[name], crop, &params).success {
			return true;
		}
	}
	false
}

fn find_bullets(ctx: &ParseContext, panel: Image, sep_y: u32, templates: &[&str], threshold: f32) -> Vec<TemplateMatch> {
	let roi = ctx.layout.region(PanelRegion::BulletColumn(sep_y), panel);
	let params = SearchParams::new(threshold).roi(roi).grayscale().mode(SearchMode::All);
	let result = search(ctx.templates, templates, panel, &params);
	let mut matches = dedup_close_matches(filter_outliers(result.matches));
	matches.sort_by_key(|m| m.center.1);
	matches
}

/// Bullets form a single column; anything noticeably right of the leftmost
/// match is a false positive from panel artwork.
fn filter_outliers(matches: Vec<TemplateMatch>) -> Vec<TemplateMatch> {
	let Some(left) = matches.iter().map(|m| m.center.0).min() else {
		return Vec::new();
	};
	matches
		.into_iter()
		.filter(|m| (m.center.0 as i64 - left as i64).unsigned_abs() < (m.region.w as f32 * 1.2) as u64)
		.collect()
}

/// Overlapping detections from the plain/medium template variants collapse
/// to the higher-scoring one.
fn dedup_close_matches(matches: Vec<TemplateMatch>) -> Vec<TemplateMatch> {
	let mut kept: Vec<TemplateMatch> = Vec::new();
	for m in matches {
		match kept.iter_mut().find(|k| {
			let dx = k.center.0 as i64 - m.center.0 as i64;
			let dy = k.center.1 as i64 - m.center.1 as i64;
			dx * dx + dy * dy <= 25
		}) {
			Some(k) => {
				if m.score > k.score {
					*k = m;
				}
			}
			None => kept.push(m),
		}
	}
	kept
}
