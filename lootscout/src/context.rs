//! Shared read-only state for one detection session.
//!
//! Everything the parser needs is carried explicitly instead of through
//! process-wide caches, so a resolution change mid-run just means building
//! a new context.

use std::collections::BTreeSet;

use vision::{HsvRange, TemplateStore, TextRecognizer, UiLayout};
use vocab::Vocabulary;

/// Red tint painted over stat lines the current character cannot use.
pub const UNUSABLE_RED: HsvRange = HsvRange {
	h_min: 345.0,
	h_max: 12.0,
	s_min: 110,
	s_max: 255,
	v_min: 110,
	v_max: 255,
};

/// Muted blue tint of material/currency headers.
pub const MATERIAL_BLUE: HsvRange = HsvRange {
	h_min: 200.0,
	h_max: 250.0,
	s_min: 60,
	s_max: 255,
	v_min: 100,
	v_max: 255,
};

/// Gold tone of unique aspect text, used to trim the aspect crop.
pub const UNIQUE_GOLD: HsvRange = HsvRange {
	h_min: 30.0,
	h_max: 55.0,
	s_min: 80,
	s_max: 255,
	v_min: 120,
	v_max: 255,
};

pub struct ParseContext<'a> {
	pub templates: &'a TemplateStore,
	pub vocab: &'a Vocabulary,
	pub ocr: &'a dyn TextRecognizer,
	pub layout: UiLayout,
	/// Combined word list, built once per context from the vocabulary.
	pub word_list: BTreeSet<String>,
}

impl<'a> ParseContext<'a> {
	pub fn new(
		templates: &'a TemplateStore,
		vocab: &'a Vocabulary,
		ocr: &'a dyn TextRecognizer,
		layout: UiLayout,
	) -> Self {
		Self {
			word_list: vocab.word_list(),
			templates,
			vocab,
			ocr,
			layout,
		}
	}
}
