//! Game vocabulary: canonical key -> description dictionaries, the OCR
//! error phrase map, and the boilerplate word lists, loaded from per-language
//! JSON assets.

use std::{
	collections::BTreeSet,
	fs::File,
	io::BufReader,
	path::Path,
};

use anyhow::{Context, Result};

mod constants;
pub use constants::*;
mod correct;
pub use correct::*;
mod matcher;
pub use matcher::*;

/// Canonical key -> description text. Sorted by key so every scan over the
/// dictionary is deterministic.
pub type Dictionary = std::collections::BTreeMap<String, String>;

/// Header marker strings read from the tooltip assets.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct Tooltips {
	#[serde(rename = "ItemPower")]
	pub item_power: String,
	#[serde(rename = "ItemTier")]
	pub item_tier: String,
}

impl Default for Tooltips {
	fn default() -> Self {
		Self {
			item_power: "item power".to_string(),
			item_tier: "tier".to_string(),
		}
	}
}

#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
	pub affixes: Dictionary,
	/// Dungeon modifier descriptions, merged across the sigil sections.
	pub sigil_affixes: Dictionary,
	pub item_types: Dictionary,
	/// Legendary aspect descriptions.
	pub aspects: Dictionary,
	/// Unique aspect descriptions, truncated to the comparison window.
	pub unique_aspects: Dictionary,
	/// Ordered error phrase -> correction pairs.
	pub error_map: Vec<(String, String)>,
	/// Everything after the first of these keywords is boilerplate.
	pub filter_after_keywords: Vec<String>,
	/// Boilerplate words stripped wholesale before matching.
	pub filter_words: Vec<String>,
	pub tooltips: Tooltips,
}

/// Unique descriptions are compared on a fixed-length prefix: the tail is
/// flavor text that only hurts the edit-distance score.
const UNIQUE_DESC_PREFIX: usize = 45;

#[derive(serde::Deserialize)]
struct SigilSections {
	dungeons: Dictionary,
	minor: Dictionary,
	major: Dictionary,
	positive: Dictionary,
}

#[derive(serde::Deserialize)]
struct Corrections {
	error_map: Dictionary,
	filter_after_keyword: Vec<String>,
	filter_words: Vec<String>,
}

#[derive(serde::Deserialize)]
struct UniqueEntry {
	desc: String,
}

impl Vocabulary {
	/// Load all vocabulary assets from one language directory.
	pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
		let dir = dir.as_ref();

		let affixes: Dictionary = read_json(&dir.join("affixes.json"))?;
		let item_types: Dictionary = read_json(&dir.join("item_types.json"))?;
		let aspects: Dictionary = read_json(&dir.join("aspects.json"))?;
		let tooltips: Tooltips = read_json(&dir.join("tooltips.json"))?;

		let sigils: SigilSections = read_json(&dir.join("sigils.json"))?;
		let mut sigil_affixes = sigils.dungeons;
		sigil_affixes.extend(sigils.minor);
		sigil_affixes.extend(sigils.major);
		sigil_affixes.extend(sigils.positive);

		let uniques: std::collections::BTreeMap<String, UniqueEntry> = read_json(&dir.join("uniques.json"))?;
		let unique_aspects = uniques
			.into_iter()
			.map(|(key, entry)| {
				let desc = entry.desc.chars().take(UNIQUE_DESC_PREFIX).collect();
				(key, desc)
			})
			.collect();

		let corrections: Corrections = read_json(&dir.join("corrections.json"))?;

		Ok(Self {
			affixes,
			sigil_affixes,
			item_types,
			aspects,
			unique_aspects,
			error_map: corrections.error_map.into_iter().collect(),
			filter_after_keywords: corrections.filter_after_keyword,
			filter_words: corrections.filter_words,
			tooltips,
		})
	}

	/// Apply the error phrase map as plain substring replacements.
	///
	/// This is the cheap header-text variant; affix paragraphs go through
	/// the full [`OcrCorrector`] pipeline instead.
	pub fn apply_error_phrases(&self, text: &str) -> String {
		let mut text = text.to_string();
		for (error, correction) in &self.error_map {
			if text.contains(error.as_str()) {
				text = text.replace(error.as_str(), correction);
			}
		}
		text
	}

	/// Combined lowercase word list over every dictionary description, fed
	/// to the word-list correction stage.
	pub fn word_list(&self) -> BTreeSet<String> {
		let mut words = BTreeSet::new();
		let dictionaries = [
			&self.affixes,
			&self.sigil_affixes,
			&self.item_types,
			&self.aspects,
			&self.unique_aspects,
		];
		for dictionary in dictionaries {
			for description in dictionary.values() {
				for word in description.split_whitespace() {
					let word: String = word
						.chars()
						.filter(|c| c.is_alphabetic() || *c == '\'')
						.collect::<String>()
						.to_lowercase();
					if word.len() >= 3 {
						words.insert(word);
					}
				}
			}
		}
		words
	}

	/// Corrector wired to this vocabulary's error map and word list.
	pub fn corrector<'a>(&'a self, word_list: &'a BTreeSet<String>) -> OcrCorrector<'a> {
		OcrCorrector::new(&self.error_map, word_list)
	}
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
	let file = File::open(path).with_context(|| format!("Open {}", path.display()))?;
	let reader = BufReader::new(file);
	serde_json::from_reader(reader).with_context(|| format!("Parse {}", path.display()))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn word_list_is_lowercase_and_filtered() {
		let mut vocab = Vocabulary::default();
		vocab.affixes.insert("maximum_life".into(), "+Maximum Life".into());
		vocab.affixes.insert("ranks".into(), "to All Skills".into());
		let words = vocab.word_list();
		assert!(words.contains("maximum"));
		assert!(words.contains("life"));
		assert!(words.contains("skills"));
		// Too short after stripping.
		assert!(!words.contains("to"));
	}

	#[test]
	fn error_phrases_apply_in_order() {
		let mut vocab = Vocabulary::default();
		vocab.error_map.push(("ARMGR".into(), "ARMOR".into()));
		assert_eq!(vocab.apply_error_phrases("TOTAL ARMGR"), "TOTAL ARMOR");
	}
}
