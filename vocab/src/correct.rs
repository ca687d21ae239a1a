//! OCR text repair.
//!
//! Three ordered stages, each separately callable and idempotent: glyph
//! confusion repair (regex level), known-phrase repair (error map level,
//! keeping word confidences aligned with the token count), and word-list
//! repair (levenshtein against the combined vocabulary).

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::constants::{GLYPH_CONFUSIONS, SINGLE_CHARACTER_ERRORS, STARTING_CHARACTERS_TO_STRIP, SUFFIXES};

/// Text plus one confidence per whitespace-separated word.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OcrText {
	pub text: String,
	pub word_confidences: Vec<f32>,
}

impl OcrText {
	pub fn new(text: impl Into<String>, word_confidences: Vec<f32>) -> Self {
		Self {
			text: text.into(),
			word_confidences,
		}
	}

	pub fn from_text(text: impl Into<String>) -> Self {
		let text = text.into();
		let words = text.split_whitespace().count();
		Self {
			word_confidences: vec![1.0; words],
			text,
		}
	}
}

static TOKEN_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[+\-]?\d*\.?\d+%?|\w[\w'\-.]*|\S").expect("token pattern"));
static TRAILING_PUNCT_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"[.!?,"'\-]+$"#).expect("trailing punct pattern"));
static WORD_START_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\w").expect("word start pattern"));

pub struct OcrCorrector<'a> {
	/// Ordered error phrase -> correction pairs.
	error_map: &'a [(String, String)],
	/// Combined lowercase vocabulary the word-list stage corrects towards.
	word_list: &'a BTreeSet<String>,
	/// Minimum normalized levenshtein similarity to accept a correction.
	min_score: f32,
	/// Tokens shorter than this are left alone.
	min_word_len: usize,
}

impl<'a> OcrCorrector<'a> {
	pub fn new(error_map: &'a [(String, String)], word_list: &'a BTreeSet<String>) -> Self {
		Self {
			error_map,
			word_list,
			min_score: 0.6,
			min_word_len: 3,
		}
	}

	/// Run all three stages in order.
	pub fn process(&self, input: OcrText) -> OcrText {
		let mut result = input;
		result.text = self.fix_glyph_confusions(&result.text);
		result = self.fix_known_phrases(&result);
		result.text = self.fix_against_word_list(&result.text);
		result
	}

	/// Stage 1: character-level repairs for systematic engine confusions.
	pub fn fix_glyph_confusions(&self, text: &str) -> String {
		let mut text = text.to_string();
		for (pattern, replacement) in GLYPH_CONFUSIONS.iter() {
			if pattern.is_match(&text) {
				tracing::debug!(pattern = pattern.as_str(), "glyph confusion repair");
				text = pattern.replace_all(&text, *replacement).into_owned();
			}
		}
		for (error, correction) in SINGLE_CHARACTER_ERRORS {
			if text.contains(error) {
				text = text.replace(error, correction);
			}
		}
		// Any surviving run of I's is a numeral.
		while text.contains("II") {
			text = text.replace("II", "11");
		}
		if text.starts_with(STARTING_CHARACTERS_TO_STRIP) {
			text.remove(0);
		}
		text
	}

	/// Stage 2: phrase-level repairs against the error map.
	///
	/// Word confidences follow the token count of the correction: equal
	/// length keeps them aligned, a split duplicates the original value,
	/// a merge averages the contributing values.
	pub fn fix_known_phrases(&self, input: &OcrText) -> OcrText {
		let mut new_lines: Vec<String> = Vec::new();
		let mut new_confidences: Vec<f32> = Vec::new();
		let mut base = 0usize;

		for line in input.text.lines() {
			let words: Vec<&str> = line.split_whitespace().collect();
			let mut out_words: Vec<String> = Vec::new();
			let mut cursor = 0usize;

			while cursor < words.len() {
				let confidence_at = |i: usize| input.word_confidences.get(base + i).copied().unwrap_or(1.0);
				let hit = self.error_map.iter().find_map(|(error, correction)| {
					if !line.contains(error.as_str()) {
						return None;
					}
					let error_len = error.split_whitespace().count().max(1);
					let end = (cursor + error_len).min(words.len());
					let window = words[cursor..end].join(" ");
					if window.contains(error.as_str()) {
						Some((window.replace(error.as_str(), correction), end - cursor))
					} else {
						None
					}
				});

				match hit {
					Some((replaced, error_len)) => {
						let replaced_len = replaced.split_whitespace().count();
						tracing::debug!(from = %words[cursor..cursor + error_len].join(" "), to = %replaced, "known phrase repair");
						if replaced_len == error_len {
							new_confidences.extend((0..error_len).map(|i| confidence_at(cursor + i)));
						} else if replaced_len > error_len {
							new_confidences.extend(std::iter::repeat_n(confidence_at(cursor), replaced_len));
						} else {
							let sum: f32 = (0..error_len).map(|i| confidence_at(cursor + i)).sum();
							new_confidences.extend(std::iter::repeat_n(sum / error_len as f32, replaced_len));
						}
						out_words.push(replaced);
						cursor += error_len;
					}
					None => {
						new_confidences.push(confidence_at(cursor));
						out_words.push(words[cursor].to_string());
						cursor += 1;
					}
				}
			}

			base += words.len();
			new_lines.push(out_words.join(" "));
		}

		OcrText {
			text: new_lines.join("\n"),
			word_confidences: new_confidences,
		}
	}

	/// Stage 3: correct unknown words towards the combined vocabulary.
	///
	/// Tokens are word/number/punctuation units; words below the length
	/// floor or already in the list pass through. Common suffixes are
	/// stripped before matching so plural and gerund forms still resolve
	/// to their base word; the original capitalization is preserved.
	pub fn fix_against_word_list(&self, text: &str) -> String {
		if self.word_list.is_empty() {
			return text.to_string();
		}

		let mut new_lines: Vec<String> = Vec::new();
		for line in text.lines() {
			let tokens: Vec<&str> = TOKEN_REGEX.find_iter(line).map(|m| m.as_str()).collect();
			let mut out: Vec<String> = Vec::new();

			for token in &tokens {
				out.push(self.correct_token(token));
			}

			// Rejoin with a space unless the next token is punctuation, or
			// the pair is a thousands separator comma.
			let mut joined = String::new();
			for (i, token) in out.iter().enumerate() {
				joined.push_str(token);
				if let Some(next) = out.get(i + 1) {
					let next_is_word = WORD_START_REGEX.is_match(next);
					let is_thousands = token == "," && next.chars().all(|c| c.is_ascii_digit());
					if next_is_word && !is_thousands {
						joined.push(' ');
					}
				}
			}
			new_lines.push(joined);
		}
		new_lines.join("\n")
	}

	fn correct_token(&self, token: &str) -> String {
		let trailing = TRAILING_PUNCT_REGEX
			.find(token)
			.map(|m| m.as_str())
			.unwrap_or("");
		let stripped = &token[..token.len() - trailing.len()];

		let correctable = WORD_START_REGEX.is_match(stripped)
			&& stripped.len() >= self.min_word_len
			&& token.chars().any(|c| c.is_alphabetic());
		if !correctable || self.word_list.contains(&token.to_lowercase()) {
			return token.to_string();
		}

		let lower = stripped.to_lowercase();
		let (mut best_base, mut best_score) = self.best_match(&lower);
		let mut best_suffix = "";
		for suffix in SUFFIXES {
			let Some(base) = lower.strip_suffix(suffix) else {
				continue;
			};
			if self.word_list.contains(base) {
				best_base = base.to_string();
				best_suffix = suffix;
				break;
			}
			let (candidate, score) = self.best_match(base);
			if score > best_score {
				best_base = candidate;
				best_score = score;
				best_suffix = suffix;
			}
		}

		if lower != format!("{best_base}{best_suffix}") && best_score >= self.min_score {
			let corrected = format!("{}{best_suffix}{trailing}", preserve_case(token, &best_base));
			tracing::debug!(from = token, to = %corrected, score = best_score, "word list repair");
			corrected
		} else {
			token.to_string()
		}
	}

	/// Closest entry of the combined word list by levenshtein distance,
	/// with the normalized similarity score.
	fn best_match(&self, word: &str) -> (String, f32) {
		let mut best = String::new();
		let mut best_distance = usize::MAX;
		for candidate in self.word_list {
			let distance = levenshtein::levenshtein(word, candidate);
			if distance < best_distance {
				best_distance = distance;
				best = candidate.clone();
			}
		}
		let score = 1.0 - best_distance as f32 / word.chars().count().max(1) as f32;
		(best, score)
	}
}

/// Carry the capitalization pattern of `original` over to `corrected`.
fn preserve_case(original: &str, corrected: &str) -> String {
	if original.chars().all(|c| !c.is_lowercase()) && original.chars().any(|c| c.is_uppercase()) {
		corrected.to_uppercase()
	} else if original.chars().next().is_some_and(|c| c.is_uppercase()) {
		let mut chars = corrected.chars();
		match chars.next() {
			Some(first) => first.to_uppercase().chain(chars).collect(),
			None => String::new(),
		}
	} else {
		corrected.to_lowercase()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn word_list(words: &[&str]) -> BTreeSet<String> {
		words.iter().map(|w| w.to_string()).collect()
	}

	fn error_map(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
		pairs.iter().map(|(a, b)| (a.to_string(), b.to_string())).collect()
	}

	#[test]
	fn glyph_confusions_fix_numerals_and_letters() {
		let map = error_map(&[]);
		let list = word_list(&[]);
		let corrector = OcrCorrector::new(&map, &list);
		assert_eq!(corrector.fix_glyph_confusions("+I5% damage"), "+15% damage");
		assert_eq!(corrector.fix_glyph_confusions("TIER II"), "TIER 11");
		assert_eq!(corrector.fix_glyph_confusions("'maximum life"), "maximum life");
	}

	#[test]
	fn known_phrase_split_duplicates_confidence() {
		let map = error_map(&[("AXECLASS", "AXE CLASS")]);
		let list = word_list(&[]);
		let corrector = OcrCorrector::new(&map, &list);
		let out = corrector.fix_known_phrases(&OcrText::new("AXECLASS WEAPON", vec![0.8, 0.9]));
		assert_eq!(out.text, "AXE CLASS WEAPON");
		assert_eq!(out.word_confidences, vec![0.8, 0.8, 0.9]);
	}

	#[test]
	fn known_phrase_merge_averages_confidence() {
		let map = error_map(&[("QU AB", "QUHAB")]);
		let list = word_list(&[]);
		let corrector = OcrCorrector::new(&map, &list);
		let out = corrector.fix_known_phrases(&OcrText::new("QU AB RUNE", vec![0.5, 1.0, 1.0]));
		assert_eq!(out.text, "QUHAB RUNE");
		assert_eq!(out.word_confidences, vec![0.75, 1.0]);
	}

	#[test]
	fn word_list_repairs_near_misses_and_suffixes() {
		let map = error_map(&[]);
		let list = word_list(&["maximum", "life", "damage", "vulnerable"]);
		let corrector = OcrCorrector::new(&map, &list);
		assert_eq!(corrector.fix_against_word_list("makimum life"), "maximum life");
		// Plural resolves via suffix stripping.
		assert_eq!(corrector.fix_against_word_list("damages"), "damages");
		// Known words pass through regardless of case.
		assert_eq!(corrector.fix_against_word_list("Vulnerable"), "Vulnerable");
	}

	#[test]
	fn word_list_leaves_numbers_and_short_tokens() {
		let map = error_map(&[]);
		let list = word_list(&["damage"]);
		let corrector = OcrCorrector::new(&map, &list);
		assert_eq!(corrector.fix_against_word_list("+12.5% dmage to x"), "+12.5% damage to x");
	}

	#[test]
	fn pipeline_is_idempotent() {
		let map = error_map(&[("ARMER", "ARMOR"), ("QU AB", "QUHAB")]);
		let list = word_list(&["maximum", "life", "armor", "damage", "while", "fortified"]);
		let corrector = OcrCorrector::new(&map, &list);

		let input = OcrText::from_text("+I2% makimum life\nARMER while fortified");
		let once = corrector.process(input);
		let twice = corrector.process(once.clone());
		assert_eq!(once, twice);
		assert_eq!(once.text, "+12% maximum life\nARMOR while fortified");
	}
}
