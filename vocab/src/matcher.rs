//! Edit-distance resolution of cleaned OCR text to canonical vocabulary keys.

use std::sync::LazyLock;

use regex::Regex;

use crate::Dictionary;

/// Default acceptance score for [`closest_match`].
pub const DEFAULT_MIN_SCORE: f32 = 0.86;

static NUMBER_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[+\-]?(?:\d+\.\d+|\.\d+|\d+\.?)%?").expect("number pattern"));
static DIGIT_SEPARATOR_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d)[, ]+(\d)").expect("digit separator pattern"));
static STRIP_NUMBER_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\+?\d+(\.\d+)?%?").expect("strip number pattern"));
static LEFTOVER_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\[\]+\-:%'#]").expect("leftover pattern"));

/// Similarity in 0..=1 based on levenshtein distance over the longer input.
fn similarity(a: &str, b: &str) -> f32 {
	let max_len = a.chars().count().max(b.chars().count());
	if max_len == 0 {
		return 1.0;
	}
	1.0 - levenshtein::levenshtein(a, b) as f32 / max_len as f32
}

/// Score `text` against every description in `vocabulary` and return the key
/// of the best-scoring entry when its similarity reaches `min_score`.
///
/// Ties keep the first entry in dictionary iteration order (sorted by key),
/// so results are reproducible across runs.
pub fn closest_match<'a>(text: &str, vocabulary: &'a Dictionary, min_score: f32) -> Option<&'a str> {
	let mut best: Option<(&str, f32)> = None;
	for (key, description) in vocabulary {
		let score = similarity(text, description);
		if best.is_none_or(|(_, s)| score > s) {
			best = Some((key, score));
		}
	}
	match best {
		Some((key, score)) if score >= min_score => Some(key),
		_ => None,
	}
}

/// Truncate `text` at the earliest occurrence of any keyword.
pub fn remove_text_after_first_keyword<'a>(text: &'a str, keywords: &[String]) -> &'a str {
	let cut = keywords
		.iter()
		.filter_map(|keyword| text.find(keyword.as_str()))
		.min();
	match cut {
		Some(pos) => &text[..pos],
		None => text,
	}
}

/// Extract the `idx`-th numeral of `text` as a float.
///
/// Thousands separators are dropped first, and boilerplate after a
/// filter-after keyword is ignored. The literal "up to a 5%" phrasing
/// carries its rolled value in the second numeral regardless of `idx`.
pub fn find_number(text: &str, idx: usize, after_keywords: &[String]) -> Option<f64> {
	let text = remove_text_after_first_keyword(text, after_keywords);
	let text = text.replace(',', "");
	let matches: Vec<&str> = NUMBER_REGEX.find_iter(&text).map(|m| m.as_str()).collect();
	let number = if text.contains("up to a 5%") {
		matches.get(1)
	} else {
		matches.get(idx)
	}?;
	number.replace(['+', '%'], "").parse::<f64>().ok()
}

/// Normalize an OCR'd description for fuzzy matching: strip rolled numbers,
/// bracket markup, boilerplate words and anything past a filter-after
/// keyword, then collapse whitespace and lowercase.
pub fn clean_str(text: &str, after_keywords: &[String], filter_words: &[String]) -> String {
	let mut cleaned = DIGIT_SEPARATOR_REGEX.replace_all(text, "$1$2").into_owned();
	cleaned = STRIP_NUMBER_REGEX.replace_all(&cleaned, "").into_owned();
	cleaned = cleaned.replace("[x]", "").replace("durability:", "");
	cleaned = LEFTOVER_REGEX.replace_all(&cleaned, "").into_owned();
	cleaned = remove_text_after_first_keyword(&cleaned, after_keywords).to_string();
	for word in filter_words {
		cleaned = cleaned.replace(word.as_str(), "");
	}
	cleaned = cleaned.replace(['(', ')'], "");
	cleaned.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}
