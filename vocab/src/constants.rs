//! Literal data tables used by correction and aspect parsing.
//!
//! The aspect index tables are positional exceptions observed in the game
//! text itself (some aspect descriptions lead with a fixed numeral before
//! the rolled one); they cannot be derived and are carried as-is.

use std::sync::LazyLock;

use regex::Regex;

/// Regex repairs for characters the OCR engine systematically confuses,
/// applied in order. The engine mixes up I/1/U-ish glyph shapes depending
/// on the neighborhood.
pub static GLYPH_CONFUSIONS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
	[
		// Double strokes between capitals are a misread U.
		(r"([A-Z])II", "${1}U"),
		(r"II([A-Z])", "U$1"),
		(r"([A-Z])11", "${1}U"),
		(r"11([A-Z])", "U$1"),
		// I next to digits or sign/percent glyphs is a 1.
		(r"([%0-9+\-])I", "${1}1"),
		(r"I([%0-9+\-])", "1$1"),
		// 1 next to capitals is an I.
		(r"([A-Z])1", "${1}I"),
		(r"1([A-Z])", "I$1"),
	]
	.into_iter()
	.map(|(pattern, replacement)| (Regex::new(pattern).expect("glyph pattern"), replacement))
	.collect()
});

/// Whole-token digit/letter confusions. Only isolated single characters are
/// touched so words keep their letters.
pub const SINGLE_CHARACTER_ERRORS: &[(&str, &str)] = &[
	(" I ", " 1 "),
	(" I\n", " 1\n"),
	("\nI ", "\n1 "),
	(" S ", " 5 "),
	(" S\n", " 5\n"),
	("\nS ", "\n5 "),
	(" O ", " 0 "),
	(" O\n", " 0\n"),
	("\nO ", "\n0 "),
];

/// Leading characters the engine sometimes hallucinates in front of a line.
pub const STARTING_CHARACTERS_TO_STRIP: &[char] = &['\u{2018}', '\''];

/// Common suffixes stripped before the word-list lookup, longest first so
/// "ness" wins over "s".
pub const SUFFIXES: &[&str] = &[
	"ness", "less", "ful", "ies", "ves", "ing", "est", "'s", "es", "ed", "er", "ly", "s", "y", "'",
];

/// Aspect keys whose rolled value is the second numeral of the description.
pub const ASPECT_NUMBER_AT_IDX1: &[&str] = &[
	// Legendary
	"frostbitten",
	"of_artful_initiative",
	"of_noxious_ice",
	"elementalists",
	"snowveiled",
	"of_might",
	"assimilation",
	"exploiters",
	"of_audacity",
	"ghostwalker",
	"of_slaughter",
	"of_tempering_blows",
	"of_ancestral_charge",
	"of_encroaching_wrath",
	"brawlers",
	"devilish",
	"earthstrikers",
	"steadfast_berserkers",
	"windlasher",
	"bear_clan_berserkers",
	"of_mending_stone",
	"of_metamorphic_stone",
	"of_the_stampede",
	"of_the_trampled_earth",
	"lightning_dancers",
	"raw_might",
	"of_decay",
	"osseous_gale",
	"rotting",
	"of_exposed_flesh",
	"coldbringers",
	"of_uncanny_treachery",
	"of_lethal_dusk",
	"enshrouding",
	"of_arrow_storms",
	"of_bursting_venoms",
	"of_pestilent_points",
	"of_synergy",
	"icy_alchemists",
	"toxic_alchemists",
	"trickshot",
	"snowguards",
	"of_frozen_orbit",
	"serpentine",
	// Uniques
	"banished_lords_talisman",
	"ancients_oath",
	"battle_trance",
	"gohrs_devastating_grips",
	"waxing_gibbous",
	"black_river",
	"bloodless_scream",
	"ring_of_mendeln",
	"blue_rose",
	"esadoras_overflowing_cameo",
	"staff_of_endless_rage",
	"fists_of_fate",
	"mothers_embrace",
	"temerity",
	"the_butchers_cleaver",
	"xfals_corroded_signet",
	"writhing_band_of_trickery",
	"airidahs_inexorable_will",
];

/// Aspect keys whose rolled value is the third numeral of the description.
pub const ASPECT_NUMBER_AT_IDX2: &[&str] = &[
	// Legendary
	"of_retribution",
	"of_serration",
	"of_untimely_death",
	// Uniques
	"azurewrath",
	"soulbrand",
	"ring_of_red_furor",
];

/// Which numeral of an aspect description carries the rolled value.
pub fn aspect_number_index(key: &str) -> usize {
	if ASPECT_NUMBER_AT_IDX2.contains(&key) {
		2
	} else if ASPECT_NUMBER_AT_IDX1.contains(&key) {
		1
	} else {
		0
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn aspect_index_lookup() {
		assert_eq!(aspect_number_index("of_serration"), 2);
		assert_eq!(aspect_number_index("frostbitten"), 1);
		assert_eq!(aspect_number_index("of_inner_calm"), 0);
	}

	#[test]
	fn glyph_patterns_compile() {
		assert_eq!(GLYPH_CONFUSIONS.len(), 8);
	}
}
