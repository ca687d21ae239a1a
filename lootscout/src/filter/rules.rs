//! Declarative rule schema for profile documents.
//!
//! Profiles deserialize into these types as-is; [`Profile::validate`] then
//! checks every referenced name against the vocabulary and removes rules that
//! cannot match anything, so evaluation never has to second-guess its input.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use vocab::Vocabulary;

use crate::item::ItemType;

/// One user profile: named gear rules plus optional aspect, unique and sigil
/// sections. Sections that are absent simply contribute no matches.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
	pub name: String,
	/// Gear rules keep their document order; each entry is a single named rule.
	#[serde(rename = "Affixes")]
	pub affixes: Vec<BTreeMap<String, GearRule>>,
	#[serde(rename = "Aspects")]
	pub aspects: Vec<AspectRule>,
	#[serde(rename = "Uniques")]
	pub uniques: Vec<UniqueRule>,
	#[serde(rename = "Sigils")]
	pub sigils: Option<SigilRule>,
}

/// Rule for magic/rare/legendary gear.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GearRule {
	/// Allowed item type keys; empty means any type.
	pub item_type: Vec<String>,
	pub min_power: Option<u32>,
	pub affix_pool: Vec<CountGroup>,
	pub inherent_pool: Vec<CountGroup>,
	/// Affix names that veto the rule when present anywhere on the item.
	pub blacklist: Vec<String>,
	pub min_greater_affix_count: usize,
}

/// A group of affix conditions satisfied when the number of qualifying item
/// affixes lies within the group's count window.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CountGroup {
	pub count: Vec<AffixCondition>,
	pub min_count: Option<usize>,
	pub max_count: Option<usize>,
}

impl CountGroup {
	/// Count window, inclusive. Both bounds default to the full list, so a
	/// bare group means "all of these".
	pub fn bounds(&self) -> (usize, usize) {
		(
			self.min_count.unwrap_or(self.count.len()),
			self.max_count.unwrap_or(self.count.len()),
		)
	}
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AffixCondition {
	pub name: String,
	/// Roll threshold; absent means any roll qualifies.
	pub value: Option<f64>,
	pub comparison: Comparison,
}

impl AffixCondition {
	pub fn accepts(&self, value: Option<f64>) -> bool {
		value_ok(self.comparison, self.value, value)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparison {
	#[default]
	Larger,
	Smaller,
}

/// Threshold check shared by affix and aspect conditions. An absent threshold
/// or an absent rolled value is vacuously satisfied.
fn value_ok(comparison: Comparison, threshold: Option<f64>, value: Option<f64>) -> bool {
	match (threshold, value) {
		(Some(threshold), Some(value)) => match comparison {
			Comparison::Larger => value >= threshold,
			Comparison::Smaller => value <= threshold,
		},
		_ => true,
	}
}

/// Aspect rules match legendary items independently of any gear rule.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AspectRule {
	pub name: String,
	pub value: Option<f64>,
	pub comparison: Comparison,
}

impl AspectRule {
	pub fn accepts(&self, value: Option<f64>) -> bool {
		value_ok(self.comparison, self.value, value)
	}
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UniqueRule {
	pub item_type: Vec<String>,
	pub min_power: Option<u32>,
	/// Required aspect; absent keeps any unique passing the type/power gate.
	pub aspect: Option<AspectRule>,
	/// Additional affix conditions; all of them must be satisfied.
	pub affix: Vec<AffixCondition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SigilRule {
	pub min_tier: u32,
	pub max_tier: u32,
	pub blacklist: Vec<SigilCondition>,
	pub whitelist: Vec<SigilCondition>,
	/// Which list wins when one entry of each applies to the same sigil.
	pub priority: SigilPriority,
}

impl Default for SigilRule {
	fn default() -> Self {
		Self {
			min_tier: 0,
			max_tier: 9999,
			blacklist: Vec::new(),
			whitelist: Vec::new(),
			priority: SigilPriority::default(),
		}
	}
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SigilCondition {
	pub name: String,
	/// Extra affix names; at least one must also be on the sigil for the
	/// entry to apply.
	pub condition: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SigilPriority {
	#[default]
	Blacklist,
	Whitelist,
}

/// A rule dropped during validation, with the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadError {
	pub profile: String,
	pub rule: String,
	pub detail: String,
}

impl fmt::Display for LoadError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}.{}: {}", self.profile, self.rule, self.detail)
	}
}

impl std::error::Error for LoadError {}

impl Profile {
	/// Check every name this profile references against the vocabulary and
	/// drop rules that could never match. The remaining rules stay usable, so
	/// one typo does not take the whole profile down.
	pub fn validate(&mut self, vocab: &Vocabulary) -> Vec<LoadError> {
		let mut errors = Vec::new();
		let profile = self.name.clone();

		for rules in &mut self.affixes {
			rules.retain(|rule_name, rule| match check_gear_rule(rule, vocab) {
				Ok(()) => true,
				Err(detail) => {
					errors.push(LoadError { profile: profile.clone(), rule: rule_name.clone(), detail });
					false
				}
			});
		}

		self.aspects.retain(|rule| {
			let known = vocab.aspects.contains_key(&rule.name) || vocab.unique_aspects.contains_key(&rule.name);
			if !known {
				errors.push(LoadError {
					profile: profile.clone(),
					rule: "Aspects".to_string(),
					detail: format!("unknown aspect {:?}", rule.name),
				});
			}
			known
		});

		self.uniques.retain(|rule| match check_unique_rule(rule, vocab) {
			Ok(()) => true,
			Err(detail) => {
				errors.push(LoadError { profile: profile.clone(), rule: "Uniques".to_string(), detail });
				false
			}
		});

		if let Some(sigils) = &self.sigils
			&& let Err(detail) = check_sigil_rule(sigils, vocab)
		{
			errors.push(LoadError { profile: profile.clone(), rule: "Sigils".to_string(), detail });
			self.sigils = None;
		}

		for err in &errors {
			tracing::warn!(%err, "dropping profile rule");
		}
		errors
	}
}

fn check_gear_rule(rule: &GearRule, vocab: &Vocabulary) -> Result<(), String> {
	check_item_types(&rule.item_type)?;
	for group in rule.affix_pool.iter().chain(&rule.inherent_pool) {
		let (min, max) = group.bounds();
		if min > max || min > group.count.len() {
			return Err(format!("count window [{min}, {max}] cannot be met by {} affixes", group.count.len()));
		}
		for condition in &group.count {
			known_affix(&condition.name, &vocab.affixes)?;
		}
	}
	for name in &rule.blacklist {
		known_affix(name, &vocab.affixes)?;
	}
	Ok(())
}

fn check_unique_rule(rule: &UniqueRule, vocab: &Vocabulary) -> Result<(), String> {
	check_item_types(&rule.item_type)?;
	if let Some(aspect) = &rule.aspect
		&& !vocab.unique_aspects.contains_key(&aspect.name)
	{
		return Err(format!("unknown unique aspect {:?}", aspect.name));
	}
	for condition in &rule.affix {
		known_affix(&condition.name, &vocab.affixes)?;
	}
	Ok(())
}

fn check_sigil_rule(rule: &SigilRule, vocab: &Vocabulary) -> Result<(), String> {
	if rule.min_tier > rule.max_tier {
		return Err(format!("tier window [{}, {}] is empty", rule.min_tier, rule.max_tier));
	}
	for entry in rule.blacklist.iter().chain(&rule.whitelist) {
		known_affix(&entry.name, &vocab.sigil_affixes)?;
		for name in &entry.condition {
			known_affix(name, &vocab.sigil_affixes)?;
		}
	}
	for entry in &rule.blacklist {
		if rule.whitelist.iter().any(|w| w.name == entry.name) {
			return Err(format!("{:?} is both blacklisted and whitelisted", entry.name));
		}
	}
	Ok(())
}

fn check_item_types(types: &[String]) -> Result<(), String> {
	match types.iter().find(|t| ItemType::from_key(t).is_none()) {
		Some(unknown) => Err(format!("unknown item type {unknown:?}")),
		None => Ok(()),
	}
}

fn known_affix(name: &str, dictionary: &vocab::Dictionary) -> Result<(), String> {
	if dictionary.contains_key(name) {
		Ok(())
	} else {
		Err(format!("unknown affix {name:?}"))
	}
}
