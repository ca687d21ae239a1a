//! Keep/discard evaluation of a parsed item against profile rules.
//!
//! Every satisfied rule contributes one [`MatchedFilter`] trace, so downstream
//! consumers can highlight exactly which affixes carried the decision.

mod load;
pub use load::*;
mod rules;
pub use rules::*;

use crate::item::{Affix, AffixType, Item, ItemRarity, ItemType};

/// One satisfied rule.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MatchedFilter {
	/// "profile.rule" label of the satisfied rule.
	pub profile: String,
	pub matched_affixes: Vec<String>,
	pub did_match_aspect: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct FilterResult {
	pub keep: bool,
	pub matched: Vec<MatchedFilter>,
}

/// Evaluate `item` against every profile. Dispatches on item shape: sigils,
/// unique/mythic gear and ordinary gear follow different rule sections.
pub fn should_keep(item: &Item, profiles: &[Profile]) -> FilterResult {
	let mut res = FilterResult::default();
	let (Some(item_type), Some(power)) = (item.item_type, item.power) else {
		return res;
	};

	if item_type == ItemType::Sigil {
		check_sigils(item, power, profiles, &mut res);
	} else if matches!(item.rarity, ItemRarity::Unique | ItemRarity::Mythic) {
		check_uniques(item, item_type, power, profiles, &mut res);
	} else {
		check_gear(item, item_type, power, profiles, &mut res);
		check_aspects(item, profiles, &mut res);
	}
	res
}

fn check_sigils(item: &Item, tier: u32, profiles: &[Profile], res: &mut FilterResult) {
	let rules: Vec<(&str, &SigilRule)> = profiles
		.iter()
		.filter_map(|p| p.sigils.as_ref().map(|s| (p.name.as_str(), s)))
		.collect();
	if rules.is_empty() {
		// Nothing filters sigils at all; keep them.
		res.keep = true;
		res.matched.push(MatchedFilter::default());
		return;
	}

	for (profile, rule) in rules {
		if tier < rule.min_tier || tier > rule.max_tier {
			continue;
		}
		let blacklisted = rule.blacklist.iter().any(|entry| sigil_entry_applies(entry, item));
		let whitelisted = rule.whitelist.iter().any(|entry| sigil_entry_applies(entry, item));
		if !rule.whitelist.is_empty() && !whitelisted {
			continue;
		}
		if blacklisted && !(whitelisted && rule.priority == SigilPriority::Whitelist) {
			continue;
		}
		res.keep = true;
		res.matched.push(MatchedFilter {
			profile: format!("{profile}.Sigil"),
			..Default::default()
		});
	}
}

/// A list entry applies when its named affix is on the sigil and, if extra
/// condition affixes are listed, at least one of them is too.
fn sigil_entry_applies(entry: &SigilCondition, item: &Item) -> bool {
	has_affix(item, &entry.name) && (entry.condition.is_empty() || entry.condition.iter().any(|name| has_affix(item, name)))
}

fn has_affix(item: &Item, name: &str) -> bool {
	item.affixes.iter().chain(&item.inherent).any(|a| a.name == name)
}

fn check_gear(item: &Item, item_type: ItemType, power: u32, profiles: &[Profile], res: &mut FilterResult) {
	for profile in profiles {
		for (rule_name, rule) in profile.affixes.iter().flat_map(|rules| rules.iter()) {
			if !type_ok(&rule.item_type, item_type) || !power_ok(rule.min_power, power) {
				continue;
			}
			if rule.blacklist.iter().any(|name| has_affix(item, name)) {
				continue;
			}
			let greater = item.affixes.iter().filter(|a| a.kind == AffixType::Greater).count();
			if greater < rule.min_greater_affix_count {
				continue;
			}

			let mut matched = Vec::new();
			if !match_pools(&rule.affix_pool, &item.affixes, &mut matched)
				|| !match_pools(&rule.inherent_pool, &item.inherent, &mut matched)
			{
				continue;
			}

			tracing::info!(profile = profile.name, rule = rule_name, affixes = ?matched, "rule matched");
			res.keep = true;
			res.matched.push(MatchedFilter {
				profile: format!("{}.{rule_name}", profile.name),
				matched_affixes: matched,
				did_match_aspect: false,
			});
		}
	}
}

fn check_aspects(item: &Item, profiles: &[Profile], res: &mut FilterResult) {
	let Some(aspect) = &item.aspect else {
		return;
	};
	for profile in profiles {
		for rule in &profile.aspects {
			if rule.name == aspect.name && rule.accepts(aspect.value) {
				tracing::info!(profile = profile.name, aspect = aspect.name, value = ?aspect.value, "aspect matched");
				res.keep = true;
				res.matched.push(MatchedFilter {
					profile: format!("{}.Aspects", profile.name),
					did_match_aspect: true,
					..Default::default()
				});
			}
		}
	}
}

fn check_uniques(item: &Item, item_type: ItemType, power: u32, profiles: &[Profile], res: &mut FilterResult) {
	for profile in profiles {
		for rule in &profile.uniques {
			if !type_ok(&rule.item_type, item_type) || !power_ok(rule.min_power, power) {
				continue;
			}
			if let Some(wanted) = &rule.aspect {
				let aspect_ok = item
					.aspect
					.as_ref()
					.is_some_and(|a| a.name == wanted.name && wanted.accepts(a.value));
				if !aspect_ok {
					continue;
				}
			}
			// Every listed affix condition must be met.
			let matched = match_conditions(&rule.affix, &item.affixes);
			if matched.len() < rule.affix.len() {
				continue;
			}
			res.keep = true;
			res.matched.push(MatchedFilter {
				profile: match &rule.aspect {
					Some(wanted) => format!("{}.{}", profile.name, wanted.name),
					None => format!("{}.Unique", profile.name),
				},
				matched_affixes: matched,
				did_match_aspect: rule.aspect.is_some(),
			});
		}
	}
}

fn match_pools(pools: &[CountGroup], affixes: &[Affix], matched: &mut Vec<String>) -> bool {
	for group in pools {
		let names = match_conditions(&group.count, affixes);
		let (min, max) = group.bounds();
		if names.len() < min || names.len() > max {
			return false;
		}
		matched.extend(names);
	}
	true
}

/// Names of the satisfied conditions, consuming each item affix at most once.
/// A condition without a threshold, or an affix without a parsed value, is
/// vacuously satisfied.
fn match_conditions(conditions: &[AffixCondition], affixes: &[Affix]) -> Vec<String> {
	let mut remaining: Vec<&Affix> = affixes.iter().collect();
	let mut names = Vec::new();
	for condition in conditions {
		if let Some(pos) = remaining.iter().position(|a| a.name == condition.name && condition.accepts(a.value)) {
			remaining.remove(pos);
			names.push(condition.name.clone());
		}
	}
	names
}

fn type_ok(allowed: &[String], item_type: ItemType) -> bool {
	allowed.is_empty() || allowed.iter().any(|t| t == item_type.key())
}

fn power_ok(min_power: Option<u32>, power: u32) -> bool {
	min_power.is_none_or(|min| power >= min)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::item::Aspect;

	fn affix(name: &str, value: Option<f64>) -> Affix {
		Affix {
			name: name.to_string(),
			value,
			..Default::default()
		}
	}

	fn item(rarity: ItemRarity, item_type: ItemType, power: u32) -> Item {
		let mut item = Item::new(rarity);
		item.item_type = Some(item_type);
		item.power = Some(power);
		item
	}

	fn condition(name: &str) -> AffixCondition {
		AffixCondition {
			name: name.to_string(),
			..Default::default()
		}
	}

	fn resistances() -> Vec<AffixCondition> {
		["cold_resistance", "fire_resistance", "poison_resistance", "shadow_resistance", "lightning_resistance", "dodge_chance"]
			.iter()
			.map(|name| condition(name))
			.collect()
	}

	fn gear_profile(group: CountGroup) -> Profile {
		Profile {
			name: "test".into(),
			affixes: vec![std::collections::BTreeMap::from([(
				"Boots".to_string(),
				GearRule {
					item_type: vec!["Boots".into()],
					min_power: Some(700),
					affix_pool: vec![group],
					..Default::default()
				},
			)])],
			..Default::default()
		}
	}

	fn sigil_profile(rule: SigilRule) -> Profile {
		Profile {
			name: "test".into(),
			sigils: Some(rule),
			..Default::default()
		}
	}

	#[test]
	fn count_group_window_bounds_both_ways() {
		let profiles = [gear_profile(CountGroup {
			count: resistances(),
			min_count: Some(2),
			max_count: Some(4),
		})];

		let mut boots = item(ItemRarity::Rare, ItemType::Boots, 725);
		boots.affixes = vec![affix("cold_resistance", Some(6.0)), affix("fire_resistance", Some(5.0))];
		assert!(should_keep(&boots, &profiles).keep);
		assert_eq!(should_keep(&boots, &profiles).matched[0].matched_affixes, vec!["cold_resistance", "fire_resistance"]);

		boots.affixes.truncate(1);
		assert!(!should_keep(&boots, &profiles).keep);

		boots.affixes = vec![
			affix("cold_resistance", Some(6.0)),
			affix("fire_resistance", Some(5.0)),
			affix("poison_resistance", Some(5.0)),
			affix("shadow_resistance", Some(5.0)),
			affix("lightning_resistance", Some(5.0)),
		];
		assert!(!should_keep(&boots, &profiles).keep, "exceeding maxCount must not match");
	}

	#[test]
	fn thresholds_follow_the_comparison() {
		let profiles = [gear_profile(CountGroup {
			count: vec![AffixCondition {
				name: "cold_resistance".into(),
				value: Some(4.0),
				comparison: Comparison::Smaller,
			}],
			..Default::default()
		})];

		let mut boots = item(ItemRarity::Rare, ItemType::Boots, 725);
		boots.affixes = vec![affix("cold_resistance", Some(3.5))];
		assert!(should_keep(&boots, &profiles).keep);
		boots.affixes = vec![affix("cold_resistance", Some(6.0))];
		assert!(!should_keep(&boots, &profiles).keep);
		// No parsed value is vacuously within any threshold.
		boots.affixes = vec![affix("cold_resistance", None)];
		assert!(should_keep(&boots, &profiles).keep);
	}

	#[test]
	fn blacklist_and_greater_count_gate_gear_rules() {
		let mut profile = gear_profile(CountGroup {
			count: vec![condition("movement_speed")],
			..Default::default()
		});
		let rule = profile.affixes[0].get_mut("Boots").unwrap();
		rule.blacklist = vec!["maximum_life".into()];
		rule.min_greater_affix_count = 1;
		let profiles = [profile];

		let mut boots = item(ItemRarity::Legendary, ItemType::Boots, 725);
		boots.affixes = vec![affix("movement_speed", Some(12.0))];
		assert!(!should_keep(&boots, &profiles).keep, "no greater affix yet");

		boots.affixes[0].kind = AffixType::Greater;
		assert!(should_keep(&boots, &profiles).keep);

		boots.affixes.push(affix("maximum_life", Some(300.0)));
		assert!(!should_keep(&boots, &profiles).keep, "blacklisted affix must veto");
	}

	#[test]
	fn aspect_rules_match_independently() {
		let profiles = [Profile {
			name: "test".into(),
			aspects: vec![AspectRule {
				name: "ghostwalker".into(),
				value: Some(20.0),
				comparison: Comparison::Larger,
			}],
			..Default::default()
		}];

		let mut boots = item(ItemRarity::Legendary, ItemType::Boots, 725);
		boots.aspect = Some(Aspect {
			name: "ghostwalker".into(),
			value: Some(25.0),
			..Default::default()
		});
		let res = should_keep(&boots, &profiles);
		assert!(res.keep);
		assert_eq!(res.matched[0].profile, "test.Aspects");
		assert!(res.matched[0].did_match_aspect);

		boots.aspect.as_mut().unwrap().value = Some(15.0);
		assert!(!should_keep(&boots, &profiles).keep);
	}

	#[test]
	fn sigil_tier_window_keeps() {
		let profiles = [sigil_profile(SigilRule {
			min_tier: 40,
			max_tier: 80,
			..Default::default()
		})];
		let sigil = item(ItemRarity::Common, ItemType::Sigil, 60);
		let res = should_keep(&sigil, &profiles);
		assert!(res.keep);
		assert_eq!(res.matched[0].profile, "test.Sigil");

		let low = item(ItemRarity::Common, ItemType::Sigil, 20);
		assert!(!should_keep(&low, &profiles).keep);
	}

	#[test]
	fn blacklisted_sigil_inherent_discards() {
		let profiles = [sigil_profile(SigilRule {
			blacklist: vec![SigilCondition {
				name: "underroot".into(),
				condition: Vec::new(),
			}],
			..Default::default()
		})];
		let mut sigil = item(ItemRarity::Common, ItemType::Sigil, 60);
		sigil.inherent = vec![affix("underroot", None)];
		assert!(!should_keep(&sigil, &profiles).keep);

		sigil.inherent = vec![affix("jalals_vigil", None)];
		assert!(should_keep(&sigil, &profiles).keep);
	}

	#[test]
	fn sigil_priority_decides_list_conflicts() {
		let rule = SigilRule {
			blacklist: vec![SigilCondition {
				name: "reduce_cooldowns_on_kill".into(),
				condition: Vec::new(),
			}],
			whitelist: vec![SigilCondition {
				name: "iron_hold".into(),
				condition: vec!["shadow_damage".into()],
			}],
			..Default::default()
		};
		let mut sigil = item(ItemRarity::Common, ItemType::Sigil, 60);
		sigil.affixes = vec![affix("shadow_damage", Some(2.0)), affix("reduce_cooldowns_on_kill", None)];
		sigil.inherent = vec![affix("iron_hold", None)];

		let profiles = [sigil_profile(rule.clone())];
		assert!(!should_keep(&sigil, &profiles).keep, "blacklist wins by default");

		let profiles = [sigil_profile(SigilRule {
			priority: SigilPriority::Whitelist,
			..rule
		})];
		assert!(should_keep(&sigil, &profiles).keep);
	}

	#[test]
	fn whitelist_condition_must_also_be_present() {
		let profiles = [sigil_profile(SigilRule {
			whitelist: vec![SigilCondition {
				name: "iron_hold".into(),
				condition: vec!["shadow_damage".into()],
			}],
			..Default::default()
		})];
		let mut sigil = item(ItemRarity::Common, ItemType::Sigil, 60);
		sigil.inherent = vec![affix("iron_hold", None)];
		assert!(!should_keep(&sigil, &profiles).keep, "condition affix missing");

		sigil.affixes = vec![affix("shadow_damage", Some(2.0))];
		assert!(should_keep(&sigil, &profiles).keep);
	}

	#[test]
	fn sigils_without_any_sigil_rule_are_kept() {
		let profiles = [Profile {
			name: "gear_only".into(),
			..Default::default()
		}];
		let sigil = item(ItemRarity::Common, ItemType::Sigil, 60);
		let res = should_keep(&sigil, &profiles);
		assert!(res.keep);
		assert_eq!(res.matched.len(), 1);
	}

	#[test]
	fn unique_needs_the_named_aspect() {
		let profiles = [Profile {
			name: "test".into(),
			uniques: vec![UniqueRule {
				min_power: Some(900),
				aspect: Some(AspectRule {
					name: "soulbrand".into(),
					value: Some(20.0),
					comparison: Comparison::Larger,
				}),
				affix: vec![AffixCondition {
					name: "attack_speed".into(),
					value: Some(8.4),
					comparison: Comparison::Larger,
				}],
				..Default::default()
			}],
			..Default::default()
		}];

		let mut chest = item(ItemRarity::Unique, ItemType::ChestArmor, 925);
		chest.affixes = vec![affix("attack_speed", Some(9.0))];
		chest.aspect = Some(Aspect {
			name: "soulbrand".into(),
			value: Some(22.0),
			..Default::default()
		});
		let res = should_keep(&chest, &profiles);
		assert!(res.keep);
		assert_eq!(res.matched[0].profile, "test.soulbrand");
		assert!(res.matched[0].did_match_aspect);

		chest.aspect.as_mut().unwrap().value = Some(15.0);
		assert!(!should_keep(&chest, &profiles).keep);

		chest.aspect.as_mut().unwrap().value = Some(22.0);
		chest.affixes[0].value = Some(8.0);
		assert!(!should_keep(&chest, &profiles).keep, "affix condition must hold too");
	}

	#[test]
	fn unique_rule_without_aspect_gates_on_type_and_power() {
		let profiles = [Profile {
			name: "test".into(),
			uniques: vec![UniqueRule {
				item_type: vec!["Scythe".into()],
				min_power: Some(900),
				..Default::default()
			}],
			..Default::default()
		}];
		let scythe = item(ItemRarity::Unique, ItemType::Scythe, 925);
		assert!(should_keep(&scythe, &profiles).keep);
		let weak = item(ItemRarity::Unique, ItemType::Scythe, 800);
		assert!(!should_keep(&weak, &profiles).keep);
		let sword = item(ItemRarity::Unique, ItemType::Sword, 925);
		assert!(!should_keep(&sword, &profiles).keep);
	}

	#[test]
	fn unreadable_items_are_never_kept() {
		let mut no_type = Item::new(ItemRarity::Legendary);
		no_type.power = Some(800);
		assert!(!should_keep(&no_type, &[]).keep);

		let mut no_power = Item::new(ItemRarity::Legendary);
		no_power.item_type = Some(ItemType::Boots);
		assert!(!should_keep(&no_power, &[]).keep);
	}
}
