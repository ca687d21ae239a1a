//! Structured item model produced by the parser and consumed by the filter.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemRarity {
	Common,
	Magic,
	Rare,
	Legendary,
	Unique,
	Mythic,
}

impl ItemRarity {
	/// Header substring announcing this rarity.
	pub fn marker(&self) -> &'static str {
		match self {
			Self::Common => "common",
			Self::Magic => "magic",
			Self::Rare => "rare",
			Self::Legendary => "legendary",
			Self::Unique => "unique",
			Self::Mythic => "mythic",
		}
	}

	pub const ALL: &[Self] = &[
		Self::Common,
		Self::Magic,
		Self::Rare,
		Self::Legendary,
		Self::Unique,
		Self::Mythic,
	];

	/// Rarities that carry an aspect line at the bottom of the panel.
	pub fn has_aspect(&self) -> bool {
		matches!(self, Self::Legendary | Self::Unique | Self::Mythic)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemType {
	Amulet,
	Axe,
	Axe2H,
	Boots,
	Bow,
	ChestArmor,
	Crossbow2H,
	Dagger,
	Elixir,
	Focus,
	Glaive,
	Gloves,
	Helm,
	Legs,
	Mace,
	Mace2H,
	OffHandTotem,
	Polearm,
	Quarterstaff,
	Ring,
	Scythe,
	Scythe2H,
	Shield,
	Staff,
	Sword,
	Sword2H,
	Tome,
	Wand,
	Compass,
	Consumable,
	Gem,
	Incense,
	Material,
	Rune,
	Sigil,
	TemperManual,
	Tribute,
}

impl ItemType {
	/// Canonical vocabulary key for this type.
	pub fn key(&self) -> &'static str {
		match self {
			Self::Amulet => "Amulet",
			Self::Axe => "Axe",
			Self::Axe2H => "Axe2H",
			Self::Boots => "Boots",
			Self::Bow => "Bow",
			Self::ChestArmor => "ChestArmor",
			Self::Crossbow2H => "Crossbow2H",
			Self::Dagger => "Dagger",
			Self::Elixir => "Elixir",
			Self::Focus => "Focus",
			Self::Glaive => "Glaive",
			Self::Gloves => "Gloves",
			Self::Helm => "Helm",
			Self::Legs => "Legs",
			Self::Mace => "Mace",
			Self::Mace2H => "Mace2H",
			Self::OffHandTotem => "OffHandTotem",
			Self::Polearm => "Polearm",
			Self::Quarterstaff => "Quarterstaff",
			Self::Ring => "Ring",
			Self::Scythe => "Scythe",
			Self::Scythe2H => "Scythe2H",
			Self::Shield => "Shield",
			Self::Staff => "Staff",
			Self::Sword => "Sword",
			Self::Sword2H => "Sword2H",
			Self::Tome => "Tome",
			Self::Wand => "Wand",
			Self::Compass => "Compass",
			Self::Consumable => "Consumable",
			Self::Gem => "Gem",
			Self::Incense => "Incense",
			Self::Material => "Material",
			Self::Rune => "Rune",
			Self::Sigil => "Sigil",
			Self::TemperManual => "TemperManual",
			Self::Tribute => "Tribute",
		}
	}

	pub fn from_key(key: &str) -> Option<Self> {
		Self::ALL.iter().copied().find(|t| t.key() == key)
	}

	pub const ALL: &[Self] = &[
		Self::Amulet,
		Self::Axe,
		Self::Axe2H,
		Self::Boots,
		Self::Bow,
		Self::ChestArmor,
		Self::Crossbow2H,
		Self::Dagger,
		Self::Elixir,
		Self::Focus,
		Self::Glaive,
		Self::Gloves,
		Self::Helm,
		Self::Legs,
		Self::Mace,
		Self::Mace2H,
		Self::OffHandTotem,
		Self::Polearm,
		Self::Quarterstaff,
		Self::Ring,
		Self::Scythe,
		Self::Scythe2H,
		Self::Shield,
		Self::Staff,
		Self::Sword,
		Self::Sword2H,
		Self::Tome,
		Self::Wand,
		Self::Compass,
		Self::Consumable,
		Self::Gem,
		Self::Incense,
		Self::Material,
		Self::Rune,
		Self::Sigil,
		Self::TemperManual,
		Self::Tribute,
	];

	pub fn is_armor(&self) -> bool {
		matches!(self, Self::Boots | Self::ChestArmor | Self::Gloves | Self::Helm | Self::Legs)
	}

	pub fn is_jewelry(&self) -> bool {
		matches!(self, Self::Amulet | Self::Ring)
	}

	pub fn is_consumable(&self) -> bool {
		matches!(self, Self::Consumable | Self::Elixir | Self::Incense | Self::TemperManual)
	}

	pub fn is_weapon(&self) -> bool {
		matches!(
			self,
			Self::Axe
				| Self::Axe2H
				| Self::Bow
				| Self::Crossbow2H
				| Self::Dagger
				| Self::Focus
				| Self::Glaive
				| Self::Mace
				| Self::Mace2H
				| Self::OffHandTotem
				| Self::Polearm
				| Self::Quarterstaff
				| Self::Scythe
				| Self::Scythe2H
				| Self::Staff
				| Self::Sword
				| Self::Sword2H
				| Self::Tome
				| Self::Wand
		)
	}

	/// Two-handed variant when the header carries a "two-handed" marker.
	pub fn two_handed(&self) -> Option<Self> {
		match self {
			Self::Sword => Some(Self::Sword2H),
			Self::Mace => Some(Self::Mace2H),
			Self::Scythe => Some(Self::Scythe2H),
			Self::Axe => Some(Self::Axe2H),
			_ => None,
		}
	}

	/// How many leading bullets below the separator are inherent rather than
	/// rolled affixes. Fixed per slot, not inferred.
	pub fn inherent_bullet_count(&self) -> usize {
		match self {
			Self::Ring | Self::Sigil => 2,
			Self::Shield => 4,
			Self::ChestArmor | Self::Helm | Self::Gloves | Self::Legs => 0,
			Self::Amulet | Self::Boots => 1,
			t if t.is_weapon() => 1,
			_ => 0,
		}
	}

	/// Some slots display aspect values scaled up; divide them back down.
	pub fn aspect_value_divisor(&self) -> f64 {
		match self {
			Self::Amulet => 1.5,
			Self::Axe2H
			| Self::Mace2H
			| Self::Scythe2H
			| Self::Sword2H
			| Self::Bow
			| Self::Crossbow2H
			| Self::Polearm
			| Self::Quarterstaff
			| Self::Staff => 2.0,
			_ => 1.0,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AffixType {
	#[default]
	Normal,
	Inherent,
	Greater,
	Rerolled,
	Tempered,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Affix {
	pub name: String,
	pub value: Option<f64>,
	/// Roll range when the panel shows one (advanced tooltips).
	pub min_value: Option<f64>,
	pub max_value: Option<f64>,
	pub kind: AffixType,
	/// Raw paragraph text the affix was matched from.
	pub text: String,
	/// Pixel location of the owning bullet in panel coordinates.
	pub loc: Option<(u32, u32)>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Aspect {
	pub name: String,
	pub value: Option<f64>,
	pub text: String,
	pub loc: Option<(u32, u32)>,
}

/// One parsed item description. Built fresh per detection cycle and never
/// mutated after the filter engine reads it.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
	pub rarity: ItemRarity,
	pub item_type: Option<ItemType>,
	pub power: Option<u32>,
	pub affixes: Vec<Affix>,
	pub inherent: Vec<Affix>,
	pub aspect: Option<Aspect>,
	pub codex_upgrade: bool,
}

impl Item {
	pub fn new(rarity: ItemRarity) -> Self {
		Self {
			rarity,
			item_type: None,
			power: None,
			affixes: Vec::new(),
			inherent: Vec::new(),
			aspect: None,
			codex_upgrade: false,
		}
	}

	pub fn is_sigil(&self) -> bool {
		self.item_type == Some(ItemType::Sigil)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn inherent_bullet_table() {
		assert_eq!(ItemType::Ring.inherent_bullet_count(), 2);
		assert_eq!(ItemType::Sigil.inherent_bullet_count(), 2);
		assert_eq!(ItemType::Shield.inherent_bullet_count(), 4);
		assert_eq!(ItemType::Amulet.inherent_bullet_count(), 1);
		assert_eq!(ItemType::Boots.inherent_bullet_count(), 1);
		assert_eq!(ItemType::Sword.inherent_bullet_count(), 1);
		assert_eq!(ItemType::ChestArmor.inherent_bullet_count(), 0);
		assert_eq!(ItemType::Helm.inherent_bullet_count(), 0);
		assert_eq!(ItemType::Gloves.inherent_bullet_count(), 0);
		assert_eq!(ItemType::Legs.inherent_bullet_count(), 0);
	}

	#[test]
	fn aspect_divisors() {
		assert_eq!(ItemType::Amulet.aspect_value_divisor(), 1.5);
		assert_eq!(ItemType::Sword2H.aspect_value_divisor(), 2.0);
		assert_eq!(ItemType::Bow.aspect_value_divisor(), 2.0);
		assert_eq!(ItemType::Ring.aspect_value_divisor(), 1.0);
	}

	#[test]
	fn type_keys_round_trip() {
		for t in ItemType::ALL {
			assert_eq!(ItemType::from_key(t.key()), Some(*t));
		}
	}
}
