use serde::{Deserialize, Serialize};
use std::path::Path;

use super::bond::ExperienceType;
use super::personality::PersonalityTrait;
use super::table::{self, DataError};

const BUILTIN_INTERACTIONS: &str = include_str!("../../data/interactions.ron");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionCategory {
    Feeding,
    Touch,
    Play,
    Communication,
    Grooming,
    Gift,
}

impl InteractionCategory {
    /// The kind of shared experience a successful interaction counts as.
    pub fn experience_type(&self) -> ExperienceType {
        match self {
            Self::Feeding => ExperienceType::Feeding,
            Self::Touch => ExperienceType::Comfort,
            Self::Play => ExperienceType::Play,
            Self::Communication => ExperienceType::Communication,
            Self::Grooming => ExperienceType::Grooming,
            Self::Gift => ExperienceType::Comfort,
        }
    }
}

/// Trust tiers. An animal sits in the highest tier whose threshold is at or
/// below its current trust.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustTier {
    Fearful,
    Wary,
    Curious,
    Accepting,
    Friendly,
    Bonded,
}

impl TrustTier {
    pub const ALL: [TrustTier; 6] = [
        Self::Fearful,
        Self::Wary,
        Self::Curious,
        Self::Accepting,
        Self::Friendly,
        Self::Bonded,
    ];

    pub fn threshold(&self) -> f32 {
        match self {
            Self::Fearful => 0.0,
            Self::Wary => 15.0,
            Self::Curious => 30.0,
            Self::Accepting => 50.0,
            Self::Friendly => 75.0,
            Self::Bonded => 90.0,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Fearful => "Fearful",
            Self::Wary => "Wary",
            Self::Curious => "Curious",
            Self::Accepting => "Accepting",
            Self::Friendly => "Friendly",
            Self::Bonded => "Bonded",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Fearful => "Flees at the slightest movement.",
            Self::Wary => "Watches you from a safe distance.",
            Self::Curious => "Edges closer to see what you are doing.",
            Self::Accepting => "Tolerates you nearby.",
            Self::Friendly => "Happy to see you.",
            Self::Bonded => "Trusts you completely.",
        }
    }

    pub fn for_trust(trust: f32) -> TrustTier {
        Self::ALL
            .iter()
            .rev()
            .copied()
            .find(|t| t.threshold() <= trust)
            .unwrap_or(TrustTier::Fearful)
    }

    pub fn next(&self) -> Option<TrustTier> {
        Self::ALL.iter().copied().find(|t| t > self)
    }
}

/// Additive trust adjustments keyed by the animal's primary trait.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersonalityModifiers {
    #[serde(default)]
    pub bonuses: Vec<(PersonalityTrait, f32)>,
    #[serde(default)]
    pub penalties: Vec<(PersonalityTrait, f32)>,
}

impl PersonalityModifiers {
    pub fn bonus_for(&self, t: PersonalityTrait) -> Option<f32> {
        self.bonuses.iter().find(|(p, _)| *p == t).map(|(_, v)| *v)
    }

    pub fn penalty_for(&self, t: PersonalityTrait) -> Option<f32> {
        self.penalties.iter().find(|(p, _)| *p == t).map(|(_, v)| *v)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InteractionRequirements {
    #[serde(default)]
    pub min_trust: Option<f32>,
    #[serde(default)]
    pub max_trust: Option<f32>,
    #[serde(default)]
    pub required_items: Vec<String>,
}

/// One entry of the static interaction table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub category: InteractionCategory,
    pub base_trust_modifier: f32,
    #[serde(default)]
    pub energy_cost: f32,
    /// Presentation pacing only.
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub cooldown_ms: u64,
    /// Lowest trust tier at which the interaction is offered.
    #[serde(default = "default_unlock_tier")]
    pub unlock_tier: TrustTier,
    #[serde(default)]
    pub personality_modifiers: PersonalityModifiers,
    #[serde(default)]
    pub requirements: InteractionRequirements,
}

fn default_unlock_tier() -> TrustTier {
    TrustTier::Fearful
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InteractionTable {
    pub interactions: Vec<Interaction>,
}

impl InteractionTable {
    pub fn builtin() -> Result<InteractionTable, DataError> {
        Self::parse_ron(BUILTIN_INTERACTIONS)
    }

    pub fn load_from_ron(path: &Path) -> Result<InteractionTable, DataError> {
        Self::parse_ron(&table::read_source(path)?)
    }

    pub fn parse_ron(input: &str) -> Result<InteractionTable, DataError> {
        let interactions: Vec<Interaction> = table::parse_ron(input)?;
        table::ensure_unique(interactions.iter().map(|i| i.id.as_str()))?;
        Ok(InteractionTable { interactions })
    }

    pub fn get(&self, id: &str) -> Option<&Interaction> {
        self.interactions.iter().find(|i| i.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Interaction> {
        self.interactions.iter()
    }

    /// Add or replace interactions from `other`, keyed by id.
    pub fn merge(&mut self, other: InteractionTable) {
        for interaction in other.interactions {
            match self.interactions.iter_mut().find(|i| i.id == interaction.id) {
                Some(existing) => *existing = interaction,
                None => self.interactions.push(interaction),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_lookup_takes_highest_threshold_at_or_below() {
        assert_eq!(TrustTier::for_trust(0.0), TrustTier::Fearful);
        assert_eq!(TrustTier::for_trust(14.9), TrustTier::Fearful);
        assert_eq!(TrustTier::for_trust(15.0), TrustTier::Wary);
        assert_eq!(TrustTier::for_trust(25.0), TrustTier::Wary);
        assert_eq!(TrustTier::for_trust(50.0), TrustTier::Accepting);
        assert_eq!(TrustTier::for_trust(89.99), TrustTier::Friendly);
        assert_eq!(TrustTier::for_trust(100.0), TrustTier::Bonded);
    }

    #[test]
    fn tier_next() {
        assert_eq!(TrustTier::Fearful.next(), Some(TrustTier::Wary));
        assert_eq!(TrustTier::Bonded.next(), None);
    }

    #[test]
    fn builtin_table_contains_offer_food() {
        let table = InteractionTable::builtin().unwrap();
        let food = table.get("offer_food").unwrap();
        assert_eq!(food.base_trust_modifier, 8.0);
        assert_eq!(food.requirements.min_trust, Some(20.0));
        assert_eq!(food.requirements.required_items, vec!["food".to_string()]);
        assert!(food.personality_modifiers.bonus_for(PersonalityTrait::Friendly).is_some());
    }

    #[test]
    fn merge_overrides_by_id() {
        let mut base = InteractionTable::builtin().unwrap();
        let count = base.interactions.len();
        let patch = InteractionTable::parse_ron(
            r#"[
                (id: "offer_food", name: "Offer Treat", category: feeding, base_trust_modifier: 12.0),
                (id: "sing", name: "Sing", category: communication, base_trust_modifier: 2.0),
            ]"#,
        )
        .unwrap();
        base.merge(patch);
        assert_eq!(base.interactions.len(), count + 1);
        assert_eq!(base.get("offer_food").unwrap().base_trust_modifier, 12.0);
        assert_eq!(base.get("sing").unwrap().unlock_tier, TrustTier::Fearful);
    }

    #[test]
    fn category_maps_to_experience() {
        assert_eq!(InteractionCategory::Touch.experience_type(), ExperienceType::Comfort);
        assert_eq!(InteractionCategory::Play.experience_type(), ExperienceType::Play);
    }
}
