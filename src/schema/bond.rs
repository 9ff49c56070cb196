use serde::{Deserialize, Serialize};
use std::path::Path;

use super::table::{self, DataError};

const BUILTIN_BONDING: &str = include_str!("../../data/bonding.ron");

/// Discrete long-term relationship tier, ordered from weakest to strongest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BondLevel {
    Stranger,
    Acquaintance,
    Friend,
    CloseFriend,
    Companion,
    SoulMate,
}

impl BondLevel {
    pub const ALL: [BondLevel; 6] = [
        Self::Stranger,
        Self::Acquaintance,
        Self::Friend,
        Self::CloseFriend,
        Self::Companion,
        Self::SoulMate,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Stranger => "stranger",
            Self::Acquaintance => "acquaintance",
            Self::Friend => "friend",
            Self::CloseFriend => "close_friend",
            Self::Companion => "companion",
            Self::SoulMate => "soul_mate",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|l| l.name() == name)
    }

    /// Position in the ladder, 0 for `Stranger` through 5 for `SoulMate`.
    pub fn rank(&self) -> u8 {
        *self as u8
    }

    /// Resolve the level reached with `points` and `time_ms` together.
    ///
    /// Levels are scanned from the strongest down and the first one whose
    /// point AND time thresholds are both met wins.
    pub fn resolve(points: f32, time_ms: u64, levels: &[BondLevelInfo]) -> BondLevel {
        let mut sorted: Vec<&BondLevelInfo> = levels.iter().collect();
        sorted.sort_by(|a, b| b.level.cmp(&a.level));
        sorted
            .into_iter()
            .find(|info| points >= info.points_required && time_ms >= info.time_required_ms)
            .map(|info| info.level)
            .unwrap_or(BondLevel::Stranger)
    }
}

/// What kind of time an animal and the player shared. Drives bonding-style
/// multipliers and activity milestones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperienceType {
    Feeding,
    Play,
    Comfort,
    Grooming,
    Communication,
    Learning,
    Exploration,
    Performance,
}

impl ExperienceType {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Feeding => "feeding",
            Self::Play => "play",
            Self::Comfort => "comfort",
            Self::Grooming => "grooming",
            Self::Communication => "communication",
            Self::Learning => "learning",
            Self::Exploration => "exploration",
            Self::Performance => "performance",
        }
    }
}

/// Thresholds and perks of one bond level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BondLevelInfo {
    pub level: BondLevel,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub points_required: f32,
    pub time_required_ms: u64,
    /// Companion abilities granted on reaching this level.
    #[serde(default)]
    pub abilities: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequirementKind {
    /// Milliseconds spent together.
    TimeSpent,
    SharedExperiences,
    ActivitiesCompleted,
    /// Last trust value mirrored from taming.
    TrustLevel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequirementSpec {
    pub kind: RequirementKind,
    pub target: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MilestoneRewards {
    #[serde(default)]
    pub abilities: Vec<String>,
    #[serde(default)]
    pub knowledge: Vec<String>,
}

/// Static description of a one-time bonding goal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MilestoneDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub required_level: BondLevel,
    pub requirements: Vec<RequirementSpec>,
    #[serde(default)]
    pub rewards: MilestoneRewards,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbilityKind {
    /// Always on once unlocked; cannot be used explicitly.
    Passive,
    Active,
    Triggered,
}

/// An effect the animal offers once the bond is strong enough.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanionAbility {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub kind: AbilityKind,
    pub required_level: BondLevel,
    #[serde(default)]
    pub cooldown_ms: u64,
    #[serde(default)]
    pub effect: String,
    #[serde(default)]
    pub magnitude: f32,
}

/// Level ladder, milestone catalogue and ability catalogue.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BondingTable {
    pub levels: Vec<BondLevelInfo>,
    #[serde(default)]
    pub milestones: Vec<MilestoneDefinition>,
    #[serde(default)]
    pub abilities: Vec<CompanionAbility>,
}

impl BondingTable {
    /// The table shipped with the crate.
    pub fn builtin() -> Result<BondingTable, DataError> {
        Self::parse_ron(BUILTIN_BONDING)
    }

    pub fn load_from_ron(path: &Path) -> Result<BondingTable, DataError> {
        Self::parse_ron(&table::read_source(path)?)
    }

    pub fn parse_ron(input: &str) -> Result<BondingTable, DataError> {
        let t: BondingTable = table::parse_ron(input)?;
        table::ensure_unique(t.milestones.iter().map(|m| m.id.as_str()))?;
        table::ensure_unique(t.abilities.iter().map(|a| a.id.as_str()))?;
        Ok(t)
    }

    pub fn level_info(&self, level: BondLevel) -> Option<&BondLevelInfo> {
        self.levels.iter().find(|l| l.level == level)
    }

    pub fn ability(&self, id: &str) -> Option<&CompanionAbility> {
        self.abilities.iter().find(|a| a.id == id)
    }

    /// All abilities whose level requirement is met at `level`.
    pub fn abilities_for(&self, level: BondLevel) -> Vec<&CompanionAbility> {
        self.abilities
            .iter()
            .filter(|a| a.required_level <= level)
            .collect()
    }
}
