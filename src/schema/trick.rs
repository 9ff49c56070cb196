use serde::{Deserialize, Serialize};
use std::path::Path;

use super::bond::BondLevel;
use super::personality::PersonalityTrait;
use super::table::{self, DataError};

const BUILTIN_TRICKS: &str = include_str!("../../data/tricks.ron");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GestureKind {
    Tap,
    DoubleTap,
    Swipe,
    Hold,
    Circle,
    Pinch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

/// The gesture a teaching phase expects from the player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gesture {
    pub kind: GestureKind,
    #[serde(default)]
    pub direction: Option<Direction>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
}

/// What the player actually did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GestureInput {
    pub kind: GestureKind,
    #[serde(default)]
    pub direction: Option<Direction>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
}

impl GestureInput {
    pub fn new(kind: GestureKind) -> Self {
        Self {
            kind,
            direction: None,
            duration_ms: None,
        }
    }

    pub fn towards(mut self, direction: Direction) -> Self {
        self.direction = Some(direction);
        self
    }

    pub fn lasting(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }
}

impl From<&Gesture> for GestureInput {
    fn from(g: &Gesture) -> Self {
        Self {
            kind: g.kind,
            direction: g.direction,
            duration_ms: g.duration_ms,
        }
    }
}

impl Gesture {
    /// Accuracy in [0, 1] of `input` against this gesture.
    ///
    /// A wrong kind costs x0.3, a wrong direction x0.5, and a duration off
    /// by a fraction `d` of the expected duration scales by `1 - d`, never
    /// below 0.3.
    pub fn accuracy(&self, input: &GestureInput) -> f32 {
        let mut accuracy = 1.0_f32;

        if input.kind != self.kind {
            accuracy *= 0.3;
        }

        if let Some(expected) = self.direction {
            if input.direction != Some(expected) {
                accuracy *= 0.5;
            }
        }

        if let Some(expected) = self.duration_ms.filter(|d| *d > 0) {
            let actual = input.duration_ms.unwrap_or(0);
            let deviation = (expected as f32 - actual as f32).abs() / expected as f32;
            accuracy *= (1.0 - deviation).max(0.3);
        }

        accuracy.clamp(0.0, 1.0)
    }
}

/// One step of a trick's teaching sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeachingPhase {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub gesture: Gesture,
    /// Accuracy an attempt needs before personality adjustments.
    pub required_success: f32,
    #[serde(default)]
    pub hints: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrickCategory {
    Basic,
    Movement,
    Performance,
    Utility,
    Advanced,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrickRequirements {
    #[serde(default)]
    pub min_trust: Option<f32>,
    /// Exact bond level the animal must be at.
    #[serde(default)]
    pub bond_level: Option<BondLevel>,
    #[serde(default)]
    pub prerequisites: Vec<String>,
    #[serde(default)]
    pub min_energy: Option<f32>,
    /// The animal must have at least one of these traits. Empty means any.
    #[serde(default)]
    pub personality: Vec<PersonalityTrait>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MasteryReward {
    BondPoints(f32),
    Ability(String),
    Cosmetic(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trick {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub category: TrickCategory,
    /// 1 (trivial) to 10 (expert).
    pub difficulty: u8,
    /// Per-species success rates in [0, 1].
    #[serde(default)]
    pub species_compatibility: Vec<(String, f32)>,
    #[serde(default = "default_compatibility")]
    pub default_compatibility: f32,
    #[serde(default)]
    pub requirements: TrickRequirements,
    pub phases: Vec<TeachingPhase>,
    /// Successful attempts needed to complete one phase.
    pub practice_attempts: u32,
    pub performance_value: u32,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub mastery_rewards: Vec<MasteryReward>,
}

fn default_compatibility() -> f32 {
    0.5
}

impl Trick {
    pub fn compatibility(&self, species: &str) -> f32 {
        self.species_compatibility
            .iter()
            .find(|(s, _)| s == species)
            .map(|(_, rate)| *rate)
            .unwrap_or(self.default_compatibility)
    }

    pub fn phase_index(&self, phase_id: &str) -> Option<usize> {
        self.phases.iter().position(|p| p.id == phase_id)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrickTable {
    pub tricks: Vec<Trick>,
}

impl TrickTable {
    pub fn builtin() -> Result<TrickTable, DataError> {
        Self::parse_ron(BUILTIN_TRICKS)
    }

    pub fn load_from_ron(path: &Path) -> Result<TrickTable, DataError> {
        Self::parse_ron(&table::read_source(path)?)
    }

    pub fn parse_ron(input: &str) -> Result<TrickTable, DataError> {
        let tricks: Vec<Trick> = table::parse_ron(input)?;
        table::ensure_unique(tricks.iter().map(|t| t.id.as_str()))?;
        Ok(TrickTable { tricks })
    }

    pub fn get(&self, id: &str) -> Option<&Trick> {
        self.tricks.iter().find(|t| t.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Trick> {
        self.tricks.iter()
    }
}
