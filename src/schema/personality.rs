use serde::{Deserialize, Serialize};

/// The trait vocabulary produced by the personality classifier.
///
/// Every per-animal modifier in the engines is derived from this enum with
/// an exhaustive `match`, so adding a trait forces each derivation to be
/// revisited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonalityTrait {
    Friendly,
    Shy,
    Playful,
    Curious,
    Calm,
    Energetic,
    Independent,
    Protective,
}

impl PersonalityTrait {
    pub const ALL: [PersonalityTrait; 8] = [
        Self::Friendly,
        Self::Shy,
        Self::Playful,
        Self::Curious,
        Self::Calm,
        Self::Energetic,
        Self::Independent,
        Self::Protective,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Friendly => "friendly",
            Self::Shy => "shy",
            Self::Playful => "playful",
            Self::Curious => "curious",
            Self::Calm => "calm",
            Self::Energetic => "energetic",
            Self::Independent => "independent",
            Self::Protective => "protective",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.name() == name.to_lowercase())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityLevel {
    Low,
    #[default]
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SocialPreference {
    Solitary,
    #[default]
    Neutral,
    Social,
}

/// Trait profile of one animal. Read once when a progress record is
/// created; later changes to the profile do not affect existing records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonalityProfile {
    pub primary: PersonalityTrait,
    #[serde(default)]
    pub secondary: Option<PersonalityTrait>,
    #[serde(default)]
    pub activity_level: ActivityLevel,
    #[serde(default)]
    pub social_preference: SocialPreference,
    /// Interaction ids this animal responds well to.
    #[serde(default)]
    pub preferred_interactions: Vec<String>,
}

impl PersonalityProfile {
    pub fn new(primary: PersonalityTrait) -> Self {
        Self {
            primary,
            secondary: None,
            activity_level: ActivityLevel::default(),
            social_preference: SocialPreference::default(),
            preferred_interactions: Vec::new(),
        }
    }

    pub fn with_secondary(mut self, secondary: PersonalityTrait) -> Self {
        self.secondary = Some(secondary);
        self
    }

    pub fn with_activity_level(mut self, level: ActivityLevel) -> Self {
        self.activity_level = level;
        self
    }

    pub fn with_social_preference(mut self, pref: SocialPreference) -> Self {
        self.social_preference = pref;
        self
    }

    pub fn preferring(mut self, interaction_id: &str) -> Self {
        self.preferred_interactions.push(interaction_id.to_string());
        self
    }

    /// True if either the primary or the secondary trait is `t`.
    pub fn has_trait(&self, t: PersonalityTrait) -> bool {
        self.primary == t || self.secondary == Some(t)
    }

    pub fn prefers(&self, interaction_id: &str) -> bool {
        self.preferred_interactions.iter().any(|i| i == interaction_id)
    }
}
