/// Bonding — long-lived relationship progress, milestones, companion
/// abilities and passive decay.
///
/// The bond level is never assigned directly: after every change to points
/// or time together it is re-derived with [`BondLevel::resolve`].
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::rc::Rc;
use thiserror::Error;

use crate::core::clock::{Clock, SystemClock, MINUTE_MS};
use crate::core::events::{EventBus, SubscriptionId};
use crate::core::gate::Gate;
use crate::core::scheduler::IntervalScheduler;
use crate::core::store::{self, MemoryStore, Store};
use crate::schema::animal::{Animal, AnimalId};
use crate::schema::bond::{
    AbilityKind, BondLevel, BondingTable, CompanionAbility, ExperienceType, MilestoneDefinition,
    MilestoneRewards, RequirementKind,
};
use crate::schema::personality::{PersonalityProfile, PersonalityTrait, SocialPreference};
use crate::schema::table::DataError;

pub const BONDING_STORE_KEY: &str = "bonding-progress";

#[derive(Debug, Error)]
pub enum BondingError {
    #[error("no bonding progress for {0}")]
    NoProgress(AnimalId),
    #[error("unknown ability: {0}")]
    UnknownAbility(String),
    #[error("ability '{ability}' unavailable: {reason}")]
    AbilityUnavailable { ability: String, reason: String },
    #[error("data error: {0}")]
    Data(#[from] DataError),
}

/// Tunables for passive decay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BondingConfig {
    pub sweep_interval_ms: u64,
    /// Bonds idle for longer than this start to decay.
    pub stale_after_ms: u64,
    pub max_points: f32,
}

impl Default for BondingConfig {
    fn default() -> Self {
        Self {
            sweep_interval_ms: MINUTE_MS,
            stale_after_ms: 5 * MINUTE_MS,
            max_points: 1000.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BondingStyle {
    SlowSteady,
    ActivityBased,
    Emotional,
    TrustBased,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BondingPreferences {
    pub style: BondingStyle,
    pub preferred_activities: Vec<ExperienceType>,
}

impl BondingPreferences {
    pub fn from_personality(personality: &PersonalityProfile) -> Self {
        let (style, mut preferred_activities) = style_for(personality.primary);
        if let Some(secondary) = personality.secondary {
            for activity in style_for(secondary).1 {
                if !preferred_activities.contains(&activity) {
                    preferred_activities.push(activity);
                }
            }
        }
        Self {
            style,
            preferred_activities,
        }
    }

    /// Scale applied to positive point gains.
    pub fn multiplier(&self, experience: Option<ExperienceType>) -> f32 {
        match self.style {
            BondingStyle::SlowSteady => 0.8,
            BondingStyle::ActivityBased => match experience {
                Some(e) if self.preferred_activities.contains(&e) => 1.3,
                _ => 1.0,
            },
            BondingStyle::Emotional => match experience {
                Some(ExperienceType::Comfort) | Some(ExperienceType::Learning) => 1.2,
                _ => 1.0,
            },
            BondingStyle::TrustBased => 1.1,
        }
    }
}

fn style_for(t: PersonalityTrait) -> (BondingStyle, Vec<ExperienceType>) {
    use ExperienceType::*;
    match t {
        PersonalityTrait::Friendly => (BondingStyle::TrustBased, vec![Play, Comfort, Feeding]),
        PersonalityTrait::Shy => (BondingStyle::SlowSteady, vec![Comfort, Grooming]),
        PersonalityTrait::Playful => (BondingStyle::ActivityBased, vec![Play, Exploration, Performance]),
        PersonalityTrait::Curious => (BondingStyle::ActivityBased, vec![Exploration, Learning]),
        PersonalityTrait::Calm => (BondingStyle::Emotional, vec![Comfort, Grooming]),
        PersonalityTrait::Energetic => (BondingStyle::ActivityBased, vec![Play, Exploration]),
        PersonalityTrait::Independent => (BondingStyle::SlowSteady, vec![Exploration]),
        PersonalityTrait::Protective => (BondingStyle::TrustBased, vec![Comfort, Feeding]),
    }
}

/// Bond points lost per idle minute.
pub fn decay_rate_for(personality: &PersonalityProfile) -> f32 {
    let base = match personality.primary {
        PersonalityTrait::Friendly => 0.5,
        PersonalityTrait::Shy => 0.3,
        PersonalityTrait::Playful => 0.8,
        PersonalityTrait::Curious => 0.6,
        PersonalityTrait::Calm => 0.3,
        PersonalityTrait::Energetic => 1.0,
        PersonalityTrait::Independent => 1.2,
        PersonalityTrait::Protective => 0.4,
    };
    let social = match personality.social_preference {
        SocialPreference::Solitary => 0.8,
        SocialPreference::Neutral => 1.0,
        SocialPreference::Social => 1.2,
    };
    base * social
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedExperience {
    pub id: String,
    pub experience_type: ExperienceType,
    pub description: String,
    pub bond_points: f32,
    /// -1 (distressing) to 1 (deeply moving). Informational.
    pub emotional_impact: f32,
    pub timestamp: u64,
}

impl SharedExperience {
    pub fn new(id: &str, experience_type: ExperienceType, description: &str, bond_points: f32) -> Self {
        Self {
            id: id.to_string(),
            experience_type,
            description: description.to_string(),
            bond_points,
            emotional_impact: 0.5,
            timestamp: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MilestoneRequirement {
    pub kind: RequirementKind,
    pub target: f32,
    pub current: f32,
}

impl MilestoneRequirement {
    pub fn is_met(&self) -> bool {
        self.current >= self.target
    }
}

/// Per-animal copy of a milestone with live requirement counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BondingMilestone {
    pub id: String,
    pub name: String,
    pub description: String,
    pub required_level: BondLevel,
    pub requirements: Vec<MilestoneRequirement>,
    pub rewards: MilestoneRewards,
    pub achieved: bool,
    pub achieved_at: Option<u64>,
}

impl BondingMilestone {
    fn from_definition(def: &MilestoneDefinition) -> Self {
        Self {
            id: def.id.clone(),
            name: def.name.clone(),
            description: def.description.clone(),
            required_level: def.required_level,
            requirements: def
                .requirements
                .iter()
                .map(|r| MilestoneRequirement {
                    kind: r.kind,
                    target: r.target,
                    current: 0.0,
                })
                .collect(),
            rewards: def.rewards.clone(),
            achieved: false,
            achieved_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipEventKind {
    BondIncrease,
    BondDecrease,
    LevelUp,
    SharedExperience,
    MilestoneAchieved,
    AbilityUnlocked,
    AbilityUsed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipEvent {
    pub kind: RelationshipEventKind,
    pub timestamp: u64,
    pub points_delta: f32,
    pub level: BondLevel,
    pub description: String,
}

/// Per-animal bonding record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BondingProgress {
    pub animal_id: AnimalId,
    pub current_bond_level: BondLevel,
    pub bond_points: f32,
    pub time_spent_together_ms: u64,
    pub shared_experiences: Vec<SharedExperience>,
    pub milestones: Vec<BondingMilestone>,
    pub relationship_history: Vec<RelationshipEvent>,
    pub bond_decay_rate: f32,
    pub bonding_preferences: BondingPreferences,
    pub unlocked_abilities: Vec<String>,
    pub knowledge: Vec<String>,
    pub ability_cooldowns: FxHashMap<String, u64>,
    pub activities_completed: u32,
    pub last_known_trust: f32,
    pub created_at: u64,
    pub last_bonding_activity: u64,
    /// Time up to which decay has already been charged.
    pub decay_checkpoint: u64,
}

impl BondingProgress {
    fn record(&mut self, kind: RelationshipEventKind, now: u64, points_delta: f32, description: String) {
        self.relationship_history.push(RelationshipEvent {
            kind,
            timestamp: now,
            points_delta,
            level: self.current_bond_level,
            description,
        });
    }

    fn unlock(&mut self, ability: &str, now: u64, unlocked: &mut Vec<String>) {
        if self.unlocked_abilities.iter().any(|a| a == ability) {
            return;
        }
        self.unlocked_abilities.push(ability.to_string());
        self.record(
            RelationshipEventKind::AbilityUnlocked,
            now,
            0.0,
            format!("unlocked {}", ability),
        );
        unlocked.push(ability.to_string());
    }
}

/// Result of any call that changes bond points.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BondPointsOutcome {
    pub points_awarded: f32,
    pub level_up: bool,
    pub new_level: Option<BondLevel>,
    pub milestones_achieved: Vec<String>,
    pub abilities_unlocked: Vec<String>,
}

impl BondPointsOutcome {
    /// Fold a later outcome into this one.
    pub fn merge(&mut self, later: BondPointsOutcome) {
        self.points_awarded += later.points_awarded;
        self.level_up |= later.level_up;
        if later.new_level.is_some() {
            self.new_level = later.new_level;
        }
        self.milestones_achieved.extend(later.milestones_achieved);
        self.abilities_unlocked.extend(later.abilities_unlocked);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbilityUse {
    pub animal_id: AnimalId,
    pub ability_id: String,
    pub used_at: u64,
    pub cooldown_until: u64,
    pub effect: String,
    pub magnitude: f32,
}

/// Points removed from one animal by a maintenance sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecayReport {
    pub animal_id: AnimalId,
    pub points_lost: f32,
    pub bond_points: f32,
    pub level: BondLevel,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BondingEvent {
    BondLevelUp {
        animal_id: AnimalId,
        from: BondLevel,
        to: BondLevel,
    },
    MilestoneAchieved {
        animal_id: AnimalId,
        milestone_id: String,
    },
    AbilityUnlocked {
        animal_id: AnimalId,
        ability_id: String,
    },
    BondDecay(DecayReport),
}

/// Builder for constructing a `BondingEngine`.
pub struct BondingEngineBuilder {
    table: Option<BondingTable>,
    table_path: Option<String>,
    config: BondingConfig,
    store: Option<Rc<dyn Store>>,
    clock: Option<Rc<dyn Clock>>,
}

impl BondingEngineBuilder {
    /// Provide the bonding table directly (for testing without files).
    pub fn with_table(mut self, table: BondingTable) -> Self {
        self.table = Some(table);
        self
    }

    /// Load the bonding table from a RON file instead of the built-in one.
    pub fn table_path(mut self, path: &str) -> Self {
        self.table_path = Some(path.to_string());
        self
    }

    pub fn config(mut self, config: BondingConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store(mut self, store: Rc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn clock(mut self, clock: Rc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> Result<BondingEngine, BondingError> {
        let table = match (self.table, self.table_path) {
            (Some(table), _) => table,
            (None, Some(path)) => BondingTable::load_from_ron(Path::new(&path))?,
            (None, None) => BondingTable::builtin()?,
        };

        let store: Rc<dyn Store> = match self.store {
            Some(store) => store,
            None => Rc::new(MemoryStore::new()),
        };
        let clock: Rc<dyn Clock> = match self.clock {
            Some(clock) => clock,
            None => Rc::new(SystemClock),
        };

        let progress = match store::load_records::<AnimalId, BondingProgress>(&*store, BONDING_STORE_KEY) {
            Ok(records) => records.into_iter().collect(),
            Err(e) => {
                log::warn!("could not load bonding progress, starting fresh: {}", e);
                FxHashMap::default()
            }
        };

        let mut scheduler = IntervalScheduler::new(self.config.sweep_interval_ms);
        scheduler.start(clock.now_ms());

        Ok(BondingEngine {
            scheduler,
            table,
            config: self.config,
            progress,
            store,
            clock,
            events: EventBus::new(),
        })
    }
}

/// Accumulates bond points, derives bond levels and runs passive decay.
/// Built via `BondingEngine::builder()`.
pub struct BondingEngine {
    table: BondingTable,
    config: BondingConfig,
    progress: FxHashMap<AnimalId, BondingProgress>,
    scheduler: IntervalScheduler,
    store: Rc<dyn Store>,
    clock: Rc<dyn Clock>,
    events: EventBus<BondingEvent>,
}

/// Side effects collected while re-deriving level and milestones, emitted
/// once the progress borrow is released.
#[derive(Default)]
struct Reevaluation {
    level_change: Option<(BondLevel, BondLevel)>,
    milestones: Vec<String>,
    abilities: Vec<String>,
}

impl BondingEngine {
    pub fn builder() -> BondingEngineBuilder {
        BondingEngineBuilder {
            table: None,
            table_path: None,
            config: BondingConfig::default(),
            store: None,
            clock: None,
        }
    }

    pub fn table(&self) -> &BondingTable {
        &self.table
    }

    pub fn config(&self) -> &BondingConfig {
        &self.config
    }

    pub fn subscribe<F>(&mut self, handler: F) -> SubscriptionId
    where
        F: FnMut(&BondingEvent) + 'static,
    {
        self.events.subscribe(handler)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    pub fn on_bond_level_up<F>(&mut self, mut handler: F) -> SubscriptionId
    where
        F: FnMut(AnimalId, BondLevel, BondLevel) + 'static,
    {
        self.events.subscribe(move |e| {
            if let BondingEvent::BondLevelUp { animal_id, from, to } = e {
                handler(*animal_id, *from, *to);
            }
        })
    }

    pub fn on_milestone_achieved<F>(&mut self, mut handler: F) -> SubscriptionId
    where
        F: FnMut(AnimalId, &str) + 'static,
    {
        self.events.subscribe(move |e| {
            if let BondingEvent::MilestoneAchieved { animal_id, milestone_id } = e {
                handler(*animal_id, milestone_id);
            }
        })
    }

    pub fn on_ability_unlocked<F>(&mut self, mut handler: F) -> SubscriptionId
    where
        F: FnMut(AnimalId, &str) + 'static,
    {
        self.events.subscribe(move |e| {
            if let BondingEvent::AbilityUnlocked { animal_id, ability_id } = e {
                handler(*animal_id, ability_id);
            }
        })
    }

    pub fn on_bond_decay<F>(&mut self, mut handler: F) -> SubscriptionId
    where
        F: FnMut(&DecayReport) + 'static,
    {
        self.events.subscribe(move |e| {
            if let BondingEvent::BondDecay(report) = e {
                handler(report);
            }
        })
    }

    /// Create the animal's bonding record, deriving decay rate and bonding
    /// preferences from `personality`. An existing record is returned as is.
    pub fn initialize_bonding(&mut self, animal: &Animal, personality: &PersonalityProfile) -> BondingProgress {
        if let Some(existing) = self.progress.get(&animal.id) {
            return existing.clone();
        }

        let now = self.clock.now_ms();
        let progress = BondingProgress {
            animal_id: animal.id,
            current_bond_level: BondLevel::Stranger,
            bond_points: 0.0,
            time_spent_together_ms: 0,
            shared_experiences: Vec::new(),
            milestones: self
                .table
                .milestones
                .iter()
                .map(BondingMilestone::from_definition)
                .collect(),
            relationship_history: Vec::new(),
            bond_decay_rate: decay_rate_for(personality),
            bonding_preferences: BondingPreferences::from_personality(personality),
            unlocked_abilities: Vec::new(),
            knowledge: Vec::new(),
            ability_cooldowns: FxHashMap::default(),
            activities_completed: 0,
            last_known_trust: animal.stats.trust.clamp(0.0, 100.0),
            created_at: now,
            last_bonding_activity: now,
            decay_checkpoint: now,
        };
        log::debug!(
            "bonding initialised for {}: style {:?}, decay {:.2}/min",
            animal.id,
            progress.bonding_preferences.style,
            progress.bond_decay_rate
        );
        self.progress.insert(animal.id, progress.clone());
        self.persist();
        progress
    }

    /// Add (or, with a negative value, remove) bond points. Positive gains
    /// are scaled by the animal's bonding style.
    pub fn add_bond_points(
        &mut self,
        animal_id: AnimalId,
        points: f32,
        reason: &str,
        experience: Option<ExperienceType>,
    ) -> Result<BondPointsOutcome, BondingError> {
        let now = self.clock.now_ms();
        let max_points = self.config.max_points;
        let progress = self
            .progress
            .get_mut(&animal_id)
            .ok_or(BondingError::NoProgress(animal_id))?;

        let scaled = if points > 0.0 {
            points * progress.bonding_preferences.multiplier(experience)
        } else {
            points
        };
        let before = progress.bond_points;
        progress.bond_points = (before + scaled).clamp(0.0, max_points);
        let applied = progress.bond_points - before;

        if experience.is_some() {
            progress.activities_completed += 1;
        }
        progress.last_bonding_activity = now;
        progress.decay_checkpoint = now;

        let kind = if applied >= 0.0 {
            RelationshipEventKind::BondIncrease
        } else {
            RelationshipEventKind::BondDecrease
        };
        progress.record(kind, now, applied, reason.to_string());

        let outcome = self.reevaluate_and_emit(animal_id, now, applied);
        self.persist();
        Ok(outcome)
    }

    /// Record a shared experience and award its bond points.
    pub fn add_shared_experience(
        &mut self,
        animal_id: AnimalId,
        mut experience: SharedExperience,
    ) -> Result<BondPointsOutcome, BondingError> {
        let now = self.clock.now_ms();
        let progress = self
            .progress
            .get_mut(&animal_id)
            .ok_or(BondingError::NoProgress(animal_id))?;

        if experience.timestamp == 0 {
            experience.timestamp = now;
        }
        let points = experience.bond_points;
        let kind = experience.experience_type;
        let description = experience.description.clone();
        progress.record(
            RelationshipEventKind::SharedExperience,
            now,
            0.0,
            description.clone(),
        );
        progress.shared_experiences.push(experience);

        self.add_bond_points(animal_id, points, &description, Some(kind))
    }

    /// Accumulate time together. Every full minute crossed earns one point.
    pub fn update_time_spent_together(
        &mut self,
        animal_id: AnimalId,
        elapsed_ms: u64,
    ) -> Result<BondPointsOutcome, BondingError> {
        let now = self.clock.now_ms();
        let max_points = self.config.max_points;
        let progress = self
            .progress
            .get_mut(&animal_id)
            .ok_or(BondingError::NoProgress(animal_id))?;

        let before_ms = progress.time_spent_together_ms;
        progress.time_spent_together_ms = before_ms.saturating_add(elapsed_ms);
        let minutes = progress.time_spent_together_ms / MINUTE_MS - before_ms / MINUTE_MS;

        let before = progress.bond_points;
        progress.bond_points = (before + minutes as f32).clamp(0.0, max_points);
        let applied = progress.bond_points - before;
        progress.last_bonding_activity = now;
        progress.decay_checkpoint = now;
        if applied > 0.0 {
            progress.record(
                RelationshipEventKind::BondIncrease,
                now,
                applied,
                format!("{} minutes together", minutes),
            );
        }

        let outcome = self.reevaluate_and_emit(animal_id, now, applied);
        self.persist();
        Ok(outcome)
    }

    /// Mirror the latest trust value so trust milestones can be evaluated.
    pub fn record_trust(&mut self, animal_id: AnimalId, trust: f32) -> Result<BondPointsOutcome, BondingError> {
        let now = self.clock.now_ms();
        let progress = self
            .progress
            .get_mut(&animal_id)
            .ok_or(BondingError::NoProgress(animal_id))?;
        progress.last_known_trust = trust.clamp(0.0, 100.0);

        let outcome = self.reevaluate_and_emit(animal_id, now, 0.0);
        self.persist();
        Ok(outcome)
    }

    pub fn get_bonding_progress(&self, animal_id: AnimalId) -> Option<&BondingProgress> {
        self.progress.get(&animal_id)
    }

    pub fn get_bond_level(&self, animal_id: AnimalId) -> Option<BondLevel> {
        self.progress.get(&animal_id).map(|p| p.current_bond_level)
    }

    /// Abilities whose level requirement is met at `level`.
    pub fn get_available_abilities(&self, level: BondLevel) -> Vec<&CompanionAbility> {
        self.table.abilities_for(level)
    }

    pub fn can_use_ability(&self, animal_id: AnimalId, ability_id: &str) -> Gate {
        let progress = match self.progress.get(&animal_id) {
            Some(p) => p,
            None => return Gate::deny("No bond with this animal yet"),
        };
        let ability = match self.table.ability(ability_id) {
            Some(a) => a,
            None => return Gate::deny(format!("Unknown ability '{}'", ability_id)),
        };
        if progress.current_bond_level < ability.required_level {
            return Gate::deny(format!(
                "{} requires a {} bond",
                ability.name,
                ability.required_level.name()
            ));
        }
        if !progress.unlocked_abilities.iter().any(|a| a == ability_id) {
            return Gate::deny(format!("{} has not been unlocked", ability.name));
        }
        if ability.kind == AbilityKind::Passive {
            return Gate::deny(format!("{} is always active", ability.name));
        }
        let now = self.clock.now_ms();
        if let Some(until) = progress.ability_cooldowns.get(ability_id) {
            if now < *until {
                let secs = (until - now).div_ceil(1000);
                return Gate::deny(format!("{} is recovering for {}s", ability.name, secs));
            }
        }
        Gate::allow()
    }

    pub fn use_ability(&mut self, animal_id: AnimalId, ability_id: &str) -> Result<AbilityUse, BondingError> {
        let ability = self
            .table
            .ability(ability_id)
            .cloned()
            .ok_or_else(|| BondingError::UnknownAbility(ability_id.to_string()))?;
        if !self.progress.contains_key(&animal_id) {
            return Err(BondingError::NoProgress(animal_id));
        }
        let gate = self.can_use_ability(animal_id, ability_id);
        if !gate.allowed {
            return Err(BondingError::AbilityUnavailable {
                ability: ability_id.to_string(),
                reason: gate.reason.unwrap_or_default(),
            });
        }

        let now = self.clock.now_ms();
        let cooldown_until = now.saturating_add(ability.cooldown_ms);
        let progress = self
            .progress
            .get_mut(&animal_id)
            .ok_or(BondingError::NoProgress(animal_id))?;
        progress
            .ability_cooldowns
            .insert(ability.id.clone(), cooldown_until);
        progress.last_bonding_activity = now;
        progress.decay_checkpoint = now;
        progress.record(
            RelationshipEventKind::AbilityUsed,
            now,
            0.0,
            format!("used {}", ability.name),
        );
        log::debug!("{} used {}", animal_id, ability.id);
        self.persist();

        Ok(AbilityUse {
            animal_id,
            ability_id: ability.id,
            used_at: now,
            cooldown_until,
            effect: ability.effect,
            magnitude: ability.magnitude,
        })
    }

    /// Drive the periodic maintenance sweep. Runs at most once per sweep
    /// interval; returns the decay applied, if any ran.
    pub fn tick(&mut self, now: u64) -> Vec<DecayReport> {
        if !self.scheduler.poll(now) {
            return Vec::new();
        }
        self.run_maintenance(now)
    }

    /// Apply decay to every bond idle for longer than the staleness
    /// threshold: `floor(rate * idle minutes)` points per animal.
    pub fn run_maintenance(&mut self, now: u64) -> Vec<DecayReport> {
        let stale_after = self.config.stale_after_ms;
        let mut decayed = Vec::new();

        let mut ids: Vec<AnimalId> = self.progress.keys().copied().collect();
        ids.sort();
        for animal_id in ids {
            let Some(progress) = self.progress.get_mut(&animal_id) else {
                continue;
            };
            if now.saturating_sub(progress.last_bonding_activity) <= stale_after {
                continue;
            }
            let since = progress.decay_checkpoint.max(progress.last_bonding_activity);
            let minutes = now.saturating_sub(since) / MINUTE_MS;
            let loss = (progress.bond_decay_rate * minutes as f32).floor();
            if loss <= 0.0 {
                continue;
            }
            progress.decay_checkpoint = since + minutes * MINUTE_MS;

            let before = progress.bond_points;
            progress.bond_points = (before - loss).max(0.0);
            let lost = before - progress.bond_points;
            if lost <= 0.0 {
                continue;
            }
            progress.record(
                RelationshipEventKind::BondDecrease,
                now,
                -lost,
                format!("bond decay after {} idle minutes", minutes),
            );

            self.reevaluate_and_emit(animal_id, now, -lost);
            if let Some(progress) = self.progress.get(&animal_id) {
                let report = DecayReport {
                    animal_id,
                    points_lost: lost,
                    bond_points: progress.bond_points,
                    level: progress.current_bond_level,
                };
                log::debug!("{} lost {} bond points to decay", animal_id, lost);
                self.events.emit(&BondingEvent::BondDecay(report.clone()));
                decayed.push(report);
            }
        }

        if !decayed.is_empty() {
            self.persist();
        }
        decayed
    }

    fn reevaluate_and_emit(&mut self, animal_id: AnimalId, now: u64, applied: f32) -> BondPointsOutcome {
        let Some(progress) = self.progress.get_mut(&animal_id) else {
            return BondPointsOutcome::default();
        };
        let change = reevaluate(progress, &self.table, now);

        let mut outcome = BondPointsOutcome {
            points_awarded: applied,
            ..BondPointsOutcome::default()
        };
        if let Some((from, to)) = change.level_change {
            if to > from {
                log::info!("{} bond level up: {} -> {}", animal_id, from.name(), to.name());
                outcome.level_up = true;
                outcome.new_level = Some(to);
                self.events
                    .emit(&BondingEvent::BondLevelUp { animal_id, from, to });
            }
        }
        for milestone_id in &change.milestones {
            log::info!("{} achieved milestone {}", animal_id, milestone_id);
            self.events.emit(&BondingEvent::MilestoneAchieved {
                animal_id,
                milestone_id: milestone_id.clone(),
            });
        }
        for ability_id in &change.abilities {
            self.events.emit(&BondingEvent::AbilityUnlocked {
                animal_id,
                ability_id: ability_id.clone(),
            });
        }
        outcome.milestones_achieved = change.milestones;
        outcome.abilities_unlocked = change.abilities;
        outcome
    }

    fn persist(&self) {
        let mut records: Vec<(AnimalId, &BondingProgress)> =
            self.progress.iter().map(|(id, p)| (*id, p)).collect();
        records.sort_by_key(|(id, _)| *id);
        if let Err(e) = store::save_records(&*self.store, BONDING_STORE_KEY, &records) {
            log::warn!("failed to persist bonding progress: {}", e);
        }
    }
}

/// Re-derive the level from (points, time), grant level abilities, and
/// evaluate milestones. Downward level changes are only recorded in
/// history; milestones never revert.
fn reevaluate(progress: &mut BondingProgress, table: &BondingTable, now: u64) -> Reevaluation {
    let mut change = Reevaluation::default();

    let from = progress.current_bond_level;
    let to = BondLevel::resolve(progress.bond_points, progress.time_spent_together_ms, &table.levels);
    if to != from {
        progress.current_bond_level = to;
        change.level_change = Some((from, to));
        if to > from {
            progress.record(
                RelationshipEventKind::LevelUp,
                now,
                0.0,
                format!("became {}", to.name()),
            );
            for info in table.levels.iter().filter(|l| l.level > from && l.level <= to) {
                for ability in &info.abilities {
                    progress.unlock(ability, now, &mut change.abilities);
                }
            }
        } else {
            progress.record(
                RelationshipEventKind::BondDecrease,
                now,
                0.0,
                format!("bond weakened to {}", to.name()),
            );
        }
    }

    let shared = progress.shared_experiences.len() as f32;
    let activities = progress.activities_completed as f32;
    let time = progress.time_spent_together_ms as f32;
    let trust = progress.last_known_trust;
    let level = progress.current_bond_level;

    let mut newly_achieved: Vec<usize> = Vec::new();
    for (idx, milestone) in progress.milestones.iter_mut().enumerate() {
        if milestone.achieved {
            continue;
        }
        for req in milestone.requirements.iter_mut() {
            req.current = match req.kind {
                RequirementKind::TimeSpent => time,
                RequirementKind::SharedExperiences => shared,
                RequirementKind::ActivitiesCompleted => activities,
                RequirementKind::TrustLevel => trust,
            };
        }
        if level >= milestone.required_level && milestone.requirements.iter().all(|r| r.is_met()) {
            milestone.achieved = true;
            milestone.achieved_at = Some(now);
            newly_achieved.push(idx);
        }
    }

    for idx in newly_achieved {
        let milestone = progress.milestones[idx].clone();
        progress.record(
            RelationshipEventKind::MilestoneAchieved,
            now,
            0.0,
            format!("achieved {}", milestone.name),
        );
        for ability in &milestone.rewards.abilities {
            progress.unlock(ability, now, &mut change.abilities);
        }
        for fact in &milestone.rewards.knowledge {
            if !progress.knowledge.contains(fact) {
                progress.knowledge.push(fact.clone());
            }
        }
        change.milestones.push(milestone.id);
    }

    change
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::personality::ActivityLevel;

    #[test]
    fn decay_rates_follow_personality() {
        let friendly = PersonalityProfile::new(PersonalityTrait::Friendly);
        assert_eq!(decay_rate_for(&friendly), 0.5);
        let social = friendly.clone().with_social_preference(SocialPreference::Social);
        assert!((decay_rate_for(&social) - 0.6).abs() < 1e-6);
        let lone = PersonalityProfile::new(PersonalityTrait::Independent)
            .with_social_preference(SocialPreference::Solitary)
            .with_activity_level(ActivityLevel::High);
        assert!((decay_rate_for(&lone) - 0.96).abs() < 1e-6);
    }

    #[test]
    fn style_multipliers() {
        let shy = BondingPreferences::from_personality(&PersonalityProfile::new(PersonalityTrait::Shy));
        assert_eq!(shy.multiplier(Some(ExperienceType::Comfort)), 0.8);

        let playful = BondingPreferences::from_personality(&PersonalityProfile::new(PersonalityTrait::Playful));
        assert_eq!(playful.multiplier(Some(ExperienceType::Play)), 1.3);
        assert_eq!(playful.multiplier(Some(ExperienceType::Grooming)), 1.0);
        assert_eq!(playful.multiplier(None), 1.0);

        let calm = BondingPreferences::from_personality(&PersonalityProfile::new(PersonalityTrait::Calm));
        assert_eq!(calm.multiplier(Some(ExperienceType::Learning)), 1.2);
        assert_eq!(calm.multiplier(Some(ExperienceType::Play)), 1.0);

        let friendly = BondingPreferences::from_personality(&PersonalityProfile::new(PersonalityTrait::Friendly));
        assert_eq!(friendly.multiplier(None), 1.1);
    }

    #[test]
    fn secondary_trait_adds_preferred_activities() {
        let p = PersonalityProfile::new(PersonalityTrait::Curious).with_secondary(PersonalityTrait::Shy);
        let prefs = BondingPreferences::from_personality(&p);
        assert_eq!(prefs.style, BondingStyle::ActivityBased);
        assert!(prefs.preferred_activities.contains(&ExperienceType::Exploration));
        assert!(prefs.preferred_activities.contains(&ExperienceType::Grooming));
    }

    fn bare_progress(table: &BondingTable) -> BondingProgress {
        BondingProgress {
            animal_id: AnimalId(1),
            current_bond_level: BondLevel::Stranger,
            bond_points: 0.0,
            time_spent_together_ms: 0,
            shared_experiences: Vec::new(),
            milestones: table.milestones.iter().map(BondingMilestone::from_definition).collect(),
            relationship_history: Vec::new(),
            bond_decay_rate: 0.5,
            bonding_preferences: BondingPreferences::from_personality(&PersonalityProfile::new(
                PersonalityTrait::Calm,
            )),
            unlocked_abilities: Vec::new(),
            knowledge: Vec::new(),
            ability_cooldowns: FxHashMap::default(),
            activities_completed: 0,
            last_known_trust: 0.0,
            created_at: 0,
            last_bonding_activity: 0,
            decay_checkpoint: 0,
        }
    }

    #[test]
    fn reevaluate_levels_up_and_unlocks_every_crossed_level() {
        let table = BondingTable::builtin().unwrap();
        let mut p = bare_progress(&table);
        p.bond_points = 320.0;
        p.time_spent_together_ms = 2_000_000;
        let change = reevaluate(&mut p, &table, 10);
        assert_eq!(change.level_change, Some((BondLevel::Stranger, BondLevel::Friend)));
        assert!(change.abilities.contains(&"keen_senses".to_string()));
        assert!(change.abilities.contains(&"follow_me".to_string()));
        assert_eq!(p.current_bond_level, BondLevel::Friend);
    }

    #[test]
    fn reevaluate_records_level_down_without_touching_milestones() {
        let table = BondingTable::builtin().unwrap();
        let mut p = bare_progress(&table);
        p.bond_points = 150.0;
        p.time_spent_together_ms = 400_000;
        p.shared_experiences.push(SharedExperience::new("walk", ExperienceType::Exploration, "walk", 5.0));
        let first = reevaluate(&mut p, &table, 1);
        assert!(first.milestones.contains(&"first_steps".to_string()));

        p.bond_points = 90.0;
        let second = reevaluate(&mut p, &table, 2);
        assert_eq!(second.level_change, Some((BondLevel::Acquaintance, BondLevel::Stranger)));
        assert!(second.milestones.is_empty());
        let first_steps = p.milestones.iter().find(|m| m.id == "first_steps").unwrap();
        assert!(first_steps.achieved);
        assert_eq!(
            p.relationship_history.last().map(|e| e.kind),
            Some(RelationshipEventKind::BondDecrease)
        );
    }
}
