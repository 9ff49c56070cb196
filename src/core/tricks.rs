/// Trick learning — phased teaching, gesture evaluation and performances.
///
/// A trick is taught one phase at a time. Each successful gesture adds
/// `1 / practice_attempts` to the phase's progress; a full phase
/// advances to the next one, and finishing the last phase marks the trick
/// learned. Learned tricks can then be performed for points and mastery.
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::rc::Rc;
use thiserror::Error;

use crate::core::bonding::{BondPointsOutcome, BondingEngine};
use crate::core::clock::{Clock, SystemClock};
use crate::core::events::{EventBus, SubscriptionId};
use crate::core::store::{self, MemoryStore, Store};
use crate::schema::animal::{Animal, AnimalId};
use crate::schema::bond::{BondLevel, ExperienceType};
use crate::schema::personality::{ActivityLevel, PersonalityProfile, PersonalityTrait};
use crate::schema::table::DataError;
use crate::schema::trick::{GestureInput, MasteryReward, TeachingPhase, Trick, TrickTable};

pub const TRICK_STORE_KEY: &str = "trick-learning-progress";

const MIN_COMPATIBILITY: f32 = 0.1;
const MASTERY_QUALITY: f32 = 0.8;
const BOND_QUALITY: f32 = 0.7;
const MAX_MASTERY: f32 = 100.0;
const PROGRESS_EPSILON: f32 = 1e-6;

#[derive(Debug, Error)]
pub enum TrickError {
    #[error("unknown trick: {0}")]
    UnknownTrick(String),
    #[error("{animal} is not learning '{trick}'")]
    NoProgress { animal: AnimalId, trick: String },
    #[error("'{trick}' is already learned by {animal}")]
    AlreadyLearned { animal: AnimalId, trick: String },
    #[error("'{trick}' has no phase '{phase}'")]
    InvalidPhase { trick: String, phase: String },
    #[error("data error: {0}")]
    Data(#[from] DataError),
}

/// Per-animal learning adjustments, derived once from personality.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LearningModifiers {
    /// Added to each phase's accuracy threshold.
    pub difficulty_adjustment: f32,
    /// How quickly the animal picks things up. Shown to the player; the
    /// number of successes a phase needs is fixed by the trick.
    pub learning_speed: f32,
    /// Subtracted from each phase's accuracy threshold.
    pub gesture_tolerance: f32,
}

impl LearningModifiers {
    pub fn from_personality(personality: &PersonalityProfile) -> Self {
        let (difficulty_adjustment, speed, gesture_tolerance) = match personality.primary {
            PersonalityTrait::Friendly => (0.0, 1.0, 0.05),
            PersonalityTrait::Shy => (0.05, 0.9, 0.1),
            PersonalityTrait::Playful => (-0.05, 1.2, 0.05),
            PersonalityTrait::Curious => (-0.05, 1.2, 0.0),
            PersonalityTrait::Calm => (0.0, 1.0, 0.1),
            PersonalityTrait::Energetic => (0.05, 1.1, 0.0),
            PersonalityTrait::Independent => (0.1, 0.8, 0.0),
            PersonalityTrait::Protective => (0.0, 0.9, 0.05),
        };
        let activity = match personality.activity_level {
            ActivityLevel::Low => 0.9,
            ActivityLevel::Medium => 1.0,
            ActivityLevel::High => 1.1,
        };
        Self {
            difficulty_adjustment,
            learning_speed: speed * activity,
            gesture_tolerance,
        }
    }

    /// Accuracy a gesture needs for a phase requiring `required`.
    pub fn threshold(&self, required: f32) -> f32 {
        (required + self.difficulty_adjustment - self.gesture_tolerance).clamp(0.05, 1.0)
    }
}

/// Teaching state of one trick for one animal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrickLearningProgress {
    pub trick_id: String,
    pub current_phase: String,
    pub phase_index: usize,
    /// 0..=1 progress through the current phase.
    pub phase_progress: f32,
    pub phase_attempts: u32,
    pub phase_successes: u32,
    pub total_attempts: u32,
    pub successful_attempts: u32,
    pub mastery_level: f32,
    pub is_learned: bool,
    pub is_mastered: bool,
    pub modifiers: LearningModifiers,
    /// Sum of the accuracy of every successful gesture.
    pub success_accuracy_sum: f32,
    pub started_at: u64,
    pub last_attempt_at: Option<u64>,
}

/// A trick the animal knows and can perform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnedTrick {
    pub trick_id: String,
    pub learned_at: u64,
    pub times_performed: u32,
    /// Running average of performance quality.
    pub average_quality: f32,
    pub best_quality: f32,
    pub mastery_level: f32,
    pub is_mastered: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrickAttempt {
    pub trick_id: String,
    pub phase_id: String,
    pub accuracy: f32,
    pub threshold: f32,
    pub success: bool,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudienceReaction {
    Poor,
    Good,
    Excellent,
    Spectacular,
}

impl AudienceReaction {
    pub fn for_quality(quality: f32) -> Self {
        if quality >= 0.9 {
            Self::Spectacular
        } else if quality >= 0.7 {
            Self::Excellent
        } else if quality >= 0.5 {
            Self::Good
        } else {
            Self::Poor
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Poor => "poor",
            Self::Good => "good",
            Self::Excellent => "excellent",
            Self::Spectacular => "spectacular",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrickPerformance {
    pub trick_id: String,
    pub quality: f32,
    pub reaction: AudienceReaction,
    pub points_earned: u32,
    pub mastery_gained: f32,
    pub timestamp: u64,
}

/// Everything the trick engine remembers about one animal.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnimalTricks {
    pub learning: Vec<TrickLearningProgress>,
    pub learned: Vec<LearnedTrick>,
    pub attempts: Vec<TrickAttempt>,
    pub performances: Vec<TrickPerformance>,
}

impl AnimalTricks {
    fn learning(&self, trick_id: &str) -> Option<&TrickLearningProgress> {
        self.learning.iter().find(|p| p.trick_id == trick_id)
    }

    fn learning_mut(&mut self, trick_id: &str) -> Option<&mut TrickLearningProgress> {
        self.learning.iter_mut().find(|p| p.trick_id == trick_id)
    }

    fn learned(&self, trick_id: &str) -> Option<&LearnedTrick> {
        self.learned.iter().find(|t| t.trick_id == trick_id)
    }

    fn learned_mut(&mut self, trick_id: &str) -> Option<&mut LearnedTrick> {
        self.learned.iter_mut().find(|t| t.trick_id == trick_id)
    }
}

/// Snapshot of the phase currently being taught.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeachingSession {
    pub animal_id: AnimalId,
    pub trick_id: String,
    pub phase_id: String,
    pub phase_name: String,
    pub phase_index: usize,
    pub total_phases: usize,
    pub phase_progress: f32,
    /// Accuracy a gesture must reach, after personality adjustments.
    pub threshold: f32,
    pub hints: Vec<String>,
    pub resumed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LearningStart {
    Started {
        session: TeachingSession,
        message: String,
    },
    Rejected {
        message: String,
        unmet: Vec<String>,
    },
}

impl LearningStart {
    pub fn is_started(&self) -> bool {
        matches!(self, Self::Started { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GestureOutcome {
    pub success: bool,
    pub feedback: String,
    pub phase_advanced: bool,
    pub trick_learned: bool,
    pub gesture_accuracy: f32,
    pub phase_progress: f32,
    pub next_phase: Option<String>,
    /// Rewards granted when the trick was learned by this attempt.
    pub rewards: Vec<MasteryReward>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceOutcome {
    pub success: bool,
    pub performance: Option<TrickPerformance>,
    pub message: String,
    pub mastery_gained: f32,
    pub bond: Option<BondPointsOutcome>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrickEvent {
    PhaseAdvanced {
        animal_id: AnimalId,
        trick_id: String,
        phase_id: String,
    },
    TrickLearned {
        animal_id: AnimalId,
        trick_id: String,
    },
    TrickMastered {
        animal_id: AnimalId,
        trick_id: String,
    },
    PerformanceComplete {
        animal_id: AnimalId,
        performance: TrickPerformance,
    },
}

/// Builder for constructing a `TrickLearningEngine`.
pub struct TrickLearningEngineBuilder {
    seed: u64,
    tricks: Option<TrickTable>,
    tricks_path: Option<String>,
    store: Option<Rc<dyn Store>>,
    clock: Option<Rc<dyn Clock>>,
}

impl TrickLearningEngineBuilder {
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Provide the trick table directly (for testing without files).
    pub fn with_tricks(mut self, tricks: TrickTable) -> Self {
        self.tricks = Some(tricks);
        self
    }

    /// Load the trick table from a RON file instead of the built-in one.
    pub fn tricks_path(mut self, path: &str) -> Self {
        self.tricks_path = Some(path.to_string());
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

    pub fn build(self) -> Result<TrickLearningEngine, TrickError> {
        let tricks = match (self.tricks, self.tricks_path) {
            (Some(tricks), _) => tricks,
            (None, Some(path)) => TrickTable::load_from_ron(Path::new(&path))?,
            (None, None) => TrickTable::builtin()?,
        };

        let store: Rc<dyn Store> = match self.store {
            Some(store) => store,
            None => Rc::new(MemoryStore::new()),
        };
        let clock: Rc<dyn Clock> = match self.clock {
            Some(clock) => clock,
            None => Rc::new(SystemClock),
        };

        let animals = match store::load_records::<AnimalId, AnimalTricks>(&*store, TRICK_STORE_KEY) {
            Ok(records) => records.into_iter().collect(),
            Err(e) => {
                log::warn!("could not load trick progress, starting fresh: {}", e);
                FxHashMap::default()
            }
        };

        Ok(TrickLearningEngine {
            tricks,
            animals,
            store,
            clock,
            rng: StdRng::seed_from_u64(self.seed),
            events: EventBus::new(),
        })
    }
}

/// Teaches tricks phase by phase and scores performances of learned ones.
/// Built via `TrickLearningEngine::builder()`.
pub struct TrickLearningEngine {
    tricks: TrickTable,
    animals: FxHashMap<AnimalId, AnimalTricks>,
    store: Rc<dyn Store>,
    clock: Rc<dyn Clock>,
    rng: StdRng,
    events: EventBus<TrickEvent>,
}

impl TrickLearningEngine {
    pub fn builder() -> TrickLearningEngineBuilder {
        TrickLearningEngineBuilder {
            seed: 0,
            tricks: None,
            tricks_path: None,
            store: None,
            clock: None,
        }
    }

    pub fn tricks(&self) -> &TrickTable {
        &self.tricks
    }

    pub fn subscribe<F>(&mut self, handler: F) -> SubscriptionId
    where
        F: FnMut(&TrickEvent) + 'static,
    {
        self.events.subscribe(handler)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    pub fn on_phase_advanced<F>(&mut self, mut handler: F) -> SubscriptionId
    where
        F: FnMut(AnimalId, &str, &str) + 'static,
    {
        self.events.subscribe(move |e| {
            if let TrickEvent::PhaseAdvanced { animal_id, trick_id, phase_id } = e {
                handler(*animal_id, trick_id, phase_id);
            }
        })
    }

    pub fn on_trick_learned<F>(&mut self, mut handler: F) -> SubscriptionId
    where
        F: FnMut(AnimalId, &str) + 'static,
    {
        self.events.subscribe(move |e| {
            if let TrickEvent::TrickLearned { animal_id, trick_id } = e {
                handler(*animal_id, trick_id);
            }
        })
    }

    pub fn on_trick_mastered<F>(&mut self, mut handler: F) -> SubscriptionId
    where
        F: FnMut(AnimalId, &str) + 'static,
    {
        self.events.subscribe(move |e| {
            if let TrickEvent::TrickMastered { animal_id, trick_id } = e {
                handler(*animal_id, trick_id);
            }
        })
    }

    pub fn on_performance_complete<F>(&mut self, mut handler: F) -> SubscriptionId
    where
        F: FnMut(AnimalId, &TrickPerformance) + 'static,
    {
        self.events.subscribe(move |e| {
            if let TrickEvent::PerformanceComplete { animal_id, performance } = e {
                handler(*animal_id, performance);
            }
        })
    }

    /// Every requirement of `trick` the animal does not currently meet.
    pub fn unmet_requirements(
        &self,
        animal: &Animal,
        personality: &PersonalityProfile,
        trick: &Trick,
        bond_level: BondLevel,
    ) -> Vec<String> {
        let req = &trick.requirements;
        let mut unmet = Vec::new();

        if let Some(min) = req.min_trust {
            if animal.stats.trust < min {
                unmet.push(format!("Requires {:.0} trust", min));
            }
        }
        if let Some(level) = req.bond_level {
            if bond_level != level {
                unmet.push(format!("Requires a {} bond", level.name()));
            }
        }
        let learned = self.animals.get(&animal.id);
        for prereq in &req.prerequisites {
            if learned.and_then(|a| a.learned(prereq)).is_none() {
                let name = self.tricks.get(prereq).map(|t| t.name.as_str()).unwrap_or(prereq);
                unmet.push(format!("Must know {} first", name));
            }
        }
        if let Some(min) = req.min_energy {
            if animal.stats.energy < min {
                unmet.push(format!("Requires {:.0} energy", min));
            }
        }
        if !req.personality.is_empty() && !req.personality.iter().any(|t| personality.has_trait(*t)) {
            let names: Vec<&str> = req.personality.iter().map(|t| t.name()).collect();
            unmet.push(format!("Suits a {} animal", names.join(" or ")));
        }
        unmet
    }

    /// Begin (or resume) teaching `trick_id`. Unmet requirements are
    /// returned as a rejection rather than an error.
    pub fn start_learning_trick(
        &mut self,
        animal: &Animal,
        personality: &PersonalityProfile,
        trick_id: &str,
        bonding: &BondingEngine,
    ) -> Result<LearningStart, TrickError> {
        let trick = self
            .tricks
            .get(trick_id)
            .cloned()
            .ok_or_else(|| TrickError::UnknownTrick(trick_id.to_string()))?;

        if self
            .animals
            .get(&animal.id)
            .and_then(|a| a.learned(trick_id))
            .is_some()
        {
            return Ok(LearningStart::Rejected {
                message: format!("{} already knows {}", animal.name, trick.name),
                unmet: Vec::new(),
            });
        }

        let compatibility = trick.compatibility(&animal.species);
        if compatibility < MIN_COMPATIBILITY {
            return Ok(LearningStart::Rejected {
                message: format!("A {} cannot learn {}", animal.species, trick.name),
                unmet: vec![format!("Species compatibility {:.2}", compatibility)],
            });
        }

        let bond_level = bonding
            .get_bond_level(animal.id)
            .unwrap_or(BondLevel::Stranger);
        let unmet = self.unmet_requirements(animal, personality, &trick, bond_level);
        if !unmet.is_empty() {
            log::debug!("{} cannot start {}: {:?}", animal.id, trick.id, unmet);
            return Ok(LearningStart::Rejected {
                message: format!("{} is not ready to learn {}", animal.name, trick.name),
                unmet,
            });
        }

        let first_phase = trick
            .phases
            .first()
            .ok_or_else(|| TrickError::InvalidPhase {
                trick: trick.id.clone(),
                phase: String::new(),
            })?;

        let now = self.clock.now_ms();
        let record = self.animals.entry(animal.id).or_default();
        let resumed = record.learning(trick_id).is_some();
        if !resumed {
            record.learning.push(TrickLearningProgress {
                trick_id: trick.id.clone(),
                current_phase: first_phase.id.clone(),
                phase_index: 0,
                phase_progress: 0.0,
                phase_attempts: 0,
                phase_successes: 0,
                total_attempts: 0,
                successful_attempts: 0,
                mastery_level: 0.0,
                is_learned: false,
                is_mastered: false,
                modifiers: LearningModifiers::from_personality(personality),
                success_accuracy_sum: 0.0,
                started_at: now,
                last_attempt_at: None,
            });
            self.persist();
        }

        let session = self
            .teaching_session(animal.id, trick_id, resumed)
            .ok_or_else(|| TrickError::NoProgress {
                animal: animal.id,
                trick: trick_id.to_string(),
            })?;
        let message = if resumed {
            format!("Continuing {} with {}: {}", trick.name, animal.name, session.phase_name)
        } else {
            format!("{} starts learning {}", animal.name, trick.name)
        };
        log::debug!("{}", message);
        Ok(LearningStart::Started { session, message })
    }

    /// The phase currently being taught, if `trick_id` is in progress.
    pub fn get_teaching_session(&self, animal_id: AnimalId, trick_id: &str) -> Option<TeachingSession> {
        self.teaching_session(animal_id, trick_id, true)
    }

    fn teaching_session(&self, animal_id: AnimalId, trick_id: &str, resumed: bool) -> Option<TeachingSession> {
        let progress = self.animals.get(&animal_id)?.learning(trick_id)?;
        if progress.is_learned {
            return None;
        }
        let trick = self.tricks.get(trick_id)?;
        let phase = trick.phases.get(progress.phase_index)?;
        Some(TeachingSession {
            animal_id,
            trick_id: trick_id.to_string(),
            phase_id: phase.id.clone(),
            phase_name: phase.name.clone(),
            phase_index: progress.phase_index,
            total_phases: trick.phases.len(),
            phase_progress: progress.phase_progress,
            threshold: progress.modifiers.threshold(phase.required_success),
            hints: phase.hints.clone(),
            resumed,
        })
    }

    /// Evaluate one gesture against the current phase.
    pub fn attempt_trick_gesture(
        &mut self,
        animal_id: AnimalId,
        trick_id: &str,
        input: &GestureInput,
        bonding: &mut BondingEngine,
    ) -> Result<GestureOutcome, TrickError> {
        let trick = self
            .tricks
            .get(trick_id)
            .cloned()
            .ok_or_else(|| TrickError::UnknownTrick(trick_id.to_string()))?;
        let now = self.clock.now_ms();

        let record = self
            .animals
            .get_mut(&animal_id)
            .ok_or_else(|| TrickError::NoProgress {
                animal: animal_id,
                trick: trick_id.to_string(),
            })?;
        let progress = record
            .learning_mut(trick_id)
            .ok_or_else(|| TrickError::NoProgress {
                animal: animal_id,
                trick: trick_id.to_string(),
            })?;
        if progress.is_learned {
            return Err(TrickError::AlreadyLearned {
                animal: animal_id,
                trick: trick_id.to_string(),
            });
        }
        let phase: TeachingPhase = match trick.phase_index(&progress.current_phase) {
            Some(idx) if idx == progress.phase_index => trick.phases[idx].clone(),
            _ => {
                return Err(TrickError::InvalidPhase {
                    trick: trick.id.clone(),
                    phase: progress.current_phase.clone(),
                })
            }
        };

        let accuracy = phase.gesture.accuracy(input);
        let threshold = progress.modifiers.threshold(phase.required_success);
        let success = accuracy >= threshold;

        progress.phase_attempts += 1;
        progress.total_attempts += 1;
        progress.last_attempt_at = Some(now);

        let mut phase_advanced = false;
        let mut trick_learned = false;
        if success {
            progress.phase_successes += 1;
            progress.successful_attempts += 1;
            progress.success_accuracy_sum += accuracy;
            let step = 1.0 / trick.practice_attempts.max(1) as f32;
            progress.phase_progress = (progress.phase_progress + step).min(1.0);

            if progress.phase_progress >= 1.0 - PROGRESS_EPSILON {
                if progress.phase_index + 1 < trick.phases.len() {
                    progress.phase_index += 1;
                    progress.current_phase = trick.phases[progress.phase_index].id.clone();
                    progress.phase_progress = 0.0;
                    progress.phase_attempts = 0;
                    progress.phase_successes = 0;
                    phase_advanced = true;
                } else {
                    progress.phase_progress = 1.0;
                    progress.is_learned = true;
                    trick_learned = true;
                }
            }
        }

        let phase_progress = progress.phase_progress;
        let next_phase = phase_advanced.then(|| progress.current_phase.clone());
        let initial_quality = if progress.successful_attempts > 0 {
            (progress.success_accuracy_sum / progress.successful_attempts as f32).clamp(0.0, 1.0)
        } else {
            0.0
        };

        record.attempts.push(TrickAttempt {
            trick_id: trick.id.clone(),
            phase_id: phase.id.clone(),
            accuracy,
            threshold,
            success,
            timestamp: now,
        });
        if trick_learned {
            record.learned.push(LearnedTrick {
                trick_id: trick.id.clone(),
                learned_at: now,
                times_performed: 0,
                average_quality: initial_quality,
                best_quality: 0.0,
                mastery_level: 0.0,
                is_mastered: false,
            });
        }

        let feedback = feedback_for(success, accuracy, threshold, &phase, &trick, phase_advanced, trick_learned);
        log::debug!(
            "{} gesture for {} ({}): accuracy {:.2} vs {:.2}",
            animal_id,
            trick.id,
            phase.id,
            accuracy,
            threshold
        );

        if let Some(ref phase_id) = next_phase {
            self.events.emit(&TrickEvent::PhaseAdvanced {
                animal_id,
                trick_id: trick.id.clone(),
                phase_id: phase_id.clone(),
            });
        }

        let mut rewards = Vec::new();
        if trick_learned {
            log::info!("{} learned {}", animal_id, trick.id);
            for reward in &trick.mastery_rewards {
                if let MasteryReward::BondPoints(points) = reward {
                    let reason = format!("learned {}", trick.name);
                    if let Err(e) = bonding.add_bond_points(animal_id, *points, &reason, Some(ExperienceType::Learning)) {
                        log::warn!("could not award bond points for {}: {}", trick.id, e);
                    }
                }
                rewards.push(reward.clone());
            }
            self.events.emit(&TrickEvent::TrickLearned {
                animal_id,
                trick_id: trick.id.clone(),
            });
        }

        self.persist();
        Ok(GestureOutcome {
            success,
            feedback,
            phase_advanced,
            trick_learned,
            gesture_accuracy: accuracy,
            phase_progress,
            next_phase,
            rewards,
        })
    }

    /// Perform a learned trick. Quality comes from the running average,
    /// mastery and a small random swing.
    pub fn perform_trick(
        &mut self,
        animal_id: AnimalId,
        trick_id: &str,
        bonding: &mut BondingEngine,
    ) -> Result<PerformanceOutcome, TrickError> {
        let trick = self
            .tricks
            .get(trick_id)
            .cloned()
            .ok_or_else(|| TrickError::UnknownTrick(trick_id.to_string()))?;

        let Some(learned) = self.animals.get(&animal_id).and_then(|a| a.learned(trick_id)) else {
            return Ok(PerformanceOutcome {
                success: false,
                performance: None,
                message: format!("{} has not learned yet", trick.name),
                mastery_gained: 0.0,
                bond: None,
            });
        };

        let swing: f32 = self.rng.gen_range(-0.1..=0.1);
        let quality = (learned.average_quality + learned.mastery_level / MAX_MASTERY * 0.3 + swing).clamp(0.0, 1.0);
        let reaction = AudienceReaction::for_quality(quality);
        let points_earned = (trick.performance_value as f32 * quality).floor() as u32;
        let now = self.clock.now_ms();

        let mut mastery_gained = 0.0;
        let mut newly_mastered = false;
        let mut performance = TrickPerformance {
            trick_id: trick.id.clone(),
            quality,
            reaction,
            points_earned,
            mastery_gained: 0.0,
            timestamp: now,
        };
        if let Some(record) = self.animals.get_mut(&animal_id) {
            if let Some(learned) = record.learned_mut(trick_id) {
                let n = learned.times_performed as f32;
                learned.average_quality = ((learned.average_quality * n + quality) / (n + 1.0)).clamp(0.0, 1.0);
                learned.times_performed += 1;
                learned.best_quality = learned.best_quality.max(quality);
                if quality > MASTERY_QUALITY && learned.mastery_level < MAX_MASTERY {
                    let before = learned.mastery_level;
                    learned.mastery_level = (before + (quality * 10.0).floor()).min(MAX_MASTERY);
                    mastery_gained = learned.mastery_level - before;
                    if learned.mastery_level >= MAX_MASTERY && !learned.is_mastered {
                        learned.is_mastered = true;
                        newly_mastered = true;
                    }
                }
            }
            if let Some(progress) = record.learning_mut(trick_id) {
                progress.mastery_level = record_mastery(progress.mastery_level, mastery_gained);
                progress.is_mastered |= newly_mastered;
            }
            performance.mastery_gained = mastery_gained;
            record.performances.push(performance.clone());
        }

        let mut bond = None;
        if quality > BOND_QUALITY {
            let points = (quality * 10.0).floor();
            let reason = format!("{} performance of {}", reaction.name(), trick.name);
            match bonding.add_bond_points(animal_id, points, &reason, Some(ExperienceType::Performance)) {
                Ok(outcome) => bond = Some(outcome),
                Err(e) => log::warn!("could not award performance bond points: {}", e),
            }
        }

        log::debug!(
            "{} performed {}: quality {:.2} ({})",
            animal_id,
            trick.id,
            quality,
            reaction.name()
        );
        if newly_mastered {
            log::info!("{} mastered {}", animal_id, trick.id);
            self.events.emit(&TrickEvent::TrickMastered {
                animal_id,
                trick_id: trick.id.clone(),
            });
        }
        self.events.emit(&TrickEvent::PerformanceComplete {
            animal_id,
            performance: performance.clone(),
        });
        self.persist();

        Ok(PerformanceOutcome {
            success: true,
            message: format!("A {} performance of {}!", reaction.name(), trick.name),
            performance: Some(performance),
            mastery_gained,
            bond,
        })
    }

    pub fn get_learning_progress(&self, animal_id: AnimalId, trick_id: &str) -> Option<&TrickLearningProgress> {
        self.animals.get(&animal_id)?.learning(trick_id)
    }

    pub fn get_mastery_level(&self, animal_id: AnimalId, trick_id: &str) -> f32 {
        self.animals
            .get(&animal_id)
            .and_then(|a| a.learned(trick_id))
            .map(|t| t.mastery_level)
            .unwrap_or(0.0)
    }

    pub fn get_learned_tricks(&self, animal_id: AnimalId) -> &[LearnedTrick] {
        self.animals
            .get(&animal_id)
            .map(|a| a.learned.as_slice())
            .unwrap_or(&[])
    }

    pub fn get_performance_history(&self, animal_id: AnimalId) -> &[TrickPerformance] {
        self.animals
            .get(&animal_id)
            .map(|a| a.performances.as_slice())
            .unwrap_or(&[])
    }

    pub fn get_attempt_history(&self, animal_id: AnimalId) -> &[TrickAttempt] {
        self.animals
            .get(&animal_id)
            .map(|a| a.attempts.as_slice())
            .unwrap_or(&[])
    }

    fn persist(&self) {
        let mut records: Vec<(AnimalId, &AnimalTricks)> =
            self.animals.iter().map(|(id, a)| (*id, a)).collect();
        records.sort_by_key(|(id, _)| *id);
        if let Err(e) = store::save_records(&*self.store, TRICK_STORE_KEY, &records) {
            log::warn!("failed to persist trick progress: {}", e);
        }
    }
}

fn record_mastery(current: f32, gained: f32) -> f32 {
    (current + gained).clamp(0.0, MAX_MASTERY)
}

fn feedback_for(
    success: bool,
    accuracy: f32,
    threshold: f32,
    phase: &TeachingPhase,
    trick: &Trick,
    phase_advanced: bool,
    trick_learned: bool,
) -> String {
    if trick_learned {
        return format!("Learned {}!", trick.name);
    }
    if phase_advanced {
        return format!("{} complete, on to the next step.", phase.name);
    }
    if success {
        return if accuracy >= 0.95 {
            "Perfect!".to_string()
        } else {
            "Good, keep practising.".to_string()
        };
    }
    match phase.hints.first() {
        Some(hint) if accuracy < threshold * 0.5 => format!("Not quite. {}", hint),
        _ => "Almost, try again.".to_string(),
    }
}
