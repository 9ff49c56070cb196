/// Taming — interaction evaluation, trust bookkeeping and cooldowns.
///
/// Each attempt's trust delta starts from the interaction's base modifier,
/// is adjusted by personality, repetition and streak, and is then scaled
/// down if the probabilistic success draw fails.
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::rc::Rc;
use thiserror::Error;

use crate::core::clock::{Clock, SystemClock};
use crate::core::events::{EventBus, SubscriptionId};
use crate::core::gate::Gate;
use crate::core::store::{self, MemoryStore, Store};
use crate::schema::animal::{Animal, AnimalId};
use crate::schema::interaction::{Interaction, InteractionTable, TrustTier};
use crate::schema::personality::PersonalityProfile;
use crate::schema::table::DataError;

pub const TAMING_STORE_KEY: &str = "taming-progress";

const REPETITION_WINDOW_MS: u64 = 60_000;
const REPETITION_THRESHOLD: usize = 3;
const REPETITION_PENALTY: f32 = 0.7;
const STREAK_WINDOW: usize = 5;
const STREAK_THRESHOLD: usize = 3;
const STREAK_BONUS: f32 = 1.2;
const FAILURE_SCALE: f32 = 0.3;
const PREFERENCE_MIN_ATTEMPTS: usize = 3;

#[derive(Debug, Error)]
pub enum TamingError {
    #[error("unknown interaction: {0}")]
    UnknownInteraction(String),
    #[error("no taming progress for {0}")]
    NoProgress(AnimalId),
    #[error("interaction '{interaction}' is on cooldown until {until}")]
    OnCooldown { interaction: String, until: u64 },
    #[error("requirements not met: {0}")]
    RequirementsNotMet(String),
    #[error("data error: {0}")]
    Data(#[from] DataError),
}

/// Immutable record of one interaction attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionResult {
    pub interaction_id: String,
    pub success: bool,
    pub trust_change: f32,
    pub previous_trust: f32,
    pub new_trust: f32,
    pub success_chance: f32,
    pub energy_cost: f32,
    pub timestamp: u64,
    pub reaction: String,
}

/// Per-animal taming record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TamingProgress {
    pub animal_id: AnimalId,
    pub current_trust: f32,
    pub total_interactions: u32,
    pub successful_interactions: u32,
    pub history: Vec<InteractionResult>,
    /// 0..=5, tracked alongside the bonding engine's level.
    pub bond_level: u8,
    pub favorite_interactions: Vec<String>,
    pub disliked_interactions: Vec<String>,
    /// Interaction id -> timestamp until which it is blocked.
    pub cooldowns: FxHashMap<String, u64>,
    pub first_met_at: u64,
    pub last_interaction_at: Option<u64>,
}

impl TamingProgress {
    fn new(animal: &Animal, now: u64) -> Self {
        let trust = animal.stats.trust.clamp(0.0, 100.0);
        Self {
            animal_id: animal.id,
            current_trust: trust,
            total_interactions: 0,
            successful_interactions: 0,
            history: Vec::new(),
            bond_level: legacy_bond_level(trust),
            favorite_interactions: Vec::new(),
            disliked_interactions: Vec::new(),
            cooldowns: FxHashMap::default(),
            first_met_at: now,
            last_interaction_at: None,
        }
    }

    pub fn success_rate(&self) -> f32 {
        if self.total_interactions == 0 {
            0.0
        } else {
            self.successful_interactions as f32 / self.total_interactions as f32
        }
    }
}

/// A bracketed play session with one animal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TamingSession {
    pub animal_id: AnimalId,
    pub started_at: u64,
    pub ended_at: Option<u64>,
    pub initial_trust: f32,
    pub current_trust: f32,
    pub interactions: Vec<InteractionResult>,
    /// Set when the session ends: true if trust finished above where it began.
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrustLevelInfo {
    pub tier: TrustTier,
    pub name: &'static str,
    pub description: &'static str,
    pub trust: f32,
    pub next: Option<TrustTier>,
    /// 0..=1 progress from this tier's threshold to the next one.
    pub progress_to_next: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TamingEvent {
    InteractionCompleted {
        animal_id: AnimalId,
        result: InteractionResult,
    },
    TrustTierChanged {
        animal_id: AnimalId,
        from: TrustTier,
        to: TrustTier,
    },
    SessionEnded(TamingSession),
}

/// Builder for constructing a `TamingEngine`.
pub struct TamingEngineBuilder {
    seed: u64,
    interactions: Option<InteractionTable>,
    interactions_path: Option<String>,
    store: Option<Rc<dyn Store>>,
    clock: Option<Rc<dyn Clock>>,
}

impl TamingEngineBuilder {
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Provide the interaction table directly (for testing without files).
    pub fn with_interactions(mut self, table: InteractionTable) -> Self {
        self.interactions = Some(table);
        self
    }

    /// Merge interactions from a RON file over the built-in table.
    pub fn interactions_path(mut self, path: &str) -> Self {
        self.interactions_path = Some(path.to_string());
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

    pub fn build(self) -> Result<TamingEngine, TamingError> {
        let mut interactions = match self.interactions {
            Some(table) => table,
            None => InteractionTable::builtin()?,
        };
        if let Some(ref path) = self.interactions_path {
            interactions.merge(InteractionTable::load_from_ron(Path::new(path))?);
        }

        let store: Rc<dyn Store> = match self.store {
            Some(store) => store,
            None => Rc::new(MemoryStore::new()),
        };
        let clock: Rc<dyn Clock> = match self.clock {
            Some(clock) => clock,
            None => Rc::new(SystemClock),
        };

        let progress = match store::load_records::<AnimalId, TamingProgress>(&*store, TAMING_STORE_KEY) {
            Ok(records) => records.into_iter().collect(),
            Err(e) => {
                log::warn!("could not load taming progress, starting fresh: {}", e);
                FxHashMap::default()
            }
        };

        Ok(TamingEngine {
            interactions,
            progress,
            sessions: FxHashMap::default(),
            store,
            clock,
            rng: StdRng::seed_from_u64(self.seed),
            events: EventBus::new(),
        })
    }
}

/// Evaluates interactions against an animal's trust and keeps per-animal
/// taming records. Built via `TamingEngine::builder()`.
pub struct TamingEngine {
    interactions: InteractionTable,
    progress: FxHashMap<AnimalId, TamingProgress>,
    sessions: FxHashMap<AnimalId, TamingSession>,
    store: Rc<dyn Store>,
    clock: Rc<dyn Clock>,
    rng: StdRng,
    events: EventBus<TamingEvent>,
}

impl TamingEngine {
    pub fn builder() -> TamingEngineBuilder {
        TamingEngineBuilder {
            seed: 0,
            interactions: None,
            interactions_path: None,
            store: None,
            clock: None,
        }
    }

    pub fn subscribe<F>(&mut self, handler: F) -> SubscriptionId
    where
        F: FnMut(&TamingEvent) + 'static,
    {
        self.events.subscribe(handler)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    pub fn interactions(&self) -> &InteractionTable {
        &self.interactions
    }

    /// Begin a session, creating the animal's progress record on first
    /// contact. A second call while a session is open returns the open one.
    pub fn start_session(&mut self, animal: &Animal) -> TamingSession {
        let now = self.clock.now_ms();
        let created = !self.progress.contains_key(&animal.id);
        let trust = self
            .progress
            .entry(animal.id)
            .or_insert_with(|| TamingProgress::new(animal, now))
            .current_trust;

        if let Some(existing) = self.sessions.get(&animal.id) {
            return existing.clone();
        }

        let session = TamingSession {
            animal_id: animal.id,
            started_at: now,
            ended_at: None,
            initial_trust: trust,
            current_trust: trust,
            interactions: Vec::new(),
            success: false,
        };
        self.sessions.insert(animal.id, session.clone());
        log::debug!("taming session started for {} at trust {:.1}", animal.id, trust);

        if created {
            self.persist();
        }
        session
    }

    pub fn end_session(&mut self, animal_id: AnimalId) -> Option<TamingSession> {
        let mut session = self.sessions.remove(&animal_id)?;
        if let Some(progress) = self.progress.get(&animal_id) {
            session.current_trust = progress.current_trust;
        }
        session.ended_at = Some(self.clock.now_ms());
        session.success = session.current_trust > session.initial_trust;
        log::debug!(
            "taming session ended for {}: {:.1} -> {:.1}",
            animal_id,
            session.initial_trust,
            session.current_trust
        );
        self.events.emit(&TamingEvent::SessionEnded(session.clone()));
        Some(session)
    }

    /// Pure permission check for UI gating. Never mutates state.
    pub fn can_perform_interaction(
        &self,
        animal_id: AnimalId,
        interaction: &Interaction,
        items: &[String],
    ) -> Gate {
        let progress = match self.progress.get(&animal_id) {
            Some(p) => p,
            None => return Gate::deny("You have not met this animal yet"),
        };
        let now = self.clock.now_ms();

        if let Some(until) = cooldown_until(progress, &interaction.id, now) {
            let secs = (until - now).div_ceil(1000);
            return Gate::deny(format!("{} is on cooldown for {}s", interaction.name, secs));
        }

        match unmet_requirement(interaction, progress.current_trust, items) {
            Some(reason) => Gate::deny(reason),
            None => Gate::allow(),
        }
    }

    /// Every interaction currently allowed and off cooldown.
    pub fn get_available_interactions(&self, animal_id: AnimalId, items: &[String]) -> Vec<&Interaction> {
        self.interactions
            .iter()
            .filter(|i| self.can_perform_interaction(animal_id, i, items).allowed)
            .collect()
    }

    pub fn attempt_interaction(
        &mut self,
        animal_id: AnimalId,
        interaction_id: &str,
        items: &[String],
        personality: &PersonalityProfile,
    ) -> Result<InteractionResult, TamingError> {
        let interaction = self
            .interactions
            .get(interaction_id)
            .cloned()
            .ok_or_else(|| TamingError::UnknownInteraction(interaction_id.to_string()))?;
        let now = self.clock.now_ms();

        let progress = self
            .progress
            .get(&animal_id)
            .ok_or(TamingError::NoProgress(animal_id))?;

        if let Some(until) = cooldown_until(progress, &interaction.id, now) {
            return Err(TamingError::OnCooldown {
                interaction: interaction.id.clone(),
                until,
            });
        }
        if let Some(reason) = unmet_requirement(&interaction, progress.current_trust, items) {
            return Err(TamingError::RequirementsNotMet(reason));
        }

        let mut delta = trust_delta(&interaction, progress, personality, now);
        let chance = success_chance(&interaction, progress, personality);
        let success = self.rng.gen::<f32>() < chance;
        if !success {
            delta *= FAILURE_SCALE;
        }

        let previous_trust = progress.current_trust;
        let new_trust = (previous_trust + delta).clamp(0.0, 100.0);
        let result = InteractionResult {
            interaction_id: interaction.id.clone(),
            success,
            trust_change: new_trust - previous_trust,
            previous_trust,
            new_trust,
            success_chance: chance,
            energy_cost: interaction.energy_cost,
            timestamp: now,
            reaction: reaction_for(success, delta).to_string(),
        };

        let progress = self
            .progress
            .get_mut(&animal_id)
            .ok_or(TamingError::NoProgress(animal_id))?;
        progress.current_trust = new_trust;
        progress.total_interactions += 1;
        if success {
            progress.successful_interactions += 1;
        }
        progress.history.push(result.clone());
        progress
            .cooldowns
            .insert(interaction.id.clone(), now.saturating_add(interaction.cooldown_ms));
        progress.bond_level = legacy_bond_level(new_trust);
        progress.last_interaction_at = Some(now);
        refresh_preferences(progress);

        if let Some(session) = self.sessions.get_mut(&animal_id) {
            session.interactions.push(result.clone());
            session.current_trust = new_trust;
        }

        log::debug!(
            "{} on {}: success={} chance={:.2} trust {:.1} -> {:.1}",
            interaction.id,
            animal_id,
            success,
            chance,
            previous_trust,
            new_trust
        );

        let from = TrustTier::for_trust(previous_trust);
        let to = TrustTier::for_trust(new_trust);
        if from != to {
            log::info!("{} is now {}", animal_id, to.name());
            self.events
                .emit(&TamingEvent::TrustTierChanged { animal_id, from, to });
        }
        self.events.emit(&TamingEvent::InteractionCompleted {
            animal_id,
            result: result.clone(),
        });

        self.persist();
        Ok(result)
    }

    pub fn get_current_trust(&self, animal_id: AnimalId) -> Option<f32> {
        self.progress.get(&animal_id).map(|p| p.current_trust)
    }

    pub fn get_trust_level_info(&self, animal_id: AnimalId) -> Option<TrustLevelInfo> {
        let trust = self.get_current_trust(animal_id)?;
        let tier = TrustTier::for_trust(trust);
        let next = tier.next();
        let ceiling = next.map(|n| n.threshold()).unwrap_or(100.0);
        let span = ceiling - tier.threshold();
        let progress_to_next = if span <= 0.0 {
            1.0
        } else {
            ((trust - tier.threshold()) / span).clamp(0.0, 1.0)
        };
        Some(TrustLevelInfo {
            tier,
            name: tier.name(),
            description: tier.description(),
            trust,
            next,
            progress_to_next,
        })
    }

    pub fn get_progress(&self, animal_id: AnimalId) -> Option<&TamingProgress> {
        self.progress.get(&animal_id)
    }

    pub fn get_session(&self, animal_id: AnimalId) -> Option<&TamingSession> {
        self.sessions.get(&animal_id)
    }

    pub fn get_interaction_history(&self, animal_id: AnimalId) -> &[InteractionResult] {
        self.progress
            .get(&animal_id)
            .map(|p| p.history.as_slice())
            .unwrap_or(&[])
    }

    /// Milliseconds until `interaction_id` may be used again; 0 when ready.
    pub fn cooldown_remaining(&self, animal_id: AnimalId, interaction_id: &str) -> u64 {
        let now = self.clock.now_ms();
        self.progress
            .get(&animal_id)
            .and_then(|p| cooldown_until(p, interaction_id, now))
            .map(|until| until - now)
            .unwrap_or(0)
    }

    fn persist(&self) {
        let mut records: Vec<(AnimalId, &TamingProgress)> =
            self.progress.iter().map(|(id, p)| (*id, p)).collect();
        records.sort_by_key(|(id, _)| *id);
        if let Err(e) = store::save_records(&*self.store, TAMING_STORE_KEY, &records) {
            log::warn!("failed to persist taming progress: {}", e);
        }
    }
}

/// The taming-side bond counter: one step per 20 trust, capped at 5.
fn legacy_bond_level(trust: f32) -> u8 {
    ((trust / 20.0).floor() as u8).min(5)
}

fn cooldown_until(progress: &TamingProgress, interaction_id: &str, now: u64) -> Option<u64> {
    progress
        .cooldowns
        .get(interaction_id)
        .copied()
        .filter(|until| now < *until)
}

fn unmet_requirement(interaction: &Interaction, trust: f32, items: &[String]) -> Option<String> {
    let tier = TrustTier::for_trust(trust);
    if interaction.unlock_tier > tier {
        return Some(format!(
            "{} unlocks once the animal is {}",
            interaction.name,
            interaction.unlock_tier.name()
        ));
    }

    let req = &interaction.requirements;
    if let Some(min) = req.min_trust {
        if trust < min {
            return Some(format!("Requires at least {:.0} trust", min));
        }
    }
    if let Some(max) = req.max_trust {
        if trust > max {
            return Some(format!("Only works below {:.0} trust", max));
        }
    }
    let missing: Vec<&str> = req
        .required_items
        .iter()
        .filter(|needed| !items.iter().any(|have| have == *needed))
        .map(|s| s.as_str())
        .collect();
    if !missing.is_empty() {
        return Some(format!("Missing items: {}", missing.join(", ")));
    }
    None
}

fn trust_delta(
    interaction: &Interaction,
    progress: &TamingProgress,
    personality: &PersonalityProfile,
    now: u64,
) -> f32 {
    let mods = &interaction.personality_modifiers;
    let mut delta = interaction.base_trust_modifier;
    if let Some(bonus) = mods.bonus_for(personality.primary) {
        delta += bonus;
    }
    if let Some(penalty) = mods.penalty_for(personality.primary) {
        delta -= penalty;
    }

    // The attempt being evaluated counts towards the repetition threshold.
    let recent_same = progress
        .history
        .iter()
        .filter(|r| r.interaction_id == interaction.id)
        .filter(|r| now.saturating_sub(r.timestamp) < REPETITION_WINDOW_MS)
        .count();
    if recent_same + 1 >= REPETITION_THRESHOLD {
        delta *= REPETITION_PENALTY;
    }

    let recent_successes = progress
        .history
        .iter()
        .rev()
        .take(STREAK_WINDOW)
        .filter(|r| r.success)
        .count();
    if recent_successes >= STREAK_THRESHOLD {
        delta *= STREAK_BONUS;
    }

    delta
}

fn success_chance(
    interaction: &Interaction,
    progress: &TamingProgress,
    personality: &PersonalityProfile,
) -> f32 {
    let tier = TrustTier::for_trust(progress.current_trust);
    let experience = progress
        .history
        .iter()
        .filter(|r| r.interaction_id == interaction.id)
        .count();

    let mut chance = 0.6 + tier.threshold() / 100.0 * 0.3 + (0.05 * experience as f32).min(0.2);

    let mods = &interaction.personality_modifiers;
    if personality.prefers(&interaction.id) || mods.bonus_for(personality.primary).is_some() {
        chance += 0.1;
    }
    if mods.penalty_for(personality.primary).is_some() {
        chance -= 0.15;
    }
    chance.clamp(0.1, 0.95)
}

fn reaction_for(success: bool, delta: f32) -> &'static str {
    match (success, delta) {
        (true, d) if d >= 5.0 => "delighted",
        (true, _) => "receptive",
        (false, d) if d < 0.0 => "startled",
        (false, _) => "hesitant",
    }
}

fn refresh_preferences(progress: &mut TamingProgress) {
    let mut tally: FxHashMap<&str, (usize, usize)> = FxHashMap::default();
    for r in &progress.history {
        let entry = tally.entry(r.interaction_id.as_str()).or_insert((0, 0));
        entry.0 += 1;
        if r.success {
            entry.1 += 1;
        }
    }

    let mut favorites = Vec::new();
    let mut disliked = Vec::new();
    for (id, (attempts, successes)) in tally {
        if attempts < PREFERENCE_MIN_ATTEMPTS {
            continue;
        }
        let rate = successes as f32 / attempts as f32;
        if rate >= 0.7 {
            favorites.push(id.to_string());
        } else if rate <= 0.3 {
            disliked.push(id.to_string());
        }
    }
    favorites.sort();
    disliked.sort();
    progress.favorite_interactions = favorites;
    progress.disliked_interactions = disliked;
}
