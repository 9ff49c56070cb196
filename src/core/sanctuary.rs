/// Sanctuary — owns the three engines and carries results between them.
///
/// Taming trust gates tricks, successful interactions and performances feed
/// bond points back, and ended sessions count as time spent together.
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::rc::Rc;
use thiserror::Error;

use crate::core::bonding::{
    AbilityUse, BondPointsOutcome, BondingConfig, BondingEngine, BondingError, BondingProgress, DecayReport,
};
use crate::core::clock::{Clock, SystemClock};
use crate::core::store::{MemoryStore, Store};
use crate::core::taming::{InteractionResult, TamingEngine, TamingError, TamingSession};
use crate::core::tricks::{GestureOutcome, LearningStart, PerformanceOutcome, TrickError, TrickLearningEngine};
use crate::schema::animal::{Animal, AnimalId};
use crate::schema::interaction::Interaction;
use crate::schema::personality::PersonalityProfile;
use crate::schema::trick::GestureInput;

#[derive(Debug, Error)]
pub enum SanctuaryError {
    #[error("unknown animal: {0}")]
    UnknownAnimal(AnimalId),
    #[error("taming error: {0}")]
    Taming(#[from] TamingError),
    #[error("bonding error: {0}")]
    Bonding(#[from] BondingError),
    #[error("trick error: {0}")]
    Trick(#[from] TrickError),
}

/// An interaction attempt plus whatever it did to the bond.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionOutcome {
    pub result: InteractionResult,
    pub bond: Option<BondPointsOutcome>,
}

struct Resident {
    animal: Animal,
    personality: PersonalityProfile,
}

/// Builder for constructing a `Sanctuary`.
pub struct SanctuaryBuilder {
    seed: u64,
    store: Option<Rc<dyn Store>>,
    clock: Option<Rc<dyn Clock>>,
    interactions_path: Option<String>,
    bonding_path: Option<String>,
    tricks_path: Option<String>,
    bonding_config: BondingConfig,
}

impl SanctuaryBuilder {
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
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

    pub fn interactions_path(mut self, path: &str) -> Self {
        self.interactions_path = Some(path.to_string());
        self
    }

    pub fn bonding_path(mut self, path: &str) -> Self {
        self.bonding_path = Some(path.to_string());
        self
    }

    pub fn tricks_path(mut self, path: &str) -> Self {
        self.tricks_path = Some(path.to_string());
        self
    }

    pub fn bonding_config(mut self, config: BondingConfig) -> Self {
        self.bonding_config = config;
        self
    }

    pub fn build(self) -> Result<Sanctuary, SanctuaryError> {
        let store: Rc<dyn Store> = match self.store {
            Some(store) => store,
            None => Rc::new(MemoryStore::new()),
        };
        let clock: Rc<dyn Clock> = match self.clock {
            Some(clock) => clock,
            None => Rc::new(SystemClock),
        };

        let mut taming = TamingEngine::builder()
            .seed(self.seed)
            .store(store.clone())
            .clock(clock.clone());
        if let Some(ref path) = self.interactions_path {
            taming = taming.interactions_path(path);
        }

        let mut bonding = BondingEngine::builder()
            .config(self.bonding_config)
            .store(store.clone())
            .clock(clock.clone());
        if let Some(ref path) = self.bonding_path {
            bonding = bonding.table_path(path);
        }

        let mut tricks = TrickLearningEngine::builder()
            .seed(self.seed.wrapping_add(1))
            .store(store)
            .clock(clock.clone());
        if let Some(ref path) = self.tricks_path {
            tricks = tricks.tricks_path(path);
        }

        Ok(Sanctuary {
            taming: taming.build()?,
            bonding: bonding.build()?,
            tricks: tricks.build()?,
            residents: FxHashMap::default(),
            clock,
        })
    }
}

/// The composed game-facing API. Built via `Sanctuary::builder()`.
pub struct Sanctuary {
    taming: TamingEngine,
    bonding: BondingEngine,
    tricks: TrickLearningEngine,
    residents: FxHashMap<AnimalId, Resident>,
    clock: Rc<dyn Clock>,
}

impl Sanctuary {
    pub fn builder() -> SanctuaryBuilder {
        SanctuaryBuilder {
            seed: 42,
            store: None,
            clock: None,
            interactions_path: None,
            bonding_path: None,
            tricks_path: None,
            bonding_config: BondingConfig::default(),
        }
    }

    /// Register an animal and its personality. Trust and bond records
    /// already in the store are picked up again.
    pub fn adopt(&mut self, mut animal: Animal, personality: PersonalityProfile) {
        if let Some(trust) = self.taming.get_current_trust(animal.id) {
            animal.stats.trust = trust;
        }
        log::debug!("{} ({}) joined the sanctuary", animal.name, animal.id);
        self.residents.insert(animal.id, Resident { animal, personality });
    }

    pub fn animal(&self, animal_id: AnimalId) -> Option<&Animal> {
        self.residents.get(&animal_id).map(|r| &r.animal)
    }

    pub fn animals(&self) -> impl Iterator<Item = &Animal> {
        self.residents.values().map(|r| &r.animal)
    }

    pub fn taming(&self) -> &TamingEngine {
        &self.taming
    }

    pub fn taming_mut(&mut self) -> &mut TamingEngine {
        &mut self.taming
    }

    pub fn bonding(&self) -> &BondingEngine {
        &self.bonding
    }

    pub fn bonding_mut(&mut self) -> &mut BondingEngine {
        &mut self.bonding
    }

    pub fn tricks(&self) -> &TrickLearningEngine {
        &self.tricks
    }

    pub fn tricks_mut(&mut self) -> &mut TrickLearningEngine {
        &mut self.tricks
    }

    fn resident(&self, animal_id: AnimalId) -> Result<&Resident, SanctuaryError> {
        self.residents
            .get(&animal_id)
            .ok_or(SanctuaryError::UnknownAnimal(animal_id))
    }

    /// Open a taming session and make sure a bond record exists.
    pub fn start_session(&mut self, animal_id: AnimalId) -> Result<TamingSession, SanctuaryError> {
        let resident = self
            .residents
            .get(&animal_id)
            .ok_or(SanctuaryError::UnknownAnimal(animal_id))?;
        let session = self.taming.start_session(&resident.animal);
        if self.bonding.get_bonding_progress(animal_id).is_none() {
            self.bonding
                .initialize_bonding(&resident.animal, &resident.personality);
        }
        Ok(session)
    }

    /// Close the session; its length counts as time spent together.
    pub fn end_session(&mut self, animal_id: AnimalId) -> Result<Option<TamingSession>, SanctuaryError> {
        let Some(session) = self.taming.end_session(animal_id) else {
            return Ok(None);
        };
        let elapsed = session
            .ended_at
            .unwrap_or(session.started_at)
            .saturating_sub(session.started_at);
        if elapsed > 0 {
            self.bonding.update_time_spent_together(animal_id, elapsed)?;
        }
        Ok(Some(session))
    }

    pub fn available_interactions(&self, animal_id: AnimalId, items: &[String]) -> Vec<&Interaction> {
        self.taming.get_available_interactions(animal_id, items)
    }

    /// Run one taming interaction and carry its effects into bonding.
    pub fn interact(
        &mut self,
        animal_id: AnimalId,
        interaction_id: &str,
        items: &[String],
    ) -> Result<InteractionOutcome, SanctuaryError> {
        self.start_session(animal_id)?;
        let personality = self.resident(animal_id)?.personality.clone();

        let result = self
            .taming
            .attempt_interaction(animal_id, interaction_id, items, &personality)?;

        if let Some(resident) = self.residents.get_mut(&animal_id) {
            resident.animal.stats.trust = result.new_trust;
            resident.animal.stats.energy = (resident.animal.stats.energy - result.energy_cost).clamp(0.0, 100.0);
        }

        let mut bond = self.bonding.record_trust(animal_id, result.new_trust)?;
        if result.success {
            let experience = self
                .taming
                .interactions()
                .get(interaction_id)
                .map(|i| i.category.experience_type());
            let points = result.trust_change.round().max(1.0);
            let reason = format!("{} went well", interaction_id);
            let gained = self
                .bonding
                .add_bond_points(animal_id, points, &reason, experience)?;
            bond.merge(gained);
        }

        let touched_bond = bond.points_awarded != 0.0
            || bond.level_up
            || !bond.milestones_achieved.is_empty()
            || !bond.abilities_unlocked.is_empty();
        Ok(InteractionOutcome {
            result,
            bond: touched_bond.then_some(bond),
        })
    }

    pub fn start_learning_trick(&mut self, animal_id: AnimalId, trick_id: &str) -> Result<LearningStart, SanctuaryError> {
        let resident = self
            .residents
            .get(&animal_id)
            .ok_or(SanctuaryError::UnknownAnimal(animal_id))?;
        Ok(self
            .tricks
            .start_learning_trick(&resident.animal, &resident.personality, trick_id, &self.bonding)?)
    }

    pub fn attempt_trick_gesture(
        &mut self,
        animal_id: AnimalId,
        trick_id: &str,
        input: &GestureInput,
    ) -> Result<GestureOutcome, SanctuaryError> {
        self.resident(animal_id)?;
        Ok(self
            .tricks
            .attempt_trick_gesture(animal_id, trick_id, input, &mut self.bonding)?)
    }

    pub fn perform_trick(&mut self, animal_id: AnimalId, trick_id: &str) -> Result<PerformanceOutcome, SanctuaryError> {
        self.resident(animal_id)?;
        Ok(self.tricks.perform_trick(animal_id, trick_id, &mut self.bonding)?)
    }

    pub fn use_ability(&mut self, animal_id: AnimalId, ability_id: &str) -> Result<AbilityUse, SanctuaryError> {
        Ok(self.bonding.use_ability(animal_id, ability_id)?)
    }

    pub fn bonding_progress(&self, animal_id: AnimalId) -> Option<&BondingProgress> {
        self.bonding.get_bonding_progress(animal_id)
    }

    /// Drive scheduled work. Call regularly with the current time.
    pub fn tick(&mut self, now: u64) -> Vec<DecayReport> {
        self.bonding.tick(now)
    }

    /// `tick` at the sanctuary clock's current time.
    pub fn tick_now(&mut self) -> Vec<DecayReport> {
        let now = self.clock.now_ms();
        self.tick(now)
    }
}
