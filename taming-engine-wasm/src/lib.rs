//! WASM bindings for taming-engine — powers the interactive web demo.

use std::rc::Rc;
use wasm_bindgen::prelude::*;

use taming_engine::core::clock::ManualClock;
use taming_engine::core::sanctuary::Sanctuary;
use taming_engine::schema::animal::{Animal, AnimalId};
use taming_engine::schema::personality::{ActivityLevel, PersonalityProfile, PersonalityTrait, SocialPreference};
use taming_engine::schema::trick::{Direction, GestureInput, GestureKind};

// ---------------------------------------------------------------------------
// JSON helper types for communication across the WASM boundary
// ---------------------------------------------------------------------------
#[derive(serde::Deserialize)]
struct GestureJson {
    kind: String,
    direction: Option<String>,
    duration_ms: Option<u64>,
}

#[derive(serde::Serialize)]
struct AnimalInfo {
    id: u64,
    name: String,
    species: String,
    personality: String,
    trust: f32,
    energy: f32,
}

#[derive(serde::Serialize)]
struct TrustInfo {
    trust: f32,
    tier: String,
    description: String,
    next_tier: Option<String>,
    progress_to_next: f32,
}

// ---------------------------------------------------------------------------
// Conversion helpers
// ---------------------------------------------------------------------------
fn parse_gesture_kind(s: &str) -> Option<GestureKind> {
    match s.to_lowercase().as_str() {
        "tap" => Some(GestureKind::Tap),
        "double_tap" => Some(GestureKind::DoubleTap),
        "swipe" => Some(GestureKind::Swipe),
        "hold" => Some(GestureKind::Hold),
        "circle" => Some(GestureKind::Circle),
        "pinch" => Some(GestureKind::Pinch),
        _ => None,
    }
}

fn parse_direction(s: &str) -> Option<Direction> {
    match s.to_lowercase().as_str() {
        "up" => Some(Direction::Up),
        "down" => Some(Direction::Down),
        "left" => Some(Direction::Left),
        "right" => Some(Direction::Right),
        _ => None,
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, JsError> {
    serde_json::to_string(value).map_err(|e| JsError::new(&format!("Serialization error: {e}")))
}

// ---------------------------------------------------------------------------
// Preset residents of the demo meadow
// ---------------------------------------------------------------------------
fn meadow_residents() -> Vec<(Animal, PersonalityProfile)> {
    vec![
        (
            Animal::new(1, "Ember", "fox").with_trust(25.0),
            PersonalityProfile::new(PersonalityTrait::Friendly)
                .with_secondary(PersonalityTrait::Curious)
                .preferring("offer_food"),
        ),
        (
            Animal::new(2, "Thistle", "rabbit").with_trust(5.0),
            PersonalityProfile::new(PersonalityTrait::Shy)
                .with_activity_level(ActivityLevel::Low)
                .with_social_preference(SocialPreference::Solitary),
        ),
        (
            Animal::new(3, "Gale", "wolf").with_trust(10.0),
            PersonalityProfile::new(PersonalityTrait::Independent)
                .with_secondary(PersonalityTrait::Protective)
                .with_activity_level(ActivityLevel::High),
        ),
        (
            Animal::new(4, "Pip", "owl").with_trust(15.0),
            PersonalityProfile::new(PersonalityTrait::Calm).with_social_preference(SocialPreference::Social),
        ),
    ]
}

// ---------------------------------------------------------------------------
// SanctuaryDemo — the main exported struct
// ---------------------------------------------------------------------------
/// Every call that depends on time takes the host's current time in
/// milliseconds; the demo never reads the system clock itself.
#[wasm_bindgen]
pub struct SanctuaryDemo {
    sanctuary: Sanctuary,
    clock: Rc<ManualClock>,
    personalities: Vec<(u64, String)>,
}

#[wasm_bindgen]
impl SanctuaryDemo {
    /// Create a new demo meadow with the given seed and start time.
    #[wasm_bindgen(constructor)]
    pub fn new(seed: u64, now_ms: u64) -> Result<SanctuaryDemo, JsError> {
        let clock = Rc::new(ManualClock::new(now_ms));
        let mut sanctuary = Sanctuary::builder()
            .seed(seed)
            .clock(clock.clone())
            .build()
            .map_err(|e| JsError::new(&format!("Sanctuary build error: {e}")))?;

        let mut personalities = Vec::new();
        for (animal, personality) in meadow_residents() {
            personalities.push((animal.id.0, personality.primary.name().to_string()));
            sanctuary.adopt(animal, personality);
        }

        Ok(SanctuaryDemo {
            sanctuary,
            clock,
            personalities,
        })
    }

    /// Return a JSON array describing every animal in the meadow.
    pub fn animals(&self) -> Result<String, JsError> {
        let mut infos: Vec<AnimalInfo> = self
            .sanctuary
            .animals()
            .map(|a| AnimalInfo {
                id: a.id.0,
                name: a.name.clone(),
                species: a.species.clone(),
                personality: self
                    .personalities
                    .iter()
                    .find(|(id, _)| *id == a.id.0)
                    .map(|(_, p)| p.clone())
                    .unwrap_or_default(),
                trust: a.stats.trust,
                energy: a.stats.energy,
            })
            .collect();
        infos.sort_by_key(|a| a.id);
        to_json(&infos)
    }

    /// Return a JSON array of interaction ids available with `items`
    /// (a JSON array of strings).
    pub fn available_interactions(&mut self, animal_id: u64, items_json: &str, now_ms: u64) -> Result<String, JsError> {
        self.clock.set(now_ms);
        let items: Vec<String> = serde_json::from_str(items_json)
            .map_err(|e| JsError::new(&format!("Invalid items JSON: {e}")))?;
        let id = AnimalId(animal_id);
        self.sanctuary
            .start_session(id)
            .map_err(|e| JsError::new(&e.to_string()))?;
        let ids: Vec<&str> = self
            .sanctuary
            .available_interactions(id, &items)
            .into_iter()
            .map(|i| i.id.as_str())
            .collect();
        to_json(&ids)
    }

    /// Attempt an interaction. Returns the JSON interaction outcome.
    pub fn interact(
        &mut self,
        animal_id: u64,
        interaction_id: &str,
        items_json: &str,
        now_ms: u64,
    ) -> Result<String, JsError> {
        self.clock.set(now_ms);
        let items: Vec<String> = serde_json::from_str(items_json)
            .map_err(|e| JsError::new(&format!("Invalid items JSON: {e}")))?;
        let outcome = self
            .sanctuary
            .interact(AnimalId(animal_id), interaction_id, &items)
            .map_err(|e| JsError::new(&e.to_string()))?;
        to_json(&outcome)
    }

    /// End the current taming session. Returns the JSON session or `null`.
    pub fn end_session(&mut self, animal_id: u64, now_ms: u64) -> Result<String, JsError> {
        self.clock.set(now_ms);
        let session = self
            .sanctuary
            .end_session(AnimalId(animal_id))
            .map_err(|e| JsError::new(&e.to_string()))?;
        to_json(&session)
    }

    /// Return JSON trust information for an animal, or `null` before first contact.
    pub fn trust(&self, animal_id: u64) -> Result<String, JsError> {
        let info = self
            .sanctuary
            .taming()
            .get_trust_level_info(AnimalId(animal_id))
            .map(|info| TrustInfo {
                trust: info.trust,
                tier: info.name.to_string(),
                description: info.description.to_string(),
                next_tier: info.next.map(|t| t.name().to_string()),
                progress_to_next: info.progress_to_next,
            });
        to_json(&info)
    }

    /// Return the JSON bonding record, or `null` before first contact.
    pub fn bond(&self, animal_id: u64) -> Result<String, JsError> {
        to_json(&self.sanctuary.bonding_progress(AnimalId(animal_id)))
    }

    /// Start or resume teaching a trick. Returns the JSON start result.
    pub fn teach(&mut self, animal_id: u64, trick_id: &str, now_ms: u64) -> Result<String, JsError> {
        self.clock.set(now_ms);
        let start = self
            .sanctuary
            .start_learning_trick(AnimalId(animal_id), trick_id)
            .map_err(|e| JsError::new(&e.to_string()))?;
        to_json(&start)
    }

    /// Attempt a teaching gesture.
    ///
    /// Expected JSON shape:
    /// ```json
    /// { "kind": "swipe", "direction": "down", "duration_ms": 400 }
    /// ```
    pub fn gesture(&mut self, animal_id: u64, trick_id: &str, gesture_json: &str, now_ms: u64) -> Result<String, JsError> {
        self.clock.set(now_ms);
        let input: GestureJson = serde_json::from_str(gesture_json)
            .map_err(|e| JsError::new(&format!("Invalid gesture JSON: {e}")))?;
        let kind = parse_gesture_kind(&input.kind)
            .ok_or_else(|| JsError::new(&format!("Unknown gesture: {}", input.kind)))?;
        let mut gesture = GestureInput::new(kind);
        if let Some(direction) = input.direction.as_deref().and_then(parse_direction) {
            gesture = gesture.towards(direction);
        }
        if let Some(ms) = input.duration_ms {
            gesture = gesture.lasting(ms);
        }
        let outcome = self
            .sanctuary
            .attempt_trick_gesture(AnimalId(animal_id), trick_id, &gesture)
            .map_err(|e| JsError::new(&e.to_string()))?;
        to_json(&outcome)
    }

    /// Perform a learned trick. Returns the JSON performance outcome.
    pub fn perform(&mut self, animal_id: u64, trick_id: &str, now_ms: u64) -> Result<String, JsError> {
        self.clock.set(now_ms);
        let outcome = self
            .sanctuary
            .perform_trick(AnimalId(animal_id), trick_id)
            .map_err(|e| JsError::new(&e.to_string()))?;
        to_json(&outcome)
    }

    /// Return the JSON list of tricks an animal knows.
    pub fn learned_tricks(&self, animal_id: u64) -> Result<String, JsError> {
        to_json(&self.sanctuary.tricks().get_learned_tricks(AnimalId(animal_id)))
    }

    /// Use a companion ability. Returns the JSON ability use.
    pub fn use_ability(&mut self, animal_id: u64, ability_id: &str, now_ms: u64) -> Result<String, JsError> {
        self.clock.set(now_ms);
        let used = self
            .sanctuary
            .use_ability(AnimalId(animal_id), ability_id)
            .map_err(|e| JsError::new(&e.to_string()))?;
        to_json(&used)
    }

    /// Run scheduled maintenance. Returns a JSON array of decay reports.
    pub fn tick(&mut self, now_ms: u64) -> Result<String, JsError> {
        self.clock.set(now_ms);
        to_json(&self.sanctuary.tick(now_ms))
    }

    /// Return JSON array of built-in trick ids.
    pub fn tricks(&self) -> String {
        let ids: Vec<&str> = self
            .sanctuary
            .tricks()
            .tricks()
            .iter()
            .map(|t| t.id.as_str())
            .collect();
        serde_json::to_string(&ids).unwrap_or_else(|_| "[]".to_string())
    }

    /// Return JSON array of gesture kinds.
    pub fn gesture_kinds() -> String {
        serde_json::to_string(&["tap", "double_tap", "swipe", "hold", "circle", "pinch"])
            .unwrap_or_else(|_| "[]".to_string())
    }

    /// Reset the meadow with a new seed.
    pub fn reset(&mut self, seed: u64, now_ms: u64) -> Result<(), JsError> {
        *self = SanctuaryDemo::new(seed, now_ms)?;
        Ok(())
    }
}
