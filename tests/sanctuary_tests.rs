/// Sanctuary integration tests — the three engines working together.

use std::rc::Rc;
use taming_engine::core::bonding::{BondingConfig, BondingError};
use taming_engine::core::clock::{ManualClock, MINUTE_MS};
use taming_engine::core::sanctuary::{Sanctuary, SanctuaryError};
use taming_engine::core::store::MemoryStore;
use taming_engine::schema::animal::{Animal, AnimalId};
use taming_engine::schema::bond::BondLevel;
use taming_engine::schema::personality::{PersonalityProfile, PersonalityTrait};
use taming_engine::schema::trick::GestureInput;

fn sanctuary(clock: &Rc<ManualClock>) -> Sanctuary {
    Sanctuary::builder().seed(17).clock(clock.clone()).build().unwrap()
}

/// Friendly fox: trust-based bonding earns x1.1 on every gain.
fn adopt_ember(sanctuary: &mut Sanctuary, trust: f32) -> AnimalId {
    let ember = Animal::new(1, "Ember", "fox").with_trust(trust);
    let id = ember.id;
    sanctuary.adopt(ember, PersonalityProfile::new(PersonalityTrait::Friendly));
    id
}

fn bond_points(sanctuary: &Sanctuary, id: AnimalId) -> f32 {
    sanctuary.bonding_progress(id).map(|p| p.bond_points).unwrap_or(0.0)
}

#[test]
fn interactions_feed_trust_into_bonding() {
    let clock = Rc::new(ManualClock::new(0));
    let mut sanctuary = sanctuary(&clock);
    let id = adopt_ember(&mut sanctuary, 25.0);

    for round in 0..8 {
        let interaction = if round % 2 == 0 { "observe" } else { "soft_voice" };
        let before = bond_points(&sanctuary, id);
        let outcome = sanctuary.interact(id, interaction, &[]).unwrap();
        let after = bond_points(&sanctuary, id);

        let result = &outcome.result;
        assert_eq!(sanctuary.animal(id).unwrap().stats.trust, result.new_trust);
        assert_eq!(
            sanctuary.bonding_progress(id).unwrap().last_known_trust,
            result.new_trust
        );
        if result.success {
            let expected = result.trust_change.round().max(1.0) * 1.1;
            let bond = outcome.bond.as_ref().expect("success should touch the bond");
            assert!((bond.points_awarded - expected).abs() < 1e-4);
            assert!((after - before - expected).abs() < 1e-4);
        } else {
            assert!(outcome.bond.is_none());
            assert_eq!(after, before);
        }
        clock.advance(10_000);
    }
    assert_eq!(sanctuary.taming().get_interaction_history(id).len(), 8);
}

#[test]
fn repeated_interactions_keep_the_first_bond_record() {
    let clock = Rc::new(ManualClock::new(0));
    let mut sanctuary = sanctuary(&clock);
    let id = adopt_ember(&mut sanctuary, 25.0);
    sanctuary.start_session(id).unwrap();
    let first = sanctuary.bonding_progress(id).unwrap().clone();

    for _ in 0..5 {
        clock.advance(MINUTE_MS);
        sanctuary.interact(id, "observe", &[]).unwrap();
        sanctuary.start_session(id).unwrap();
    }
    let progress = sanctuary.bonding_progress(id).unwrap();
    assert_eq!(progress.created_at, first.created_at);
    assert_eq!(progress.bond_decay_rate, first.bond_decay_rate);
    assert_eq!(progress.bonding_preferences, first.bonding_preferences);
}

#[test]
fn unknown_animals_are_rejected() {
    let clock = Rc::new(ManualClock::new(0));
    let mut sanctuary = sanctuary(&clock);
    assert!(matches!(
        sanctuary.interact(AnimalId(5), "observe", &[]),
        Err(SanctuaryError::UnknownAnimal(AnimalId(5)))
    ));
    assert!(matches!(
        sanctuary.start_learning_trick(AnimalId(5), "sit"),
        Err(SanctuaryError::UnknownAnimal(_))
    ));
    assert!(matches!(
        sanctuary.use_ability(AnimalId(5), "follow_me"),
        Err(SanctuaryError::Bonding(BondingError::NoProgress(_)))
    ));
}

#[test]
fn ended_session_counts_as_time_together() {
    let clock = Rc::new(ManualClock::new(0));
    let mut sanctuary = sanctuary(&clock);
    let id = adopt_ember(&mut sanctuary, 25.0);

    sanctuary.start_session(id).unwrap();
    clock.advance(10 * MINUTE_MS);
    let session = sanctuary.end_session(id).unwrap().unwrap();
    assert_eq!(session.ended_at, Some(10 * MINUTE_MS));

    let progress = sanctuary.bonding_progress(id).unwrap();
    assert_eq!(progress.time_spent_together_ms, 10 * MINUTE_MS);
    assert_eq!(progress.bond_points, 10.0);
    assert!(sanctuary.end_session(id).unwrap().is_none());
}

#[test]
fn taught_trick_can_be_performed_for_bond_points() {
    let clock = Rc::new(ManualClock::new(0));
    let mut sanctuary = sanctuary(&clock);
    let id = adopt_ember(&mut sanctuary, 25.0);
    sanctuary.start_session(id).unwrap();

    assert!(sanctuary.start_learning_trick(id, "sit").unwrap().is_started());
    let sit = sanctuary.tricks().tricks().get("sit").cloned().unwrap();
    let mut learned = false;
    for phase in &sit.phases {
        for _ in 0..sit.practice_attempts {
            clock.advance(1_000);
            let outcome = sanctuary
                .attempt_trick_gesture(id, "sit", &GestureInput::from(&phase.gesture))
                .unwrap();
            assert!(outcome.success);
            learned = outcome.trick_learned;
        }
    }
    assert!(learned);
    // Learning "sit" grants 20 points, x1.1 for a friendly fox.
    assert!((bond_points(&sanctuary, id) - 22.0).abs() < 1e-4);

    let before = bond_points(&sanctuary, id);
    let outcome = sanctuary.perform_trick(id, "sit").unwrap();
    let performance = outcome.performance.unwrap();
    assert!(performance.quality >= 0.9);
    let bond = outcome.bond.unwrap();
    let expected = (performance.quality * 10.0).floor() * 1.1;
    assert!((bond.points_awarded - expected).abs() < 1e-4);
    assert!((bond_points(&sanctuary, id) - before - expected).abs() < 1e-4);
}

#[test]
fn low_trust_blocks_teaching() {
    let clock = Rc::new(ManualClock::new(0));
    let mut sanctuary = sanctuary(&clock);
    let id = adopt_ember(&mut sanctuary, 10.0);
    let start = sanctuary.start_learning_trick(id, "sit").unwrap();
    assert!(!start.is_started());
}

#[test]
fn idle_bonds_decay_on_tick() {
    let clock = Rc::new(ManualClock::new(0));
    let mut sanctuary = sanctuary(&clock);
    let id = adopt_ember(&mut sanctuary, 25.0);
    sanctuary.start_session(id).unwrap();
    sanctuary
        .bonding_mut()
        .add_bond_points(id, 40.0, "treats", None)
        .unwrap();

    assert!(sanctuary.tick_now().is_empty());
    clock.advance(20 * MINUTE_MS);
    let reports = sanctuary.tick_now();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].animal_id, id);
    assert_eq!(reports[0].points_lost, 10.0);
    assert_eq!(reports[0].level, BondLevel::Stranger);
}

#[test]
fn custom_bonding_config_reaches_the_engine() {
    let clock = Rc::new(ManualClock::new(0));
    let sanctuary = Sanctuary::builder()
        .clock(clock.clone())
        .bonding_config(BondingConfig {
            max_points: 500.0,
            ..BondingConfig::default()
        })
        .build()
        .unwrap();
    assert_eq!(sanctuary.bonding().config().max_points, 500.0);
}

#[test]
fn adopting_again_restores_stored_trust() {
    let store = Rc::new(MemoryStore::new());
    let clock = Rc::new(ManualClock::new(0));
    let build = || {
        Sanctuary::builder()
            .store(store.clone())
            .clock(clock.clone())
            .build()
            .unwrap()
    };

    let trust = {
        let mut sanctuary = build();
        let id = adopt_ember(&mut sanctuary, 25.0);
        sanctuary.interact(id, "observe", &[]).unwrap().result.new_trust
    };

    let mut sanctuary = build();
    let id = adopt_ember(&mut sanctuary, 25.0);
    assert_eq!(sanctuary.animal(id).unwrap().stats.trust, trust);
    assert!(sanctuary.bonding_progress(id).is_some());
}
