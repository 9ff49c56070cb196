/// Trick learning integration tests — phases, rejections, rewards and performances.

use std::cell::RefCell;
use std::rc::Rc;
use taming_engine::core::bonding::BondingEngine;
use taming_engine::core::clock::ManualClock;
use taming_engine::core::store::MemoryStore;
use taming_engine::core::tricks::{LearningStart, TrickError, TrickLearningEngine};
use taming_engine::schema::animal::Animal;
use taming_engine::schema::personality::{ActivityLevel, PersonalityProfile, PersonalityTrait};
use taming_engine::schema::trick::{Direction, GestureInput, GestureKind, MasteryReward, TrickTable};

const TRICKS: &str = r#"[
    (
        id: "bow",
        name: "Bow",
        category: basic,
        difficulty: 2,
        species_compatibility: [("fox", 0.9), ("fish", 0.0)],
        requirements: (min_trust: Some(20.0)),
        phases: [
            (id: "dip", name: "Dip", gesture: (kind: tap), required_success: 0.6, hints: ["Tap once."]),
            (id: "hold", name: "Hold", gesture: (kind: hold, duration_ms: Some(1000)), required_success: 0.6),
        ],
        practice_attempts: 5,
        performance_value: 10,
        mastery_rewards: [bond_points(15.0), cosmetic("bow_tie")],
    ),
    (
        id: "encore",
        name: "Encore",
        category: performance,
        difficulty: 6,
        requirements: (
            bond_level: Some(acquaintance),
            prerequisites: ["bow"],
            personality: [playful],
        ),
        phases: [
            (id: "flourish", name: "Flourish", gesture: (kind: swipe, direction: Some(up)), required_success: 0.7),
        ],
        practice_attempts: 2,
        performance_value: 30,
    ),
]"#;

struct Fixture {
    clock: Rc<ManualClock>,
    tricks: TrickLearningEngine,
    bonding: BondingEngine,
}

fn fixture(seed: u64) -> Fixture {
    let clock = Rc::new(ManualClock::new(0));
    let tricks = TrickLearningEngine::builder()
        .seed(seed)
        .with_tricks(TrickTable::parse_ron(TRICKS).unwrap())
        .clock(clock.clone())
        .build()
        .unwrap();
    let bonding = BondingEngine::builder().clock(clock.clone()).build().unwrap();
    Fixture { clock, tricks, bonding }
}

/// Calm, medium activity: speed 1.0, threshold = required - 0.1.
fn calm() -> PersonalityProfile {
    PersonalityProfile::new(PersonalityTrait::Calm)
}

fn tap() -> GestureInput {
    GestureInput::new(GestureKind::Tap)
}

fn hold(ms: u64) -> GestureInput {
    GestureInput::new(GestureKind::Hold).lasting(ms)
}

/// Teach "bow" to completion: exact taps, then holds of `hold_ms`.
fn teach_bow(f: &mut Fixture, fox: &Animal, hold_ms: u64) {
    assert!(f
        .tricks
        .start_learning_trick(fox, &calm(), "bow", &f.bonding)
        .unwrap()
        .is_started());
    for _ in 0..5 {
        f.tricks.attempt_trick_gesture(fox.id, "bow", &tap(), &mut f.bonding).unwrap();
    }
    for _ in 0..5 {
        f.tricks
            .attempt_trick_gesture(fox.id, "bow", &hold(hold_ms), &mut f.bonding)
            .unwrap();
    }
}

#[test]
fn phase_advances_after_practice_attempts_successes() {
    let mut f = fixture(1);
    let fox = Animal::new(1, "Ember", "fox").with_trust(30.0);
    let start = f.tricks.start_learning_trick(&fox, &calm(), "bow", &f.bonding).unwrap();
    match start {
        LearningStart::Started { session, .. } => {
            assert_eq!(session.phase_id, "dip");
            assert_eq!(session.total_phases, 2);
            assert!((session.threshold - 0.5).abs() < 1e-6);
            assert!(!session.resumed);
        }
        other => panic!("expected a started session, got {:?}", other),
    }

    // A wrong gesture (0.3 accuracy) earns nothing.
    let miss = f
        .tricks
        .attempt_trick_gesture(fox.id, "bow", &GestureInput::new(GestureKind::Pinch), &mut f.bonding)
        .unwrap();
    assert!(!miss.success);
    assert_eq!(miss.phase_progress, 0.0);
    assert_eq!(miss.feedback, "Almost, try again.");

    for i in 0..4 {
        let outcome = f.tricks.attempt_trick_gesture(fox.id, "bow", &tap(), &mut f.bonding).unwrap();
        assert!(outcome.success);
        assert!(!outcome.phase_advanced, "advanced early on success {}", i + 1);
    }
    let fifth = f.tricks.attempt_trick_gesture(fox.id, "bow", &tap(), &mut f.bonding).unwrap();
    assert!(fifth.phase_advanced);
    assert_eq!(fifth.next_phase.as_deref(), Some("hold"));
    assert!(!fifth.trick_learned);

    let progress = f.tricks.get_learning_progress(fox.id, "bow").unwrap();
    assert_eq!(progress.current_phase, "hold");
    assert_eq!(progress.phase_progress, 0.0);
    assert_eq!(progress.total_attempts, 6);
    assert_eq!(progress.successful_attempts, 5);
    assert_eq!(f.tricks.get_attempt_history(fox.id).len(), 6);
}

#[test]
fn every_personality_needs_exactly_practice_attempts_successes() {
    let mut f = fixture(2);
    let levels = [ActivityLevel::Low, ActivityLevel::Medium, ActivityLevel::High];
    let mut next_id = 1;
    for personality in PersonalityTrait::ALL {
        for level in levels {
            let fox = Animal::new(next_id, "Kit", "fox").with_trust(30.0);
            next_id += 1;
            let profile = PersonalityProfile::new(personality).with_activity_level(level);
            assert!(f
                .tricks
                .start_learning_trick(&fox, &profile, "bow", &f.bonding)
                .unwrap()
                .is_started());

            let mut last_index = 0;
            for (gesture, phase) in [(tap(), "dip"), (hold(1000), "hold")] {
                for success in 1..=5 {
                    let outcome = f
                        .tricks
                        .attempt_trick_gesture(fox.id, "bow", &gesture, &mut f.bonding)
                        .unwrap();
                    assert!(outcome.success, "{:?}/{:?} missed an exact {}", personality, level, phase);
                    let finished = outcome.phase_advanced || outcome.trick_learned;
                    assert_eq!(
                        finished,
                        success == 5,
                        "{:?}/{:?} finished {} on success {}",
                        personality,
                        level,
                        phase,
                        success
                    );

                    let progress = f.tricks.get_learning_progress(fox.id, "bow").unwrap();
                    assert!(
                        progress.phase_index == last_index || progress.phase_index == last_index + 1,
                        "{:?}/{:?} jumped from phase {} to {}",
                        personality,
                        level,
                        last_index,
                        progress.phase_index
                    );
                    last_index = progress.phase_index;
                }
            }
            assert_eq!(last_index, 1);
            assert!(
                f.tricks.get_learned_tricks(fox.id).iter().any(|t| t.trick_id == "bow"),
                "{:?}/{:?} did not learn bow",
                personality,
                level
            );
        }
    }
}

#[test]
fn learning_records_trick_and_forwards_bond_points() {
    let mut f = fixture(2);
    let fox = Animal::new(1, "Ember", "fox").with_trust(30.0);
    f.bonding.initialize_bonding(&fox, &calm());

    let learned = Rc::new(RefCell::new(Vec::new()));
    {
        let learned = learned.clone();
        f.tricks.on_trick_learned(move |_, trick| learned.borrow_mut().push(trick.to_string()));
    }
    let phases = Rc::new(RefCell::new(Vec::new()));
    {
        let phases = phases.clone();
        f.tricks.on_phase_advanced(move |_, _, phase| phases.borrow_mut().push(phase.to_string()));
    }

    f.tricks.start_learning_trick(&fox, &calm(), "bow", &f.bonding).unwrap();
    for _ in 0..5 {
        f.tricks.attempt_trick_gesture(fox.id, "bow", &tap(), &mut f.bonding).unwrap();
    }
    // 800ms against an expected 1000ms scores 0.8.
    let mut last = None;
    for _ in 0..5 {
        last = Some(
            f.tricks
                .attempt_trick_gesture(fox.id, "bow", &hold(800), &mut f.bonding)
                .unwrap(),
        );
    }
    let last = last.unwrap();
    assert!(last.trick_learned);
    assert_eq!(
        last.rewards,
        vec![MasteryReward::BondPoints(15.0), MasteryReward::Cosmetic("bow_tie".to_string())]
    );

    let known = f.tricks.get_learned_tricks(fox.id);
    assert_eq!(known.len(), 1);
    assert_eq!(known[0].trick_id, "bow");
    assert!((known[0].average_quality - 0.9).abs() < 1e-4);
    assert_eq!(known[0].times_performed, 0);
    assert!(f.tricks.get_learning_progress(fox.id, "bow").unwrap().is_learned);
    assert!(f.tricks.get_teaching_session(fox.id, "bow").is_none());

    // Calm bonds emotionally: learning earns x1.2.
    let bond = f.bonding.get_bonding_progress(fox.id).unwrap();
    assert!((bond.bond_points - 18.0).abs() < 1e-4);

    assert_eq!(*learned.borrow(), vec!["bow".to_string()]);
    assert_eq!(*phases.borrow(), vec!["hold".to_string()]);

    assert!(matches!(
        f.tricks.attempt_trick_gesture(fox.id, "bow", &tap(), &mut f.bonding),
        Err(TrickError::AlreadyLearned { .. })
    ));
}

#[test]
fn teaching_resumes_where_it_stopped() {
    let mut f = fixture(3);
    let fox = Animal::new(1, "Ember", "fox").with_trust(30.0);
    f.tricks.start_learning_trick(&fox, &calm(), "bow", &f.bonding).unwrap();
    for _ in 0..2 {
        f.tricks.attempt_trick_gesture(fox.id, "bow", &tap(), &mut f.bonding).unwrap();
    }

    f.clock.advance(60_000);
    match f.tricks.start_learning_trick(&fox, &calm(), "bow", &f.bonding).unwrap() {
        LearningStart::Started { session, .. } => {
            assert!(session.resumed);
            assert!((session.phase_progress - 0.4).abs() < 1e-6);
        }
        other => panic!("expected resumed session, got {:?}", other),
    }
}

#[test]
fn rejections_explain_what_is_missing() {
    let mut f = fixture(4);

    let fish = Animal::new(2, "Bubbles", "fish").with_trust(90.0);
    match f.tricks.start_learning_trick(&fish, &calm(), "bow", &f.bonding).unwrap() {
        LearningStart::Rejected { unmet, .. } => assert!(unmet[0].contains("compatibility")),
        other => panic!("fish should be rejected, got {:?}", other),
    }

    let timid = Animal::new(3, "Thistle", "rabbit").with_trust(10.0);
    match f.tricks.start_learning_trick(&timid, &calm(), "bow", &f.bonding).unwrap() {
        LearningStart::Rejected { unmet, .. } => assert_eq!(unmet, vec!["Requires 20 trust".to_string()]),
        other => panic!("low trust should be rejected, got {:?}", other),
    }

    let fox = Animal::new(1, "Ember", "fox").with_trust(30.0);
    match f.tricks.start_learning_trick(&fox, &calm(), "encore", &f.bonding).unwrap() {
        LearningStart::Rejected { unmet, .. } => {
            assert_eq!(unmet.len(), 3, "unexpected unmet list {:?}", unmet);
            assert!(unmet.iter().any(|u| u.contains("Acquaintance")));
            assert!(unmet.iter().any(|u| u.contains("Bow")));
            assert!(unmet.iter().any(|u| u.contains("playful")));
        }
        other => panic!("encore should be rejected, got {:?}", other),
    }
    assert!(f.tricks.get_learning_progress(fox.id, "encore").is_none());

    assert!(matches!(
        f.tricks.start_learning_trick(&fox, &calm(), "backflip", &f.bonding),
        Err(TrickError::UnknownTrick(_))
    ));
    assert!(matches!(
        f.tricks.attempt_trick_gesture(fox.id, "bow", &tap(), &mut f.bonding),
        Err(TrickError::NoProgress { .. })
    ));
}

#[test]
fn already_learned_trick_is_rejected_without_requirements() {
    let mut f = fixture(5);
    let fox = Animal::new(1, "Ember", "fox").with_trust(30.0);
    teach_bow(&mut f, &fox, 1000);

    match f.tricks.start_learning_trick(&fox, &calm(), "bow", &f.bonding).unwrap() {
        LearningStart::Rejected { message, unmet } => {
            assert!(message.contains("already knows"));
            assert!(unmet.is_empty());
        }
        other => panic!("expected rejection, got {:?}", other),
    }
}

#[test]
fn unlearned_trick_cannot_be_performed() {
    let mut f = fixture(6);
    let fox = Animal::new(1, "Ember", "fox").with_trust(30.0);
    let outcome = f.tricks.perform_trick(fox.id, "bow", &mut f.bonding).unwrap();
    assert!(!outcome.success);
    assert!(outcome.performance.is_none());
    assert!(f.tricks.get_performance_history(fox.id).is_empty());
    assert!(matches!(
        f.tricks.perform_trick(fox.id, "backflip", &mut f.bonding),
        Err(TrickError::UnknownTrick(_))
    ));
}

#[test]
fn performances_build_mastery_up_to_the_cap() {
    let mut f = fixture(7);
    let fox = Animal::new(1, "Ember", "fox").with_trust(30.0);
    f.bonding.initialize_bonding(&fox, &calm());
    teach_bow(&mut f, &fox, 1000);

    let mastered = Rc::new(RefCell::new(0));
    {
        let mastered = mastered.clone();
        f.tricks.on_trick_mastered(move |_, _| *mastered.borrow_mut() += 1);
    }

    for _ in 0..60 {
        f.clock.advance(1_000);
        let outcome = f.tricks.perform_trick(fox.id, "bow", &mut f.bonding).unwrap();
        let performance = outcome.performance.unwrap();
        assert!((0.0..=1.0).contains(&performance.quality));
        assert_eq!(performance.points_earned, (10.0 * performance.quality).floor() as u32);
        assert_eq!(outcome.bond.is_some(), performance.quality > 0.7);
        if performance.quality <= 0.8 {
            assert_eq!(outcome.mastery_gained, 0.0);
        }
        assert!(f.tricks.get_mastery_level(fox.id, "bow") <= 100.0);
    }

    assert_eq!(f.tricks.get_mastery_level(fox.id, "bow"), 100.0);
    let known = &f.tricks.get_learned_tricks(fox.id)[0];
    assert!(known.is_mastered);
    assert_eq!(known.times_performed, 60);
    assert!(known.best_quality >= known.average_quality);
    assert_eq!(*mastered.borrow(), 1);
    assert_eq!(f.tricks.get_performance_history(fox.id).len(), 60);
    assert!(f.tricks.get_learning_progress(fox.id, "bow").unwrap().is_mastered);
}

#[test]
fn queries_are_idempotent() {
    let mut f = fixture(8);
    let fox = Animal::new(1, "Ember", "fox").with_trust(30.0);
    teach_bow(&mut f, &fox, 900);
    f.tricks.perform_trick(fox.id, "bow", &mut f.bonding).unwrap();

    let learned = f.tricks.get_learned_tricks(fox.id).to_vec();
    let history = f.tricks.get_performance_history(fox.id).to_vec();
    assert_eq!(f.tricks.get_learned_tricks(fox.id), learned.as_slice());
    assert_eq!(f.tricks.get_performance_history(fox.id), history.as_slice());
    assert_eq!(
        f.tricks.get_mastery_level(fox.id, "bow"),
        f.tricks.get_mastery_level(fox.id, "bow")
    );
}

#[test]
fn learned_tricks_survive_rebuild() {
    let store = Rc::new(MemoryStore::new());
    let clock = Rc::new(ManualClock::new(0));
    let build = || {
        TrickLearningEngine::builder()
            .with_tricks(TrickTable::parse_ron(TRICKS).unwrap())
            .store(store.clone())
            .clock(clock.clone())
            .build()
            .unwrap()
    };

    let mut f = Fixture {
        clock: clock.clone(),
        tricks: build(),
        bonding: BondingEngine::builder().clock(clock.clone()).build().unwrap(),
    };
    let fox = Animal::new(1, "Ember", "fox").with_trust(30.0);
    teach_bow(&mut f, &fox, 1000);

    let rebuilt = build();
    assert_eq!(rebuilt.get_learned_tricks(fox.id), f.tricks.get_learned_tricks(fox.id));
    assert_eq!(rebuilt.get_attempt_history(fox.id).len(), 10);
}

#[test]
fn direction_matters_for_directed_phases() {
    let mut f = fixture(9);
    let playful = PersonalityProfile::new(PersonalityTrait::Playful);
    let fox = Animal::new(1, "Ember", "fox").with_trust(30.0);
    f.bonding.initialize_bonding(&fox, &playful);
    teach_bow(&mut f, &fox, 1000);

    // Reach an exact Acquaintance bond so "encore" opens up.
    f.bonding.update_time_spent_together(fox.id, 300_000).unwrap();
    f.bonding.add_bond_points(fox.id, 100.0, "play", None).unwrap();
    assert!(f
        .tricks
        .start_learning_trick(&fox, &playful, "encore", &f.bonding)
        .unwrap()
        .is_started());

    let wrong_way = GestureInput::new(GestureKind::Swipe).towards(Direction::Down);
    let outcome = f
        .tricks
        .attempt_trick_gesture(fox.id, "encore", &wrong_way, &mut f.bonding)
        .unwrap();
    assert!(!outcome.success);
    assert!((outcome.gesture_accuracy - 0.5).abs() < 1e-6);
}
