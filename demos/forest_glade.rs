/// Forest Glade example — one afternoon with a wary fox.
///
/// A walkthrough: first contact → feeding → a long session together →
/// teaching "sit" → performing it → the bond fading after a day away.
///
/// Uses a manual clock so the whole afternoon runs instantly.
///
/// Run with: cargo run --example forest_glade

use std::cell::RefCell;
use std::rc::Rc;
use taming_engine::core::clock::{ManualClock, MINUTE_MS};
use taming_engine::core::sanctuary::Sanctuary;
use taming_engine::core::tricks::LearningStart;
use taming_engine::schema::animal::Animal;
use taming_engine::schema::personality::{ActivityLevel, PersonalityProfile, PersonalityTrait};
use taming_engine::schema::trick::GestureInput;

fn main() {
    let clock = Rc::new(ManualClock::new(1_700_000_000_000));
    let mut sanctuary = Sanctuary::builder()
        .seed(2026)
        .clock(clock.clone())
        .build()
        .expect("Failed to build sanctuary");

    // Collect notable moments from every engine.
    let log = Rc::new(RefCell::new(Vec::<String>::new()));
    {
        let log = log.clone();
        sanctuary.bonding_mut().on_bond_level_up(move |id, from, to| {
            log.borrow_mut()
                .push(format!("{}: bond {} -> {}", id, from.name(), to.name()));
        });
    }
    {
        let log = log.clone();
        sanctuary.bonding_mut().on_milestone_achieved(move |id, milestone| {
            log.borrow_mut().push(format!("{}: milestone {}", id, milestone));
        });
    }
    {
        let log = log.clone();
        sanctuary.tricks_mut().on_trick_learned(move |id, trick| {
            log.borrow_mut().push(format!("{}: learned {}", id, trick));
        });
    }

    // --- Meet Ember ---
    let ember = Animal::new(1, "Ember", "fox").with_trust(25.0);
    let id = ember.id;
    let personality = PersonalityProfile::new(PersonalityTrait::Friendly)
        .with_secondary(PersonalityTrait::Curious)
        .with_activity_level(ActivityLevel::High)
        .preferring("offer_food");
    sanctuary.adopt(ember, personality);
    sanctuary.start_session(id).expect("Ember is registered");

    println!("=== Forest Glade ===\n");

    // --- Win some trust ---
    let food = vec!["food".to_string()];
    for round in 0..6 {
        let interaction = if round % 2 == 0 { "offer_food" } else { "soft_voice" };
        match sanctuary.interact(id, interaction, &food) {
            Ok(outcome) => println!(
                "{:<11} {:>7}  trust {:5.1} -> {:5.1}",
                interaction,
                if outcome.result.success { "success" } else { "failed" },
                outcome.result.previous_trust,
                outcome.result.new_trust
            ),
            Err(e) => println!("{:<11} skipped: {}", interaction, e),
        }
        clock.advance(12_000);
    }

    // --- An hour in the glade ---
    clock.advance(60 * MINUTE_MS);
    let session = sanctuary
        .end_session(id)
        .expect("bonding record exists")
        .expect("session was open");
    println!(
        "\nSession ended: trust {:.1} -> {:.1}",
        session.initial_trust, session.current_trust
    );

    // --- Teach "sit" ---
    match sanctuary.start_learning_trick(id, "sit") {
        Ok(LearningStart::Started { message, .. }) => println!("\n{}", message),
        Ok(LearningStart::Rejected { message, unmet }) => {
            println!("\n{}: {}", message, unmet.join("; "));
            return;
        }
        Err(e) => {
            println!("\nCannot teach sit: {}", e);
            return;
        }
    }
    let sit = sanctuary
        .tricks()
        .tricks()
        .get("sit")
        .cloned()
        .expect("sit is a built-in trick");
    'teaching: for phase in &sit.phases {
        loop {
            let outcome = sanctuary
                .attempt_trick_gesture(id, "sit", &GestureInput::from(&phase.gesture))
                .expect("sit is being taught");
            println!("  [{}] {}", phase.name, outcome.feedback);
            if outcome.trick_learned {
                break 'teaching;
            }
            if outcome.phase_advanced {
                break;
            }
        }
    }

    // --- Show off ---
    println!();
    for _ in 0..3 {
        let outcome = sanctuary.perform_trick(id, "sit").expect("sit is known");
        println!("{}", outcome.message);
    }

    // --- A day away ---
    let before = sanctuary
        .bonding_progress(id)
        .map(|p| p.bond_points)
        .unwrap_or(0.0);
    clock.advance(24 * 60 * MINUTE_MS);
    sanctuary.tick_now();
    let after = sanctuary
        .bonding_progress(id)
        .map(|p| p.bond_points)
        .unwrap_or(0.0);
    println!("\nA day away: bond points {:.0} -> {:.0}", before, after);

    println!("\n--- Moments ---");
    for line in log.borrow().iter() {
        println!("  {}", line);
    }
}
