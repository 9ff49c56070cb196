/// Preview — interactive shell for playing through taming, bonding and tricks.
///
/// Usage: preview [--interactions <file>] [--bonding <file>] [--tricks <file>]
///                [--store <dir>] [--seed <n>]
///
/// Commands:
///   adopt <name> <species> <trait> [trust] — add an animal
///   list                                  — list animals
///   select <id>                           — choose the active animal
///   options [items...]                    — interactions available now
///   do <interaction> [items...]           — attempt an interaction
///   end                                   — end the taming session
///   teach <trick>                         — start or resume teaching a trick
///   gesture <trick> <kind> [dir] [ms]     — attempt a teaching gesture
///   perform <trick>                       — perform a learned trick
///   ability <id>                          — use a companion ability
///   wait <seconds>                        — advance time and run maintenance
///   status                                — trust, bond and trick summary
///   help                                  — list commands
///   quit                                  — exit

use std::io::{self, BufRead, Write};
use std::rc::Rc;
use taming_engine::core::clock::{Clock, ManualClock, SystemClock};
use taming_engine::core::sanctuary::Sanctuary;
use taming_engine::core::store::{FileStore, MemoryStore, Store};
use taming_engine::core::tricks::LearningStart;
use taming_engine::schema::animal::{Animal, AnimalId};
use taming_engine::schema::personality::{PersonalityProfile, PersonalityTrait};
use taming_engine::schema::trick::{Direction, GestureInput, GestureKind};

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return;
    }

    let mut interactions_path = None;
    let mut bonding_path = None;
    let mut tricks_path = None;
    let mut store_dir = None;
    let mut seed: u64 = 42;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--interactions" if i + 1 < args.len() => {
                i += 1;
                interactions_path = Some(args[i].clone());
            }
            "--bonding" if i + 1 < args.len() => {
                i += 1;
                bonding_path = Some(args[i].clone());
            }
            "--tricks" if i + 1 < args.len() => {
                i += 1;
                tricks_path = Some(args[i].clone());
            }
            "--store" if i + 1 < args.len() => {
                i += 1;
                store_dir = Some(args[i].clone());
            }
            "--seed" if i + 1 < args.len() => {
                i += 1;
                seed = args[i].parse().unwrap_or(42);
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    let store: Rc<dyn Store> = match store_dir {
        Some(ref dir) => match FileStore::open(dir) {
            Ok(store) => Rc::new(store),
            Err(e) => {
                eprintln!("ERROR: Cannot open store at {}: {}", dir, e);
                std::process::exit(1);
            }
        },
        None => Rc::new(MemoryStore::new()),
    };
    // Virtual time starting from now, so `wait` can skip ahead.
    let clock = Rc::new(ManualClock::new(SystemClock.now_ms()));

    let mut builder = Sanctuary::builder()
        .seed(seed)
        .store(store)
        .clock(clock.clone());
    if let Some(ref path) = interactions_path {
        builder = builder.interactions_path(path);
    }
    if let Some(ref path) = bonding_path {
        builder = builder.bonding_path(path);
    }
    if let Some(ref path) = tricks_path {
        builder = builder.tricks_path(path);
    }
    let mut sanctuary = match builder.build() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            std::process::exit(1);
        }
    };

    println!(
        "Loaded {} interactions and {} tricks",
        sanctuary.taming().interactions().interactions.len(),
        sanctuary.tricks().tricks().tricks.len()
    );
    println!("Seed: {}", seed);
    println!("Type 'help' for commands.\n");

    let mut active: Option<AnimalId> = None;
    let mut next_id: u64 = 1;

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("preview> ");
        stdout.flush().ok();

        let mut line = String::new();
        if stdin.lock().read_line(&mut line).is_err() || line.is_empty() {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        let cmd = parts[0].to_lowercase();

        match cmd.as_str() {
            "quit" | "exit" | "q" => {
                println!("Goodbye.");
                break;
            }
            "help" | "h" | "?" => print_help(),
            "adopt" => {
                if parts.len() < 4 {
                    println!("Usage: adopt <name> <species> <trait> [trust]");
                    continue;
                }
                let Some(primary) = PersonalityTrait::from_name(parts[3]) else {
                    let names: Vec<&str> = PersonalityTrait::ALL.iter().map(|t| t.name()).collect();
                    println!("Unknown trait '{}'. One of: {}", parts[3], names.join(", "));
                    continue;
                };
                let trust = parts.get(4).and_then(|t| t.parse().ok()).unwrap_or(0.0);
                let animal = Animal::new(next_id, parts[1], parts[2]).with_trust(trust);
                let id = animal.id;
                next_id += 1;
                sanctuary.adopt(animal, PersonalityProfile::new(primary));
                active = Some(id);
                println!("Adopted {} as {} (now active)", parts[1], id);
            }
            "list" => {
                let mut animals: Vec<&Animal> = sanctuary.animals().collect();
                animals.sort_by_key(|a| a.id);
                for a in animals {
                    let marker = if Some(a.id) == active { "*" } else { " " };
                    println!(
                        "{} {} {} the {} (trust {:.1}, energy {:.0})",
                        marker, a.id, a.name, a.species, a.stats.trust, a.stats.energy
                    );
                }
            }
            "select" => {
                match parts.get(1).and_then(|s| s.parse::<u64>().ok()).map(AnimalId) {
                    Some(id) if sanctuary.animal(id).is_some() => {
                        active = Some(id);
                        println!("Active animal: {}", id);
                    }
                    _ => println!("Usage: select <id> (see 'list')"),
                }
            }
            "wait" => {
                let secs: u64 = match parts.get(1).and_then(|s| s.parse().ok()) {
                    Some(s) => s,
                    None => {
                        println!("Usage: wait <seconds>");
                        continue;
                    }
                };
                clock.advance(secs * 1000);
                let decayed = sanctuary.tick_now();
                println!("{}s pass.", secs);
                for report in decayed {
                    println!(
                        "  {} lost {:.0} bond points ({:.0} left, {})",
                        report.animal_id,
                        report.points_lost,
                        report.bond_points,
                        report.level.name()
                    );
                }
            }
            _ => {
                let Some(id) = active else {
                    println!("No active animal. Use 'adopt' first.");
                    continue;
                };
                run_animal_command(&mut sanctuary, id, &cmd, &parts[1..]);
            }
        }
    }
}

fn run_animal_command(sanctuary: &mut Sanctuary, id: AnimalId, cmd: &str, args: &[&str]) {
    let items: Vec<String> = args.iter().skip(1).map(|s| s.to_string()).collect();
    match cmd {
        "options" => {
            let all: Vec<String> = args.iter().map(|s| s.to_string()).collect();
            if let Err(e) = sanctuary.start_session(id) {
                println!("Error: {}", e);
                return;
            }
            for interaction in sanctuary.available_interactions(id, &all) {
                println!(
                    "  {:<16} {:+.1} trust, cooldown {}s",
                    interaction.id,
                    interaction.base_trust_modifier,
                    interaction.cooldown_ms / 1000
                );
            }
        }
        "do" => {
            let Some(interaction) = args.first() else {
                println!("Usage: do <interaction> [items...]");
                return;
            };
            match sanctuary.interact(id, interaction, &items) {
                Ok(outcome) => {
                    let r = &outcome.result;
                    println!(
                        "{} ({}): trust {:.1} -> {:.1} [{:.0}% chance, {}]",
                        r.interaction_id,
                        if r.success { "success" } else { "failed" },
                        r.previous_trust,
                        r.new_trust,
                        r.success_chance * 100.0,
                        r.reaction
                    );
                    if let Some(bond) = outcome.bond {
                        println!("  +{:.1} bond points", bond.points_awarded);
                        if let Some(level) = bond.new_level {
                            println!("  Bond grew to {}!", level.name());
                        }
                        for m in &bond.milestones_achieved {
                            println!("  Milestone: {}", m);
                        }
                        for a in &bond.abilities_unlocked {
                            println!("  Ability unlocked: {}", a);
                        }
                    }
                }
                Err(e) => println!("Error: {}", e),
            }
        }
        "end" => match sanctuary.end_session(id) {
            Ok(Some(session)) => println!(
                "Session over: trust {:.1} -> {:.1} ({})",
                session.initial_trust,
                session.current_trust,
                if session.success { "progress" } else { "no progress" }
            ),
            Ok(None) => println!("No open session."),
            Err(e) => println!("Error: {}", e),
        },
        "teach" => {
            let Some(trick) = args.first() else {
                println!("Usage: teach <trick>");
                return;
            };
            match sanctuary.start_learning_trick(id, trick) {
                Ok(LearningStart::Started { session, message }) => {
                    println!("{}", message);
                    println!(
                        "  Phase {}/{}: {} (accuracy >= {:.2})",
                        session.phase_index + 1,
                        session.total_phases,
                        session.phase_name,
                        session.threshold
                    );
                    for hint in &session.hints {
                        println!("  Hint: {}", hint);
                    }
                }
                Ok(LearningStart::Rejected { message, unmet }) => {
                    println!("{}", message);
                    for u in unmet {
                        println!("  - {}", u);
                    }
                }
                Err(e) => println!("Error: {}", e),
            }
        }
        "gesture" => {
            if args.len() < 2 {
                println!("Usage: gesture <trick> <tap|double_tap|swipe|hold|circle|pinch> [up|down|left|right] [ms]");
                return;
            }
            let Some(kind) = parse_gesture_kind(args[1]) else {
                println!("Unknown gesture: {}", args[1]);
                return;
            };
            let mut input = GestureInput::new(kind);
            for extra in &args[2..] {
                if let Some(dir) = parse_direction(extra) {
                    input = input.towards(dir);
                } else if let Ok(ms) = extra.parse::<u64>() {
                    input = input.lasting(ms);
                }
            }
            match sanctuary.attempt_trick_gesture(id, args[0], &input) {
                Ok(outcome) => {
                    println!(
                        "{} (accuracy {:.2}, phase {:.0}%)",
                        outcome.feedback,
                        outcome.gesture_accuracy,
                        outcome.phase_progress * 100.0
                    );
                    if let Some(next) = outcome.next_phase {
                        println!("  Next phase: {}", next);
                    }
                }
                Err(e) => println!("Error: {}", e),
            }
        }
        "perform" => {
            let Some(trick) = args.first() else {
                println!("Usage: perform <trick>");
                return;
            };
            match sanctuary.perform_trick(id, trick) {
                Ok(outcome) => {
                    println!("{}", outcome.message);
                    if let Some(p) = outcome.performance {
                        println!(
                            "  quality {:.2}, {} points, +{:.0} mastery",
                            p.quality, p.points_earned, p.mastery_gained
                        );
                    }
                }
                Err(e) => println!("Error: {}", e),
            }
        }
        "ability" => {
            let Some(ability) = args.first() else {
                println!("Usage: ability <id>");
                return;
            };
            match sanctuary.use_ability(id, ability) {
                Ok(used) => println!(
                    "{} ({} x{:.1}), ready again in {}s",
                    used.ability_id,
                    used.effect,
                    used.magnitude,
                    (used.cooldown_until - used.used_at) / 1000
                ),
                Err(e) => println!("Error: {}", e),
            }
        }
        "status" => print_status(sanctuary, id),
        _ => println!("Unknown command: {}. Type 'help' for commands.", cmd),
    }
}

fn print_status(sanctuary: &Sanctuary, id: AnimalId) {
    match sanctuary.taming().get_trust_level_info(id) {
        Some(info) => println!(
            "Trust {:.1} ({}: {}) {:.0}% to next tier",
            info.trust,
            info.name,
            info.description,
            info.progress_to_next * 100.0
        ),
        None => println!("Not met yet."),
    }
    if let Some(bond) = sanctuary.bonding_progress(id) {
        println!(
            "Bond: {} with {:.0} points, {} min together, decay {:.2}/min",
            bond.current_bond_level.name(),
            bond.bond_points,
            bond.time_spent_together_ms / 60_000,
            bond.bond_decay_rate
        );
        if !bond.unlocked_abilities.is_empty() {
            println!("  Abilities: {}", bond.unlocked_abilities.join(", "));
        }
        if !bond.knowledge.is_empty() {
            println!("  Knows: {}", bond.knowledge.join(", "));
        }
    }
    for learned in sanctuary.tricks().get_learned_tricks(id) {
        println!(
            "  Trick {}: performed {}x, avg quality {:.2}, mastery {:.0}",
            learned.trick_id, learned.times_performed, learned.average_quality, learned.mastery_level
        );
    }
}

fn parse_gesture_kind(s: &str) -> Option<GestureKind> {
    match s {
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
    match s {
        "up" => Some(Direction::Up),
        "down" => Some(Direction::Down),
        "left" => Some(Direction::Left),
        "right" => Some(Direction::Right),
        _ => None,
    }
}

fn print_usage() {
    println!("Usage: preview [--interactions <file>] [--bonding <file>] [--tricks <file>]");
    println!("               [--store <dir>] [--seed <n>]");
}

fn print_help() {
    println!("Commands:");
    println!("  adopt <name> <species> <trait> [trust]  Add an animal");
    println!("  list                                   List animals");
    println!("  select <id>                            Choose the active animal");
    println!("  options [items...]                     Interactions available now");
    println!("  do <interaction> [items...]            Attempt an interaction");
    println!("  end                                    End the taming session");
    println!("  teach <trick>                          Start or resume teaching a trick");
    println!("  gesture <trick> <kind> [dir] [ms]      Attempt a teaching gesture");
    println!("  perform <trick>                        Perform a learned trick");
    println!("  ability <id>                           Use a companion ability");
    println!("  wait <seconds>                         Advance time and run maintenance");
    println!("  status                                 Trust, bond and trick summary");
    println!("  quit                                   Exit");
}
