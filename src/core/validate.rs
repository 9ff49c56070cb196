/// Static checks over the data tables. Errors make a table unusable;
/// warnings flag content that loads but probably isn't what the author meant.
use rustc_hash::FxHashSet;

use crate::schema::bond::BondingTable;
use crate::schema::interaction::InteractionTable;
use crate::schema::trick::{MasteryReward, TrickTable};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LintReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl LintReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn extend(&mut self, other: LintReport) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }
}

fn duplicates<'a>(ids: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
    let mut seen = FxHashSet::default();
    let mut dupes = Vec::new();
    for id in ids {
        if !seen.insert(id) && !dupes.contains(&id) {
            dupes.push(id);
        }
    }
    dupes
}

pub fn lint_interactions(table: &InteractionTable) -> LintReport {
    let mut report = LintReport::default();

    for id in duplicates(table.iter().map(|i| i.id.as_str())) {
        report.errors.push(format!("Duplicate interaction id '{}'", id));
    }

    for interaction in table.iter() {
        let req = &interaction.requirements;
        if let (Some(min), Some(max)) = (req.min_trust, req.max_trust) {
            if min > max {
                report.errors.push(format!(
                    "Interaction '{}' requires trust between {} and {}, which is empty",
                    interaction.id, min, max
                ));
            }
        }
        if let Some(max) = req.max_trust {
            if max < interaction.unlock_tier.threshold() {
                report.errors.push(format!(
                    "Interaction '{}' unlocks at {} but stops working above {} trust",
                    interaction.id,
                    interaction.unlock_tier.name(),
                    max
                ));
            }
        }
        if interaction.base_trust_modifier == 0.0 {
            report
                .warnings
                .push(format!("Interaction '{}' never changes trust", interaction.id));
        }
        if interaction.energy_cost < 0.0 {
            report
                .warnings
                .push(format!("Interaction '{}' has a negative energy cost", interaction.id));
        }
    }

    report
}

pub fn lint_bonding(table: &BondingTable) -> LintReport {
    let mut report = LintReport::default();

    for id in duplicates(table.milestones.iter().map(|m| m.id.as_str())) {
        report.errors.push(format!("Duplicate milestone id '{}'", id));
    }
    for id in duplicates(table.abilities.iter().map(|a| a.id.as_str())) {
        report.errors.push(format!("Duplicate ability id '{}'", id));
    }

    let mut levels: Vec<_> = table.levels.iter().collect();
    levels.sort_by_key(|l| l.level);
    for pair in levels.windows(2) {
        let (lower, upper) = (pair[0], pair[1]);
        if lower.level == upper.level {
            report
                .errors
                .push(format!("Bond level '{}' is defined twice", upper.level.name()));
        } else if upper.points_required <= lower.points_required
            || upper.time_required_ms <= lower.time_required_ms
        {
            report.errors.push(format!(
                "Bond level '{}' must need more points and time than '{}'",
                upper.level.name(),
                lower.level.name()
            ));
        }
    }
    if table.levels.is_empty() {
        report.warnings.push("No bond levels defined".to_string());
    }

    let known: FxHashSet<&str> = table.abilities.iter().map(|a| a.id.as_str()).collect();
    for level in &table.levels {
        for ability in &level.abilities {
            if !known.contains(ability.as_str()) {
                report.errors.push(format!(
                    "Bond level '{}' grants unknown ability '{}'",
                    level.level.name(),
                    ability
                ));
            }
        }
    }
    for milestone in &table.milestones {
        for ability in &milestone.rewards.abilities {
            if !known.contains(ability.as_str()) {
                report.errors.push(format!(
                    "Milestone '{}' rewards unknown ability '{}'",
                    milestone.id, ability
                ));
            }
        }
        if milestone.requirements.is_empty() {
            report.warnings.push(format!(
                "Milestone '{}' has no requirements and is achieved on reaching {}",
                milestone.id,
                milestone.required_level.name()
            ));
        }
    }

    report
}

pub fn lint_tricks(table: &TrickTable) -> LintReport {
    let mut report = LintReport::default();

    for id in duplicates(table.iter().map(|t| t.id.as_str())) {
        report.errors.push(format!("Duplicate trick id '{}'", id));
    }

    for trick in table.iter() {
        if trick.phases.is_empty() {
            report.errors.push(format!("Trick '{}' has no teaching phases", trick.id));
        }
        if trick.practice_attempts == 0 {
            report
                .errors
                .push(format!("Trick '{}' needs at least one practice attempt", trick.id));
        }
        for id in duplicates(trick.phases.iter().map(|p| p.id.as_str())) {
            report
                .errors
                .push(format!("Trick '{}' has duplicate phase '{}'", trick.id, id));
        }
        for phase in &trick.phases {
            if !(0.0..=1.0).contains(&phase.required_success) {
                report.errors.push(format!(
                    "Phase '{}' of '{}' requires accuracy {} outside 0..=1",
                    phase.id, trick.id, phase.required_success
                ));
            }
        }
        for prereq in &trick.requirements.prerequisites {
            if prereq == &trick.id {
                report.errors.push(format!("Trick '{}' requires itself", trick.id));
            } else if table.get(prereq).is_none() {
                report.errors.push(format!(
                    "Trick '{}' requires unknown trick '{}'",
                    trick.id, prereq
                ));
            }
        }
        if !(1..=10).contains(&trick.difficulty) {
            report.warnings.push(format!(
                "Trick '{}' has difficulty {} (expected 1-10)",
                trick.id, trick.difficulty
            ));
        }
        if trick
            .species_compatibility
            .iter()
            .all(|(_, rate)| *rate < 0.1)
            && trick.default_compatibility < 0.1
        {
            report
                .warnings
                .push(format!("No species can learn trick '{}'", trick.id));
        }
        if !trick
            .mastery_rewards
            .iter()
            .any(|r| matches!(r, MasteryReward::BondPoints(_)))
        {
            report
                .warnings
                .push(format!("Trick '{}' awards no bond points when learned", trick.id));
        }
    }

    report
}

/// Lint every table together.
pub fn lint_all(interactions: &InteractionTable, bonding: &BondingTable, tricks: &TrickTable) -> LintReport {
    let mut report = lint_interactions(interactions);
    report.extend(lint_bonding(bonding));
    report.extend(lint_tricks(tricks));
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_tables_have_no_errors() {
        let report = lint_all(
            &InteractionTable::builtin().unwrap(),
            &BondingTable::builtin().unwrap(),
            &TrickTable::builtin().unwrap(),
        );
        assert!(!report.has_errors(), "{:?}", report.errors);
    }

    #[test]
    fn dangling_prerequisite_and_empty_phases() {
        let tricks = TrickTable::parse_ron(
            r#"[
                (id: "bow", name: "Bow", category: basic, difficulty: 2,
                 requirements: (prerequisites: ["curtsy"]),
                 phases: [], practice_attempts: 3, performance_value: 5),
            ]"#,
        )
        .unwrap();
        let report = lint_tricks(&tricks);
        assert!(report.errors.iter().any(|e| e.contains("curtsy")));
        assert!(report.errors.iter().any(|e| e.contains("no teaching phases")));
    }

    #[test]
    fn level_thresholds_must_increase() {
        let table = BondingTable::parse_ron(
            r#"(
                levels: [
                    (level: stranger, name: "Stranger", points_required: 0.0, time_required_ms: 0),
                    (level: acquaintance, name: "Acquaintance", points_required: 100.0, time_required_ms: 0),
                ],
            )"#,
        )
        .unwrap();
        let report = lint_bonding(&table);
        assert!(report.errors.iter().any(|e| e.contains("acquaintance")));
    }

    #[test]
    fn unknown_ability_reference() {
        let table = BondingTable::parse_ron(
            r#"(
                levels: [
                    (level: stranger, name: "Stranger", points_required: 0.0, time_required_ms: 0, abilities: ["fly"]),
                ],
            )"#,
        )
        .unwrap();
        let report = lint_bonding(&table);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("fly"));
    }

    #[test]
    fn duplicates_are_reported_once() {
        assert_eq!(duplicates(["a", "b", "a", "a"].into_iter()), vec!["a"]);
    }
}
