use serde::{Deserialize, Serialize};

/// Newtype wrapper for animal IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AnimalId(pub u64);

impl std::fmt::Display for AnimalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "animal#{}", self.0)
    }
}

/// Live stats owned by the world simulation. The engines only read them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    /// 0..=100
    pub trust: f32,
    /// 0..=100
    pub energy: f32,
}

impl Default for Stats {
    fn default() -> Self {
        Self {
            trust: 0.0,
            energy: 100.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

/// Descriptor of a wild animal as handed over by the world layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Animal {
    pub id: AnimalId,
    pub name: String,
    /// Species key, e.g. "fox" or "red_panda". Matched against trick
    /// compatibility tables.
    pub species: String,
    pub stats: Stats,
    #[serde(default)]
    pub position: Position,
}

impl Animal {
    pub fn new(id: u64, name: &str, species: &str) -> Self {
        Self {
            id: AnimalId(id),
            name: name.to_string(),
            species: species.to_string(),
            stats: Stats::default(),
            position: Position::default(),
        }
    }

    pub fn with_trust(mut self, trust: f32) -> Self {
        self.stats.trust = trust.clamp(0.0, 100.0);
        self
    }

    pub fn with_energy(mut self, energy: f32) -> Self {
        self.stats.energy = energy.clamp(0.0, 100.0);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn animal_creation() {
        let fox = Animal::new(7, "Ember", "fox").with_trust(25.0);
        assert_eq!(fox.id, AnimalId(7));
        assert_eq!(fox.species, "fox");
        assert_eq!(fox.stats.trust, 25.0);
        assert_eq!(fox.stats.energy, 100.0);
    }

    #[test]
    fn stats_are_clamped() {
        let owl = Animal::new(1, "Hoot", "owl").with_trust(140.0).with_energy(-3.0);
        assert_eq!(owl.stats.trust, 100.0);
        assert_eq!(owl.stats.energy, 0.0);
    }

    #[test]
    fn animal_id_display() {
        assert_eq!(AnimalId(42).to_string(), "animal#42");
    }
}
