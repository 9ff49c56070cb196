//! Taming Engine — trust, bonding and trick-learning rules for
//! animal-taming games.
//!
//! Three cooperating rules engines over per-animal records: taming turns
//! individual interactions into trust, bonding turns sustained attention
//! into a decaying long-term bond, and trick learning drives a phased
//! teaching protocol gated by both.

pub mod core;
pub mod schema;
