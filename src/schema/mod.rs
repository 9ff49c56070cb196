//! Plain data types shared by the engines: animal descriptors, personality
//! profiles, and the static interaction, bonding and trick tables.

pub mod animal;
pub mod bond;
pub mod interaction;
pub mod personality;
pub mod table;
pub mod trick;
