//! Rules engines and the infrastructure they share.

pub mod bonding;
pub mod clock;
pub mod events;
pub mod gate;
pub mod sanctuary;
pub mod scheduler;
pub mod store;
pub mod taming;
pub mod tricks;
pub mod validate;
