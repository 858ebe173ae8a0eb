//! Conjunction risk, spatial density, shell health and ground visibility

mod density;
mod health;
mod risk;
mod visibility;

pub use density::*;
pub use health::*;
pub use risk::*;
pub use visibility::*;
