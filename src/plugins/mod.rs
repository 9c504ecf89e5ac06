//! Engine components, leaf-first.

pub mod progression;
pub mod stats;
pub mod lifescore;
pub mod catalog;
pub mod rewards;
pub mod achievements;
pub mod missions;
pub mod scenario;
pub mod ratelimit;
pub mod engine;
