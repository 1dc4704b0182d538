//! Shared utilities for arcaded
//!
//! This crate provides:
//! - ID types (SessionId, StationId, PlanId, ClientId)
//! - The injectable clock (monotonic system clock, manual test clock)
//! - Money in minor units with half-up rounding helpers
//! - Default paths for socket, data, and config

mod ids;
mod money;
mod paths;
mod time;

pub use ids::*;
pub use money::*;
pub use paths::*;
pub use time::*;
