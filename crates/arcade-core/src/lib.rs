//! Session lifecycle and billing engine for arcaded
//!
//! This crate is the heart of arcaded, containing:
//! - Pause accounting (PauseLedger)
//! - Session state machine (Active <-> Paused -> Terminated | Cancelled)
//! - Pricing (hourly rate or fixed-price plan, discount at settlement)
//! - Billing snapshots derived from an injected clock
//! - Fire-once warning and expiry scheduling
//! - The engine that owns every session and persists settlements

mod billing;
mod engine;
mod error;
mod events;
mod lifecycle;
mod pause;
mod pricing;
mod warnings;

pub use billing::*;
pub use engine::*;
pub use error::*;
pub use events::*;
pub use lifecycle::*;
pub use pause::*;
pub use pricing::*;
pub use warnings::*;
