//! Protocol types for arcaded
//!
//! This crate defines the stable API between arcaded and the dashboard:
//! - Session and billing types shared with the engine
//! - Transition requests (the closed set of lifecycle events)
//! - Commands and responses
//! - Events (service -> clients)

mod commands;
mod events;
mod types;

pub use commands::*;
pub use events::*;
pub use types::*;

/// Current API version
pub const API_VERSION: u32 = 1;
