//! Data model and protocol types for appwarden
//!
//! This crate defines the stable API between wardend and its clients:
//! - The persisted data model (block policy, usage sessions, session pointer)
//! - Commands (requests from clients)
//! - Responses
//! - Events (daemon -> clients), including overlay render requests
//! - Versioning

mod commands;
mod events;
mod types;

pub use commands::*;
pub use events::*;
pub use types::*;

/// Current API version
pub const API_VERSION: u32 = 1;
