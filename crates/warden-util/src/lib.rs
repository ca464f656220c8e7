//! Shared utilities for appwarden
//!
//! This crate provides:
//! - ID types (AppId, SessionId, ClientId)
//! - Time utilities (mockable wall clock, millisecond timestamps, local day bounds)
//! - Default paths for socket, data, config and pid files

mod ids;
mod paths;
mod time;

pub use ids::*;
pub use paths::*;
pub use time::*;
