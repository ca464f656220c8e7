//! Enforcement engine for appwarden
//!
//! This crate is the heart of wardend, containing:
//! - Session tracking (NoSession -> Open -> Closed, with orphan recovery)
//! - The block overlay state machine
//! - The fixed-cadence monitoring loop with cooldown debouncing
//! - Consecutive-day streak computation
//! - The watchdog that relaunches the enforcement process

mod events;
mod monitor;
mod overlay;
mod streak;
mod tracker;
mod watchdog;

pub use events::*;
pub use monitor::*;
pub use overlay::*;
pub use streak::*;
pub use tracker::*;
pub use watchdog::*;
