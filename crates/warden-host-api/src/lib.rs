//! Host capability traits for appwarden
//!
//! This crate defines the capability-based interface between the enforcement
//! core and platform-specific implementations. It contains no platform code
//! itself, only the traits, a focus-transition history shared by probe
//! implementations, and mocks for tests.

mod focus;
mod mock;
mod traits;

pub use focus::*;
pub use mock::*;
pub use traits::*;
