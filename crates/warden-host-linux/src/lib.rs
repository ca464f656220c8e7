//! Linux host integration for appwarden
//!
//! Provides:
//! - Foreground probe backed by the sway IPC tree (`swaymsg -t get_tree`)
//! - App labels from freedesktop `.desktop` entries
//! - Pid-file liveness checks and detached daemon launch for the watchdog

mod labels;
mod process;
mod sway;

pub use labels::*;
pub use process::*;
pub use sway::*;
