//! Device fleet: virtual device pools, self-healing device connections and
//! humanized touch interaction
//!
//! Starts and stops device instances, keeps an automation bridge attached to
//! each of them, and drives taps, swipes, long-presses and pinches whose
//! shape and pacing are synthesized from a behavior profile.

pub mod error;
pub mod config;
pub mod command;
pub mod sampling;

pub mod touch;
pub mod timing;
pub mod device;
pub mod connection;
pub mod session;
pub mod fleet;

// Re-exports
pub use error::{Error, ErrorKind, Result};
pub use fleet::DeviceFleet;

/// Device fleet library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
