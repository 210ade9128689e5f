//! Pure monitoring logic, free of I/O
//!
//! The actors in [`crate::actors`] own these structures and drive them from
//! the runtime.

pub mod debounce;
pub mod rates;
pub mod swarm;
pub mod tracker;

pub use debounce::Debouncer;
pub use rates::{RateBasis, Rates};
pub use tracker::{StateRecord, StateTracker};
