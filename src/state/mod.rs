//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `UnitState`: the per-unit state machine shared by the list and detail passes
//! - `DateKey`, `DetailKey`, `DateRange`: unit-of-work identities
//! - `Progress`, `RunTally`: run-scoped, non-persisted reporting state

mod progress;
mod unit_state;
mod units;

// Re-export main types
pub use progress::{Progress, RunTally};
pub use unit_state::UnitState;
pub use units::{DateKey, DateRange, DetailKey, DATE_KEY_FORMAT};
