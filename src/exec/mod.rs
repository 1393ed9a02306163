//! Execution control
//!
//! Orchestrates kernel primitives into an isolated test run with type-state
//! enforcement on the child side.

pub mod child;
pub mod collect;
pub mod inline;
pub mod runner;
pub mod watchdog;
