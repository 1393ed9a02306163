//! forkbox: process-isolated test execution
//! Runs one test per forked child so that crashes, hangs, or stray output in
//! the code under test cannot corrupt or block the driver process
//!
//! # Architecture
//!
//! ## Kernel Primitives ([`kernel`])
//! - [`kernel::pipe`]: Scoped pipes with per-end close and descriptor migration
//! - [`kernel::poll`]: Readiness multiplexing over pipe read ends
//! - [`kernel::process_group`]: Process-group scope with group-kill on release
//! - [`kernel::fork`]: Isolated execution context (fork)
//! - [`kernel::signal`]: Signal description and re-raising
//!
//! ## Execution Control ([`exec`])
//! - [`exec::runner`]: Isolated Runner and exit-status reconciliation
//! - [`exec::child`]: Type-state enforced child sequence
//! - [`exec::watchdog`]: Watchdog Monitor for group cleanup and the run timeout
//! - [`exec::collect`]: Multiplexed output and message collection
//! - [`exec::inline`]: Non-isolated runner
//!
//! ## Configuration ([`config`])
//! - [`config::types`]: Results, captured output, reserved exit statuses, errors
//! - [`config::runner`]: Runner configuration loading
//! - [`config::validator`]: Configuration validation
//!
//! ## Utilities ([`utils`])
//! - [`utils::fd_closure`]: Inherited descriptor closure in the child
//!
//! # Design Principles
//!
//! 1. **Every outcome is a value** - failures come back as a `TestResult`
//! 2. **Kernel as truth** - verdicts come from wait status, never guesses
//! 3. **Types prevent errors** - the child sequence cannot be reordered
//! 4. **Minimal unsafe** - thin wrappers in [`kernel`] with explicit preconditions

// Kernel Primitives
pub mod kernel;

// Execution Control
pub mod exec;

// Configuration
pub mod config;

// Utilities
pub mod utils;

// CLI entrypoint wiring for the forkbox binary.
pub mod cli;

// Re-export commonly used types for convenience
pub use config::runner::RunnerConfig;
pub use config::types::*;
pub use exec::inline::InlineRunner;
pub use exec::runner::{ForkedRunner, TestRunner};
