//! Utilities
//!
//! Descriptor hygiene for forked children.

pub mod fd_closure;
