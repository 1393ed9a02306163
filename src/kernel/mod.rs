//! Thin wrappers around OS process and descriptor primitives.
//!
//! `unsafe` calls carry explicit SAFETY comments.

pub mod fork;
pub mod pipe;
pub mod poll;
pub mod process_group;
pub mod signal;
