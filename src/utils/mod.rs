//! Utility modules for the loop-tree agent.
//!
//! This module contains common utilities used throughout the codebase:
//! - Error types

pub mod errors;

// Re-exports
pub use errors::*;
