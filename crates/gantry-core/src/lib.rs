//! Gantry Core
//!
//! Core domain types, traits, and error handling for Gantry pipelines.
//! This crate has minimal dependencies and defines the shared vocabulary
//! used across all other crates: resources and resource references, steps,
//! jobs, expression values, and the agent job-request message.

pub mod constants;
pub mod error;
pub mod expression;
pub mod ids;
pub mod job;
pub mod messages;
pub mod names;
pub mod resources;
pub mod step;
pub mod target;
pub mod task;
pub mod variables;

pub use error::{Error, Result};
pub use ids::*;
