//! Legacy protocol compatibility.
//!
//! Old agents and old orchestration servers exchange a flat job message: a
//! task list plus a service-endpoint list, with the source repository
//! described entirely by an endpoint's string-keyed `data` dictionary. This
//! crate models that message and translates it to and from the pipeline
//! message (typed resources plus ordered steps) used everywhere else.
//!
//! The correctness bar here is bit-for-bit backward compatibility: field
//! names, default values, and sentinel strings must match what legacy
//! agents expect, down to casing.

pub mod convert;
pub mod legacy;

pub use convert::{to_legacy_message, to_pipeline_message};
pub use legacy::{JobEnvironment, LegacyAgentJobRequestMessage, TaskInstance};
