//! Strongly-typed identifiers and instance-id generation.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! define_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_id!(JobId);
define_id!(PlanId);
define_id!(TimelineId);

/// Generates stable identifiers for pipeline nodes.
///
/// Instance names are dot-joined paths through the pipeline
/// (`stage.phase.job`), with attempt numbers appended only when greater
/// than one. Instance ids must be deterministic for a given name so that
/// retries of the same job correlate across orchestration records.
pub trait PipelineIdGenerator {
    /// Joins the non-empty segments into a dot-separated instance name.
    fn instance_name(&self, segments: &[&str]) -> String;

    /// Produces the stable id for an instance name. Case-insensitive.
    fn instance_id(&self, identifier: &str) -> Uuid;
}

/// Default id generator backed by name-based (v5) UUIDs.
pub struct DeterministicIdGenerator;

impl PipelineIdGenerator for DeterministicIdGenerator {
    fn instance_name(&self, segments: &[&str]) -> String {
        segments
            .iter()
            .filter(|x| !x.is_empty())
            .map(|x| x.trim_matches('.'))
            .filter(|x| !x.is_empty())
            .collect::<Vec<_>>()
            .join(".")
    }

    fn instance_id(&self, identifier: &str) -> Uuid {
        Uuid::new_v5(&Uuid::NAMESPACE_OID, identifier.to_lowercase().as_bytes())
    }
}

/// Appends the attempt number to an instance name when it is meaningful.
pub fn instance_name_with_attempt(identifier: &str, attempt: u32) -> String {
    if attempt > 1 {
        format!("{}.{}", identifier, attempt)
    } else {
        identifier.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_name_drops_empty_segments() {
        let generator = DeterministicIdGenerator;
        assert_eq!(generator.instance_name(&["build", "", "shard1"]), "build.shard1");
    }

    #[test]
    fn test_instance_id_is_deterministic_and_case_insensitive() {
        let generator = DeterministicIdGenerator;
        let a = generator.instance_id("Build.Test.Job1");
        let b = generator.instance_id("build.test.job1");
        assert_eq!(a, b);
        assert_eq!(a, generator.instance_id("Build.Test.Job1"));
    }

    #[test]
    fn test_attempt_suffix_only_after_first() {
        assert_eq!(instance_name_with_attempt("build.job1", 1), "build.job1");
        assert_eq!(instance_name_with_attempt("build.job1", 3), "build.job1.3");
    }
}
