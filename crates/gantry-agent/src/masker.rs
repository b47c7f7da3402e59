//! Secret masking for agent output.

use regex::Regex;
use std::sync::RwLock;

const MASK: &str = "***";

/// Secrets shorter than this are not masked; masking them would make the
/// replacement trivially reversible and shred ordinary output.
const MIN_SECRET_LENGTH: usize = 3;

/// Replaces known secret values and patterns with `***` in any text the
/// agent ships off the machine.
#[derive(Default)]
pub struct SecretMasker {
    values: RwLock<Vec<String>>,
    patterns: RwLock<Vec<Regex>>,
}

impl SecretMasker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a literal secret value.
    pub fn add_value(&self, value: &str) {
        if value.len() < MIN_SECRET_LENGTH {
            return;
        }
        let mut values = self.values.write().expect("masker lock poisoned");
        if !values.iter().any(|v| v == value) {
            values.push(value.to_string());
        }
    }

    /// Registers a regular-expression pattern to mask. Invalid patterns are
    /// ignored rather than failing the caller.
    pub fn add_pattern(&self, pattern: &str) {
        if let Ok(regex) = Regex::new(pattern) {
            self.patterns
                .write()
                .expect("masker lock poisoned")
                .push(regex);
        }
    }

    /// Masks all registered secrets in the input.
    pub fn mask(&self, input: &str) -> String {
        let mut output = input.to_string();

        for value in self.values.read().expect("masker lock poisoned").iter() {
            if output.contains(value.as_str()) {
                output = output.replace(value.as_str(), MASK);
            }
        }

        for pattern in self.patterns.read().expect("masker lock poisoned").iter() {
            output = pattern.replace_all(&output, MASK).into_owned();
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_masks_values_and_patterns() {
        let masker = SecretMasker::new();
        masker.add_value("hunter2");
        masker.add_pattern(r"ghs_[A-Za-z0-9]+");

        assert_eq!(
            masker.mask("password is hunter2, token is ghs_abc123"),
            "password is ***, token is ***"
        );
    }

    #[test]
    fn test_short_values_are_not_masked() {
        let masker = SecretMasker::new();
        masker.add_value("ab");
        assert_eq!(masker.mask("ab is fine"), "ab is fine");
    }

    #[test]
    fn test_invalid_pattern_is_ignored() {
        let masker = SecretMasker::new();
        masker.add_pattern("([unclosed");
        assert_eq!(masker.mask("text"), "text");
    }
}
