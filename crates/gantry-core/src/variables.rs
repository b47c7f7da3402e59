//! Pipeline variables and `$(name)` macro expansion.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::OnceLock;

/// A named variable as authored in a pipeline or injected by the system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variable {
    pub name: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub secret: bool,
}

/// A variable value as stored in an execution context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableValue {
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_secret: bool,
}

impl VariableValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: Some(value.into()),
            is_secret: false,
        }
    }

    pub fn secret(value: impl Into<String>) -> Self {
        Self {
            value: Some(value.into()),
            is_secret: true,
        }
    }
}

impl From<&str> for VariableValue {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for VariableValue {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Case-insensitive variable map that tracks which names were set by the
/// system. User writes never override a system-owned name, and names in the
/// `system.` namespace are reserved outright.
#[derive(Debug, Clone, Default)]
pub struct VariablesMap {
    values: IndexMap<String, VariableValue>,
    system_names: HashSet<String>,
}

impl VariablesMap {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(name: &str) -> String {
        name.to_lowercase()
    }

    pub fn get(&self, name: &str) -> Option<&VariableValue> {
        self.values.get(&Self::key(name))
    }

    pub fn is_system(&self, name: &str) -> bool {
        self.system_names.contains(&Self::key(name))
    }

    pub fn set_system(&mut self, name: &str, value: VariableValue) {
        self.system_names.insert(Self::key(name));
        self.values.insert(Self::key(name), value);
    }

    pub fn set_user(&mut self, name: &str, value: VariableValue) {
        if name.to_lowercase().starts_with("system.") || self.is_system(name) {
            return;
        }
        self.values.insert(Self::key(name), value);
    }

    pub fn set_system_variables(&mut self, variables: impl IntoIterator<Item = Variable>) {
        for variable in variables {
            self.set_system(
                &variable.name,
                VariableValue {
                    value: variable.value,
                    is_secret: variable.secret,
                },
            );
        }
    }

    pub fn set_user_variables<K, V>(&mut self, variables: impl IntoIterator<Item = (K, V)>)
    where
        K: AsRef<str>,
        V: Into<VariableValue>,
    {
        for (name, value) in variables {
            self.set_user(name.as_ref(), value.into());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &VariableValue)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Expands `$(name)` macros against this map. Undefined macros are left
    /// in place. Secret values render as `***` when masking is requested.
    pub fn expand_macros(&self, input: &str, mask_secrets: bool) -> String {
        static MACRO: OnceLock<regex::Regex> = OnceLock::new();
        let pattern = MACRO.get_or_init(|| regex::Regex::new(r"\$\(([^)]+)\)").unwrap());

        pattern
            .replace_all(input, |captures: &regex::Captures<'_>| {
                match self.get(&captures[1]) {
                    Some(variable) if variable.is_secret && mask_secrets => "***".to_string(),
                    Some(variable) => variable.value.clone().unwrap_or_default(),
                    None => captures[0].to_string(),
                }
            })
            .into_owned()
    }
}

/// Returns true when the value is a single `$(name)` macro and nothing else.
pub fn is_macro(value: &str) -> bool {
    value.starts_with("$(") && value.ends_with(')') && value.len() > 3 && {
        let inner = &value[2..value.len() - 1];
        !inner.contains("$(") && !inner.contains(')')
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_system_wins_over_user() {
        let mut variables = VariablesMap::new();
        variables.set_system("build.reason", VariableValue::new("manual"));
        variables.set_user("Build.Reason", VariableValue::new("schedule"));
        assert_eq!(
            variables.get("build.REASON").unwrap().value.as_deref(),
            Some("manual")
        );
    }

    #[test]
    fn test_user_cannot_write_system_namespace() {
        let mut variables = VariablesMap::new();
        variables.set_user("system.jobId", VariableValue::new("nope"));
        assert!(variables.get("system.jobId").is_none());
    }

    #[test]
    fn test_expand_macros() {
        let mut variables = VariablesMap::new();
        variables.set_user("configuration", VariableValue::new("release"));
        variables.set_user("apiKey", VariableValue::secret("hunter2"));

        assert_eq!(
            variables.expand_macros("build --config $(configuration)", false),
            "build --config release"
        );
        assert_eq!(
            variables.expand_macros("key=$(apiKey)", true),
            "key=***"
        );
        assert_eq!(
            variables.expand_macros("$(undefined) stays", false),
            "$(undefined) stays"
        );
    }

    #[test]
    fn test_is_macro() {
        assert!(is_macro("$(queueName)"));
        assert!(!is_macro("prefix-$(queueName)"));
        assert!(!is_macro("literal"));
    }
}
