//! Deferred expression values.
//!
//! Many pipeline settings (timeouts, max concurrency, matrix definitions,
//! queue names) are either literals known at authoring time or expressions
//! of the form `$[ ... ]` that can only be evaluated against a concrete
//! execution context. The expression grammar itself is not implemented
//! here; hosts inject an [`ExpressionEvaluator`] and the build engine only
//! cares about the literal-vs-deferred distinction.

use crate::error::{Error, Result};
use crate::variables::VariablesMap;
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Marker prefix/suffix for deferred expressions.
const EXPRESSION_PREFIX: &str = "$[";
const EXPRESSION_SUFFIX: &str = "]";

/// Returns true when the string uses deferred-expression syntax.
pub fn is_expression(value: &str) -> bool {
    value.starts_with(EXPRESSION_PREFIX) && value.ends_with(EXPRESSION_SUFFIX)
}

/// Strips the `$[ ... ]` wrapper from an expression string.
pub fn trim_expression(value: &str) -> &str {
    value
        .strip_prefix(EXPRESSION_PREFIX)
        .and_then(|v| v.strip_suffix(EXPRESSION_SUFFIX))
        .map(str::trim)
        .unwrap_or(value)
}

/// A value that is either a compile-time literal or a deferred expression.
#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionValue<T> {
    Literal(T),
    Expr(String),
}

impl<T> ExpressionValue<T> {
    pub fn expr(expression: impl Into<String>) -> Self {
        Self::Expr(expression.into())
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Self::Literal(_))
    }

    pub fn literal(&self) -> Option<&T> {
        match self {
            Self::Literal(value) => Some(value),
            Self::Expr(_) => None,
        }
    }

    pub fn expression(&self) -> Option<&str> {
        match self {
            Self::Literal(_) => None,
            Self::Expr(expression) => Some(expression),
        }
    }
}

impl<T> From<T> for ExpressionValue<T> {
    fn from(value: T) -> Self {
        Self::Literal(value)
    }
}

impl From<&str> for ExpressionValue<String> {
    fn from(value: &str) -> Self {
        if is_expression(value) {
            Self::Expr(value.to_string())
        } else {
            Self::Literal(value.to_string())
        }
    }
}

impl<T: Serialize> Serialize for ExpressionValue<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Literal(value) => value.serialize(serializer),
            Self::Expr(expression) => expression.serialize(serializer),
        }
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for ExpressionValue<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = serde_json::Value::deserialize(deserializer)?;
        if let serde_json::Value::String(s) = &raw
            && is_expression(s)
        {
            return Ok(Self::Expr(s.clone()));
        }

        T::deserialize(raw)
            .map(Self::Literal)
            .map_err(serde::de::Error::custom)
    }
}

/// Data an expression is evaluated against: the context variables plus any
/// configuration-bound data (e.g. `matrix.*` values for the current job).
pub struct EvaluationData<'a> {
    pub variables: &'a VariablesMap,
    pub context_data: &'a IndexMap<String, serde_json::Value>,
}

/// Host-supplied expression engine.
pub trait ExpressionEvaluator {
    /// Evaluates the (trimmed) expression and returns its JSON value.
    fn evaluate(&self, expression: &str, data: &EvaluationData<'_>) -> Result<serde_json::Value>;
}

/// Evaluator used when the host provides none. Every deferred expression is
/// an error; literals never reach the evaluator.
pub struct UnsupportedEvaluator;

impl ExpressionEvaluator for UnsupportedEvaluator {
    fn evaluate(&self, expression: &str, _data: &EvaluationData<'_>) -> Result<serde_json::Value> {
        Err(Error::Expression(format!(
            "No expression evaluator is configured; unable to evaluate '{expression}'"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_literal_round_trip() {
        let value: ExpressionValue<u32> = ExpressionValue::Literal(90);
        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(json, "90");
        let back: ExpressionValue<u32> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn test_expression_round_trip() {
        let value: ExpressionValue<u32> = ExpressionValue::expr("$[ variables.timeout ]");
        let json = serde_json::to_string(&value).unwrap();
        let back: ExpressionValue<u32> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn test_string_literal_is_not_expression() {
        let back: ExpressionValue<String> = serde_json::from_str("\"ubuntu-pool\"").unwrap();
        assert_eq!(back, ExpressionValue::Literal("ubuntu-pool".to_string()));
    }

    #[test]
    fn test_trim_expression() {
        assert_eq!(trim_expression("$[ variables.x ]"), "variables.x");
        assert_eq!(trim_expression("variables.x"), "variables.x");
    }
}
