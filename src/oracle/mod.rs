//! Sandboxed evaluation of script fragments.
//!
//! Unsafe rules answer "what does this expression evaluate to" by running the expression,
//! together with its collected context, in an isolated JavaScript engine. This module
//! splits that job in two:
//!
//! - [`EvalOracle`] runs one snippet in a fresh, restricted context and reports the
//!   completion value as an [`EvalValue`]. [`QuickJsOracle`] is the embedded engine;
//!   [`testing::ScriptedOracle`] replays canned answers for tests.
//! - [`Evaluator`] wraps an oracle with trap rewriting, a bounded result cache, the
//!   determinism check and the conversion of values back into syntax nodes.
//!
//! Failures of any kind surface as [`OracleError`]. There is no "bad value" inside the
//! value space: an evaluation either produced a convertible value or it did not.

mod builtins;
mod evaluator;
mod quickjs;
pub mod testing;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use builtins::{
    atob, btoa, is_safe_implementation, safe_call, PROPERTIES_THAT_MODIFY_CONTENT,
    SKIP_BUILTIN_FUNCTIONS, SKIP_IDENTIFIERS, SKIP_PROPERTIES,
};
pub use evaluator::{
    reify, rewrite_traps, EvalCache, Evaluator, DEFAULT_CACHE_CAPACITY, DEFAULT_DETERMINISM_RUNS,
};
pub use quickjs::{QuickJsOracle, DEFAULT_MEMORY_LIMIT, DEFAULT_STACK_LIMIT, DEFAULT_TIMEOUT};

/// Why an evaluation produced no usable value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OracleError {
    /// The snippet exceeded its wall-clock budget.
    #[error("evaluation timed out")]
    Timeout,

    /// The snippet threw.
    #[error("uncaught exception: {0}")]
    Exception(String),

    /// The completion value has a type that cannot become a literal (Promise, Symbol,
    /// host object, cyclic structure).
    #[error("disallowed result type: {0}")]
    Disallowed(String),

    /// Two runs of the same snippet disagreed.
    #[error("non-deterministic result")]
    NonDeterministic,

    /// The value could not be turned into syntax.
    #[error("value cannot be converted to syntax: {0}")]
    Unconvertible(String),

    /// The engine itself failed (allocation of a runtime, malformed transport data).
    #[error("sandbox engine failure: {0}")]
    Engine(String),
}

/// A JavaScript value as reported by the sandbox.
///
/// This is the transport form between the engine and the tree: it is serialized inside
/// the sandbox as tagged JSON and deserialized here. Numbers travel as text so that
/// `NaN`, the infinities and negative zero survive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v", rename_all = "lowercase")]
pub enum EvalValue {
    /// `undefined`
    Undefined,
    /// `null`
    Null,
    /// `true` / `false`
    Boolean(bool),
    /// Any number
    Number(#[serde(with = "number_text")] f64),
    /// A string
    String(String),
    /// A BigInt, decimal digits with optional sign
    BigInt(String),
    /// A regular expression object
    RegExp {
        /// Source pattern
        pattern: String,
        /// Flags
        flags: String,
    },
    /// An array, element by element
    Array(Vec<EvalValue>),
    /// A plain object, own enumerable properties in order
    Object(Vec<(String, EvalValue)>),
    /// A user function or class, as its source text
    Function(String),
    /// A value identical to a well-known global, referenced by name
    Global(String),
}

impl EvalValue {
    /// Returns the `typeof`-like name of the value, for diagnostics.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            EvalValue::Undefined => "undefined",
            EvalValue::Null => "null",
            EvalValue::Boolean(_) => "boolean",
            EvalValue::Number(_) => "number",
            EvalValue::String(_) => "string",
            EvalValue::BigInt(_) => "bigint",
            EvalValue::RegExp { .. } => "regexp",
            EvalValue::Array(_) => "array",
            EvalValue::Object(_) => "object",
            EvalValue::Function(_) => "function",
            EvalValue::Global(_) => "global",
        }
    }

    /// Returns `true` for `undefined`, `null`, booleans, numbers, strings and BigInts.
    #[must_use]
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            EvalValue::Undefined
                | EvalValue::Null
                | EvalValue::Boolean(_)
                | EvalValue::Number(_)
                | EvalValue::String(_)
                | EvalValue::BigInt(_)
        )
    }

    /// Returns the string value, if this is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            EvalValue::String(s) => Some(s),
            _ => None,
        }
    }
}

/// A sandbox able to run a snippet and report its completion value.
///
/// Every call must run in a fresh context: no state may leak from one evaluation into
/// the next.
pub trait EvalOracle {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Runs `source` as a script and returns its completion value.
    ///
    /// # Errors
    ///
    /// Any failure (exception, timeout, disallowed result) is reported as an
    /// [`OracleError`].
    fn evaluate(&mut self, source: &str) -> Result<EvalValue, OracleError>;
}

mod number_text {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    use crate::ast::print::js_number;

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        let text = if value.is_nan() {
            "NaN".to_string()
        } else if *value == 0.0 && value.is_sign_negative() {
            "-0".to_string()
        } else if value.is_sign_negative() {
            format!("-{}", js_number(*value))
        } else {
            js_number(*value)
        };
        serializer.serialize_str(&text)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        let text = String::deserialize(deserializer)?;
        match text.as_str() {
            "NaN" => Ok(f64::NAN),
            "Infinity" => Ok(f64::INFINITY),
            "-Infinity" => Ok(f64::NEG_INFINITY),
            "-0" => Ok(-0.0),
            other => other
                .parse::<f64>()
                .map_err(|e| D::Error::custom(format!("bad number '{other}': {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_format() -> Result<(), serde_json::Error> {
        let value: EvalValue =
            serde_json::from_str(r#"{"t":"array","v":[{"t":"number","v":"-0"},{"t":"undefined"},{"t":"string","v":"x"}]}"#)?;
        match &value {
            EvalValue::Array(items) => {
                assert_eq!(items.len(), 3);
                assert!(matches!(items[0], EvalValue::Number(n) if n == 0.0 && n.is_sign_negative()));
                assert_eq!(items[1], EvalValue::Undefined);
            }
            other => panic!("unexpected {other:?}"),
        }

        let nan: EvalValue = serde_json::from_str(r#"{"t":"number","v":"NaN"}"#)?;
        assert!(matches!(nan, EvalValue::Number(n) if n.is_nan()));

        let text = serde_json::to_string(&EvalValue::Number(-1.5))?;
        assert_eq!(text, r#"{"t":"number","v":"-1.5"}"#);
        Ok(())
    }

    #[test]
    fn test_object_transport() -> Result<(), serde_json::Error> {
        let value: EvalValue = serde_json::from_str(
            r#"{"t":"object","v":[["a",{"t":"boolean","v":true}],["b",{"t":"null"}]]}"#,
        )?;
        assert_eq!(
            value,
            EvalValue::Object(vec![
                ("a".to_string(), EvalValue::Boolean(true)),
                ("b".to_string(), EvalValue::Null),
            ])
        );
        assert_eq!(value.type_name(), "object");
        assert!(!value.is_primitive());
        Ok(())
    }
}
