//! Deterministic oracle for tests.

use std::{
    cell::RefCell,
    collections::{HashMap, VecDeque},
    rc::Rc,
};

use crate::oracle::{EvalOracle, EvalValue, OracleError};

/// Shared log of the snippets an oracle was asked to evaluate.
pub type CallLog = Rc<RefCell<Vec<String>>>;

/// An [`EvalOracle`] that replays scripted answers.
///
/// Unscripted snippets fail with [`OracleError::Exception`]. A scripted sequence is
/// consumed one answer per call and its last answer repeats.
///
/// # Examples
///
/// ```rust
/// use unravel::oracle::{testing::ScriptedOracle, EvalOracle, EvalValue};
///
/// let mut oracle = ScriptedOracle::new().answer("f()", EvalValue::Number(1.0));
/// assert_eq!(oracle.evaluate("f()"), Ok(EvalValue::Number(1.0)));
/// assert!(oracle.evaluate("g()").is_err());
/// assert_eq!(oracle.calls().borrow().len(), 2);
/// ```
#[derive(Debug, Default)]
pub struct ScriptedOracle {
    answers: HashMap<String, VecDeque<Result<EvalValue, OracleError>>>,
    calls: CallLog,
}

impl ScriptedOracle {
    /// Creates an oracle with no scripted answers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts a successful evaluation of `source`.
    #[must_use]
    pub fn answer(self, source: &str, value: EvalValue) -> Self {
        self.answer_sequence(source, vec![Ok(value)])
    }

    /// Scripts a failed evaluation of `source`.
    #[must_use]
    pub fn fail(self, source: &str, error: OracleError) -> Self {
        self.answer_sequence(source, vec![Err(error)])
    }

    /// Scripts successive results for `source`.
    #[must_use]
    pub fn answer_sequence(
        mut self,
        source: &str,
        results: Vec<Result<EvalValue, OracleError>>,
    ) -> Self {
        self.answers.insert(source.to_string(), results.into());
        self
    }

    /// Returns a handle to the log of evaluated snippets.
    #[must_use]
    pub fn calls(&self) -> CallLog {
        Rc::clone(&self.calls)
    }
}

impl EvalOracle for ScriptedOracle {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn evaluate(&mut self, source: &str) -> Result<EvalValue, OracleError> {
        self.calls.borrow_mut().push(source.to_string());
        let Some(queue) = self.answers.get_mut(source) else {
            return Err(OracleError::Exception(format!(
                "no scripted answer for '{source}'"
            )));
        };
        if queue.len() > 1 {
            queue
                .pop_front()
                .unwrap_or_else(|| Err(OracleError::Engine("empty script".to_string())))
        } else {
            queue
                .front()
                .cloned()
                .unwrap_or_else(|| Err(OracleError::Engine("empty script".to_string())))
        }
    }
}
