//! Sandbox evaluation through the embedded QuickJS oracle.

use std::time::Duration;

use unravel::{
    ast::Ast,
    oracle::{
        reify, EvalOracle, EvalValue, Evaluator, OracleError, QuickJsOracle, DEFAULT_MEMORY_LIMIT,
    },
};

/// Answers with an increasing counter, like a snippet reading a clock.
struct Ticking(u32);

impl EvalOracle for Ticking {
    fn name(&self) -> &'static str {
        "ticking"
    }

    fn evaluate(&mut self, _source: &str) -> Result<EvalValue, OracleError> {
        self.0 += 1;
        Ok(EvalValue::Number(f64::from(self.0)))
    }
}

fn sandbox() -> Evaluator {
    Evaluator::new(Box::new(QuickJsOracle::new()))
}

#[test]
fn coercion_follows_the_language() -> Result<(), OracleError> {
    let mut evaluator = sandbox();
    assert_eq!(
        evaluator.evaluate_value(r#""2" + 3 - "5" * 0 + "1""#)?,
        EvalValue::String("231".into())
    );
    assert_eq!(
        evaluator.evaluate_value("[] + {}")?,
        EvalValue::String("[object Object]".into())
    );
    assert_eq!(evaluator.evaluate_value("+!![]")?, EvalValue::Number(1.0));
    Ok(())
}

#[test]
fn infinite_loop_times_out() {
    let oracle = QuickJsOracle::with_limits(Duration::from_millis(100), DEFAULT_MEMORY_LIMIT);
    let mut evaluator = Evaluator::new(Box::new(oracle)).with_determinism_runs(1);
    assert_eq!(
        evaluator.evaluate_value("for (;;) {}"),
        Err(OracleError::Timeout)
    );
}

#[test]
fn empty_infinite_while_is_neutralized() -> Result<(), OracleError> {
    let oracle = QuickJsOracle::with_limits(Duration::from_millis(100), DEFAULT_MEMORY_LIMIT);
    let mut evaluator = Evaluator::new(Box::new(oracle));
    assert_eq!(
        evaluator.evaluate_value("while (true) {} 'done'")?,
        EvalValue::String("done".into())
    );
    Ok(())
}

#[test]
fn nondeterministic_sources_are_rejected() {
    let mut quickjs = sandbox();
    assert!(matches!(
        quickjs.evaluate_value("Math.random()"),
        Err(OracleError::Exception(_))
    ));

    let mut ticking = Evaluator::new(Box::new(Ticking(0)));
    assert_eq!(
        ticking.evaluate_value("clock()"),
        Err(OracleError::NonDeterministic)
    );

    let mut single = Evaluator::new(Box::new(Ticking(0))).with_determinism_runs(1);
    assert_eq!(single.evaluate_value("clock()"), Ok(EvalValue::Number(1.0)));
}

#[test]
fn results_are_cached_per_text() -> Result<(), OracleError> {
    let mut evaluator = sandbox();
    evaluator.evaluate_value("'a'.repeat(3)")?;
    evaluator.evaluate_value("'a'.repeat(3)")?;
    assert_eq!(evaluator.evaluations(), 1);
    assert_eq!(evaluator.cache_hits(), 1);

    evaluator.reset_cache();
    evaluator.evaluate_value("'a'.repeat(3)")?;
    assert_eq!(evaluator.evaluations(), 2);
    Ok(())
}

#[test]
fn disallowed_results() {
    let mut evaluator = sandbox();
    assert!(matches!(
        evaluator.evaluate_value("Symbol('x')"),
        Err(OracleError::Disallowed(_))
    ));
    assert!(matches!(
        evaluator.evaluate_value("var o = {}; o.self = o; o"),
        Err(OracleError::Disallowed(_))
    ));
}

#[test]
fn reified_values_evaluate_to_themselves() -> unravel::Result<()> {
    let mut evaluator = sandbox();
    let mut ast = Ast::parse("")?;

    for source in [
        "'quote \\' and \\n newline'",
        "-0.5",
        "[1, 'two', [null, true], undefined]",
        "({ a: 1, 'b-c': ['d'], nested: { e: false } })",
        "/ab+c/gi",
        "12345678901234567890n",
        r#"JSON.parse('{"__proto__": 3, "x": 1}')"#,
    ] {
        let value = evaluator.evaluate_value(source)?;
        let id = reify(&mut ast, &value)?;
        let printed = format!("({})", ast.text(id));
        let again = evaluator.evaluate_value(&printed)?;
        assert_eq!(again, value, "{source} printed as {printed}");
    }
    Ok(())
}

#[test]
fn evaluations_are_isolated() -> Result<(), OracleError> {
    let mut evaluator = sandbox().with_cache_capacity(0);
    evaluator.evaluate_value("var leaked = 1; leaked")?;
    assert_eq!(
        evaluator.evaluate_value("typeof leaked")?,
        EvalValue::String("undefined".into())
    );
    Ok(())
}
