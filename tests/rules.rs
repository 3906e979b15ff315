//! Individual rules applied through the public scheduler entry points.

use unravel::{
    ast::NodeType,
    deobfuscation::{
        apply_rule, rules, run_to_fixed_point, CandidateFilter, EventKind, Rule, Session,
    },
    oracle::{testing::ScriptedOracle, EvalValue, OracleError, QuickJsOracle},
    Result,
};

fn sandboxed(source: &str) -> Result<Session> {
    Ok(Session::new(source)?.with_oracle(Box::new(QuickJsOracle::new())))
}

fn run(rule: &dyn Rule, session: &mut Session) -> String {
    let outcome = apply_rule(session, rule, &CandidateFilter::all());
    assert!(!outcome.failed(), "{}: {:?}", outcome.rule, outcome.error);
    session.script().to_string()
}

#[test]
fn definite_member_in_sandbox() -> Result<()> {
    let mut session = sandboxed("x = 'abc'[1];")?;
    assert_eq!(run(&rules::ResolveDefiniteMemberExpressions, &mut session), "x = 'b';");
    Ok(())
}

#[test]
fn builtin_static_method_in_sandbox() -> Result<()> {
    let mut session = sandboxed("x = String.fromCharCode(104, 105);")?;
    assert_eq!(run(&rules::ResolveBuiltinCalls, &mut session), "x = 'hi';");
    Ok(())
}

#[test]
fn local_decoder_call_in_sandbox() -> Result<()> {
    let mut session = sandboxed("function d(i) { return ['a', 'b'][i]; } x = d(1);")?;
    let out = run(&rules::ResolveLocalCalls, &mut session);
    assert!(out.ends_with("x = 'b';"), "{out}");
    assert_eq!(session.events.count_kind(EventKind::CallResolved), 1);
    Ok(())
}

#[test]
fn scripted_oracle_answers_local_call() -> Result<()> {
    let oracle = ScriptedOracle::new().answer(
        "function d(i) { return ['a', 'b'][i]; }\nd(0)",
        EvalValue::String("a".into()),
    );
    let calls = oracle.calls();
    let mut session = Session::new("function d(i) { return ['a', 'b'][i]; } x = d(0);")?
        .with_oracle(Box::new(oracle));

    let out = run(&rules::ResolveLocalCalls, &mut session);
    assert!(out.ends_with("x = 'a';"), "{out}");
    assert!(!calls.borrow().is_empty());
    Ok(())
}

#[test]
fn failed_evaluation_leaves_tree() -> Result<()> {
    let oracle = ScriptedOracle::new().fail("'abc'[1]", OracleError::Timeout);
    let mut session = Session::new("x = 'abc'[1];")?.with_oracle(Box::new(oracle));
    let outcome = apply_rule(
        &mut session,
        &rules::ResolveDefiniteMemberExpressions,
        &CandidateFilter::all(),
    );
    assert!(!outcome.changed());
    assert!(!outcome.failed());
    assert_eq!(session.script(), "x = 'abc'[1];");
    Ok(())
}

#[test]
fn sandbox_rules_skip_without_oracle() -> Result<()> {
    let mut session = Session::new("x = 'abc'[1];")?;
    let outcome = apply_rule(
        &mut session,
        &rules::ResolveDefiniteMemberExpressions,
        &CandidateFilter::all(),
    );
    assert!(!outcome.changed());
    assert!(!outcome.failed());
    assert_eq!(session.script(), "x = 'abc'[1];");
    Ok(())
}

#[test]
fn filter_limits_candidates() -> Result<()> {
    let mut session = Session::new("if (true) a(); if (false) b(); else c();")?;
    let filter = CandidateFilter::new(|ast, id| ast.text(id).contains("a()"));
    let outcome = apply_rule(&mut session, &rules::ResolveDeterministicIfStatements, &filter);
    assert_eq!(outcome.applied, 1);
    assert!(session.script().starts_with("a();"), "{}", session.script());
    assert!(session.script().contains("if (false)"));
    Ok(())
}

#[test]
fn safe_rules_reach_a_fixed_point() -> Result<()> {
    let mut session = Session::new("var x = 3; if (true) { log(x); }")?;
    let safe = rules::safe_rules();
    assert!(run_to_fixed_point(&mut session, &safe, 50) > 0);

    let settled = session.script().to_string();
    assert_eq!(run_to_fixed_point(&mut session, &safe, 50), 0);
    assert_eq!(session.script(), settled);
    assert!(session.ast.nodes_of(NodeType::IfStatement).is_empty());
    Ok(())
}

#[test]
fn guarded_write_blocks_local_member_resolution() -> Result<()> {
    let src = "var a = [1]; if (c) a[0] = 2; f(a[0]);";
    let mut session = sandboxed(src)?;
    let outcome = apply_rule(
        &mut session,
        &rules::ResolveMemberExpressionsLocalReferences,
        &CandidateFilter::all(),
    );
    assert!(!outcome.changed());
    assert_eq!(session.script(), src);
    Ok(())
}

#[test]
fn guarded_write_replays_with_its_guard() -> Result<()> {
    let mut session = sandboxed("var c = false; var a = [1]; if (c) a[0] = 2; f(a[0]);")?;
    let out = run(&rules::ResolveMemberExpressionsLocalReferences, &mut session);
    assert!(out.ends_with("f(1);"), "{out}");
    Ok(())
}

#[test]
fn guarded_property_write_is_not_inlined() -> Result<()> {
    let src = "var o = {}; if (c) { o.p = 1; } f(o.p);";
    let mut session = Session::new(src)?;
    let outcome = apply_rule(
        &mut session,
        &rules::ResolveMemberExpressionsWithDirectAssignment,
        &CandidateFilter::all(),
    );
    assert!(!outcome.changed());
    assert_eq!(session.script(), src);
    Ok(())
}
