//! Replaying collected context is enough to evaluate an expression out of place.

use unravel::{
    ast::NodeType,
    deobfuscation::Session,
    oracle::{EvalValue, QuickJsOracle},
};

fn evaluate_in_context(
    source: &str,
    ty: NodeType,
    index: usize,
) -> unravel::Result<(String, EvalValue)> {
    let mut session = Session::new(source)?.with_oracle(Box::new(QuickJsOracle::new()));
    let origin = session.ast.nodes_of(ty)[index];
    let context = session.context(origin, true);
    let snippet = format!("{}{}", context.source(&session.ast), session.ast.text(origin));
    let value = session.evaluate_value(&snippet)?;
    Ok((snippet, value))
}

#[test]
fn array_declaration_and_mutations() -> unravel::Result<()> {
    let src = "var arr = ['c', 'a']; arr.push('b'); arr.sort(); out(arr[1]);";
    let (snippet, value) = evaluate_in_context(src, NodeType::MemberExpression, 2)?;
    assert_eq!(value, EvalValue::String("b".into()), "{snippet}");
    assert!(!snippet.contains("out("));
    Ok(())
}

#[test]
fn decoder_function_with_free_variables() -> unravel::Result<()> {
    let src = "var table = 'xyz'; function pick(i) { return table.charAt(i); } log(pick(2));";
    let mut session = Session::new(src)?.with_oracle(Box::new(QuickJsOracle::new()));
    let pick_call = session
        .ast
        .nodes_of(NodeType::CallExpression)
        .iter()
        .copied()
        .find(|&id| session.ast.text(id) == "pick(2)")
        .ok_or_else(|| unravel::Error::Error("no pick call".into()))?;
    let context = session.context(pick_call, true);
    let snippet = format!("{}{}", context.source(&session.ast), session.ast.text(pick_call));

    assert!(snippet.contains("var table"), "{snippet}");
    assert!(!snippet.contains("log("), "{snippet}");
    assert_eq!(
        session.evaluate_value(&snippet)?,
        EvalValue::String("z".into())
    );
    Ok(())
}

#[test]
fn unrelated_code_is_left_out() -> unravel::Result<()> {
    let src = "var a = [1, 2, 3]; var noise = launch(); a.reverse(); use(a[0]);";
    let (snippet, value) = evaluate_in_context(src, NodeType::MemberExpression, 1)?;
    assert!(!snippet.contains("launch"), "{snippet}");
    assert_eq!(value, EvalValue::Number(3.0));
    Ok(())
}

#[test]
fn guarded_write_is_replayed_under_its_guard() -> unravel::Result<()> {
    let src = "var c = false; var a = [1]; if (c) a[0] = 2; f(a[0]);";
    let (snippet, value) = evaluate_in_context(src, NodeType::MemberExpression, 1)?;
    assert!(snippet.contains("if (c)"), "{snippet}");
    assert_eq!(value, EvalValue::Number(1.0));
    Ok(())
}

#[test]
fn guard_on_unknown_condition_fails_evaluation() -> unravel::Result<()> {
    let src = "var a = [1]; if (c) a[0] = 2; f(a[0]);";
    let mut session = Session::new(src)?.with_oracle(Box::new(QuickJsOracle::new()));
    let origin = session.ast.nodes_of(NodeType::MemberExpression)[1];
    let context = session.context(origin, true);
    let snippet = format!("{}{}", context.source(&session.ast), session.ast.text(origin));
    assert!(snippet.contains("if (c)"), "{snippet}");
    assert!(session.evaluate_value(&snippet).is_err());
    Ok(())
}
