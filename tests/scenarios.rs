//! End-to-end deobfuscation of small scripts through the public facade.

use unravel::{deobfuscation::EngineConfig, Deobfuscator, Result};

fn full(source: &str) -> Result<String> {
    let mut deob = Deobfuscator::new(source, true);
    deob.deobfuscate(false)?;
    Ok(deob.script)
}

fn safe(source: &str) -> Result<String> {
    let mut deob = Deobfuscator::with_config(source, EngineConfig::safe_only());
    deob.deobfuscate(false)?;
    Ok(deob.script)
}

#[test]
fn folds_binary_expression_with_coercion() -> Result<()> {
    assert_eq!(full(r#""2" + 3 - "5" * 0 + "1""#)?, "'231';");
    Ok(())
}

#[test]
fn resolves_deterministic_if_statements() -> Result<()> {
    let src = "if (true) do_a(); else do_b(); if (false) do_c(); else do_d();";
    assert_eq!(safe(src)?, "do_a();\ndo_d();");
    assert_eq!(full(src)?, "do_a();\ndo_d();");
    Ok(())
}

#[test]
fn unwraps_call_through_returned_identifier() -> Result<()> {
    let src = "function a() {return btoa;} a()('yo');";
    assert_eq!(
        safe(src)?,
        "function a() {\n  return btoa;\n}\nbtoa('yo');"
    );
    // The unwrapped builtin call is then resolved.
    assert_eq!(
        full(src)?,
        "function a() {\n  return btoa;\n}\n'eW8=';"
    );
    Ok(())
}

#[test]
fn resolves_array_index_through_context() -> Result<()> {
    assert_eq!(
        full("const a = ['hello']; const b = a[0];")?,
        "const a = ['hello'];\nconst b = 'hello';"
    );
    Ok(())
}

#[test]
fn resolves_builtin_without_sandbox() -> Result<()> {
    assert_eq!(full("atob('dGVzdA==');")?, "'test';");
    assert_eq!(safe("atob('dGVzdA==');")?, "atob('dGVzdA==');");
    Ok(())
}

#[test]
fn unwraps_literal_eval() -> Result<()> {
    let src = r#"eval('console.log("hello world")');"#;
    assert_eq!(safe(src)?, "console.log('hello world');");
    assert_eq!(full(src)?, "console.log('hello world');");
    Ok(())
}

#[test]
fn guarded_property_write_is_not_inlined() -> Result<()> {
    let out = safe("var o = {}; if (c) { o.p = 1; } f(o.p);")?;
    assert!(out.contains("f(o.p)"), "{out}");
    Ok(())
}

#[test]
fn guarded_element_write_is_not_replayed_unconditionally() -> Result<()> {
    let out = full("var a = [1]; if (c) a[0] = 2; f(a[0]);")?;
    assert!(out.contains("f(a[0])"), "{out}");
    Ok(())
}

#[test]
fn second_run_is_a_no_op() -> Result<()> {
    let mut deob = Deobfuscator::new("if (true) do_a(); else do_b();", true);
    assert!(deob.deobfuscate(false)?);
    let first = deob.script.clone();

    assert!(!deob.deobfuscate(false)?);
    assert_eq!(deob.script, first);
    Ok(())
}

#[test]
fn output_is_deterministic() -> Result<()> {
    let src = "var x = 'a' + 'b'; if (!![]) { run(x); } else { stop(); }";
    assert_eq!(full(src)?, full(src)?);
    Ok(())
}

#[test]
fn clean_removes_unreferenced_declarations() -> Result<()> {
    let mut deob = Deobfuscator::with_config(
        "var unused = 1;\nif (true) run();",
        EngineConfig::safe_only(),
    );
    assert!(deob.deobfuscate(true)?);
    assert_eq!(deob.script, "run();");
    Ok(())
}

#[test]
fn invalid_script_is_an_error() {
    let mut deob = Deobfuscator::new("function (", true);
    assert!(matches!(
        deob.deobfuscate(false),
        Err(unravel::Error::Parse { .. })
    ));
    assert_eq!(deob.script, "function (");
}

#[test]
fn result_reports_changes() -> Result<()> {
    let mut deob = Deobfuscator::with_config(
        "if (true) do_a(); else do_b();",
        EngineConfig::safe_only(),
    );
    deob.deobfuscate(false)?;

    let result = deob.result().expect("result after a run");
    assert!(result.modified);
    assert!(result.iterations >= 1);
    assert!(result.stats().branches_resolved >= 1);
    assert!(result.events.has_transformations());
    Ok(())
}
