//! Embedded QuickJS sandbox.
//!
//! Each evaluation gets its own [`Runtime`] and [`Context`], so nothing a snippet does
//! survives into the next one. The runtime carries a memory cap, a stack cap and an
//! interrupt handler enforcing the wall-clock deadline. Before the snippet runs, a small
//! prelude installs the value serializer, binds `atob`/`btoa` to the host
//! implementations and disables the nondeterministic builtins (`Math.random`, `Date`),
//! which then throw and make the evaluation fail.

use std::time::{Duration, Instant};

use rquickjs::{Context, Ctx, Function, Runtime};
use serde::Deserialize;

use crate::oracle::{builtins, EvalOracle, EvalValue, OracleError};

/// Default wall-clock budget of one evaluation.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Default heap cap of one runtime in bytes.
pub const DEFAULT_MEMORY_LIMIT: usize = 64 * 1024 * 1024;

/// Default native stack cap of one runtime in bytes.
pub const DEFAULT_STACK_LIMIT: usize = 1024 * 1024;

const PRELUDE: &str = r#"
(function (G) {
  var keys = Object.keys, getProto = Object.getPrototypeOf, isArray = Array.isArray;
  var fnToString = Function.prototype.toString, stringify = JSON.stringify;
  var ObjProto = Object.prototype, PromiseCtor = Promise, RegExpCtor = RegExp;
  var hostAtob = G.__unravel_atob, hostBtoa = G.__unravel_btoa;
  delete G.__unravel_atob;
  delete G.__unravel_btoa;

  G.atob = function atob(s) {
    var r = hostAtob(String(s));
    if (r === undefined) throw new Error('The string to be decoded is not correctly encoded.');
    return r;
  };
  G.btoa = function btoa(s) {
    var r = hostBtoa(String(s));
    if (r === undefined) throw new Error('The string to be encoded contains characters outside of the Latin1 range.');
    return r;
  };
  var noop = function () {};
  G.console = { log: noop, info: noop, warn: noop, error: noop, debug: noop, trace: noop };

  Math.random = function random() { throw new Error('Math.random is not available'); };
  G.Date = function Date() { throw new Error('Date is not available'); };
  G.Date.now = function now() { throw new Error('Date is not available'); };

  var named = [];
  ['globalThis', 'console', 'Math', 'JSON', 'Reflect', 'Object', 'Array', 'String', 'Number',
   'Boolean', 'Symbol', 'RegExp', 'Error', 'Promise', 'Function', 'eval', 'parseInt',
   'parseFloat', 'isNaN', 'isFinite', 'escape', 'unescape', 'encodeURI', 'decodeURI',
   'encodeURIComponent', 'decodeURIComponent', 'atob', 'btoa'].forEach(function (n) {
    if (G[n] !== undefined) named.push([n, G[n], keys(G[n]).sort().join(',')]);
  });

  function Disallowed(what) { this.what = what; }

  function num(n) {
    if (n !== n) return 'NaN';
    if (n === Infinity) return 'Infinity';
    if (n === -Infinity) return '-Infinity';
    if (n === 0 && 1 / n < 0) return '-0';
    return String(n);
  }

  function globalName(v) {
    var sig = null;
    for (var i = 0; i < named.length; i++) {
      if (v === named[i][1]) return named[i][0];
    }
    if (typeof v !== 'object' || getProto(v) !== ObjProto) return null;
    sig = keys(v).sort().join(',');
    if (sig === '') return null;
    for (var j = 0; j < named.length; j++) {
      if (typeof named[j][1] === 'object' && named[j][2] === sig) return named[j][0];
    }
    return null;
  }

  function ser(v, depth, seen) {
    if (depth > 64) throw new Disallowed('nesting too deep');
    if (v === undefined) return { t: 'undefined' };
    if (v === null) return { t: 'null' };
    var t = typeof v;
    if (t === 'boolean') return { t: 'boolean', v: v };
    if (t === 'number') return { t: 'number', v: num(v) };
    if (t === 'string') return { t: 'string', v: v };
    if (t === 'bigint') return { t: 'bigint', v: v.toString() };
    if (t === 'symbol') throw new Disallowed('Symbol');
    var name = globalName(v);
    if (name !== null) return { t: 'global', v: name };
    if (seen.indexOf(v) >= 0) throw new Disallowed('cyclic structure');
    if (t === 'function') {
      var src = fnToString.call(v);
      if (/\{\s*\[native code\]\s*\}$/.test(src)) throw new Disallowed('native function');
      return { t: 'function', v: src };
    }
    if (v instanceof PromiseCtor) throw new Disallowed('Promise');
    if (v instanceof RegExpCtor) return { t: 'regexp', v: { pattern: v.source, flags: v.flags } };
    seen.push(v);
    var out;
    if (isArray(v)) {
      var items = [];
      for (var i = 0; i < v.length; i++) items.push(ser(v[i], depth + 1, seen));
      out = { t: 'array', v: items };
    } else {
      var proto = getProto(v);
      if (proto !== ObjProto && proto !== null) {
        var ctor = proto && proto.constructor && proto.constructor.name;
        throw new Disallowed(ctor || 'host object');
      }
      var entries = [], ks = keys(v);
      for (var k = 0; k < ks.length; k++) entries.push([ks[k], ser(v[ks[k]], depth + 1, seen)]);
      out = { t: 'object', v: entries };
    }
    seen.pop();
    return out;
  }

  G.__unravel_serialize = function (v) {
    try {
      return stringify({ ok: ser(v, 0, []) });
    } catch (e) {
      if (e instanceof Disallowed) return stringify({ disallowed: e.what });
      throw e;
    }
  };
})(globalThis);
"#;

#[derive(Deserialize)]
#[serde(rename_all = "lowercase")]
enum Transport {
    Ok(EvalValue),
    Disallowed(String),
}

/// [`EvalOracle`] backed by an embedded QuickJS engine.
///
/// # Examples
///
/// ```rust,no_run
/// use unravel::oracle::{EvalOracle, EvalValue, QuickJsOracle};
///
/// let mut oracle = QuickJsOracle::new();
/// let value = oracle.evaluate("var a = [1, 2]; a.join('-')")?;
/// assert_eq!(value, EvalValue::String("1-2".to_string()));
/// # Ok::<(), unravel::oracle::OracleError>(())
/// ```
#[derive(Debug, Clone)]
pub struct QuickJsOracle {
    timeout: Duration,
    memory_limit: usize,
    stack_limit: usize,
}

impl QuickJsOracle {
    /// Creates an oracle with the default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_TIMEOUT, DEFAULT_MEMORY_LIMIT)
    }

    /// Creates an oracle with explicit limits.
    ///
    /// # Arguments
    ///
    /// * `timeout` - Wall-clock budget of each evaluation.
    /// * `memory_limit` - Heap cap of each runtime in bytes.
    #[must_use]
    pub fn with_limits(timeout: Duration, memory_limit: usize) -> Self {
        Self {
            timeout,
            memory_limit,
            stack_limit: DEFAULT_STACK_LIMIT,
        }
    }

    /// Sets the native stack cap in bytes.
    #[must_use]
    pub fn with_stack_limit(mut self, bytes: usize) -> Self {
        self.stack_limit = bytes;
        self
    }

    /// Returns the wall-clock budget of one evaluation.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns the heap cap in bytes.
    #[must_use]
    pub fn memory_limit(&self) -> usize {
        self.memory_limit
    }

    fn install(ctx: &Ctx<'_>) -> rquickjs::Result<()> {
        let globals = ctx.globals();
        globals.set(
            "__unravel_atob",
            Function::new(
                ctx.clone(),
                |_ctx: Ctx, input: String| -> Result<Option<String>, rquickjs::Error> {
                    Ok(builtins::atob(&input))
                },
            )?,
        )?;
        globals.set(
            "__unravel_btoa",
            Function::new(
                ctx.clone(),
                |_ctx: Ctx, input: String| -> Result<Option<String>, rquickjs::Error> {
                    Ok(builtins::btoa(&input))
                },
            )?,
        )?;
        ctx.eval::<(), _>(PRELUDE)
    }

    fn thrown(ctx: &Ctx<'_>, deadline: Instant) -> OracleError {
        if Instant::now() >= deadline {
            return OracleError::Timeout;
        }
        let value = ctx.catch();
        let message = if let Some(exception) = value.as_exception() {
            exception.message().unwrap_or_else(|| "exception".to_string())
        } else if let Some(text) = value.as_string() {
            text.to_string().unwrap_or_default()
        } else {
            format!("thrown {}", value.type_name())
        };
        OracleError::Exception(message)
    }
}

impl Default for QuickJsOracle {
    fn default() -> Self {
        Self::new()
    }
}

impl EvalOracle for QuickJsOracle {
    fn name(&self) -> &'static str {
        "quickjs"
    }

    fn evaluate(&mut self, source: &str) -> Result<EvalValue, OracleError> {
        let runtime = Runtime::new().map_err(|e| OracleError::Engine(e.to_string()))?;
        runtime.set_memory_limit(self.memory_limit);
        runtime.set_max_stack_size(self.stack_limit);
        let deadline = Instant::now() + self.timeout;
        runtime.set_interrupt_handler(Some(Box::new(move || Instant::now() >= deadline)));

        let context = Context::full(&runtime).map_err(|e| OracleError::Engine(e.to_string()))?;
        let quoted =
            serde_json::to_string(source).map_err(|e| OracleError::Engine(e.to_string()))?;
        let script = format!("__unravel_serialize((0, eval)({quoted}))");

        let transport = context.with(|ctx| -> Result<String, OracleError> {
            match Self::install(&ctx) {
                Ok(()) => {}
                Err(rquickjs::Error::Exception) => return Err(Self::thrown(&ctx, deadline)),
                Err(e) => return Err(OracleError::Engine(e.to_string())),
            }
            match ctx.eval::<String, _>(script) {
                Ok(text) => Ok(text),
                Err(rquickjs::Error::Exception) => Err(Self::thrown(&ctx, deadline)),
                Err(e) => Err(OracleError::Engine(e.to_string())),
            }
        })?;

        match serde_json::from_str::<Transport>(&transport) {
            Ok(Transport::Ok(value)) => Ok(value),
            Ok(Transport::Disallowed(what)) => Err(OracleError::Disallowed(what)),
            Err(e) => Err(OracleError::Engine(format!("bad transport data: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(source: &str) -> Result<EvalValue, OracleError> {
        QuickJsOracle::new().evaluate(source)
    }

    #[test]
    fn test_primitives() -> Result<(), OracleError> {
        assert_eq!(eval("1 + 2")?, EvalValue::Number(3.0));
        assert_eq!(eval("'a' + 'b'")?, EvalValue::String("ab".to_string()));
        assert_eq!(eval("!0")?, EvalValue::Boolean(true));
        assert_eq!(eval("void 0")?, EvalValue::Undefined);
        assert_eq!(eval("null")?, EvalValue::Null);
        assert!(matches!(eval("0 / 0")?, EvalValue::Number(n) if n.is_nan()));
        assert!(matches!(eval("-0")?, EvalValue::Number(n) if n == 0.0 && n.is_sign_negative()));
        Ok(())
    }

    #[test]
    fn test_completion_value_of_statements() -> Result<(), OracleError> {
        assert_eq!(
            eval("var a = ['x', 'y']; function f(i) { return a[i]; } f(1);")?,
            EvalValue::String("y".to_string())
        );
        Ok(())
    }

    #[test]
    fn test_structures() -> Result<(), OracleError> {
        assert_eq!(
            eval("[1, 'a', [true]]")?,
            EvalValue::Array(vec![
                EvalValue::Number(1.0),
                EvalValue::String("a".to_string()),
                EvalValue::Array(vec![EvalValue::Boolean(true)]),
            ])
        );
        assert_eq!(
            eval("({b: 2})")?,
            EvalValue::Object(vec![("b".to_string(), EvalValue::Number(2.0))])
        );
        assert_eq!(
            eval("/a+/g")?,
            EvalValue::RegExp {
                pattern: "a+".to_string(),
                flags: "g".to_string()
            }
        );
        assert_eq!(eval("Math")?, EvalValue::Global("Math".to_string()));
        Ok(())
    }

    #[test]
    fn test_failures() {
        assert!(matches!(eval("throw new Error('boom')"), Err(OracleError::Exception(m)) if m.contains("boom")));
        assert!(matches!(eval("Promise.resolve(1)"), Err(OracleError::Disallowed(_))));
        assert!(matches!(eval("var o = {}; o.o = o; o"), Err(OracleError::Disallowed(_))));
        assert!(matches!(eval("[].push"), Err(OracleError::Disallowed(_))));
        assert!(matches!(eval("Math.random()"), Err(OracleError::Exception(_))));
        assert!(matches!(eval("a b"), Err(OracleError::Exception(_))));
    }

    #[test]
    fn test_timeout() {
        let mut oracle = QuickJsOracle::with_limits(Duration::from_millis(100), DEFAULT_MEMORY_LIMIT);
        assert_eq!(oracle.evaluate("for (;;) {}"), Err(OracleError::Timeout));
    }

    #[test]
    fn test_host_builtins() -> Result<(), OracleError> {
        assert_eq!(eval("atob('dGVzdA==')")?, EvalValue::String("test".to_string()));
        assert_eq!(eval("btoa('test')")?, EvalValue::String("dGVzdA==".to_string()));
        assert!(matches!(eval("atob('a')"), Err(OracleError::Exception(_))));
        Ok(())
    }

    #[test]
    fn test_isolation() -> Result<(), OracleError> {
        let mut oracle = QuickJsOracle::new();
        oracle.evaluate("var leaked = 1; leaked")?;
        assert_eq!(oracle.evaluate("typeof leaked")?, EvalValue::String("undefined".to_string()));
        Ok(())
    }

    #[test]
    fn test_user_function_source() -> Result<(), OracleError> {
        match eval("(function (a) { return a + 1; })")? {
            EvalValue::Function(src) => assert!(src.contains("return a + 1")),
            other => panic!("unexpected {other:?}"),
        }
        Ok(())
    }
}
