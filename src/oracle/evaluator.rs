//! Evaluation front-end: trap rewriting, caching, determinism and reification.

use std::{
    borrow::Cow,
    collections::{HashMap, VecDeque},
    sync::OnceLock,
};

use regex::Regex;

use crate::{
    ast::{content_hash, Ast, LitValue, NodeId, NodeKind},
    oracle::{EvalOracle, EvalValue, OracleError},
};

/// Default number of cached evaluation results.
pub const DEFAULT_CACHE_CAPACITY: usize = 100;

/// Default number of runs compared by the determinism check.
pub const DEFAULT_DETERMINISM_RUNS: usize = 2;

const MAX_REIFY_DEPTH: usize = 64;

fn traps() -> &'static [(Regex, &'static str)] {
    static TRAPS: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    TRAPS.get_or_init(|| {
        [
            (r"(?i)while\s*\(\s*(true|1)\s*\)\s*\{\s*\}", "while (0) {}"),
            (r#"(?i)["']debu["']\s*\+\s*["']gger["']"#, r#""debu" + "gge_""#),
            (r"(?i)debugger", r#""debugge_""#),
        ]
        .into_iter()
        .filter_map(|(pattern, with)| Regex::new(pattern).ok().map(|re| (re, with)))
        .collect()
    })
}

/// Neutralizes known anti-analysis traps in a snippet before it is evaluated.
///
/// Empty infinite loops become `while (0) {}` and `debugger` statements (including the
/// `'debu' + 'gger'` spelling) become inert strings.
#[must_use]
pub fn rewrite_traps(source: &str) -> Cow<'_, str> {
    let mut text = Cow::Borrowed(source);
    for (pattern, with) in traps() {
        if pattern.is_match(&text) {
            text = Cow::Owned(pattern.replace_all(&text, *with).into_owned());
        }
    }
    text
}

/// Bounded FIFO cache of evaluation results keyed by the hash of the evaluated text.
///
/// Failures are cached as well: a snippet that threw once will throw again.
#[derive(Debug)]
pub struct EvalCache {
    entries: HashMap<String, Result<EvalValue, OracleError>>,
    order: VecDeque<String>,
    capacity: usize,
}

impl EvalCache {
    /// Creates an empty cache holding at most `capacity` results.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            capacity,
        }
    }

    /// Returns the cached result for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Result<EvalValue, OracleError>> {
        self.entries.get(key)
    }

    /// Stores a result, evicting the oldest entry when full.
    pub fn insert(&mut self, key: String, result: Result<EvalValue, OracleError>) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.contains_key(&key) {
            self.entries.insert(key, result);
            return;
        }
        while self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
        self.order.push_back(key.clone());
        self.entries.insert(key, result);
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    /// Number of cached results.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Runs snippets through an [`EvalOracle`] and turns the results into syntax.
///
/// Every snippet is trap-rewritten, looked up in the cache, and otherwise evaluated
/// several times; disagreeing runs fail with [`OracleError::NonDeterministic`].
pub struct Evaluator {
    oracle: Box<dyn EvalOracle>,
    cache: EvalCache,
    determinism_runs: usize,
    evaluations: usize,
    cache_hits: usize,
}

impl Evaluator {
    /// Creates an evaluator over `oracle` with the default cache and determinism settings.
    #[must_use]
    pub fn new(oracle: Box<dyn EvalOracle>) -> Self {
        Self {
            oracle,
            cache: EvalCache::new(DEFAULT_CACHE_CAPACITY),
            determinism_runs: DEFAULT_DETERMINISM_RUNS,
            evaluations: 0,
            cache_hits: 0,
        }
    }

    /// Replaces the cache with one of the given capacity.
    #[must_use]
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache = EvalCache::new(capacity);
        self
    }

    /// Sets how many runs must agree before a result is accepted (at least one).
    #[must_use]
    pub fn with_determinism_runs(mut self, runs: usize) -> Self {
        self.determinism_runs = runs.max(1);
        self
    }

    /// Name of the underlying oracle.
    #[must_use]
    pub fn oracle_name(&self) -> &'static str {
        self.oracle.name()
    }

    /// Drops all cached results.
    pub fn reset_cache(&mut self) {
        self.cache.clear();
    }

    /// Number of snippets sent to the oracle (cache misses).
    #[must_use]
    pub fn evaluations(&self) -> usize {
        self.evaluations
    }

    /// Number of snippets answered from the cache.
    #[must_use]
    pub fn cache_hits(&self) -> usize {
        self.cache_hits
    }

    /// Evaluates `source` and returns its completion value.
    ///
    /// # Errors
    ///
    /// Returns the [`OracleError`] of the (possibly cached) failed evaluation.
    pub fn evaluate_value(&mut self, source: &str) -> Result<EvalValue, OracleError> {
        let source = rewrite_traps(source);
        let key = content_hash(&source);
        if let Some(cached) = self.cache.get(&key) {
            self.cache_hits += 1;
            return cached.clone();
        }

        self.evaluations += 1;
        let result = self.run_checked(&source);
        match &result {
            Ok(value) => log::trace!("{} -> {}", abbreviate(&source), value.type_name()),
            Err(e) => log::trace!("{} -> {e}", abbreviate(&source)),
        }
        self.cache.insert(key, result.clone());
        result
    }

    /// Evaluates `source` and builds the resulting value as detached nodes of `ast`.
    ///
    /// # Errors
    ///
    /// Returns an [`OracleError`] if evaluation fails or the value cannot be expressed
    /// as syntax. Nothing is added to `ast` in that case except unreachable nodes.
    pub fn evaluate(&mut self, ast: &mut Ast, source: &str) -> Result<NodeId, OracleError> {
        let value = self.evaluate_value(source)?;
        reify(ast, &value)
    }

    fn run_checked(&mut self, source: &str) -> Result<EvalValue, OracleError> {
        let first = self.oracle.evaluate(source)?;
        if self.determinism_runs > 1 {
            let expected = fingerprint(&first)?;
            for _ in 1..self.determinism_runs {
                let again = self.oracle.evaluate(source)?;
                if fingerprint(&again)? != expected {
                    return Err(OracleError::NonDeterministic);
                }
            }
        }
        Ok(first)
    }
}

impl std::fmt::Debug for Evaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Evaluator")
            .field("oracle", &self.oracle.name())
            .field("cached", &self.cache.len())
            .field("determinism_runs", &self.determinism_runs)
            .field("evaluations", &self.evaluations)
            .field("cache_hits", &self.cache_hits)
            .finish()
    }
}

fn fingerprint(value: &EvalValue) -> Result<String, OracleError> {
    serde_json::to_string(value).map_err(|e| OracleError::Engine(e.to_string()))
}

fn abbreviate(source: &str) -> Cow<'_, str> {
    match source.char_indices().nth(80) {
        Some((cut, _)) => Cow::Owned(format!("{}...", &source[..cut])),
        None => Cow::Borrowed(source),
    }
}

/// Builds `value` as detached nodes of `ast`.
///
/// Conversion is all-or-nothing: if any nested value cannot be expressed, the whole
/// conversion fails.
///
/// # Errors
///
/// Returns [`OracleError::Unconvertible`] for function sources that do not parse as an
/// expression and for structures nested deeper than the conversion limit.
pub fn reify(ast: &mut Ast, value: &EvalValue) -> Result<NodeId, OracleError> {
    reify_at(ast, value, 0)
}

fn reify_at(ast: &mut Ast, value: &EvalValue, depth: usize) -> Result<NodeId, OracleError> {
    if depth > MAX_REIFY_DEPTH {
        return Err(OracleError::Unconvertible("nesting too deep".to_string()));
    }
    Ok(match value {
        EvalValue::Undefined => ast.undefined(),
        EvalValue::Null => ast.null(),
        EvalValue::Boolean(b) => ast.boolean(*b),
        EvalValue::Number(n) => ast.number(*n),
        EvalValue::String(s) => ast.string(s),
        EvalValue::BigInt(digits) => match digits.strip_prefix('-') {
            Some(magnitude) => {
                let lit = ast.add(NodeKind::Literal {
                    value: LitValue::BigInt(magnitude.to_string()),
                });
                ast.unary("-", lit)
            }
            None => ast.add(NodeKind::Literal {
                value: LitValue::BigInt(digits.clone()),
            }),
        },
        EvalValue::RegExp { pattern, flags } => ast.add(NodeKind::Literal {
            value: LitValue::RegExp {
                pattern: pattern.clone(),
                flags: flags.clone(),
            },
        }),
        EvalValue::Array(items) => {
            let elements = items
                .iter()
                .map(|item| reify_at(ast, item, depth + 1))
                .collect::<Result<Vec<_>, _>>()?;
            ast.array(elements)
        }
        EvalValue::Object(entries) => {
            let mut properties = Vec::with_capacity(entries.len());
            for (key, item) in entries {
                let value = reify_at(ast, item, depth + 1)?;
                properties.push(ast.property(key, value));
            }
            ast.object(properties)
        }
        EvalValue::Function(source) => ast
            .parse_expression(source)
            .map_err(|e| OracleError::Unconvertible(format!("function source: {e}")))?,
        EvalValue::Global(name) => ast.ident(name),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::testing::ScriptedOracle;

    #[test]
    fn test_rewrite_traps() {
        assert_eq!(rewrite_traps("while (true) {}"), "while (0) {}");
        assert_eq!(rewrite_traps("while(1){ }"), "while (0) {}");
        assert_eq!(rewrite_traps("debugger;"), "\"debugge_\";");
        assert_eq!(rewrite_traps("x = 'debu' + 'gger'"), "x = \"debu\" + \"gge_\"");
        assert!(matches!(rewrite_traps("a + b"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_cache_eviction() {
        let mut cache = EvalCache::new(2);
        cache.insert("a".into(), Ok(EvalValue::Null));
        cache.insert("b".into(), Ok(EvalValue::Null));
        cache.insert("c".into(), Err(OracleError::Timeout));
        assert_eq!(cache.len(), 2);
        assert!(cache.get("a").is_none());
        assert_eq!(cache.get("c"), Some(&Err(OracleError::Timeout)));
    }

    #[test]
    fn test_cached_evaluation() -> Result<(), OracleError> {
        let oracle = ScriptedOracle::new().answer("1 + 1", EvalValue::Number(2.0));
        let calls = oracle.calls();
        let mut evaluator = Evaluator::new(Box::new(oracle));

        assert_eq!(evaluator.evaluate_value("1 + 1")?, EvalValue::Number(2.0));
        assert_eq!(evaluator.evaluate_value("1 + 1")?, EvalValue::Number(2.0));
        assert_eq!(calls.borrow().len(), 2);
        assert_eq!(evaluator.cache_hits(), 1);

        evaluator.reset_cache();
        evaluator.evaluate_value("1 + 1")?;
        assert_eq!(calls.borrow().len(), 4);
        Ok(())
    }

    #[test]
    fn test_nondeterministic() {
        let oracle = ScriptedOracle::new().answer_sequence(
            "r()",
            vec![Ok(EvalValue::Number(1.0)), Ok(EvalValue::Number(2.0))],
        );
        let mut evaluator = Evaluator::new(Box::new(oracle));
        assert_eq!(
            evaluator.evaluate_value("r()"),
            Err(OracleError::NonDeterministic)
        );
    }

    #[test]
    fn test_reify() -> crate::Result<()> {
        let mut ast = Ast::parse("")?;
        let value = EvalValue::Array(vec![
            EvalValue::Number(-1.0),
            EvalValue::String("a".to_string()),
            EvalValue::Undefined,
        ]);
        let id = reify(&mut ast, &value)?;
        assert_eq!(ast.text(id), "[\n  -1,\n  'a',\n  undefined\n]");

        let object = EvalValue::Object(vec![("k".to_string(), EvalValue::Boolean(false))]);
        let id = reify(&mut ast, &object)?;
        assert_eq!(ast.text(id), "{ k: false }");

        let own_proto = EvalValue::Object(vec![("__proto__".to_string(), EvalValue::Number(3.0))]);
        let id = reify(&mut ast, &own_proto)?;
        assert!(ast.text(id).contains("['__proto__']: 3"), "{}", ast.text(id));

        let func = EvalValue::Function("function (a) { return a; }".to_string());
        let id = reify(&mut ast, &func)?;
        assert_eq!(ast.node_type(id), crate::ast::NodeType::FunctionExpression);

        let method = EvalValue::Function("m() {}".to_string());
        assert!(reify(&mut ast, &method).is_err());

        let global = EvalValue::Global("console".to_string());
        let id = reify(&mut ast, &global)?;
        assert_eq!(ast.text(id), "console");
        Ok(())
    }
}
