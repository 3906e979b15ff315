//! Embedder facade over the deobfuscation engine.

use std::path::Path;

use crate::{
    deobfuscation::{DeobfuscationEngine, DeobfuscationResult, EngineConfig, Session, Verbosity},
    oracle::{EvalOracle, Evaluator},
    Result,
};

/// Deobfuscates one script.
///
/// The facade holds the script text and the engine settings. Every call to
/// [`Deobfuscator::deobfuscate`] runs the complete pipeline over the current
/// [`Deobfuscator::script`] and replaces it with the result when anything changed.
///
/// # Example
///
/// ```rust
/// use unravel::{deobfuscation::EngineConfig, Deobfuscator};
///
/// let mut deob = Deobfuscator::with_config(
///     "if (true) do_a(); else do_b(); if (false) do_c(); else do_d();",
///     EngineConfig::safe_only(),
/// );
/// assert!(deob.deobfuscate(false)?);
/// assert_eq!(deob.script, "do_a();\ndo_d();");
///
/// // A second run finds nothing left to do.
/// assert!(!deob.deobfuscate(false)?);
/// # Ok::<(), unravel::Error>(())
/// ```
pub struct Deobfuscator {
    /// Current script text; the deobfuscated script after a successful run.
    pub script: String,
    config: EngineConfig,
    evaluator: Option<Evaluator>,
    result: Option<DeobfuscationResult>,
}

impl Deobfuscator {
    /// Creates a deobfuscator with the default configuration.
    ///
    /// # Arguments
    ///
    /// * `script` - The obfuscated source text.
    /// * `normalize` - Run the readability rules after the main loop.
    #[must_use]
    pub fn new(script: impl Into<String>, normalize: bool) -> Self {
        Self::with_config(script, EngineConfig::default().with_normalize(normalize))
    }

    /// Creates a deobfuscator with an explicit configuration.
    #[must_use]
    pub fn with_config(script: impl Into<String>, config: EngineConfig) -> Self {
        Self {
            script: script.into(),
            config,
            evaluator: None,
            result: None,
        }
    }

    /// Creates a deobfuscator for the script stored at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::FileError`] if the file cannot be read as UTF-8 text.
    pub fn from_path(path: impl AsRef<Path>, config: EngineConfig) -> Result<Self> {
        let script = std::fs::read_to_string(path)?;
        Ok(Self::with_config(script, config))
    }

    /// Replaces the embedded sandbox with `oracle`.
    ///
    /// The oracle is wrapped in an [`Evaluator`] using the configured cache and
    /// determinism settings and is kept across runs.
    #[must_use]
    pub fn with_oracle(mut self, oracle: Box<dyn EvalOracle>) -> Self {
        self.evaluator = Some(
            Evaluator::new(oracle)
                .with_cache_capacity(self.config.oracle.cache_capacity)
                .with_determinism_runs(self.config.oracle.determinism_runs),
        );
        self
    }

    /// Sets the main loop iteration cap.
    pub fn set_max_iterations(&mut self, max: usize) {
        self.config.max_iterations = max;
    }

    /// Sets the reporting level.
    pub fn set_verbosity(&mut self, verbosity: Verbosity) {
        self.config.verbosity = verbosity;
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Runs the pipeline over [`Deobfuscator::script`].
    ///
    /// # Arguments
    ///
    /// * `clean` - Remove unreferenced declarations after the main loop.
    ///
    /// # Returns
    ///
    /// `true` if the script changed.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Parse`] if the script is not valid JavaScript. The script
    /// is left untouched on error.
    pub fn deobfuscate(&mut self, clean: bool) -> Result<bool> {
        let engine = DeobfuscationEngine::new(self.config.clone().with_clean(clean));
        let session = Session::new(&self.script)?.with_verbosity(self.config.verbosity);
        let custom = self.evaluator.is_some();
        let mut session = match self.evaluator.take().or_else(|| engine.evaluator()) {
            Some(evaluator) => session.with_evaluator(evaluator),
            None => session,
        };

        let outcome = engine.process(&mut session);
        if custom {
            self.evaluator = session.take_evaluator();
        }
        let result = outcome?;

        let modified = result.modified;
        if modified {
            self.script = session.script().to_string();
        }
        self.result = Some(result);
        Ok(modified)
    }

    /// Name of the obfuscation family detected by the last run.
    #[must_use]
    pub fn obfuscation_name(&self) -> Option<String> {
        self.result
            .as_ref()
            .and_then(|r| r.detection.primary().map(|o| o.name()))
    }

    /// Result of the last run.
    #[must_use]
    pub fn result(&self) -> Option<&DeobfuscationResult> {
        self.result.as_ref()
    }
}

impl std::fmt::Debug for Deobfuscator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deobfuscator")
            .field("script", &self.script.len())
            .field("config", &self.config)
            .field("custom_oracle", &self.evaluator.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::{testing::ScriptedOracle, EvalValue};

    #[test]
    fn test_parse_error_leaves_script() {
        let mut deob = Deobfuscator::with_config("var = ;", EngineConfig::safe_only());
        assert!(deob.deobfuscate(false).is_err());
        assert_eq!(deob.script, "var = ;");
        assert!(deob.result().is_none());
    }

    #[test]
    fn test_scripted_oracle_survives_runs() -> crate::Result<()> {
        let oracle = ScriptedOracle::new().answer(
            "const a = ['hello'];\na[0]",
            EvalValue::String("hello".into()),
        );
        let calls = oracle.calls();
        let mut deob = Deobfuscator::new("const a = ['hello']; const b = a[0];", true)
            .with_oracle(Box::new(oracle));

        assert!(deob.deobfuscate(false)?);
        assert_eq!(deob.script, "const a = ['hello'];\nconst b = 'hello';");
        assert!(!calls.borrow().is_empty());

        assert!(!deob.deobfuscate(false)?);
        assert!(deob.obfuscation_name().is_none());
        assert!(deob.result().is_some_and(|r| !r.modified));
        Ok(())
    }

    #[test]
    fn test_missing_file() {
        let missing = Deobfuscator::from_path("/nonexistent/input.js", EngineConfig::safe_only());
        assert!(matches!(missing, Err(crate::Error::FileError(_))));
    }

    #[test]
    fn test_settings() {
        let mut deob = Deobfuscator::new("a;", false);
        deob.set_max_iterations(3);
        deob.set_verbosity(Verbosity::None);
        assert_eq!(deob.config().max_iterations, 3);
        assert_eq!(deob.config().verbosity, Verbosity::None);
        assert!(!deob
            .config()
            .rules
            .contains(crate::deobfuscation::RuleSet::NORMALIZE));
    }
}
