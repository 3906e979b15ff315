//! Main deobfuscation engine.
//!
//! The [`DeobfuscationEngine`] is the main entry point for deobfuscating a
//! script. It orchestrates family detection, the family processors, the rule
//! main loop and the optional clean and normalize phases.

use std::{sync::Arc, time::Instant};

use crate::{
    deobfuscation::{
        changes::EventKind,
        config::{EngineConfig, RuleSet, Verbosity},
        detection::{DetectionResult, DetectionScore},
        detector::ObfuscatorDetector,
        obfuscators::Obfuscator,
        result::DeobfuscationResult,
        rule::{CandidateFilter, Rule},
        rules,
        scheduler::{apply_rule, run_to_fixed_point, LoopSummary, RuleScheduler},
        session::Session,
    },
    oracle::{Evaluator, QuickJsOracle},
    Error, Result,
};

/// Main deobfuscation engine.
///
/// The engine orchestrates the complete deobfuscation pipeline:
///
/// 1. **Detection**: Identify which obfuscation family produced the script
/// 2. **Preprocessing**: Family-specific rules, applied once each
/// 3. **Main loop**: Safe and unsafe rules until a fixed point
/// 4. **Postprocessing**: Family-specific rules, applied once each
/// 5. **Clean**: Dead declaration removal (opt-in)
/// 6. **Normalize**: Readability rewrites, only if the script changed
///
/// # Example
///
/// ```rust
/// use unravel::deobfuscation::{DeobfuscationEngine, EngineConfig};
///
/// let engine = DeobfuscationEngine::new(EngineConfig::safe_only());
/// let (script, result) = engine.process_source("if (false) a(); else b();")?;
///
/// assert_eq!(script, "b();");
/// assert!(result.modified);
/// # Ok::<(), unravel::Error>(())
/// ```
pub struct DeobfuscationEngine {
    /// Engine configuration.
    config: EngineConfig,
    /// Family detector.
    detector: ObfuscatorDetector,
    /// Main loop over the safe and unsafe rules.
    scheduler: RuleScheduler,
    /// Dead declaration removal, empty unless enabled.
    clean: Vec<Box<dyn Rule>>,
    /// Readability rewrites, empty unless enabled.
    normalize: Vec<Box<dyn Rule>>,
}

impl Default for DeobfuscationEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl DeobfuscationEngine {
    /// Creates a new engine with the given configuration.
    ///
    /// # Arguments
    ///
    /// * `config` - Engine configuration selecting rule groups, limits and verbosity.
    ///
    /// # Returns
    ///
    /// A new `DeobfuscationEngine` instance ready to process scripts.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        let safe = if config.rules.contains(RuleSet::SAFE) {
            rules::safe_rules()
        } else {
            Vec::new()
        };
        let unsafe_rules = if config.rules.contains(RuleSet::UNSAFE) {
            rules::unsafe_rules()
        } else {
            Vec::new()
        };
        let clean = if config.rules.contains(RuleSet::CLEAN) {
            rules::clean_rules()
        } else {
            Vec::new()
        };
        let normalize = if config.rules.contains(RuleSet::NORMALIZE) {
            rules::normalize_rules()
        } else {
            Vec::new()
        };

        let mut detector = ObfuscatorDetector::new();
        detector.set_threshold(config.detection_threshold);

        Self {
            scheduler: RuleScheduler::new(safe, unsafe_rules, config.max_iterations),
            config,
            detector,
            clean,
            normalize,
        }
    }

    /// Returns the engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns the family detector.
    #[must_use]
    pub fn detector(&self) -> &ObfuscatorDetector {
        &self.detector
    }

    /// Registers an obfuscation family with the engine.
    ///
    /// # Arguments
    ///
    /// * `obfuscator` - The family to register, wrapped in an `Arc` for shared ownership.
    pub fn register_obfuscator(&mut self, obfuscator: Arc<dyn Obfuscator>) {
        self.detector.register(obfuscator);
    }

    /// Builds the evaluator the configuration asks for.
    ///
    /// # Returns
    ///
    /// An [`Evaluator`] over a [`QuickJsOracle`] with the configured limits, or `None`
    /// if the configuration never executes code.
    #[must_use]
    pub fn evaluator(&self) -> Option<Evaluator> {
        if !self.config.needs_oracle() {
            return None;
        }
        let limits = &self.config.oracle;
        let oracle = QuickJsOracle::with_limits(limits.timeout, limits.memory_limit)
            .with_stack_limit(limits.max_stack_size);
        Some(
            Evaluator::new(Box::new(oracle))
                .with_cache_capacity(limits.cache_capacity)
                .with_determinism_runs(limits.determinism_runs),
        )
    }

    /// Parses a script into a session configured for this engine.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if `source` is not valid JavaScript.
    pub fn session(&self, source: &str) -> Result<Session> {
        let session = Session::new(source)?.with_verbosity(self.config.verbosity);
        Ok(match self.evaluator() {
            Some(evaluator) => session.with_evaluator(evaluator),
            None => session,
        })
    }

    /// Deobfuscates a script.
    ///
    /// # Returns
    ///
    /// The deobfuscated script and the [`DeobfuscationResult`] of the run.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if `source` is not valid JavaScript, or an error if the
    /// configured target family is not registered.
    pub fn process_source(&self, source: &str) -> Result<(String, DeobfuscationResult)> {
        let mut session = self.session(source)?;
        let result = self.process(&mut session)?;
        Ok((session.script().to_string(), result))
    }

    /// Runs the complete pipeline over a session.
    ///
    /// The session's caches are flushed first. Events recorded during the run are
    /// moved from the session into the returned result.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured target family is not registered. Rule
    /// failures never abort the run; they are logged and recorded as events.
    pub fn process(&self, session: &mut Session) -> Result<DeobfuscationResult> {
        let start = Instant::now();
        let original = session.script().to_string();
        session.reset_caches();

        let detection = self.classify(session)?;
        let obfuscator = detection.primary().cloned();

        if let Some(obfuscator) = obfuscator.as_ref().filter(|_| self.config.enable_processors) {
            self.run_processors(
                session,
                &obfuscator.preprocessors(),
                EventKind::PreprocessorApplied,
            );
        }

        let summary = if self.scheduler.rule_names().is_empty() {
            LoopSummary::default()
        } else {
            self.scheduler.run(session)
        };

        if let Some(obfuscator) = obfuscator.as_ref().filter(|_| self.config.enable_processors) {
            self.run_processors(
                session,
                &obfuscator.postprocessors(),
                EventKind::PostprocessorApplied,
            );
        }

        if !self.clean.is_empty() {
            run_to_fixed_point(session, &self.clean, self.config.max_iterations);
        }

        if !self.normalize.is_empty() && session.script() != original {
            run_to_fixed_point(session, &self.normalize, self.config.max_iterations);
        }

        let modified = session.script() != original;
        if session.verbosity.allows(Verbosity::Log) {
            if modified {
                log::info!(
                    "deobfuscation finished after {} iterations in {:.2?}",
                    summary.iterations,
                    start.elapsed()
                );
            } else {
                log::info!("nothing was deobfuscated");
            }
        }

        let events = session.events.take();
        Ok(DeobfuscationResult::new(detection, events, modified)
            .with_timing(start.elapsed(), summary.iterations))
    }

    /// Identifies the obfuscation family of the session's script.
    ///
    /// A configured target family bypasses detection.
    fn classify(&self, session: &Session) -> Result<DetectionResult> {
        let threshold = self.detector.threshold();
        let detection = match &self.config.target_obfuscator {
            Some(id) => {
                let Some(obfuscator) = self.detector.registry().get(id) else {
                    return Err(Error::Error(format!(
                        "unknown obfuscation family '{id}' (known: {})",
                        self.detector.registry().obfuscator_ids().join(", ")
                    )));
                };
                DetectionResult::new(
                    Some(obfuscator.clone()),
                    vec![(id.clone(), DetectionScore::with_score(100))],
                    threshold,
                )
            }
            None => self.detector.detect(&session.ast),
        };

        session
            .events
            .record(EventKind::DetectionComplete)
            .message(detection.summary());
        if let Some(obfuscator) = detection.primary() {
            if session.verbosity.allows(Verbosity::Log) {
                log::info!("detected obfuscation type: {}", obfuscator.name());
            }
        }
        Ok(detection)
    }

    /// Applies each family rule exactly once, in order. Every processor that changes
    /// the script is recorded as one `kind` event.
    fn run_processors(&self, session: &mut Session, processors: &[Box<dyn Rule>], kind: EventKind) {
        let filter = CandidateFilter::all();
        for processor in processors {
            let outcome = apply_rule(session, processor.as_ref(), &filter);
            if !outcome.changed() {
                continue;
            }
            session
                .events
                .record(kind)
                .rule(outcome.rule)
                .message(format!("{} marks applied", outcome.applied));
            if session.verbosity.allows(Verbosity::Debug) {
                log::debug!("{kind}: {} applied {} marks", outcome.rule, outcome.applied);
            }
        }
    }
}

impl std::fmt::Debug for DeobfuscationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeobfuscationEngine")
            .field("config", &self.config)
            .field("scheduler", &self.scheduler)
            .field("families", &self.detector.registry().obfuscator_ids())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ast::Ast,
        oracle::{testing::ScriptedOracle, EvalValue},
    };

    #[test]
    fn test_engine_default() {
        let engine = DeobfuscationEngine::default();
        assert_eq!(engine.config().max_iterations, 500);
        assert_eq!(engine.detector().threshold(), 50);
        assert_eq!(engine.detector().registry().len(), 4);
        assert!(engine.evaluator().is_some());
    }

    #[test]
    fn test_safe_only_never_builds_an_oracle() -> crate::Result<()> {
        let engine = DeobfuscationEngine::new(EngineConfig::safe_only());
        assert!(engine.evaluator().is_none());
        assert!(!engine.session("a;")?.has_oracle());
        Ok(())
    }

    #[test]
    fn test_deterministic_if_statements() -> crate::Result<()> {
        let engine = DeobfuscationEngine::new(EngineConfig::safe_only());
        let (script, result) = engine
            .process_source("if (true) do_a(); else do_b(); if (false) do_c(); else do_d();")?;
        assert_eq!(script, "do_a();\ndo_d();");
        assert!(result.modified);
        assert!(result.iterations >= 2);
        assert!(result.events.count_kind(EventKind::BranchResolved) >= 2);
        assert_eq!(result.events.count_kind(EventKind::DetectionComplete), 1);
        Ok(())
    }

    #[test]
    fn test_clean_script_is_unmodified() -> crate::Result<()> {
        let engine = DeobfuscationEngine::new(EngineConfig::safe_only());
        let (script, result) = engine.process_source("console.log(x);")?;
        assert_eq!(script, "console.log(x);");
        assert!(!result.modified);
        assert_eq!(result.iterations, 1);
        Ok(())
    }

    #[test]
    fn test_normalize_only_after_change() -> crate::Result<()> {
        let engine = DeobfuscationEngine::new(EngineConfig::safe_only());
        let (script, _) = engine.process_source("a['b'];")?;
        assert_eq!(script, "a['b'];");

        let (script, _) = engine.process_source("if (true) a['b'];")?;
        assert_eq!(script, "a.b;");

        let engine = DeobfuscationEngine::new(EngineConfig::safe_only().with_normalize(false));
        let (script, _) = engine.process_source("if (true) a['b'];")?;
        assert_eq!(script, "a['b'];");
        Ok(())
    }

    #[test]
    fn test_clean_phase() -> crate::Result<()> {
        let source = "var unused = 1;\nif (true) run();";
        let engine = DeobfuscationEngine::new(EngineConfig::safe_only());
        let (script, _) = engine.process_source(source)?;
        assert!(script.contains("unused"), "{script}");

        let engine = DeobfuscationEngine::new(EngineConfig::safe_only().with_clean(true));
        let (script, _) = engine.process_source(source)?;
        assert_eq!(script, "run();");
        Ok(())
    }

    #[test]
    fn test_target_obfuscator() -> crate::Result<()> {
        let config = EngineConfig::safe_only().with_target_obfuscator("array_replacements");
        let engine = DeobfuscationEngine::new(config);
        let (_, result) = engine.process_source("a();")?;
        assert!(result.detection.has("array_replacements"));

        let config = EngineConfig::safe_only().with_target_obfuscator("nope");
        let engine = DeobfuscationEngine::new(config);
        assert!(engine.process_source("a();").is_err());
        Ok(())
    }

    #[test]
    fn test_preprocessors_run_once_before_loop() -> crate::Result<()> {
        let declaration = "var s = ['a', 'b', 'c'];";
        let iife = "(function (arr, n) { while (--n) { arr.push(arr.shift()); } })(s, 2);";
        let source = format!("{declaration}\n{iife}\nf(s[0]);");
        let oracle = ScriptedOracle::new().answer(
            &format!("{declaration}\n{iife}\ns"),
            EvalValue::Array(vec![
                EvalValue::String("b".into()),
                EvalValue::String("c".into()),
                EvalValue::String("a".into()),
            ]),
        );

        let config = EngineConfig {
            enable_processors: true,
            ..EngineConfig::safe_only().with_target_obfuscator("augmented_array_replacements")
        };
        let engine = DeobfuscationEngine::new(config);
        let mut session = Session::new(&source)?.with_oracle(Box::new(oracle));
        let result = engine.process(&mut session)?;

        assert!(result.modified);
        assert_eq!(result.events.count_kind(EventKind::PreprocessorApplied), 1);
        assert!(!session.script().contains("shift"), "{}", session.script());
        Ok(())
    }

    #[test]
    fn test_processor_events_follow_phase() -> crate::Result<()> {
        let engine = DeobfuscationEngine::new(EngineConfig::safe_only());
        let mut session = Session::new("if (true) a(); b();")?;
        let processors: Vec<Box<dyn Rule>> = vec![
            Box::new(crate::deobfuscation::rules::ResolveDeterministicIfStatements),
            Box::new(crate::deobfuscation::rules::SimplifyCalls),
        ];
        engine.run_processors(&mut session, &processors, EventKind::PostprocessorApplied);

        assert_eq!(session.events.count_kind(EventKind::PostprocessorApplied), 1);
        assert_eq!(session.events.count_kind(EventKind::PreprocessorApplied), 0);
        let ran: Vec<_> = session
            .events
            .iter()
            .filter(|e| e.kind == EventKind::PostprocessorApplied)
            .map(|e| e.rule)
            .collect();
        assert_eq!(ran, vec![Some("resolveDeterministicIfStatements")]);
        assert_eq!(
            session.events.by_rule().get("resolveDeterministicIfStatements"),
            Some(&1)
        );
        Ok(())
    }

    #[test]
    fn test_detection_on_plain_script() -> crate::Result<()> {
        let engine = DeobfuscationEngine::default();
        let ast = Ast::parse("function add(a, b) { return a + b; }")?;
        assert!(!engine.detector().detect(&ast).detected());
        Ok(())
    }
}
