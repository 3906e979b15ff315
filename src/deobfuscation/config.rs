//! Configuration for the deobfuscation engine.
//!
//! This module provides configuration types for controlling the deobfuscation
//! pipeline: which rule groups run, iteration limits, sandbox limits and how much the
//! engine reports while it works.

use std::time::Duration;

use bitflags::bitflags;
use strum::{Display, EnumIter, EnumString};

use crate::oracle::{
    DEFAULT_CACHE_CAPACITY, DEFAULT_DETERMINISM_RUNS, DEFAULT_MEMORY_LIMIT, DEFAULT_STACK_LIMIT,
    DEFAULT_TIMEOUT,
};

bitflags! {
    /// Rule groups the engine may run.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RuleSet: u8 {
        /// Syntactic rewrites that never execute code.
        const SAFE = 0b0001;
        /// Rewrites that evaluate code in the sandbox.
        const UNSAFE = 0b0010;
        /// Readability normalization after the main loop.
        const NORMALIZE = 0b0100;
        /// Dead declaration removal after the main loop.
        const CLEAN = 0b1000;
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        RuleSet::SAFE | RuleSet::UNSAFE | RuleSet::NORMALIZE
    }
}

/// How much the engine reports while it works.
///
/// Levels are ordered: each level includes everything the previous ones report.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Display, EnumString, EnumIter,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Verbosity {
    /// Report nothing.
    None,
    /// Rule failures and rejected commits.
    Error,
    /// Iteration summaries and the detected obfuscation family.
    #[default]
    Log,
    /// Per-rule timings and change counts.
    Debug,
}

impl Verbosity {
    /// Returns `true` if messages of `level` should be emitted at this verbosity.
    #[must_use]
    pub fn allows(self, level: Verbosity) -> bool {
        level != Verbosity::None && level <= self
    }
}

/// Limits and settings of the evaluation sandbox.
#[derive(Debug, Clone)]
pub struct OracleConfig {
    /// Wall-clock limit of one evaluation (default: 2 s).
    pub timeout: Duration,

    /// Heap limit of one sandbox runtime in bytes (default: 64 MiB).
    pub memory_limit: usize,

    /// Stack limit of one sandbox runtime in bytes (default: 1 MiB).
    pub max_stack_size: usize,

    /// Number of evaluation results kept per session (default: 100).
    pub cache_capacity: usize,

    /// Number of runs that must agree before a result is used (default: 2).
    pub determinism_runs: usize,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            memory_limit: DEFAULT_MEMORY_LIMIT,
            max_stack_size: DEFAULT_STACK_LIMIT,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            determinism_runs: DEFAULT_DETERMINISM_RUNS,
        }
    }
}

/// Configuration for the deobfuscation engine.
///
/// # Example
///
/// ```rust
/// use unravel::deobfuscation::{EngineConfig, RuleSet};
///
/// let config = EngineConfig::default().with_max_iterations(10).with_clean(true);
/// assert_eq!(config.max_iterations, 10);
/// assert!(config.rules.contains(RuleSet::CLEAN));
/// ```
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum iterations of the main loop (default: 500).
    pub max_iterations: usize,

    /// Enabled rule groups (default: safe, unsafe and normalize).
    pub rules: RuleSet,

    /// Detection threshold for obfuscation family identification (0-100, default: 50).
    pub detection_threshold: usize,

    /// Target a specific obfuscation family (bypasses detection).
    pub target_obfuscator: Option<String>,

    /// Run the family specific pre- and post-processors (default: true).
    pub enable_processors: bool,

    /// Reporting level (default: [`Verbosity::Log`]).
    pub verbosity: Verbosity,

    /// Sandbox settings.
    pub oracle: OracleConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_iterations: 500,
            rules: RuleSet::default(),
            detection_threshold: 50,
            target_obfuscator: None,
            enable_processors: true,
            verbosity: Verbosity::default(),
            oracle: OracleConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Creates a new configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration that never executes code.
    ///
    /// Only the safe rules and normalization run and no sandbox is created. Family
    /// processors evaluate code and are disabled as well.
    #[must_use]
    pub fn safe_only() -> Self {
        Self {
            rules: RuleSet::SAFE | RuleSet::NORMALIZE,
            enable_processors: false,
            ..Self::default()
        }
    }

    /// Creates a configuration for maximum deobfuscation.
    ///
    /// This configuration uses:
    /// - More iterations (2000 max)
    /// - Dead declaration removal
    /// - A longer sandbox timeout (5 s) and a larger result cache
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            max_iterations: 2000,
            rules: RuleSet::all(),
            oracle: OracleConfig {
                timeout: Duration::from_secs(5),
                cache_capacity: 1000,
                ..OracleConfig::default()
            },
            ..Self::default()
        }
    }

    /// Sets the maximum number of iterations.
    ///
    /// # Arguments
    ///
    /// * `max` - The maximum number of main loop iterations.
    ///
    /// # Returns
    ///
    /// The modified configuration (builder pattern).
    #[must_use]
    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    /// Enables or disables readability normalization.
    #[must_use]
    pub fn with_normalize(mut self, normalize: bool) -> Self {
        self.rules.set(RuleSet::NORMALIZE, normalize);
        self
    }

    /// Enables or disables dead declaration removal.
    #[must_use]
    pub fn with_clean(mut self, clean: bool) -> Self {
        self.rules.set(RuleSet::CLEAN, clean);
        self
    }

    /// Sets the detection threshold for family identification.
    ///
    /// # Arguments
    ///
    /// * `threshold` - A value from 0-100 representing the confidence threshold.
    ///
    /// # Returns
    ///
    /// The modified configuration (builder pattern).
    #[must_use]
    pub fn with_detection_threshold(mut self, threshold: usize) -> Self {
        self.detection_threshold = threshold;
        self
    }

    /// Targets a specific obfuscation family, bypassing automatic detection.
    ///
    /// # Arguments
    ///
    /// * `obfuscator` - The family ID to target.
    ///
    /// # Returns
    ///
    /// The modified configuration (builder pattern).
    #[must_use]
    pub fn with_target_obfuscator(mut self, obfuscator: impl Into<String>) -> Self {
        self.target_obfuscator = Some(obfuscator.into());
        self
    }

    /// Sets the reporting level.
    #[must_use]
    pub fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Sets the sandbox limits.
    ///
    /// # Arguments
    ///
    /// * `timeout` - Wall-clock limit of one evaluation.
    /// * `memory_limit` - Heap limit in bytes.
    ///
    /// # Returns
    ///
    /// The modified configuration (builder pattern).
    #[must_use]
    pub fn with_oracle_limits(mut self, timeout: Duration, memory_limit: usize) -> Self {
        self.oracle.timeout = timeout;
        self.oracle.memory_limit = memory_limit;
        self
    }

    /// Returns `true` if the configuration may execute code in the sandbox.
    #[must_use]
    pub fn needs_oracle(&self) -> bool {
        self.rules.contains(RuleSet::UNSAFE) || self.enable_processors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.max_iterations, 500);
        assert_eq!(config.detection_threshold, 50);
        assert!(config.rules.contains(RuleSet::SAFE | RuleSet::UNSAFE));
        assert!(config.rules.contains(RuleSet::NORMALIZE));
        assert!(!config.rules.contains(RuleSet::CLEAN));
        assert_eq!(config.oracle.cache_capacity, 100);
        assert_eq!(config.oracle.determinism_runs, 2);
        assert!(config.needs_oracle());
    }

    #[test]
    fn test_safe_only_config() {
        let config = EngineConfig::safe_only();
        assert!(!config.rules.contains(RuleSet::UNSAFE));
        assert!(!config.needs_oracle());
    }

    #[test]
    fn test_thorough_config() {
        let config = EngineConfig::thorough();
        assert_eq!(config.max_iterations, 2000);
        assert!(config.rules.contains(RuleSet::CLEAN));
        assert_eq!(config.oracle.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_builder_pattern() {
        let config = EngineConfig::new()
            .with_max_iterations(3)
            .with_normalize(false)
            .with_target_obfuscator("obfuscator.io");

        assert_eq!(config.max_iterations, 3);
        assert!(!config.rules.contains(RuleSet::NORMALIZE));
        assert_eq!(config.target_obfuscator.as_deref(), Some("obfuscator.io"));
    }

    #[test]
    fn test_verbosity_levels() -> std::result::Result<(), strum::ParseError> {
        assert!(Verbosity::Debug.allows(Verbosity::Log));
        assert!(Verbosity::Log.allows(Verbosity::Error));
        assert!(!Verbosity::Error.allows(Verbosity::Log));
        assert!(!Verbosity::None.allows(Verbosity::Error));
        assert!(!Verbosity::Debug.allows(Verbosity::None));
        assert_eq!(Verbosity::from_str("DEBUG")?, Verbosity::Debug);
        assert_eq!(Verbosity::Error.to_string(), "error");
        Ok(())
    }
}
