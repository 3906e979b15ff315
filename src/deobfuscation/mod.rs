//! Deobfuscation framework for JavaScript.
//!
//! This module drives the rewriting of an obfuscated script into a readable one. A
//! script is parsed into a [`Session`], a library of [`Rule`]s proposes rewrites
//! through the session's ledger, and a fixed-point scheduler commits them until no rule
//! finds anything left to do.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────┐
//! │                      Deobfuscation Pipeline                        │
//! ├────────────────────────────────────────────────────────────────────┤
//! │  Input: script text                                                │
//! │           │                                                        │
//! │           ▼                                                        │
//! │  ┌──────────────────────────────────────────────────────────────┐  │
//! │  │ Family detection (scored, threshold 50)                      │  │
//! │  └──────────────────────────┬───────────────────────────────────┘  │
//! │                             ▼                                      │
//! │  ┌──────────────────────────────────────────────────────────────┐  │
//! │  │ Preprocessors (family specific, once each)                   │  │
//! │  └──────────────────────────┬───────────────────────────────────┘  │
//! │                             ▼                                      │
//! │  ┌──────────────────────────────────────────────────────────────┐  │
//! │  │ Main loop                                                    │  │
//! │  │   safe rules, commit after each                              │  │
//! │  │   unsafe rules (sandbox), commit after each                  │  │
//! │  │ until an iteration changes nothing or the cap is hit         │  │
//! │  └──────────────────────────┬───────────────────────────────────┘  │
//! │                             ▼                                      │
//! │  ┌──────────────────────────────────────────────────────────────┐  │
//! │  │ Postprocessors, clean (opt-in), normalize (if changed)       │  │
//! │  └──────────────────────────┬───────────────────────────────────┘  │
//! │                             ▼                                      │
//! │  Output: script text + DeobfuscationResult                         │
//! └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Components
//!
//! ## Engine
//!
//! [`DeobfuscationEngine`] orchestrates detection, the processors, the main loop and
//! the final phases. It is configured by an [`EngineConfig`].
//!
//! ## Rules
//!
//! - [`Rule`] - one rewrite pattern, staging marks in a [`Session`]
//! - [`RuleScheduler`] - the fixed-point main loop
//! - [`rules`] - the rule library, grouped into safe, unsafe, clean and normalize sets
//!
//! ## Obfuscation Families
//!
//! - [`Obfuscator`] - detection and processors of one family
//! - [`ObfuscatorRegistry`] / [`ObfuscatorDetector`] - registration and scoring
//! - [`DetectionScore`] / [`DetectionResult`] - confidence based detection
//!
//! ## Reporting
//!
//! - [`EventLog`] - structured record of every change and failure
//! - [`DeobfuscationResult`] - detection, events and timing of one run
//!
//! # Usage
//!
//! ```rust
//! use unravel::deobfuscation::{DeobfuscationEngine, EngineConfig};
//!
//! let engine = DeobfuscationEngine::new(EngineConfig::safe_only());
//! let (script, result) = engine.process_source("if (true) f(); else g();")?;
//!
//! assert!(result.modified);
//! println!("{script}\n{}", result.summary());
//! # Ok::<(), unravel::Error>(())
//! ```
//!
//! ## Adding Custom Families
//!
//! ```rust
//! use std::sync::Arc;
//! use unravel::{
//!     ast::Ast,
//!     deobfuscation::{DeobfuscationEngine, DetectionScore, Obfuscator},
//! };
//!
//! struct Marker;
//!
//! impl Obfuscator for Marker {
//!     fn id(&self) -> String {
//!         "marker".to_string()
//!     }
//!
//!     fn name(&self) -> String {
//!         "Marker".to_string()
//!     }
//!
//!     fn detect(&self, _ast: &Ast) -> DetectionScore {
//!         DetectionScore::new()
//!     }
//! }
//!
//! let mut engine = DeobfuscationEngine::default();
//! engine.register_obfuscator(Arc::new(Marker));
//! assert!(engine.detector().registry().has("marker"));
//! ```

// Infrastructure
mod changes;
mod config;
mod detection;
mod result;
mod rule;
mod scheduler;
mod session;

// Engine and detector
mod detector;
mod engine;

// Rule library
pub mod rules;

// Obfuscation family support
mod obfuscators;

pub use changes::{DerivedStats, Event, EventBuilder, EventKind, EventLog};
pub use config::{EngineConfig, OracleConfig, RuleSet, Verbosity};
pub use detection::{DetectionEvidence, DetectionResult, DetectionScore};
pub use detector::{DetectorBuilder, ObfuscatorDetector};
pub use engine::DeobfuscationEngine;
pub use obfuscators::{
    ArrayReplacements, AugmentedArrayProcessor, AugmentedArrayReplacements,
    FreezeUnbeautifiedValues, FunctionToArrayReplacements, Obfuscator, ObfuscatorInfo,
    ObfuscatorIo, ObfuscatorRegistry,
};
pub use result::DeobfuscationResult;
pub use rule::{CandidateFilter, Outcome, Rule, RuleCategory};
pub use scheduler::{apply_rule, run_pass, run_to_fixed_point, LoopSummary, RuleScheduler};
pub use session::Session;
