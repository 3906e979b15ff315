//! # unravel Prelude
//!
//! The most commonly used types of the library in one glob import.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all unravel operations
pub use crate::Error;

/// The result type used throughout unravel
pub use crate::Result;

/// Embedder facade
pub use crate::Deobfuscator;

// ================================================================================================
// Syntax Tree
// ================================================================================================

/// Arena AST and node model
pub use crate::ast::{Ast, LitValue, NodeId, NodeKind, NodeType};

/// Mutation ledger
pub use crate::arborist::{Arborist, Mark, MarkAction};

// ================================================================================================
// Evaluation
// ================================================================================================

/// Sandbox interface, default engine and evaluation front-end
pub use crate::oracle::{EvalOracle, EvalValue, Evaluator, OracleError, QuickJsOracle};

/// Context collection
pub use crate::context::{ContextCollector, ContextSet};

// ================================================================================================
// Deobfuscation Pipeline
// ================================================================================================

/// Engine configuration and results
pub use crate::deobfuscation::{DeobfuscationResult, EngineConfig, OracleConfig, Verbosity};

/// Rules and the fixed-point driver
pub use crate::deobfuscation::{Rule, RuleScheduler, Session};

/// Obfuscator detection
pub use crate::deobfuscation::{DetectionResult, Obfuscator, ObfuscatorDetector};
