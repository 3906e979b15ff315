//! Obfuscation family support.
//!
//! Generic rules undo most obfuscation on their own, but some tools emit structures the
//! generic rules cannot see through until they are unwound once: a string array rotated
//! at startup, guards that break the script when it is reformatted. Each supported tool
//! is an [`Obfuscator`] that recognizes its output and supplies rules that run exactly
//! once before or after the main loop.
//!
//! # Architecture
//!
//! - [`Obfuscator`] - Trait for implementing family-specific detection and processing
//! - [`ObfuscatorRegistry`] - Manages registered families and runs detection
//! - [`ObfuscatorInfo`] - Metadata about a registered family
//!
//! # Built-in Families
//!
//! - [`ArrayReplacements`] - a global string array read through numeric indices
//! - [`AugmentedArrayReplacements`] - a string array rotated by an IIFE before use
//! - [`FunctionToArrayReplacements`] - a string array returned by a function call
//! - [`ObfuscatorIo`] - obfuscator.io output with self-defending guards
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use unravel::deobfuscation::{ArrayReplacements, ObfuscatorRegistry};
//!
//! let mut registry = ObfuscatorRegistry::empty();
//! registry.register(Arc::new(ArrayReplacements));
//! assert!(registry.has("array_replacements"));
//! ```

mod arrays;
mod obfuscatorio;
mod processors;
mod registry;

pub use arrays::{ArrayReplacements, AugmentedArrayReplacements, FunctionToArrayReplacements};
pub use obfuscatorio::ObfuscatorIo;
pub use processors::{AugmentedArrayProcessor, FreezeUnbeautifiedValues};
pub use registry::{ObfuscatorInfo, ObfuscatorRegistry};

use crate::{
    ast::Ast,
    deobfuscation::{detection::DetectionScore, rule::Rule},
};

/// Handling of one obfuscation family.
///
/// Each family provides:
/// - Detection logic (scoring-based identification)
/// - Rules that run once before the main loop
/// - Rules that run once after the main loop
///
/// Families are registered with the [`ObfuscatorRegistry`] and selected by detection
/// score.
///
/// # Example
///
/// ```rust
/// use unravel::{
///     ast::{Ast, NodeType},
///     deobfuscation::{DetectionEvidence, DetectionScore, Obfuscator},
/// };
///
/// struct Packer;
///
/// impl Obfuscator for Packer {
///     fn id(&self) -> String {
///         "packer".to_string()
///     }
///
///     fn name(&self) -> String {
///         "Dean Edwards packer".to_string()
///     }
///
///     fn detect(&self, ast: &Ast) -> DetectionScore {
///         let score = DetectionScore::new();
///         if ast.source().starts_with("eval(function(p,a,c,k,e,") {
///             score.add(DetectionEvidence::StructuralPattern {
///                 description: "packer header".to_string(),
///                 confidence: 90,
///             });
///         }
///         score
///     }
/// }
///
/// let ast = Ast::parse("eval(function(p,a,c,k,e,d){ return p; }('x', 0, 0, [], 0, {}));")?;
/// assert_eq!(Packer.detect(&ast).score(), 90);
/// # Ok::<(), unravel::Error>(())
/// ```
pub trait Obfuscator: Send + Sync {
    /// Unique identifier for this family (e.g., "obfuscator.io").
    ///
    /// This ID is used for registration and lookup.
    fn id(&self) -> String;

    /// Human-readable name, used for display in logs and reports.
    fn name(&self) -> String;

    /// Scans a script and returns the detection score.
    ///
    /// Higher scores indicate higher confidence that this family produced the script.
    /// The family with the highest score at or above the threshold is selected.
    fn detect(&self, ast: &Ast) -> DetectionScore;

    /// Rules applied once, in order, before the main loop.
    fn preprocessors(&self) -> Vec<Box<dyn Rule>> {
        Vec::new()
    }

    /// Rules applied once, in order, after the main loop.
    fn postprocessors(&self) -> Vec<Box<dyn Rule>> {
        Vec::new()
    }

    /// Description of what this family handles.
    fn description(&self) -> &'static str {
        "No description available"
    }
}
