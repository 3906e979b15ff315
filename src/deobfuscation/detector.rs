//! Family detection front-end over an [`ObfuscatorRegistry`].

use std::sync::Arc;

use crate::{
    ast::Ast,
    deobfuscation::{
        detection::{DetectionResult, DetectionScore},
        obfuscators::{Obfuscator, ObfuscatorRegistry},
    },
};

/// Scores a script against every registered family and picks the most likely one.
///
/// # Example
///
/// ```rust
/// use unravel::{ast::Ast, deobfuscation::ObfuscatorDetector};
///
/// let ast = Ast::parse("console.log('plain');")?;
/// let result = ObfuscatorDetector::new().detect(&ast);
/// assert!(result.primary().is_none());
/// # Ok::<(), unravel::Error>(())
/// ```
pub struct ObfuscatorDetector {
    registry: ObfuscatorRegistry,
}

impl Default for ObfuscatorDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl ObfuscatorDetector {
    /// A detector over the built-in families.
    #[must_use]
    pub fn new() -> Self {
        Self::from_registry(ObfuscatorRegistry::new())
    }

    /// A detector over `registry`.
    #[must_use]
    pub fn from_registry(registry: ObfuscatorRegistry) -> Self {
        Self { registry }
    }

    /// Registered families.
    #[must_use]
    pub fn registry(&self) -> &ObfuscatorRegistry {
        &self.registry
    }

    /// Adds a family, replacing any family with the same id.
    pub fn register(&mut self, obfuscator: Arc<dyn Obfuscator>) {
        self.registry.register(obfuscator);
    }

    /// Sets the minimum score for a family to be reported.
    pub fn set_threshold(&mut self, threshold: usize) {
        self.registry.set_threshold(threshold);
    }

    /// Minimum score for a family to be reported.
    #[must_use]
    pub fn threshold(&self) -> usize {
        self.registry.threshold()
    }

    /// Runs every family over `ast`.
    ///
    /// The result lists the families at or above the threshold, best first; the first
    /// of them is the primary family.
    pub fn detect(&self, ast: &Ast) -> DetectionResult {
        let ranked = self.registry.detect(ast);
        let primary = ranked
            .first()
            .and_then(|(id, _)| self.registry.get(id).cloned());
        if let Some(family) = &primary {
            log::debug!("primary family {} of {} candidates", family.id(), ranked.len());
        }
        DetectionResult::new(primary, ranked, self.registry.threshold())
    }

    /// Raw scores of every family, including those under the threshold, in id order.
    pub fn all_scores(&self, ast: &Ast) -> Vec<(String, DetectionScore)> {
        self.registry
            .obfuscator_ids()
            .into_iter()
            .filter_map(|id| self.registry.get(id))
            .map(|family| (family.id(), family.detect(ast)))
            .collect()
    }
}

/// Builds an [`ObfuscatorDetector`] over an explicit set of families.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use unravel::deobfuscation::{ArrayReplacements, DetectorBuilder};
///
/// let detector = DetectorBuilder::new()
///     .with_obfuscator(Arc::new(ArrayReplacements))
///     .threshold(70)
///     .build();
/// assert_eq!(detector.threshold(), 70);
/// assert_eq!(detector.registry().len(), 1);
/// ```
pub struct DetectorBuilder {
    families: Vec<Arc<dyn Obfuscator>>,
    threshold: usize,
}

impl Default for DetectorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorBuilder {
    /// No families, threshold 50.
    #[must_use]
    pub fn new() -> Self {
        Self {
            families: Vec::new(),
            threshold: 50,
        }
    }

    /// Adds a family.
    #[must_use]
    pub fn with_obfuscator(mut self, obfuscator: Arc<dyn Obfuscator>) -> Self {
        self.families.push(obfuscator);
        self
    }

    /// Sets the threshold.
    #[must_use]
    pub fn threshold(mut self, threshold: usize) -> Self {
        self.threshold = threshold;
        self
    }

    /// Finishes the detector.
    #[must_use]
    pub fn build(self) -> ObfuscatorDetector {
        let mut registry = ObfuscatorRegistry::empty();
        registry.set_threshold(self.threshold);
        self.families
            .into_iter()
            .for_each(|family| registry.register(family));
        ObfuscatorDetector::from_registry(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_families() {
        let detector = ObfuscatorDetector::new();
        assert!(detector.registry().has("obfuscator.io"));
        assert!(detector.registry().has("array_replacements"));
    }

    #[test]
    fn test_plain_script_not_detected() -> crate::Result<()> {
        let ast = Ast::parse("function add(a, b) { return a + b; } add(1, 2);")?;
        let mut detector = ObfuscatorDetector::new();
        detector.set_threshold(75);
        assert_eq!(detector.threshold(), 75);
        assert!(!detector.detect(&ast).detected());
        assert_eq!(detector.all_scores(&ast).len(), detector.registry().len());
        Ok(())
    }

    #[test]
    fn test_builder_starts_empty() {
        let detector = DetectorBuilder::new().build();
        assert!(detector.registry().is_empty());
        assert_eq!(detector.threshold(), 50);
    }
}
