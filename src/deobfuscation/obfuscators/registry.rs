//! The set of known obfuscation families.
//!
//! Families are keyed by id in a sorted map, so listing, scoring and tie-breaking are
//! independent of registration order.

use std::{collections::BTreeMap, sync::Arc};

use crate::{
    ast::Ast,
    deobfuscation::{
        detection::DetectionScore,
        obfuscators::{
            ArrayReplacements, AugmentedArrayReplacements, FunctionToArrayReplacements,
            Obfuscator, ObfuscatorIo,
        },
    },
};

/// Registered families and the score a family needs to be reported.
///
/// # Example
///
/// ```rust
/// use unravel::{ast::Ast, deobfuscation::ObfuscatorRegistry};
///
/// let registry = ObfuscatorRegistry::new();
/// let ast = Ast::parse("var a = 1;")?;
/// assert!(registry.detect_best(&ast).is_none());
/// # Ok::<(), unravel::Error>(())
/// ```
pub struct ObfuscatorRegistry {
    families: BTreeMap<String, Arc<dyn Obfuscator>>,
    threshold: usize,
}

impl Default for ObfuscatorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ObfuscatorRegistry {
    /// The built-in families with threshold 50.
    #[must_use]
    pub fn new() -> Self {
        let builtin: [Arc<dyn Obfuscator>; 4] = [
            Arc::new(ArrayReplacements),
            Arc::new(AugmentedArrayReplacements),
            Arc::new(FunctionToArrayReplacements),
            Arc::new(ObfuscatorIo),
        ];
        let mut registry = Self::empty();
        builtin.into_iter().for_each(|family| registry.register(family));
        registry
    }

    /// No families, threshold 50.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            families: BTreeMap::new(),
            threshold: 50,
        }
    }

    /// Sets the minimum reported score.
    pub fn set_threshold(&mut self, threshold: usize) {
        self.threshold = threshold;
    }

    /// Minimum reported score.
    #[must_use]
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Adds `family`, replacing a family with the same id.
    pub fn register(&mut self, family: Arc<dyn Obfuscator>) {
        if let Some(previous) = self.families.insert(family.id(), family) {
            log::debug!("replaced family {}", previous.id());
        }
    }

    /// Removes and returns the family `id`.
    pub fn unregister(&mut self, id: &str) -> Option<Arc<dyn Obfuscator>> {
        self.families.remove(id)
    }

    /// The family `id`.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Arc<dyn Obfuscator>> {
        self.families.get(id)
    }

    /// Returns `true` if `id` is registered.
    #[must_use]
    pub fn has(&self, id: &str) -> bool {
        self.families.contains_key(id)
    }

    /// Registered ids in ascending order.
    #[must_use]
    pub fn obfuscator_ids(&self) -> Vec<&str> {
        self.families.keys().map(String::as_str).collect()
    }

    /// Number of families.
    #[must_use]
    pub fn len(&self) -> usize {
        self.families.len()
    }

    /// Returns `true` if no family is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.families.is_empty()
    }

    /// Families in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Obfuscator>> {
        self.families.values()
    }

    /// Scores every family and keeps those at or above the threshold.
    ///
    /// # Returns
    ///
    /// (id, score) pairs, highest score first. Equal scores keep id order.
    pub fn detect(&self, ast: &Ast) -> Vec<(String, DetectionScore)> {
        let mut ranked: Vec<(String, DetectionScore)> = self
            .families
            .iter()
            .map(|(id, family)| (id.clone(), family.detect(ast)))
            .filter(|(_, score)| score.score() >= self.threshold)
            .collect();
        // Stable sort: ties stay in ascending id order.
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked
    }

    /// The highest scoring family at or above the threshold.
    pub fn detect_best(&self, ast: &Ast) -> Option<Arc<dyn Obfuscator>> {
        let (id, _) = self.detect(ast).into_iter().next()?;
        self.families.get(&id).cloned()
    }

    /// Descriptions of every family, in id order.
    #[must_use]
    pub fn obfuscator_info(&self) -> Vec<ObfuscatorInfo> {
        self.iter().map(|family| ObfuscatorInfo::of(family.as_ref())).collect()
    }
}

/// Description of a registered family.
#[derive(Debug, Clone)]
pub struct ObfuscatorInfo {
    /// Family id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// What the family looks like.
    pub description: String,
    /// Rules run once before the main loop.
    pub preprocessors: Vec<&'static str>,
    /// Rules run once after the main loop.
    pub postprocessors: Vec<&'static str>,
}

impl ObfuscatorInfo {
    fn of(family: &dyn Obfuscator) -> Self {
        Self {
            id: family.id(),
            name: family.name(),
            description: family.description().to_string(),
            preprocessors: family.preprocessors().iter().map(|r| r.name()).collect(),
            postprocessors: family.postprocessors().iter().map(|r| r.name()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Family with a fixed score.
    struct Fixed(&'static str, usize);

    impl Obfuscator for Fixed {
        fn id(&self) -> String {
            self.0.to_string()
        }

        fn name(&self) -> String {
            self.0.to_uppercase()
        }

        fn detect(&self, _ast: &Ast) -> DetectionScore {
            DetectionScore::with_score(self.1)
        }
    }

    #[test]
    fn test_register_replace_unregister() {
        let mut registry = ObfuscatorRegistry::empty();
        assert!(registry.is_empty());

        registry.register(Arc::new(Fixed("packer", 60)));
        registry.register(Arc::new(Fixed("packer", 10)));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("packer").map(|f| f.name()).as_deref(), Some("PACKER"));

        assert!(registry.unregister("packer").is_some());
        assert!(!registry.has("packer"));
        assert!(registry.unregister("packer").is_none());
    }

    #[test]
    fn test_detect_orders_by_score() -> crate::Result<()> {
        let mut registry = ObfuscatorRegistry::empty();
        registry.register(Arc::new(Fixed("low", 10)));
        registry.register(Arc::new(Fixed("b", 70)));
        registry.register(Arc::new(Fixed("a", 70)));
        registry.register(Arc::new(Fixed("high", 90)));

        let ast = Ast::parse("x;")?;
        let ids: Vec<String> = registry.detect(&ast).into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, ["high", "a", "b"]);
        assert_eq!(registry.detect_best(&ast).map(|o| o.id()).as_deref(), Some("high"));

        registry.set_threshold(95);
        assert!(registry.detect_best(&ast).is_none());
        Ok(())
    }

    #[test]
    fn test_builtin_families() {
        let registry = ObfuscatorRegistry::new();
        assert_eq!(
            registry.obfuscator_ids(),
            [
                "array_replacements",
                "augmented_array_replacements",
                "function_to_array_replacements",
                "obfuscator.io"
            ]
        );
        let info = registry.obfuscator_info();
        let io = info.iter().find(|i| i.id == "obfuscator.io");
        assert_eq!(
            io.map(|i| i.preprocessors.clone()),
            Some(vec!["freezeUnbeautifiedValues", "augmentedArrayProcessor"])
        );
    }
}
