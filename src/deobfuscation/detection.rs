//! Scored detection of obfuscation families.
//!
//! Every family inspects the parsed script and returns a [`DetectionScore`]: a running
//! total plus the [`DetectionEvidence`] that produced it. The registry ranks the scores
//! and the best one at or above the threshold becomes the primary family of the
//! [`DetectionResult`].
//!
//! Scores are additive. Around 50 means several independent indicators agree, 100 means
//! the characteristic structure of a family was found outright.

use std::{
    cmp::Ordering,
    fmt,
    sync::{
        atomic::{AtomicUsize, Ordering as AtomicOrdering},
        Arc,
    },
};

use crate::deobfuscation::obfuscators::Obfuscator;

/// Upper bound on what a single repeated pattern can contribute.
const PATTERN_CAP: usize = 50;

/// One observation made while scoring a family.
#[derive(Debug, Clone)]
pub enum DetectionEvidence {
    /// An identifier naming scheme of the family, e.g. `_0x4a2f`.
    Identifier {
        /// Identifier or prefix.
        name: String,
        /// Points added.
        confidence: usize,
    },

    /// A recurring code shape, counted per occurrence.
    CodePattern {
        /// What was matched, e.g. "array rotation IIFE".
        pattern: String,
        /// Occurrences found.
        match_count: usize,
        /// Points per occurrence.
        confidence_per_match: usize,
    },

    /// A string literal the family's runtime is known to contain.
    StringLiteral {
        /// The literal.
        value: String,
        /// Points added.
        confidence: usize,
    },

    /// A structural arrangement of declarations.
    StructuralPattern {
        /// What was found.
        description: String,
        /// Points added.
        confidence: usize,
    },

    /// An observation that argues against the family.
    Contradiction {
        /// What was found.
        description: String,
        /// Points removed.
        confidence_reduction: usize,
    },
}

impl DetectionEvidence {
    /// Points this evidence adds. Contradictions add nothing and are subtracted by
    /// [`DetectionScore::add`]; repeated patterns are capped.
    #[must_use]
    pub fn confidence(&self) -> usize {
        match self {
            Self::CodePattern {
                match_count,
                confidence_per_match,
                ..
            } => match_count.saturating_mul(*confidence_per_match).min(PATTERN_CAP),
            Self::Identifier { confidence, .. }
            | Self::StringLiteral { confidence, .. }
            | Self::StructuralPattern { confidence, .. } => *confidence,
            Self::Contradiction { .. } => 0,
        }
    }
}

impl fmt::Display for DetectionEvidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identifier { name, .. } => write!(f, "ident:{name}"),
            Self::CodePattern {
                pattern,
                match_count,
                ..
            } => write!(f, "code:{pattern}x{match_count}"),
            Self::StringLiteral { value, .. } => write!(f, "string:{value}"),
            Self::StructuralPattern { description, .. } => write!(f, "structure:{description}"),
            Self::Contradiction { description, .. } => write!(f, "contra:{description}"),
        }
    }
}

/// Accumulated confidence that a script belongs to one family.
///
/// Evidence is appended through a shared reference so a family's detector can build
/// the score incrementally while walking the tree.
pub struct DetectionScore {
    total: AtomicUsize,
    evidence: boxcar::Vec<DetectionEvidence>,
}

impl DetectionScore {
    /// A score of zero with no evidence.
    #[must_use]
    pub fn new() -> Self {
        Self::with_score(0)
    }

    /// A fixed score with no evidence, as assigned to a forced family.
    #[must_use]
    pub fn with_score(score: usize) -> Self {
        Self {
            total: AtomicUsize::new(score),
            evidence: boxcar::Vec::new(),
        }
    }

    /// Current total.
    #[must_use]
    pub fn score(&self) -> usize {
        self.total.load(AtomicOrdering::Relaxed)
    }

    /// Records `evidence` and applies its points. A contradiction lowers the total,
    /// never below zero.
    pub fn add(&self, evidence: DetectionEvidence) {
        match &evidence {
            DetectionEvidence::Contradiction {
                confidence_reduction,
                ..
            } => {
                let reduction = *confidence_reduction;
                let _ = self
                    .total
                    .fetch_update(AtomicOrdering::Relaxed, AtomicOrdering::Relaxed, |s| {
                        Some(s.saturating_sub(reduction))
                    });
            }
            other => {
                self.total
                    .fetch_add(other.confidence(), AtomicOrdering::Relaxed);
            }
        }
        self.evidence.push(evidence);
    }

    /// Recorded evidence, in the order it was added.
    pub fn evidence(&self) -> impl Iterator<Item = &DetectionEvidence> {
        self.evidence.iter().map(|(_, e)| e)
    }

    /// Comma separated evidence, or "no evidence".
    #[must_use]
    pub fn evidence_summary(&self) -> String {
        let parts: Vec<String> = self.evidence().map(ToString::to_string).collect();
        if parts.is_empty() {
            "no evidence".to_string()
        } else {
            parts.join(", ")
        }
    }
}

impl Default for DetectionScore {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for DetectionScore {
    fn clone(&self) -> Self {
        let copy = Self::with_score(self.score());
        for evidence in self.evidence() {
            copy.evidence.push(evidence.clone());
        }
        copy
    }
}

impl fmt::Debug for DetectionScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DetectionScore")
            .field("score", &self.score())
            .field("evidence", &self.evidence.count())
            .finish()
    }
}

impl fmt::Display for DetectionScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "score={} ({})", self.score(), self.evidence_summary())
    }
}

impl PartialEq for DetectionScore {
    fn eq(&self, other: &Self) -> bool {
        self.score() == other.score()
    }
}

impl Eq for DetectionScore {}

impl PartialOrd for DetectionScore {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DetectionScore {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score().cmp(&other.score())
    }
}

/// Outcome of running every registered family against one script.
#[derive(Clone, Default)]
pub struct DetectionResult {
    primary: Option<Arc<dyn Obfuscator>>,
    /// Families at or above the threshold, best first.
    ranked: Vec<(String, DetectionScore)>,
    threshold: usize,
}

impl DetectionResult {
    /// Nothing detected.
    #[must_use]
    pub fn empty(threshold: usize) -> Self {
        Self {
            threshold,
            ..Self::default()
        }
    }

    /// Builds a result from an already ranked candidate list.
    #[must_use]
    pub fn new(
        primary: Option<Arc<dyn Obfuscator>>,
        ranked: Vec<(String, DetectionScore)>,
        threshold: usize,
    ) -> Self {
        Self {
            primary,
            ranked,
            threshold,
        }
    }

    /// Returns `true` if a primary family was chosen.
    #[must_use]
    pub fn detected(&self) -> bool {
        self.primary.is_some()
    }

    /// The family whose processors run for this script.
    #[must_use]
    pub fn primary(&self) -> Option<&Arc<dyn Obfuscator>> {
        self.primary.as_ref()
    }

    /// Threshold the candidates were filtered with.
    #[must_use]
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Candidates as (family id, score), best first.
    #[must_use]
    pub fn all(&self) -> &[(String, DetectionScore)] {
        &self.ranked
    }

    /// Returns `true` if `id` is among the candidates.
    #[must_use]
    pub fn has(&self, id: &str) -> bool {
        self.score_of(id).is_some()
    }

    /// Score of the candidate `id`.
    #[must_use]
    pub fn score_of(&self, id: &str) -> Option<usize> {
        self.ranked
            .iter()
            .find(|(candidate, _)| candidate == id)
            .map(|(_, score)| score.score())
    }

    /// One line description of the outcome.
    #[must_use]
    pub fn summary(&self) -> String {
        match &self.primary {
            Some(family) => format!(
                "Detected: {} (score={}), {} total candidates",
                family.name(),
                self.score_of(&family.id()).unwrap_or(0),
                self.ranked.len()
            ),
            None => "No obfuscator detected".to_string(),
        }
    }
}

impl fmt::Display for DetectionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

impl fmt::Debug for DetectionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DetectionResult")
            .field("primary", &self.primary.as_ref().map(|o| o.id()))
            .field("ranked", &self.ranked)
            .field("threshold", &self.threshold)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_points_accumulate() {
        let score = DetectionScore::new();
        score.add(DetectionEvidence::Identifier {
            name: "_0x".to_string(),
            confidence: 30,
        });
        score.add(DetectionEvidence::CodePattern {
            pattern: "rotation".to_string(),
            match_count: 3,
            confidence_per_match: 10,
        });
        assert_eq!(score.score(), 60);
        assert_eq!(score.evidence().count(), 2);
    }

    #[test]
    fn test_repeated_pattern_is_capped() {
        let score = DetectionScore::new();
        score.add(DetectionEvidence::CodePattern {
            pattern: "indexed array".to_string(),
            match_count: 100,
            confidence_per_match: 10,
        });
        assert_eq!(score.score(), 50);
    }

    #[test]
    fn test_contradiction_saturates() {
        let score = DetectionScore::with_score(40);
        score.add(DetectionEvidence::Contradiction {
            description: "array is reassigned".to_string(),
            confidence_reduction: 60,
        });
        assert_eq!(score.score(), 0);
        assert_eq!(score.evidence_summary(), "contra:array is reassigned");
        assert_eq!(DetectionScore::new().evidence_summary(), "no evidence");
    }

    #[test]
    fn test_ordering_and_clone() {
        let low = DetectionScore::with_score(50);
        let high = DetectionScore::with_score(75);
        assert!(high > low);

        low.add(DetectionEvidence::StringLiteral {
            value: "removeCookie".to_string(),
            confidence: 5,
        });
        let copy = low.clone();
        assert_eq!(copy.score(), 55);
        assert_eq!(copy.evidence_summary(), "string:removeCookie");
    }

    #[test]
    fn test_result_lookup() {
        let result = DetectionResult::new(
            None,
            vec![
                ("obfuscator.io".to_string(), DetectionScore::with_score(80)),
                ("array_replacements".to_string(), DetectionScore::with_score(30)),
            ],
            50,
        );
        assert!(!result.detected());
        assert_eq!(result.score_of("obfuscator.io"), Some(80));
        assert!(result.has("array_replacements"));
        assert!(!result.has("unknown"));
        assert_eq!(result.to_string(), "No obfuscator detected");
        assert_eq!(DetectionResult::empty(70).threshold(), 70);
    }
}
