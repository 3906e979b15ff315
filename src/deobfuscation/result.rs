//! Deobfuscation result types.
//!
//! This module contains the [`DeobfuscationResult`] struct which encapsulates
//! the outcome of running the deobfuscation engine on a script.

use std::time::Duration;

use crate::deobfuscation::{
    changes::{DerivedStats, EventLog},
    detection::DetectionResult,
};

/// Result of running deobfuscation.
///
/// Contains the event log capturing all activity during deobfuscation,
/// and the detection result identifying the obfuscation family. Statistics are
/// derived from the event log on demand.
///
/// # Example
///
/// ```rust
/// use unravel::deobfuscation::{DeobfuscationEngine, EngineConfig, Session};
///
/// let engine = DeobfuscationEngine::new(EngineConfig::safe_only());
/// let mut session = Session::new("if (true) a(); else b();")?;
/// let result = engine.process(&mut session)?;
///
/// assert!(result.modified);
/// assert!(!result.detection.detected());
/// println!("{}", result.summary());
/// # Ok::<(), unravel::Error>(())
/// ```
#[derive(Debug)]
pub struct DeobfuscationResult {
    /// Detection result identifying the obfuscation family.
    pub detection: DetectionResult,
    /// All events from the deobfuscation run.
    pub events: EventLog,
    /// Number of main loop iterations.
    pub iterations: usize,
    /// Total processing time.
    pub total_time: Duration,
    /// `true` if the script text changed.
    pub modified: bool,
}

impl DeobfuscationResult {
    /// Creates a new deobfuscation result.
    #[must_use]
    pub fn new(detection: DetectionResult, events: EventLog, modified: bool) -> Self {
        Self {
            detection,
            events,
            iterations: 0,
            total_time: Duration::ZERO,
            modified,
        }
    }

    /// Sets timing and iteration info.
    #[must_use]
    pub fn with_timing(mut self, time: Duration, iterations: usize) -> Self {
        self.total_time = time;
        self.iterations = iterations;
        self
    }

    /// Computes statistics derived from the event log.
    #[must_use]
    pub fn stats(&self) -> DerivedStats {
        DerivedStats::from_log(&self.events)
            .with_time(self.total_time)
            .with_iterations(self.iterations)
    }

    /// Generates a human-readable summary of the deobfuscation results.
    #[must_use]
    pub fn summary(&self) -> String {
        self.stats().summary()
    }

    /// Generates a detailed multi-line summary including detection info.
    #[must_use]
    pub fn detailed_summary(&self) -> String {
        format!(
            "Deobfuscation complete: {}\nDetection: {}",
            self.stats().summary(),
            self.detection.summary()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deobfuscation::changes::EventKind;

    #[test]
    fn test_summaries() {
        let events = EventLog::new();
        events.record(EventKind::CallResolved).message("");
        let result = DeobfuscationResult::new(DetectionResult::empty(50), events, true)
            .with_timing(Duration::from_millis(3), 2);

        assert_eq!(result.stats().calls_resolved, 1);
        assert_eq!(result.stats().iterations, 2);
        assert_eq!(result.summary(), "1 calls resolved in 3ms (2 iterations)");
        assert!(result
            .detailed_summary()
            .ends_with("Detection: No obfuscator detected"));
    }
}
