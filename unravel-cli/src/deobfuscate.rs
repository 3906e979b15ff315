use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Serialize;
use unravel::{
    deobfuscation::{DeobfuscationResult, DetectionResult, EngineConfig},
    Deobfuscator,
};

use crate::app::Cli;

#[derive(Debug, Serialize)]
struct DeobfuscationReport {
    file: String,
    output: Option<String>,
    modified: bool,
    detected: bool,
    obfuscator: Option<String>,
    score: usize,
    iterations: usize,
    time_ms: u128,
    stats: StatsReport,
    warnings: Vec<String>,
}

#[derive(Debug, Serialize)]
struct StatsReport {
    constants_folded: usize,
    branches_resolved: usize,
    members_resolved: usize,
    calls_resolved: usize,
    proxies_resolved: usize,
    identifiers_inlined: usize,
    functions_unwrapped: usize,
    nodes_removed: usize,
}

pub fn run(cli: &Cli) -> anyhow::Result<()> {
    let path = cli.input.as_path();
    let mut deob = Deobfuscator::from_path(path, build_config(cli))
        .with_context(|| format!("failed to read script: {}", path.display()))?;
    let modified = deob
        .deobfuscate(cli.clean)
        .with_context(|| format!("deobfuscation failed: {}", path.display()))?;

    if !modified {
        eprintln!("[-] Nothing was deobfuscated ¯\\_(ツ)_/¯");
    }

    let output_path = cli
        .output
        .as_ref()
        .map(|output| resolve_output_path(path, output.as_deref()));
    match &output_path {
        Some(out) => {
            std::fs::write(out, &deob.script)
                .with_context(|| format!("failed to write output: {}", out.display()))?;
            if !cli.quiet {
                eprintln!("[+] Saved {}", out.display());
            }
        }
        None => println!("{}", deob.script),
    }

    if let (Some(report_file), Some(result)) = (&cli.report, deob.result()) {
        let report = build_report(path, output_path.as_deref(), result);
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(report_file, json)
            .with_context(|| format!("failed to write report: {}", report_file.display()))?;
        if !cli.quiet {
            eprintln!("Report written to {}", report_file.display());
        }
    }

    Ok(())
}

fn build_config(cli: &Cli) -> EngineConfig {
    let mut config = EngineConfig::default().with_verbosity(cli.verbosity());
    if let Some(iters) = cli.max_iterations {
        config.max_iterations = iters;
    }
    config
}

fn resolve_output_path(input: &Path, output: Option<&Path>) -> PathBuf {
    if let Some(out) = output {
        return out.to_path_buf();
    }

    let stem = input
        .file_stem()
        .map_or("output", |s| s.to_str().unwrap_or("output"));
    let parent = input.parent().unwrap_or(Path::new("."));
    parent.join(format!("{stem}-deob.js"))
}

/// Extract the primary family name and score from a detection result.
fn extract_detection_summary(result: &DetectionResult) -> (Option<String>, usize) {
    match result.primary() {
        Some(primary) => (
            Some(primary.name()),
            result.score_of(&primary.id()).unwrap_or(0),
        ),
        None => (None, 0),
    }
}

fn file_display_name(path: &Path) -> String {
    path.file_name().map_or_else(
        || path.display().to_string(),
        |f| f.to_string_lossy().to_string(),
    )
}

fn build_report(
    input: &Path,
    output: Option<&Path>,
    result: &DeobfuscationResult,
) -> DeobfuscationReport {
    let (obfuscator_name, score) = extract_detection_summary(&result.detection);

    let derived = result.stats();
    let warnings: Vec<String> = result.events.warnings().map(ToString::to_string).collect();

    DeobfuscationReport {
        file: file_display_name(input),
        output: output.map(file_display_name),
        modified: result.modified,
        detected: result.detection.detected(),
        obfuscator: obfuscator_name,
        score,
        iterations: result.iterations,
        time_ms: result.total_time.as_millis(),
        stats: StatsReport {
            constants_folded: derived.constants_folded,
            branches_resolved: derived.branches_resolved,
            members_resolved: derived.members_resolved,
            calls_resolved: derived.calls_resolved,
            proxies_resolved: derived.proxies_resolved,
            identifiers_inlined: derived.identifiers_inlined,
            functions_unwrapped: derived.functions_unwrapped,
            nodes_removed: derived.nodes_removed,
        },
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_output_path() {
        let out = resolve_output_path(Path::new("samples/packed.js"), None);
        assert_eq!(out, Path::new("samples/packed-deob.js"));

        let out = resolve_output_path(Path::new("packed.js"), Some(Path::new("clean.js")));
        assert_eq!(out, Path::new("clean.js"));
    }
}
