mod app;
mod deobfuscate;

use std::process::ExitCode;

use clap::Parser;

use crate::app::Cli;

fn main() -> ExitCode {
    ctrlc::set_handler(|| {
        eprintln!("\nCancelled.");
        std::process::exit(130);
    })
    .expect("failed to set Ctrl+C handler");

    let cli = Cli::parse();

    // unravel logs go to stderr; --quiet keeps warnings only, --verbose enables debug; RUST_LOG overrides
    env_logger::Builder::new()
        .filter_module("unravel", cli.log_level())
        .parse_default_env()
        .target(env_logger::Target::Stderr)
        .format_timestamp(None)
        .format_module_path(false)
        .format_target(false)
        .init();

    match deobfuscate::run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("[x] Critical error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
