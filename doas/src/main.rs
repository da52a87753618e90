//!
//! Entry point for the `doas` batch post-processing driver (C12, spec §6, §7): parses
//! the command line, loads the Setup/Evaluation/Processing configuration documents,
//! merges any CLI override, and runs the pipeline over the configured local
//! directory. Structured the way `nexrad-inspector`'s `main.rs` does: a thin `clap`
//! parse followed by a call into library code, with `env_logger` wired to `RUST_LOG`
//! so the library's `log` calls surface without the binary hard-coding a verbosity.
//!

use clap::Parser;
use doas::cli::Cli;
use doas::config::{apply_cli_overrides, load_evaluation_document, load_processing_document, load_setup_document};
use doas::pipeline::{self, PipelineContext};
use doas::result::Error;
use doas::tally::Tally;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

fn run() -> doas::Result<()> {
    let cli = Cli::parse();

    let setup_path = cli.setup_file.as_deref().unwrap_or("Setup.xml");
    let evaluation_path = cli.evaluation_file.as_deref().unwrap_or("Evaluation.xml");
    let processing_path = cli.processing_file.as_deref().unwrap_or("Processing.xml");

    let setup = load_setup_document(BufReader::new(open(setup_path)?))?;
    let evaluation = load_evaluation_document(BufReader::new(open(evaluation_path)?))?;
    let mut config = load_processing_document(BufReader::new(open(processing_path)?))?;
    apply_cli_overrides(&mut config, &cli)?;

    log::info!(
        "processing '{}' from {} to {} ({} instrument(s) configured)",
        config.volcano,
        config.from_date,
        config.to_date,
        setup.len()
    );

    let local_directory = PathBuf::from(&config.local_directory);
    let ctx = PipelineContext {
        setup,
        evaluation,
        config,
        tally: Arc::new(Tally::new()),
    };

    pipeline::run(&ctx, &local_directory)
}

fn open(path: &str) -> doas::Result<File> {
    File::open(path).map_err(|e| Error::InputUnreachable(format!("cannot open '{path}': {e}")))
}

fn main() -> ExitCode {
    env_logger::init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
