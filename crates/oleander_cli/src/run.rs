//! `oleander run`: stage a program's library and execute it in a sandbox.
//!
//! The sandbox is an external program speaking newline-delimited JSON on
//! stdin and stdout. A fresh process is started for the run.

use std::sync::Arc;

use oleander_loader::Session;
use oleander_sandbox::{ProcessFactory, RunSettings, Runner};

use crate::pipeline::{load_project_config, runtime};
use crate::{GlobalArgs, RunArgs};

/// Runs the `oleander run` command.
///
/// Returns the sandbox's exit code.
pub fn run(args: &RunArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let config = load_project_config(global)?;
    let source = std::fs::read_to_string(&args.file)?;

    let mut settings = RunSettings::from_config(&config.sandbox);
    if let Some(secs) = args.timeout {
        settings.timeout = std::time::Duration::from_secs(secs);
    }
    let session = Arc::new(Session::from_config(&config)?);
    let factory = Arc::new(ProcessFactory::new(&args.sandbox, args.sandbox_args.clone()));
    let runner = Runner::new(session, factory, settings);

    let outcome = runtime()?.block_on(runner.run(&source, None))?;

    print!("{}", outcome.output.stdout_text());
    eprint!("{}", outcome.output.stderr_text());
    if !global.quiet {
        eprintln!(
            "    Finished with exit code {} ({} artifacts staged)",
            outcome.output.exit_code,
            outcome.preparation.staged.library.len()
        );
    }
    Ok(outcome.output.exit_code)
}
