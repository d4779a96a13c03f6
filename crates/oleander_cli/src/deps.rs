//! `oleander deps`: print a program's resolved dependencies.
//!
//! Loads the manifest from the configured content root, analyzes the source
//! file and prints the dependency set as text or JSON.

use oleander_loader::Session;
use oleander_resolve::DependencySet;

use crate::pipeline::{load_project_config, runtime};
use crate::{DepsArgs, GlobalArgs, ReportFormat};

/// Runs the `oleander deps` command.
pub fn run(args: &DepsArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let config = load_project_config(global)?;
    let source = std::fs::read_to_string(&args.file)?;

    let session = Session::from_config(&config)?;
    let deps = runtime()?.block_on(session.analyze(&source))?;

    match args.format {
        ReportFormat::Text => print!("{}", render_text(&deps)),
        ReportFormat::Json => println!("{}", serde_json::to_string_pretty(&deps)?),
    }
    Ok(0)
}

/// Renders a dependency set for the terminal.
fn render_text(deps: &DependencySet) -> String {
    let mut out = String::new();
    let join = |names: &[oleander_common::ModuleName]| {
        names
            .iter()
            .map(|n| n.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    };
    out.push_str(&format!("explicit imports: {}\n", join(&deps.explicit_imports)));
    out.push_str(&format!("implicit imports: {}\n", join(&deps.implicit_imports)));
    out.push_str(&format!("modules ({}):\n", deps.all_modules.len()));
    for module in &deps.all_modules {
        out.push_str(&format!("  {module}\n"));
    }
    out.push_str(&format!("artifact paths: {}\n", deps.olean_paths.len()));
    out
}
