//! `oleander paths`: print the candidate artifact paths of modules.
//!
//! Works offline: only the configured layout is consulted.

use oleander_common::ModuleName;
use oleander_resolve::expand_to_artifact_paths;

use crate::pipeline::load_project_config;
use crate::{GlobalArgs, PathsArgs};

/// Runs the `oleander paths` command.
pub fn run(args: &PathsArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let config = load_project_config(global)?;
    let layout = config.layout.to_layout()?;

    let modules: Vec<ModuleName> = args.modules.iter().map(|m| ModuleName::new(m.as_str())).collect();
    for path in expand_to_artifact_paths(&modules, &layout) {
        println!("{path}");
    }
    Ok(0)
}
