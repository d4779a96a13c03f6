//! `oleander stage`: fetch a program's library into a directory.
//!
//! Resolves the source file (or, with `--all`, takes the whole file
//! listing), fetches the artifacts from the content root and writes them
//! under the output directory with their library-relative paths.

use std::io::Write;
use std::sync::Arc;

use oleander_loader::{CacheStats, Preparation, ProgressFn, Session};

use crate::pipeline::{human_bytes, load_project_config, runtime, write_files};
use crate::{GlobalArgs, StageArgs};

/// Runs the `oleander stage` command.
pub fn run(args: &StageArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let config = load_project_config(global)?;
    let session = Session::from_config(&config)?;
    let progress = (!global.quiet).then(progress_printer);

    let rt = runtime()?;
    let preparation = if args.all {
        rt.block_on(session.prepare_all(progress))?
    } else {
        let file = args
            .file
            .as_ref()
            .ok_or("a source file is required unless --all is given")?;
        let source = std::fs::read_to_string(file)?;
        rt.block_on(session.prepare(&source, progress))?
    };
    if !global.quiet {
        eprintln!();
    }

    let library = &preparation.staged.library;
    std::fs::create_dir_all(&args.out)?;
    let written = write_files(&args.out, library.iter().map(|(p, b)| (p.as_str(), b)))?;

    if !global.quiet {
        eprintln!("{}", summary(&preparation, written, session.cache().stats()));
        eprintln!("     Written to {}", args.out.display());
    }
    Ok(0)
}

/// Progress callback drawing a single updating line on stderr.
fn progress_printer() -> ProgressFn {
    Arc::new(|loaded, total| {
        let mut stderr = std::io::stderr();
        let _ = write!(stderr, "\r    Fetching {loaded}/{total}");
        let _ = stderr.flush();
    })
}

/// One-line summary of a staging run.
fn summary(preparation: &Preparation, written: usize, cache: CacheStats) -> String {
    let staged = &preparation.staged;
    let mut line = format!(
        "      Staged {written} artifacts ({}): {} fetched, {} cached, {} missing",
        human_bytes(staged.library.total_bytes()),
        staged.fetched,
        staged.cached,
        staged.missing.len()
    );
    if !staged.invalid.is_empty() {
        line.push_str(&format!(", {} invalid", staged.invalid.len()));
    }
    if let Some(deps) = &preparation.dependencies {
        line.push_str(&format!(" for {} modules", deps.all_modules.len()));
    }
    line.push_str(&format!(
        "\n       Cache {} artifacts ({})",
        cache.entries,
        human_bytes(cache.bytes)
    ));
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use oleander_common::ArtifactPath;
    use oleander_config::Strategy;
    use oleander_loader::StageReport;

    #[test]
    fn summary_mentions_counts() {
        let preparation = Preparation {
            strategy: Strategy::Bulk,
            dependencies: None,
            staged: StageReport {
                fetched: 3,
                cached: 1,
                missing: vec![ArtifactPath::from("A.olean.server")],
                invalid: vec![ArtifactPath::from("B.olean")],
                ..StageReport::default()
            },
        };
        let cache = CacheStats {
            entries: 5,
            bytes: 3 * 1024,
        };
        let line = summary(&preparation, 4, cache);
        assert!(line.contains("Staged 4 artifacts (0 B)"));
        assert!(line.ends_with("Cache 5 artifacts (3.0 KiB)"));
        assert!(line.contains("3 fetched, 1 cached, 1 missing, 1 invalid"));
        assert!(!line.contains("modules"));
    }
}
