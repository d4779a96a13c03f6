//! Shared pipeline helpers for CLI commands.
//!
//! Project root discovery, config loading, logging setup, the async runtime
//! and writing staged artifacts to disk.

use std::path::{Component, Path, PathBuf};

use oleander_config::{load_config, load_config_from_str, ProjectConfig, CONFIG_FILE};
use tracing_subscriber::EnvFilter;

use crate::GlobalArgs;

/// Environment variable holding a `tracing` filter directive.
pub const LOG_ENV: &str = "OLEANDER_LOG";

/// Installs the stderr log subscriber.
///
/// `OLEANDER_LOG` wins when set; otherwise `--quiet` maps to `error`,
/// `--verbose` to `debug` and the default is `warn`.
pub fn init_logging(global: &GlobalArgs) {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| {
        EnvFilter::new(if global.quiet {
            "error"
        } else if global.verbose {
            "debug"
        } else {
            "warn"
        })
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Builds the tokio runtime the async commands run on.
pub fn runtime() -> Result<tokio::runtime::Runtime, Box<dyn std::error::Error>> {
    Ok(tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?)
}

/// Walks up from `start` looking for the nearest directory containing `oleander.toml`.
///
/// Returns the directory containing `oleander.toml`, or an error if none is found.
pub fn find_project_root(start: &Path) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let mut current = start.to_path_buf();
    loop {
        if current.join(CONFIG_FILE).exists() {
            return Ok(current);
        }
        if !current.pop() {
            return Err(format!(
                "could not find {CONFIG_FILE} in {} or any parent directory",
                start.display()
            )
            .into());
        }
    }
}

/// Loads the project configuration selected by the global args.
///
/// `--config` may name a file or a directory holding `oleander.toml`.
/// Without it the nearest `oleander.toml` above the current directory is
/// used, and defaults apply when there is none. A relative local content
/// root is taken relative to the directory the config came from.
pub fn load_project_config(
    global: &GlobalArgs,
) -> Result<ProjectConfig, Box<dyn std::error::Error>> {
    let (mut config, base) = match global.config {
        Some(ref config_path) => {
            let p = PathBuf::from(config_path);
            if p.is_file() {
                let content = std::fs::read_to_string(&p)?;
                let base = p
                    .parent()
                    .map(|p| p.to_path_buf())
                    .unwrap_or_else(|| PathBuf::from("."));
                (load_config_from_str(&content)?, base)
            } else {
                (load_config(&p)?, p)
            }
        }
        None => {
            let cwd = std::env::current_dir()?;
            match find_project_root(&cwd) {
                Ok(root) => (load_config(&root)?, root),
                Err(_) => {
                    tracing::debug!("no {CONFIG_FILE} found, using defaults");
                    (ProjectConfig::default(), cwd)
                }
            }
        }
    };
    if !config.source.is_remote() && Path::new(&config.source.content_root).is_relative() {
        config.source.content_root = base
            .join(&config.source.content_root)
            .display()
            .to_string();
    }
    Ok(config)
}

/// Writes `files` under `out`, creating parent directories as needed.
///
/// Names that would escape `out` are rejected.
pub fn write_files<'a>(
    out: &Path,
    files: impl IntoIterator<Item = (&'a str, &'a [u8])>,
) -> Result<usize, Box<dyn std::error::Error>> {
    let mut written = 0;
    for (name, bytes) in files {
        let relative = Path::new(name.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(format!("refusing to write '{name}' outside {}", out.display()).into());
        }
        let target = out.join(relative);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&target, bytes)?;
        written += 1;
    }
    Ok(written)
}

/// Formats a byte count for summaries.
pub fn human_bytes(bytes: usize) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
