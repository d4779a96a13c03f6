//! `oleander unpack`: extract the valid artifacts of a bulk archive.
//!
//! Decodes a tar archive (gzip-compressed or not), validates every artifact
//! entry and writes the valid ones under the output directory. Exits with 1
//! when a primary artifact fails validation.

use oleander_common::{artifact, ArtifactKind, ArtifactLayout, ArtifactPath};

use crate::pipeline::{human_bytes, load_project_config, write_files};
use crate::{GlobalArgs, UnpackArgs};

/// Runs the `oleander unpack` command.
pub fn run(args: &UnpackArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let config = load_project_config(global)?;
    let layout = config.layout.to_layout()?;

    let bytes = std::fs::read(&args.archive)?;
    let entries = oleander_archive::decode(&bytes)?;
    let sorted = sort_entries(&entries, &layout);

    for (name, defect) in &sorted.invalid {
        eprintln!("error: {name}: {defect}");
    }
    std::fs::create_dir_all(&args.out)?;
    let written = write_files(
        &args.out,
        sorted.valid.iter().map(|(name, data)| (*name, *data)),
    )?;

    if !global.quiet {
        let total: usize = sorted.valid.iter().map(|(_, d)| d.len()).sum();
        eprintln!(
            "    Unpacked {written} artifacts ({}) to {}",
            human_bytes(total),
            args.out.display()
        );
        if sorted.skipped > 0 {
            eprintln!("     Skipped {} non-artifact entries", sorted.skipped);
        }
    }
    Ok(if sorted.invalid.is_empty() { 0 } else { 1 })
}

/// Archive entries split by validation outcome.
struct Sorted<'a> {
    valid: Vec<(&'a str, &'a [u8])>,
    invalid: Vec<(&'a str, artifact::ArtifactDefect)>,
    skipped: usize,
}

fn sort_entries<'a>(
    entries: &'a std::collections::BTreeMap<String, Vec<u8>>,
    layout: &ArtifactLayout,
) -> Sorted<'a> {
    let mut sorted = Sorted {
        valid: Vec::new(),
        invalid: Vec::new(),
        skipped: 0,
    };
    for (name, data) in entries {
        if !layout.is_artifact(name) {
            sorted.skipped += 1;
            continue;
        }
        match artifact::inspect(data) {
            Ok(()) => sorted.valid.push((name.as_str(), data.as_slice())),
            Err(defect) => {
                if layout.kind_of(&ArtifactPath::from(name.as_str())) == ArtifactKind::Primary {
                    sorted.invalid.push((name.as_str(), defect));
                }
            }
        }
    }
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;
    use oleander_common::MIN_HEADER_LEN;
    use std::collections::BTreeMap;

    fn good() -> Vec<u8> {
        let mut bytes = vec![0u8; MIN_HEADER_LEN];
        bytes[..4].copy_from_slice(b"olea");
        bytes
    }

    #[test]
    fn entries_are_split_by_outcome() {
        let mut entries = BTreeMap::new();
        entries.insert("Init.olean".to_string(), good());
        entries.insert("Init.olean.server".to_string(), b"bad".to_vec());
        entries.insert("Init/Core.olean".to_string(), b"bad".to_vec());
        entries.insert("README".to_string(), b"hello".to_vec());

        let sorted = sort_entries(&entries, &ArtifactLayout::default());
        assert_eq!(sorted.valid.len(), 1);
        assert_eq!(sorted.valid[0].0, "Init.olean");
        assert_eq!(sorted.invalid.len(), 1);
        assert_eq!(sorted.invalid[0].0, "Init/Core.olean");
        assert_eq!(sorted.skipped, 1);
    }
}
