//! POSIX tar decoding into an in-memory file map.
//!
//! Only what the bulk library archive needs is understood: regular files,
//! the `ustar` name prefix, and the end-of-archive marker. Directories, links,
//! pax headers and other metadata entries are skipped.

use std::collections::BTreeMap;

/// Size of a tar header block and of the padding unit for entry data.
pub const BLOCK_SIZE: usize = 512;

const NAME_RANGE: std::ops::Range<usize> = 0..100;
const SIZE_RANGE: std::ops::Range<usize> = 124..136;
const TYPEFLAG_OFFSET: usize = 156;
const MAGIC_RANGE: std::ops::Range<usize> = 257..262;
const PREFIX_RANGE: std::ops::Range<usize> = 345..500;

/// Decodes an uncompressed tar stream into a map from entry path to bytes.
///
/// Decoding stops at the first all-zero header block or when fewer than
/// [`BLOCK_SIZE`] bytes remain. Only regular files with non-zero size are
/// emitted, and entries with any path segment starting with `._` (macOS
/// resource-fork sidecars) are dropped. Every returned buffer is an
/// independent copy of the entry data.
pub fn decode_tar(bytes: &[u8]) -> BTreeMap<String, Vec<u8>> {
    let mut files = BTreeMap::new();
    let mut offset = 0;

    while offset + BLOCK_SIZE <= bytes.len() {
        let header = &bytes[offset..offset + BLOCK_SIZE];
        if header.iter().all(|&b| b == 0) {
            break;
        }

        let path = entry_path(header);
        let size = parse_octal(&header[SIZE_RANGE]);
        let typeflag = header[TYPEFLAG_OFFSET];

        let data_start = offset + BLOCK_SIZE;
        let data_end = data_start.saturating_add(size).min(bytes.len());

        if is_regular_file(typeflag) && size > 0 && !is_sidecar(&path) {
            files.insert(path, bytes[data_start..data_end].to_vec());
        }

        // A truncated final entry has nothing after it worth reading.
        if data_start.saturating_add(size) > bytes.len() {
            break;
        }
        offset = data_start + padded(size);
    }

    files
}

/// Returns the entry path, joining the `ustar` prefix when present.
fn entry_path(header: &[u8]) -> String {
    let name = nul_terminated(&header[NAME_RANGE]);
    if &header[MAGIC_RANGE] == b"ustar" {
        let prefix = nul_terminated(&header[PREFIX_RANGE]);
        if !prefix.is_empty() {
            return format!("{prefix}/{name}");
        }
    }
    name
}

fn nul_terminated(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

/// Parses an octal ASCII field terminated by NUL or space. Malformed input
/// yields 0.
fn parse_octal(field: &[u8]) -> usize {
    let end = field
        .iter()
        .position(|&b| b == 0 || b == b' ')
        .unwrap_or(field.len());
    std::str::from_utf8(&field[..end])
        .ok()
        .map(str::trim)
        .and_then(|digits| usize::from_str_radix(digits, 8).ok())
        .unwrap_or(0)
}

fn is_regular_file(typeflag: u8) -> bool {
    typeflag == 0 || typeflag == b'0'
}

fn is_sidecar(path: &str) -> bool {
    path.split('/').any(|segment| segment.starts_with("._"))
}

fn padded(size: usize) -> usize {
    size.div_ceil(BLOCK_SIZE) * BLOCK_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds a raw header block by hand so field layouts are exercised
    /// independently of any tar writer.
    fn raw_header(name: &str, size: usize, typeflag: u8, ustar_prefix: Option<&str>) -> Vec<u8> {
        let mut h = vec![0u8; BLOCK_SIZE];
        h[..name.len()].copy_from_slice(name.as_bytes());
        let size_field = format!("{size:011o} ");
        h[SIZE_RANGE].copy_from_slice(size_field.as_bytes());
        h[TYPEFLAG_OFFSET] = typeflag;
        if let Some(prefix) = ustar_prefix {
            h[MAGIC_RANGE].copy_from_slice(b"ustar");
            h[PREFIX_RANGE.start..PREFIX_RANGE.start + prefix.len()]
                .copy_from_slice(prefix.as_bytes());
        }
        h
    }

    fn entry(name: &str, data: &[u8], typeflag: u8, prefix: Option<&str>) -> Vec<u8> {
        let mut out = raw_header(name, data.len(), typeflag, prefix);
        out.extend_from_slice(data);
        out.resize(BLOCK_SIZE + padded(data.len()), 0);
        out
    }

    fn terminate(mut archive: Vec<u8>) -> Vec<u8> {
        archive.extend_from_slice(&[0u8; BLOCK_SIZE * 2]);
        archive
    }

    #[test]
    fn decodes_regular_files() {
        let mut archive = entry("a.olean", b"first", b'0', None);
        archive.extend(entry("dir/b.olean", &[7u8; 600], b'0', None));
        let files = decode_tar(&terminate(archive));
        assert_eq!(files.len(), 2);
        assert_eq!(files["a.olean"], b"first");
        assert_eq!(files["dir/b.olean"], vec![7u8; 600]);
    }

    #[test]
    fn nul_typeflag_is_regular_file() {
        let archive = terminate(entry("old.olean", b"v7", 0, None));
        assert_eq!(decode_tar(&archive)["old.olean"], b"v7");
    }

    #[test]
    fn ustar_prefix_is_joined() {
        let archive = terminate(entry("String.olean", b"data", b'0', Some("Init/Data")));
        let files = decode_tar(&archive);
        assert!(files.contains_key("Init/Data/String.olean"));
    }

    #[test]
    fn prefix_ignored_without_ustar_magic() {
        let mut archive = entry("x.olean", b"data", b'0', None);
        archive[PREFIX_RANGE.start..PREFIX_RANGE.start + 3].copy_from_slice(b"pre");
        let files = decode_tar(&terminate(archive));
        assert!(files.contains_key("x.olean"));
    }

    #[test]
    fn directories_and_empty_files_skipped() {
        let mut archive = entry("Init/", b"", b'5', None);
        archive.extend(entry("empty.olean", b"", b'0', None));
        archive.extend(entry("pax", b"path=whatever", b'x', None));
        archive.extend(entry("kept.olean", b"k", b'0', None));
        let files = decode_tar(&terminate(archive));
        assert_eq!(files.keys().collect::<Vec<_>>(), vec!["kept.olean"]);
    }

    #[test]
    fn resource_fork_sidecars_skipped() {
        let mut archive = entry("Init/._Core.olean", b"junk", b'0', None);
        archive.extend(entry("._Init/Core.olean", b"junk", b'0', None));
        archive.extend(entry("Init/Core.olean", b"real", b'0', None));
        let files = decode_tar(&terminate(archive));
        assert_eq!(files.len(), 1);
        assert_eq!(files["Init/Core.olean"], b"real");
    }

    #[test]
    fn stops_at_zero_block() {
        let mut archive = terminate(entry("first.olean", b"1", b'0', None));
        archive.extend(entry("after.olean", b"2", b'0', None));
        let files = decode_tar(&archive);
        assert!(files.contains_key("first.olean"));
        assert!(!files.contains_key("after.olean"));
    }

    #[test]
    fn short_trailer_is_ignored() {
        let mut archive = entry("a.olean", b"abc", b'0', None);
        archive.extend_from_slice(&[1u8; 100]);
        let files = decode_tar(&archive);
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn malformed_size_reads_as_zero() {
        let mut archive = entry("bad.olean", b"", b'0', None);
        archive[SIZE_RANGE].copy_from_slice(b"zzzzzzzzzzz ");
        archive.extend(entry("good.olean", b"g", b'0', None));
        let files = decode_tar(&terminate(archive));
        assert!(!files.contains_key("bad.olean"));
        assert_eq!(files["good.olean"], b"g");
    }

    #[test]
    fn input_is_not_mutated_and_output_is_deterministic() {
        let archive = terminate(entry("a.olean", b"abc", b'0', None));
        let snapshot = archive.clone();
        let first = decode_tar(&archive);
        let second = decode_tar(&archive);
        assert_eq!(archive, snapshot);
        assert_eq!(first, second);
    }

    #[test]
    fn parse_octal_terminators() {
        assert_eq!(parse_octal(b"00000000017\0"), 15);
        assert_eq!(parse_octal(b"0000644 \0\0\0\0"), 0o644);
        assert_eq!(parse_octal(b"\0\0\0\0"), 0);
    }
}
