//! Header validation for compiled library artifacts.
//!
//! Every artifact starts with a fixed-size header whose first bytes are a
//! format marker. Checking the marker is a cheap guard against truncated
//! downloads, HTML error pages served with a 200, and artifacts built by a
//! different toolchain layout. It is not a full format parser.

use std::fmt;

/// Magic bytes at the start of every artifact.
pub const ARTIFACT_MAGIC: [u8; 4] = *b"olea";

/// Size of the fixed artifact header: 5-byte marker, 1-byte format version,
/// 42-byte toolchain hash and 8-byte base address.
pub const MIN_HEADER_LEN: usize = 56;

/// Why a buffer was rejected as an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactDefect {
    /// The buffer is shorter than the fixed header.
    TooShort {
        /// Length of the rejected buffer.
        len: usize,
    },
    /// The first four bytes are not [`ARTIFACT_MAGIC`].
    BadMagic {
        /// The four bytes actually found.
        found: [u8; 4],
    },
}

impl fmt::Display for ArtifactDefect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactDefect::TooShort { len } => {
                write!(f, "{len} bytes, shorter than the {MIN_HEADER_LEN}-byte header")
            }
            ArtifactDefect::BadMagic { found } => write!(
                f,
                "magic {:02x}{:02x}{:02x}{:02x} does not match {:02x}{:02x}{:02x}{:02x}",
                found[0],
                found[1],
                found[2],
                found[3],
                ARTIFACT_MAGIC[0],
                ARTIFACT_MAGIC[1],
                ARTIFACT_MAGIC[2],
                ARTIFACT_MAGIC[3]
            ),
        }
    }
}

/// Checks a buffer's header and reports the first defect found.
pub fn inspect(bytes: &[u8]) -> Result<(), ArtifactDefect> {
    if bytes.len() < MIN_HEADER_LEN {
        return Err(ArtifactDefect::TooShort { len: bytes.len() });
    }
    let found = [bytes[0], bytes[1], bytes[2], bytes[3]];
    if found != ARTIFACT_MAGIC {
        return Err(ArtifactDefect::BadMagic { found });
    }
    Ok(())
}

/// Returns `true` if the buffer carries a well-formed artifact header.
pub fn is_valid(bytes: &[u8]) -> bool {
    inspect(bytes).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_artifact(len: usize) -> Vec<u8> {
        let mut bytes = vec![0u8; len];
        bytes[..5].copy_from_slice(b"olean");
        bytes
    }

    #[test]
    fn header_sized_buffer_is_valid() {
        assert!(is_valid(&valid_artifact(MIN_HEADER_LEN)));
    }

    #[test]
    fn trailing_content_is_irrelevant() {
        let mut bytes = valid_artifact(MIN_HEADER_LEN);
        bytes.extend_from_slice(b"<html>not really</html>");
        assert!(is_valid(&bytes));
    }

    #[test]
    fn short_buffer_is_invalid_even_with_magic() {
        let bytes = valid_artifact(MIN_HEADER_LEN - 1);
        assert_eq!(
            inspect(&bytes),
            Err(ArtifactDefect::TooShort {
                len: MIN_HEADER_LEN - 1
            })
        );
        assert!(!is_valid(&[]));
    }

    #[test]
    fn mutating_any_magic_byte_invalidates() {
        let original = valid_artifact(128);
        for i in 0..4 {
            let mut bytes = original.clone();
            bytes[i] ^= 0xff;
            assert!(!is_valid(&bytes), "byte {i} mutation should be rejected");
        }
    }

    #[test]
    fn html_error_page_is_rejected() {
        let page = b"<!DOCTYPE html><html><body>404 Not Found</body></html>".repeat(2);
        assert!(matches!(
            inspect(&page),
            Err(ArtifactDefect::BadMagic { .. })
        ));
    }

    #[test]
    fn defect_display() {
        let msg = ArtifactDefect::TooShort { len: 3 }.to_string();
        assert!(msg.contains("3 bytes"));
        let msg = ArtifactDefect::BadMagic { found: *b"PK\x03\x04" }.to_string();
        assert!(msg.contains("504b0304"));
        assert!(msg.contains("6f6c6561"));
    }
}
