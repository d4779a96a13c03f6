//! Decoding of the bulk library archive.
//!
//! The bulk archive is a tar stream, usually gzip-compressed, holding the
//! same artifact files that are otherwise fetched one by one. Decoding yields
//! the same path → bytes map shape the incremental loader produces.

#![warn(missing_docs)]

pub mod tar;

use std::collections::BTreeMap;
use std::io::Read;

use flate2::read::GzDecoder;

pub use crate::tar::{decode_tar, BLOCK_SIZE};

/// The two leading bytes of every gzip member.
pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Errors that can occur while decoding an archive.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    /// The input looked like gzip but could not be inflated.
    #[error("failed to decompress gzip archive: {0}")]
    Gzip(#[from] std::io::Error),
}

/// Returns `true` if the buffer starts with the gzip magic bytes.
pub fn is_gzip(bytes: &[u8]) -> bool {
    bytes.starts_with(&GZIP_MAGIC)
}

/// Decodes a tar archive, inflating it first when it is gzip-compressed.
pub fn decode(bytes: &[u8]) -> Result<BTreeMap<String, Vec<u8>>, ArchiveError> {
    if is_gzip(bytes) {
        let mut inflated = Vec::with_capacity(bytes.len() * 4);
        GzDecoder::new(bytes).read_to_end(&mut inflated)?;
        Ok(decode_tar(&inflated))
    } else {
        Ok(decode_tar(bytes))
    }
}
