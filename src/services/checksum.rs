//! Content checksum computation
//!
//! CRC32 is the identity key for everything in this tool: two files or
//! releases are the same episode iff their checksums match. Hashing is
//! streamed in fixed-size chunks so multi-gigabyte video files never get
//! buffered whole.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use crc32fast::Hasher;

/// Chunk size for streaming reads
const CHUNK_SIZE: usize = 8192;

/// Compute the 8-character uppercase hex CRC32 of a byte stream.
///
/// Read errors propagate; retry/skip policy belongs to the caller.
pub fn checksum_stream<R: Read>(mut reader: R) -> Result<String> {
    let mut hasher = Hasher::new();
    let mut buf = [0u8; CHUNK_SIZE];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:08X}", hasher.finalize()))
}

/// Compute the checksum of a file on disk.
pub fn checksum_file(path: &Path) -> Result<String> {
    let file = File::open(path)
        .with_context(|| format!("failed to open {} for hashing", path.display()))?;
    checksum_stream(file)
}
