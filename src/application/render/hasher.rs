//! Streaming SHA-256 digests for rendered PDFs.

use std::path::Path;

use sha2::{Digest, Sha256};
use tokio::{fs::File, io::AsyncReadExt};

const CHUNK_SIZE: usize = 64 * 1024;

/// Digest and length of a file on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDigest {
    /// Lowercase hex SHA-256, always 64 characters.
    pub sha256_hex: String,
    pub size_bytes: u64,
}

/// Hash `path` in fixed-size chunks without buffering the whole file.
///
/// I/O failures are returned as-is; callers treat them as environment errors.
pub async fn hash_file(path: &Path) -> std::io::Result<FileDigest> {
    let mut file = File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];
    let mut size_bytes: u64 = 0;

    loop {
        let read = file.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
        size_bytes += read as u64;
    }

    Ok(FileDigest {
        sha256_hex: hex::encode(hasher.finalize()),
        size_bytes,
    })
}
