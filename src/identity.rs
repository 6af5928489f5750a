//! Content identity: streaming SHA-256 fingerprints

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

use crate::error::ReadError;

/// Read buffer size used while hashing
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Content fingerprint of a file
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    /// Lowercase hex digest
    pub hash: String,
    /// Bytes actually read
    pub size: u64,
}

/// Computes content fingerprints
pub trait ContentHasher: Send + Sync {
    fn fingerprint(&self, path: &Path) -> Result<Fingerprint, ReadError>;
}

/// SHA-256 over the whole file, read in [`CHUNK_SIZE`] pieces
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Hasher;

impl ContentHasher for Sha256Hasher {
    fn fingerprint(&self, path: &Path) -> Result<Fingerprint, ReadError> {
        let file = File::open(path).map_err(|e| ReadError::new(path, e))?;
        fingerprint_reader(file).map_err(|e| ReadError::new(path, e))
    }
}

/// Hash everything readable from `reader`
pub fn fingerprint_reader<R: Read>(mut reader: R) -> std::io::Result<Fingerprint> {
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];
    let mut size = 0u64;
    loop {
        let n = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buffer[..n]);
        size += n as u64;
    }
    Ok(Fingerprint {
        hash: format!("{:x}", hasher.finalize()),
        size,
    })
}
