//! SHA-512 checksums for image files
//!
//! Files are streamed in fixed-size blocks so arbitrarily large images
//! never have to fit in memory.

use crate::error::{ImgsyncError, ImgsyncResult};
use sha2::{Digest, Sha512};
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

/// Block size used when hashing files on disk
pub const BLOCK_SIZE: usize = 1 << 20;

/// Incremental SHA-512 hasher producing lowercase hex
#[derive(Default)]
pub struct Hasher {
    inner: Sha512,
}

impl Hasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    pub fn finalize_hex(self) -> String {
        hex::encode(self.inner.finalize())
    }
}

/// Compute the hex SHA-512 digest of a file
pub fn digest(path: &Path) -> ImgsyncResult<String> {
    let mut file = File::open(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => ImgsyncError::FileNotFound(path.to_path_buf()),
        _ => ImgsyncError::io(format!("opening {}", path.display()), e),
    })?;

    let mut hasher = Hasher::new();
    let mut buf = vec![0u8; BLOCK_SIZE];
    loop {
        let n = match file.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(ImgsyncError::io(format!("reading {}", path.display()), e)),
        };
        hasher.update(&buf[..n]);
    }

    Ok(hasher.finalize_hex())
}

/// Compare two hex digests ignoring case
pub fn matches(computed: &str, expected: &str) -> bool {
    computed.eq_ignore_ascii_case(expected.trim())
}

/// Check whether the file at `path` has the expected digest
pub fn verify(path: &Path, expected: &str) -> ImgsyncResult<bool> {
    Ok(matches(&digest(path)?, expected))
}

/// Whether `value` looks like a hex-encoded SHA-512 digest
pub fn is_sha512_hex(value: &str) -> bool {
    value.len() == 128 && value.bytes().all(|b| b.is_ascii_hexdigit())
}
