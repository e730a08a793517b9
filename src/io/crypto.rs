use crate::error::Result;
use sha2::{Digest, Sha256};
use std::{
    fs::File,
    io::{self, BufReader},
    path::Path,
};
use tracing::debug;

/// Lowercase hex SHA-256 of the file at `path`.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut reader = BufReader::with_capacity(64 * 1024, File::open(path)?);
    let mut hasher = Sha256::new();
    io::copy(&mut reader, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Whether the file's digest matches `expected_hex` (any case).
pub fn verify_sha256(path: &Path, expected_hex: &str) -> Result<bool> {
    let got = sha256_file(path)?;
    let ok = got.eq_ignore_ascii_case(expected_hex);
    if !ok {
        debug!(path = %path.display(), expected = expected_hex, got = %got, "digest mismatch");
    }
    Ok(ok)
}
