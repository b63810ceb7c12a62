//! SHA-256 artifact integrity checks

use sha2::{Digest, Sha256};

use crate::error::LoaderError;
use crate::package::PackageIdentity;

/// Hex-encoded SHA-256 of `data`
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Verify downloaded bytes against a registry-declared SHA-256
pub fn verify_sha256(
    data: &[u8],
    expected_hex: &str,
    identity: &PackageIdentity,
) -> Result<(), LoaderError> {
    let expected = expected_hex.trim().to_ascii_lowercase();
    let actual = sha256_hex(data);
    if actual != expected {
        return Err(LoaderError::Download {
            identity: identity.clone(),
            message: format!("integrity mismatch: expected sha256 {}, got {}", expected, actual),
        });
    }
    Ok(())
}
