//! SHA-256 digests and archive verification.
//!
//! The verifier streams the downloaded file through SHA-256 and compares the
//! result with the descriptor's expected digest. Any difference is fatal.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::str::FromStr;

use crate::error::IntegrityError;

const BUF_SIZE: usize = 64 * 1024;

/// A 256-bit SHA-256 digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Sha256Digest([u8; 32]);

impl Sha256Digest {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn of_bytes(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Sha256Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Sha256Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sha256Digest({})", self.to_hex())
    }
}

/// Reason a string is not a SHA-256 hex digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseDigestError(String);

impl fmt::Display for ParseDigestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ParseDigestError {}

impl FromStr for Sha256Digest {
    type Err = ParseDigestError;

    /// Parses exactly 64 hex characters, either case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.len() != 64 {
            return Err(ParseDigestError(format!(
                "expected 64 hex characters, got {}",
                s.len()
            )));
        }
        let mut out = [0u8; 32];
        hex::decode_to_slice(s, &mut out)
            .map_err(|e| ParseDigestError(format!("invalid hex: {}", e)))?;
        Ok(Self(out))
    }
}

impl Serialize for Sha256Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Sha256Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Compute SHA-256 of a file.
/// Reads in chunks to keep memory use bounded; suitable for large archives.
pub fn sha256_path(path: &Path) -> io::Result<Sha256Digest> {
    let mut f = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; BUF_SIZE];
    loop {
        let n = f.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(Sha256Digest(hasher.finalize().into()))
}

/// Hash `path` and compare with `expected`. Returns the computed digest on match.
pub fn verify_file(path: &Path, expected: &Sha256Digest) -> Result<Sha256Digest, IntegrityError> {
    let actual = sha256_path(path).map_err(|source| IntegrityError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    if actual != *expected {
        return Err(IntegrityError::Mismatch {
            path: path.to_path_buf(),
            expected: *expected,
            actual,
        });
    }
    tracing::debug!(path = %path.display(), digest = %actual, "checksum verified");
    Ok(actual)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const EMPTY: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";
    const HELLO_NL: &str = "5891b5b522d5df086d0ff0b110fbd9d21bb4fc7163af34d08286a2e846f6be03";

    #[test]
    fn sha256_path_empty_file() {
        let f = tempfile::NamedTempFile::new().unwrap();
        let digest = sha256_path(f.path()).unwrap();
        assert_eq!(digest.to_hex(), EMPTY);
    }

    #[test]
    fn sha256_path_known_content() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"hello\n").unwrap();
        f.flush().unwrap();
        let digest = sha256_path(f.path()).unwrap();
        assert_eq!(digest.to_hex(), HELLO_NL);
        assert_eq!(digest, Sha256Digest::of_bytes(b"hello\n"));
    }

    #[test]
    fn parse_accepts_upper_case() {
        let d: Sha256Digest = HELLO_NL.to_uppercase().parse().unwrap();
        assert_eq!(d.to_hex(), HELLO_NL);
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert!("abc".parse::<Sha256Digest>().is_err());
        let not_hex = "z".repeat(64);
        assert!(not_hex.parse::<Sha256Digest>().is_err());
        let too_long = format!("{}00", EMPTY);
        assert!(too_long.parse::<Sha256Digest>().is_err());
    }

    #[test]
    fn verify_file_detects_single_bit_flip() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"hello\n").unwrap();
        f.flush().unwrap();

        let good: Sha256Digest = HELLO_NL.parse().unwrap();
        assert_eq!(verify_file(f.path(), &good).unwrap(), good);

        let mut flipped = *good.as_bytes();
        flipped[31] ^= 0x01;
        let bad = Sha256Digest::from_bytes(flipped);
        match verify_file(f.path(), &bad) {
            Err(IntegrityError::Mismatch {
                expected, actual, ..
            }) => {
                assert_eq!(expected, bad);
                assert_eq!(actual, good);
            }
            other => panic!("expected mismatch, got {:?}", other),
        }
    }

    #[test]
    fn verify_file_missing_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.zip");
        let d: Sha256Digest = EMPTY.parse().unwrap();
        assert!(matches!(
            verify_file(&missing, &d),
            Err(IntegrityError::Read { .. })
        ));
    }

    #[test]
    fn serde_as_hex_string() {
        let d: Sha256Digest = EMPTY.parse().unwrap();
        let json = serde_json::to_string(&d).unwrap();
        assert_eq!(json, format!("\"{}\"", EMPTY));
        let back: Sha256Digest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, d);
    }
}
