//! Checksum provider for snapshot verification
//!
//! The provider is selected once at construction: SHA-256, then MD5, then
//! size-only. Size-only is the degraded mode; verification callers that
//! land there compare (size, mtime) pairs instead of digests.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

/// Digest algorithms in preference order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    /// SHA-256 content digest
    Sha256,
    /// MD5 content digest
    Md5,
    /// No content digest; the decimal file size stands in
    SizeOnly,
}

impl Algorithm {
    /// Returns the string representation used in formatted digests
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Sha256 => "sha256",
            Algorithm::Md5 => "md5",
            Algorithm::SizeOnly => "size",
        }
    }
}

/// A checksum provider bound to one algorithm
#[derive(Debug, Clone, Copy)]
pub struct Provider {
    algorithm: Algorithm,
}

impl Provider {
    /// Select the first available algorithm: SHA-256 > MD5 > size-only.
    pub fn select() -> Self {
        Self::select_from(&[Algorithm::Sha256, Algorithm::Md5, Algorithm::SizeOnly])
    }

    /// Select the first available algorithm from an explicit preference
    /// chain. SHA-256 and MD5 are always compiled in, so selection stops
    /// at the first entry; the chain exists so the degraded orderings
    /// stay testable.
    pub fn select_from(preference: &[Algorithm]) -> Self {
        let algorithm = preference.first().copied().unwrap_or(Algorithm::SizeOnly);
        Self { algorithm }
    }

    /// The algorithm this provider computes
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Whether verification callers must fall back to (size, mtime) pairs
    pub fn is_size_only(&self) -> bool {
        self.algorithm == Algorithm::SizeOnly
    }

    /// Digest of a file's content.
    ///
    /// Reads in chunks to handle large files. Size-only mode returns the
    /// decimal file size encoded as bytes.
    pub fn digest(&self, path: &Path) -> io::Result<Vec<u8>> {
        match self.algorithm {
            Algorithm::Sha256 => {
                let mut hasher = Sha256::new();
                stream_into(path, |chunk| hasher.update(chunk))?;
                Ok(hasher.finalize().to_vec())
            }
            Algorithm::Md5 => {
                let mut context = md5::Context::new();
                stream_into(path, |chunk| context.consume(chunk))?;
                Ok(context.compute().0.to_vec())
            }
            Algorithm::SizeOnly => {
                let meta = std::fs::metadata(path)?;
                Ok(meta.len().to_string().into_bytes())
            }
        }
    }

    /// Digest formatted as `<algorithm>:<lowercase hex>`.
    ///
    /// Size-only digests render as `size:<decimal>`.
    pub fn digest_formatted(&self, path: &Path) -> io::Result<String> {
        let raw = self.digest(path)?;
        if self.algorithm == Algorithm::SizeOnly {
            return Ok(format!("size:{}", String::from_utf8_lossy(&raw)));
        }

        let mut hex = String::with_capacity(raw.len() * 2);
        for byte in &raw {
            hex.push_str(&format!("{:02x}", byte));
        }
        Ok(format!("{}:{}", self.algorithm.as_str(), hex))
    }
}

/// Feed a file through a digest callback in 8KB chunks.
fn stream_into<F: FnMut(&[u8])>(path: &Path, mut update: F) -> io::Result<()> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        update(&buffer[..bytes_read]);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_selection_prefers_sha256() {
        let provider = Provider::select();
        assert_eq!(provider.algorithm(), Algorithm::Sha256);
        assert!(!provider.is_size_only());
    }

    #[test]
    fn test_degradation_chain() {
        let md5 = Provider::select_from(&[Algorithm::Md5, Algorithm::SizeOnly]);
        assert_eq!(md5.algorithm(), Algorithm::Md5);

        let size_only = Provider::select_from(&[Algorithm::SizeOnly]);
        assert_eq!(size_only.algorithm(), Algorithm::SizeOnly);
        assert!(size_only.is_size_only());

        let empty = Provider::select_from(&[]);
        assert_eq!(empty.algorithm(), Algorithm::SizeOnly);
    }

    #[test]
    fn test_digest_deterministic() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("test.dat");
        std::fs::write(&path, b"checkpoint digest test data").unwrap();

        let provider = Provider::select();
        let first = provider.digest(&path).unwrap();
        let second = provider.digest(&path).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.len(), 32); // SHA-256 output width
    }

    #[test]
    fn test_digest_detects_changes() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("test.dat");
        let provider = Provider::select();

        std::fs::write(&path, b"original").unwrap();
        let before = provider.digest(&path).unwrap();

        std::fs::write(&path, b"modified").unwrap();
        let after = provider.digest(&path).unwrap();

        assert_ne!(before, after);
    }

    #[test]
    fn test_md5_digest_width() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("test.dat");
        std::fs::write(&path, b"md5 fallback").unwrap();

        let provider = Provider::select_from(&[Algorithm::Md5]);
        let digest = provider.digest(&path).unwrap();

        assert_eq!(digest.len(), 16);
    }

    #[test]
    fn test_size_only_digest_is_decimal_size() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("test.dat");
        std::fs::write(&path, vec![0u8; 512]).unwrap();

        let provider = Provider::select_from(&[Algorithm::SizeOnly]);
        let digest = provider.digest(&path).unwrap();

        assert_eq!(digest, b"512".to_vec());
        assert_eq!(provider.digest_formatted(&path).unwrap(), "size:512");
    }

    #[test]
    fn test_digest_large_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("large.dat");

        // Larger than the 8KB read buffer
        let mut file = File::create(&path).unwrap();
        let chunk = [0xABu8; 1024];
        for _ in 0..100 {
            file.write_all(&chunk).unwrap();
        }
        file.sync_all().unwrap();
        drop(file);

        let provider = Provider::select();
        let first = provider.digest(&path).unwrap();
        let second = provider.digest(&path).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_digest_missing_file() {
        let provider = Provider::select();
        let result = provider.digest(Path::new("/nonexistent/file.dat"));

        assert!(result.is_err());
    }

    #[test]
    fn test_formatted_digest_shape() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("test.dat");
        std::fs::write(&path, b"abc").unwrap();

        let formatted = Provider::select().digest_formatted(&path).unwrap();

        assert!(formatted.starts_with("sha256:"));
        assert_eq!(formatted.len(), "sha256:".len() + 64);
    }
}
