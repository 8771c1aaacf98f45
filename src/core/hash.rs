use sha2::{Digest, Sha256};

/// Computes content signatures over canonical thumbnail bytes.
///
/// The digest is taken over the resized thumbnail, not the original file, so
/// it is only comparable between thumbnails rendered with the same
/// [`SIGNATURE_SCHEME`](crate::core::thumbnail::SIGNATURE_SCHEME).
pub struct HashService;

impl HashService {
    pub fn new() -> Self {
        Self
    }

    /// SHA-256 of `thumbnail`, lowercase hex.
    pub fn compute_signature(&self, thumbnail: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(thumbnail);
        format!("{:x}", hasher.finalize())
    }
}

impl Default for HashService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digest() {
        let service = HashService::new();
        assert_eq!(
            service.compute_signature(b"hello world"),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_signature_format() {
        let service = HashService::new();
        let signature = service.compute_signature(&[1, 2, 3]);
        assert_eq!(signature.len(), 64);
        assert!(signature.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(service.compute_signature(&[1, 2, 4]), signature);
    }
}
