//! Content hashing with blake3.
//!
//! Used for change suppression: an HMR instance remembers the digest of the
//! last output it pushed and skips identical recompiles.

/// Full blake3 digest of `data` as lowercase hex.
#[inline]
pub fn digest<T: AsRef<[u8]> + ?Sized>(data: &T) -> String {
    hex::encode(blake3::hash(data.as_ref()).as_bytes())
}

/// Short 8-char fingerprint, for log lines and cache-busting query strings.
#[inline]
pub fn fingerprint<T: AsRef<[u8]> + ?Sized>(data: &T) -> String {
    digest(data)[..8].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_is_stable() {
        assert_eq!(digest("body { color: red }"), digest("body { color: red }"));
        assert_ne!(digest("a"), digest("b"));
        assert_eq!(digest("a").len(), 64);
    }

    #[test]
    fn test_fingerprint_prefix() {
        let d = digest(b"content");
        assert_eq!(fingerprint(b"content"), &d[..8]);
    }
}
