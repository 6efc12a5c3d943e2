use sha2::{Digest, Sha256};

/// SHA-256 of the original bytes, lowercase hex. Used as the dedup key.
pub fn content_hash(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_is_stable() {
        assert_eq!(
            content_hash(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(content_hash(b"picture"), content_hash(b"picture"));
        assert_ne!(content_hash(b"picture"), content_hash(b"picture!"));
    }
}
