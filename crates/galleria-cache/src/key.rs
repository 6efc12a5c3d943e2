use galleria_core::constants::PICTURE_LIST_CACHE_PREFIX;
use galleria_core::PictureQuery;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::CacheError;

const KEY_HASH_LEN: usize = 32;

/// `<prefix><sha256(json(value))[..32]>`
pub fn hashed_key<T: Serialize>(prefix: &str, value: &T) -> Result<String, CacheError> {
    let encoded = serde_json::to_vec(value)?;
    let digest = hex::encode(Sha256::digest(&encoded));
    Ok(format!("{}{}", prefix, &digest[..KEY_HASH_LEN]))
}

/// Equivalent queries map to the same key.
pub fn picture_list_key(query: &PictureQuery) -> Result<String, CacheError> {
    hashed_key(PICTURE_LIST_CACHE_PREFIX, &query.clone().normalized())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equivalent_queries_share_a_key() {
        let a = PictureQuery {
            name_contains: Some(" Beach".to_string()),
            ..PictureQuery::default()
        };
        let b = PictureQuery {
            name_contains: Some("beach ".to_string()),
            ..PictureQuery::default()
        };
        let key = picture_list_key(&a).unwrap();
        assert_eq!(key, picture_list_key(&b).unwrap());
        assert!(key.starts_with(PICTURE_LIST_CACHE_PREFIX));
        assert_eq!(key.len(), PICTURE_LIST_CACHE_PREFIX.len() + KEY_HASH_LEN);
    }

    #[test]
    fn test_different_filters_differ() {
        let public = picture_list_key(&PictureQuery::public_gallery()).unwrap();
        let all = picture_list_key(&PictureQuery::default()).unwrap();
        assert_ne!(public, all);
    }
}
