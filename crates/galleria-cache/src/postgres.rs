use std::time::Duration;

use sqlx::PgPool;

use crate::distributed::DistributedCache;
use crate::error::CacheError;

/// Distributed tier kept in the `cache_entries` table.
///
/// Every process connected to the same database sees the same entries, so an
/// invalidation issued by one process is observed by the others.
#[derive(Clone)]
pub struct PgDistributedCache {
    pool: PgPool,
}

impl PgDistributedCache {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Delete expired rows. Returns how many were removed.
    pub async fn purge_expired(&self) -> Result<u64, CacheError> {
        let result = sqlx::query("DELETE FROM cache_entries WHERE expires_at <= NOW()")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait::async_trait]
impl DistributedCache for PgDistributedCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let value: Option<Vec<u8>> = sqlx::query_scalar(
            "SELECT value FROM cache_entries WHERE key = $1 AND expires_at > NOW()",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(value)
    }

    async fn set_with_ttl(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        sqlx::query(
            r#"
            INSERT INTO cache_entries (key, value, expires_at)
            VALUES ($1, $2, NOW() + make_interval(secs => $3))
            ON CONFLICT (key) DO UPDATE
            SET value = EXCLUDED.value, expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(ttl.as_secs_f64())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let result = sqlx::query("DELETE FROM cache_entries WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM cache_entries WHERE key = $1 AND expires_at > NOW())",
        )
        .bind(key)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, CacheError> {
        let keys: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT key FROM cache_entries
            WHERE key LIKE $1 ESCAPE '\' AND expires_at > NOW()
            ORDER BY key
            "#,
        )
        .bind(like_prefix_pattern(prefix))
        .fetch_all(&self.pool)
        .await?;
        Ok(keys)
    }
}

/// `LIKE` pattern matching keys that start with `prefix` literally.
fn like_prefix_pattern(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_prefix_pattern_escapes_wildcards() {
        assert_eq!(like_prefix_pattern("pictures:list:"), "pictures:list:%");
        assert_eq!(like_prefix_pattern("a_b%c"), "a\\_b\\%c%");
        assert_eq!(like_prefix_pattern("back\\slash"), "back\\\\slash%");
        assert_eq!(like_prefix_pattern(""), "%");
    }
}
