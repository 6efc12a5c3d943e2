//! Shared key layouts and well-known names.

/// Overflow store key holding one serialized review task.
pub const REVIEW_TASK_KEY_PREFIX: &str = "review:task:";

/// Overflow store list holding pending review task ids, in enqueue order.
pub const REVIEW_PENDING_LIST: &str = "review:pending";

/// Marker appended to a pending-list entry once a worker has claimed it.
pub const PROCESSING_MARKER: &str = "processing";

/// Cache namespace for list/search results.
pub const PICTURE_LIST_CACHE_PREFIX: &str = "galleria:picture:list:";

/// Cache namespace for single picture lookups.
pub const PICTURE_DETAIL_CACHE_PREFIX: &str = "galleria:picture:detail:";

pub fn review_task_key(picture_id: uuid::Uuid) -> String {
    format!("{}{}", REVIEW_TASK_KEY_PREFIX, picture_id)
}

pub fn picture_detail_cache_key(picture_id: uuid::Uuid) -> String {
    format!("{}{}", PICTURE_DETAIL_CACHE_PREFIX, picture_id)
}
