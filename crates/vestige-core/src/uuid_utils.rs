//! UUID v7 utilities for time-ordered identifiers.
//!
//! Job and relationship ids are UUIDv7 so that ordering by id approximates
//! ordering by creation time, which keeps list queries stable when two rows
//! share a `created_at` value.

use uuid::Uuid;

/// Generate a new UUIDv7 identifier.
///
/// # Example
///
/// ```
/// use vestige_core::uuid_utils::new_v7;
///
/// let id = new_v7();
/// assert_eq!(id.get_version_num(), 7);
/// ```
#[inline]
pub fn new_v7() -> Uuid {
    Uuid::now_v7()
}
