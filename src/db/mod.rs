//! Database abstraction layer.
//!
//! The gallery persists three tables: `generated_items`, `likes` and
//! `profiles`. Each concern is a trait so the like protocol and the
//! generation pipeline can be exercised against wrappers in tests. The
//! default implementation is [`sqlite::Database`].
//!
//! Trait methods use `impl Future` signatures, so no `async-trait` is needed
//! on this seam.

pub mod models;
pub mod sqlite;

pub use models::{GeneratedItem, Like, Profile};
pub use sqlite::Database;

use std::future::Future;

/// Storage of generated items.
pub trait ItemStore: Send + Sync + 'static {
    /// Persist a new item exactly as given.
    fn insert_item(
        &self,
        item: &GeneratedItem,
    ) -> impl Future<Output = Result<(), sqlx::Error>> + Send;

    fn get_item(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<Option<GeneratedItem>, sqlx::Error>> + Send;

    /// Every item, newest first. Unbounded.
    fn list_items(&self) -> impl Future<Output = Result<Vec<GeneratedItem>, sqlx::Error>> + Send;
}

/// Like rows and the denormalised `likes_count` counter.
pub trait LikeStore: Send + Sync + 'static {
    fn find_like(
        &self,
        user_id: &str,
        item_id: &str,
    ) -> impl Future<Output = Result<Option<Like>, sqlx::Error>> + Send;

    fn insert_like(
        &self,
        user_id: &str,
        item_id: &str,
    ) -> impl Future<Output = Result<(), sqlx::Error>> + Send;

    /// Returns the number of rows removed.
    fn delete_like(
        &self,
        user_id: &str,
        item_id: &str,
    ) -> impl Future<Output = Result<u64, sqlx::Error>> + Send;

    fn increment_likes(&self, item_id: &str) -> impl Future<Output = Result<(), sqlx::Error>> + Send;

    /// Never takes the counter below zero.
    fn decrement_likes(&self, item_id: &str) -> impl Future<Output = Result<(), sqlx::Error>> + Send;

    /// Insert the like and bump the counter in one transaction.
    ///
    /// Returns `false` when the like already existed; the counter is then
    /// left alone.
    fn like_atomic(
        &self,
        user_id: &str,
        item_id: &str,
    ) -> impl Future<Output = Result<bool, sqlx::Error>> + Send;

    /// Delete the like and drop the counter in one transaction.
    ///
    /// Returns `false` when there was nothing to delete.
    fn unlike_atomic(
        &self,
        user_id: &str,
        item_id: &str,
    ) -> impl Future<Output = Result<bool, sqlx::Error>> + Send;

    fn count_likes(&self, item_id: &str) -> impl Future<Output = Result<i64, sqlx::Error>> + Send;
}

/// User profiles.
pub trait ProfileStore: Send + Sync + 'static {
    /// Fetch the profile, creating it with the default credits and tier first if absent.
    fn get_or_create_profile(
        &self,
        user_id: &str,
    ) -> impl Future<Output = Result<Profile, sqlx::Error>> + Send;
}
