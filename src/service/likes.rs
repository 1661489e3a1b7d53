//! Like/unlike toggling and its counter bookkeeping

use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

use crate::config::LikeConsistency;
use crate::db::{GeneratedItem, ItemStore, LikeStore};
use crate::error::{AppError, Result};

/// Direction of a toggle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeAction {
    Like,
    Unlike,
}

impl FromStr for LikeAction {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "like" => Ok(Self::Like),
            "unlike" => Ok(Self::Unlike),
            other => Err(AppError::InvalidRequest(format!("Invalid action '{}'", other))),
        }
    }
}

impl fmt::Display for LikeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Like => f.write_str("like"),
            Self::Unlike => f.write_str("unlike"),
        }
    }
}

/// Apply `action` by `user_id` to `item_id` and return the refreshed item.
///
/// In [`LikeConsistency::Legacy`] mode the like row and the counter are two
/// separate writes: a repeated like is absorbed, an unlike always decrements,
/// and a failure between the writes leaves them diverged. In
/// [`LikeConsistency::Atomic`] mode both writes share a transaction and the
/// counter only moves when a row was actually inserted or deleted.
pub async fn toggle_like<S>(
    store: &S,
    consistency: LikeConsistency,
    item_id: &str,
    user_id: &str,
    action: LikeAction,
) -> Result<GeneratedItem>
where
    S: ItemStore + LikeStore,
{
    if user_id.is_empty() {
        return Err(AppError::Unauthorized("No user identity".to_string()));
    }

    if store.get_item(item_id).await?.is_none() {
        return Err(AppError::NotFound(format!("Item '{}'", item_id)));
    }

    debug!(item_id = %item_id, user_id = %user_id, action = %action, ?consistency, "Toggling like");

    match (consistency, action) {
        (LikeConsistency::Legacy, LikeAction::Like) => {
            if store.find_like(user_id, item_id).await?.is_some() {
                debug!(item_id = %item_id, user_id = %user_id, "Item already liked by user");
            } else {
                store.insert_like(user_id, item_id).await?;
                store.increment_likes(item_id).await?;
            }
        }
        (LikeConsistency::Legacy, LikeAction::Unlike) => {
            let removed = store.delete_like(user_id, item_id).await?;
            if removed == 0 {
                debug!(item_id = %item_id, user_id = %user_id, "Unlike without a like row");
            }
            store.decrement_likes(item_id).await?;
        }
        (LikeConsistency::Atomic, LikeAction::Like) => {
            if !store.like_atomic(user_id, item_id).await? {
                debug!(item_id = %item_id, user_id = %user_id, "Item already liked by user");
            }
        }
        (LikeConsistency::Atomic, LikeAction::Unlike) => {
            if !store.unlike_atomic(user_id, item_id).await? {
                debug!(item_id = %item_id, user_id = %user_id, "Unlike without a like row");
            }
        }
    }

    let item = store
        .get_item(item_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Item '{}'", item_id)))?;

    info!(item_id = %item_id, user_id = %user_id, action = %action, likes = item.likes_count, "Like toggled");
    Ok(item)
}
