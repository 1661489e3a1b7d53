//! Row types persisted by the gallery

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One generated image and its metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedItem {
    pub id: String,
    pub prompt: String,
    pub image_url: String,
    pub creator_user_id: String,
    pub likes_count: i64,
    pub created_at: DateTime<Utc>,
}

impl GeneratedItem {
    /// A freshly generated item with no likes
    pub fn new(
        prompt: impl Into<String>,
        image_url: impl Into<String>,
        creator_user_id: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            prompt: prompt.into(),
            image_url: image_url.into(),
            creator_user_id: creator_user_id.into(),
            likes_count: 0,
            // stored with microsecond precision
            created_at: Utc::now().trunc_subsecs(6),
        }
    }
}

/// One user's like of one item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Like {
    pub user_id: String,
    pub item_id: String,
    pub created_at: DateTime<Utc>,
}

/// Per-user profile, created the first time a signed-in user asks for it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: String,
    pub credits: i64,
    pub tier: String,
    pub created_at: DateTime<Utc>,
}

pub const DEFAULT_CREDITS: i64 = 3;
pub const DEFAULT_TIER: &str = "free";

/// Fixed-width UTC timestamp so that text ordering matches time ordering.
pub(crate) fn encode_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn decode_timestamp(raw: &str) -> Result<DateTime<Utc>, sqlx::Error> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))
}

#[derive(sqlx::FromRow)]
pub(crate) struct ItemRow {
    pub id: String,
    pub prompt: String,
    pub image_url: String,
    pub creator_user_id: String,
    pub likes_count: i64,
    pub created_at: String,
}

impl TryFrom<ItemRow> for GeneratedItem {
    type Error = sqlx::Error;

    fn try_from(row: ItemRow) -> Result<Self, Self::Error> {
        Ok(Self {
            created_at: decode_timestamp(&row.created_at)?,
            id: row.id,
            prompt: row.prompt,
            image_url: row.image_url,
            creator_user_id: row.creator_user_id,
            likes_count: row.likes_count,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct LikeRow {
    pub user_id: String,
    pub item_id: String,
    pub created_at: String,
}

impl TryFrom<LikeRow> for Like {
    type Error = sqlx::Error;

    fn try_from(row: LikeRow) -> Result<Self, Self::Error> {
        Ok(Self {
            created_at: decode_timestamp(&row.created_at)?,
            user_id: row.user_id,
            item_id: row.item_id,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct ProfileRow {
    pub user_id: String,
    pub credits: i64,
    pub tier: String,
    pub created_at: String,
}

impl TryFrom<ProfileRow> for Profile {
    type Error = sqlx::Error;

    fn try_from(row: ProfileRow) -> Result<Self, Self::Error> {
        Ok(Self {
            created_at: decode_timestamp(&row.created_at)?,
            user_id: row.user_id,
            credits: row.credits,
            tier: row.tier,
        })
    }
}
