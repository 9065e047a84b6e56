//! Record store trait and record types.

use crate::error::Result;
use crate::session::UserId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Store-assigned record identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub i64);

/// A record to insert.
#[derive(Debug, Clone)]
pub struct NewImageRecord {
    /// Signed-in user the record belongs to.
    pub owner_id: UserId,
    /// Data URL of the generated image.
    pub image_reference: String,
    /// Prompt as typed, without the style suffix.
    pub prompt: String,
}

/// A persisted generation record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    /// Store-assigned id.
    pub id: RecordId,
    /// Owning user.
    pub owner_id: UserId,
    /// Data URL of the generated image.
    pub image_reference: String,
    /// Prompt as typed.
    pub prompt: String,
    /// Insertion time.
    pub created_at: DateTime<Utc>,
}

/// Collection of image records isolated per owner.
///
/// Implementations must only return rows whose `owner_id` matches the
/// requested owner.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Inserts one record and returns it with its assigned id and timestamp.
    async fn insert(&self, record: NewImageRecord) -> Result<ImageRecord>;

    /// Lists the owner's records, most recent first.
    async fn list_by_owner(&self, owner_id: &UserId) -> Result<Vec<ImageRecord>>;

    /// Checks that the store is reachable.
    async fn health_check(&self) -> Result<()>;
}
