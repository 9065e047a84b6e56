//! Writes and reads generation history for the signed-in user.

use crate::error::{PromptPixError, Result};
use crate::image::GenerationResult;
use crate::persistence::store::{ImageRecord, NewImageRecord, RecordStore};
use crate::session::Session;
use std::sync::Arc;

/// Scopes record-store access to the caller's session.
///
/// `save` issues exactly one insert and never retries; a failure is returned
/// to the caller to report.
#[derive(Clone)]
pub struct PersistenceGateway {
    store: Arc<dyn RecordStore>,
}

impl PersistenceGateway {
    /// Creates a gateway over the given store.
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Records a successful generation for the signed-in user.
    pub async fn save(&self, session: &Session, result: &GenerationResult) -> Result<ImageRecord> {
        let identity = session.identity().ok_or(PromptPixError::NoSession)?;

        let record = self
            .store
            .insert(NewImageRecord {
                owner_id: identity.user_id.clone(),
                image_reference: result.image_reference(),
                prompt: result.source_prompt.clone(),
            })
            .await
            .inspect_err(|e| {
                tracing::warn!(owner_id = %identity.user_id, "failed to save image record: {e}");
            })?;

        tracing::info!(
            owner_id = %record.owner_id,
            record_id = record.id.0,
            "saved image record"
        );
        Ok(record)
    }

    /// Lists the signed-in user's records, most recent first.
    pub async fn list_for_owner(&self, session: &Session) -> Result<Vec<ImageRecord>> {
        let identity = session.identity().ok_or(PromptPixError::NoSession)?;
        let records = self.store.list_by_owner(&identity.user_id).await?;

        let total = records.len();
        let owned: Vec<ImageRecord> = records
            .into_iter()
            .filter(|r| r.owner_id == identity.user_id)
            .collect();
        if owned.len() != total {
            tracing::warn!(
                owner_id = %identity.user_id,
                dropped = total - owned.len(),
                "store returned records for another owner"
            );
        }
        Ok(owned)
    }
}
