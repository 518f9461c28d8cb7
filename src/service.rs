use std::sync::Arc;

use tracing::{info, warn};

use crate::attachments::{collect_garbage, resolve_uploads, CollectionReport, Upload};
use crate::config::UploadLimits;
use crate::error::StoreError;
use crate::models::*;
use crate::repo::MessageRepo;
use crate::storage::{AttachmentStore, AttachmentStoreError};

/// Owns the message lifecycle and keeps record contents and stored files in step.
///
/// Ordering per operation: files are written before the row that names them,
/// and files are removed only after the row that named them is gone or no
/// longer lists them. There is no lock across the row/file boundary.
#[derive(Clone)]
pub struct MessageStore {
    repo: Arc<dyn MessageRepo>,
    files: Arc<dyn AttachmentStore>,
    limits: UploadLimits,
}

impl MessageStore {
    pub fn new(repo: Arc<dyn MessageRepo>, files: Arc<dyn AttachmentStore>, limits: UploadLimits) -> Self {
        Self { repo, files, limits }
    }

    pub fn limits(&self) -> &UploadLimits { &self.limits }

    pub async fn list(&self, owner_id: OwnerId) -> Result<Vec<Message>, StoreError> {
        Ok(self.repo.list_messages(owner_id).await?)
    }

    pub async fn get(&self, id: Id, owner_id: OwnerId) -> Result<Message, StoreError> {
        Ok(self.repo.get_message(id, owner_id).await?)
    }

    /// Bytes and content type of one stored attachment.
    pub async fn attachment(&self, name: &str) -> Result<(Vec<u8>, String), StoreError> {
        match self.files.load(name).await {
            Ok(found) => Ok(found),
            Err(AttachmentStoreError::NotFound | AttachmentStoreError::InvalidName(_)) => Err(StoreError::AttachmentNotFound),
            Err(e) => Err(StoreError::StorageRead(e.to_string())),
        }
    }

    pub async fn create(&self, owner_id: OwnerId, mut new: NewMessage, uploads: Vec<Upload>) -> Result<Message, StoreError> {
        if new.title.trim().is_empty() {
            return Err(StoreError::Validation("title is required".into()));
        }
        new.attachments = resolve_uploads(self.files.as_ref(), uploads, self.limits.max_files).await?;
        let written = new.attachments.clone();

        match self.repo.create_message(owner_id, new).await {
            Ok(message) => {
                info!(owner_id, message_id = message.id, attachments = message.attachments.len(), "message created");
                Ok(message)
            }
            Err(e) => {
                warn!(owner_id, "insert failed, collecting {} fresh attachment(s)", written.len());
                collect_garbage(self.files.as_ref(), written.as_slice()).await;
                Err(e.into())
            }
        }
    }

    /// Apply a partial update. A non-empty `uploads` batch replaces the stored
    /// attachment list wholesale and the displaced files are collected; an
    /// empty batch leaves attachments untouched.
    pub async fn update(
        &self,
        id: Id,
        owner_id: OwnerId,
        mut changes: UpdateMessage,
        uploads: Vec<Upload>,
    ) -> Result<Message, StoreError> {
        if changes.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(StoreError::Validation("title must not be empty".into()));
        }
        let written = if uploads.is_empty() {
            None
        } else {
            Some(resolve_uploads(self.files.as_ref(), uploads, self.limits.max_files).await?)
        };
        changes.attachments = written.clone();

        let updated = match self.repo.update_message(id, owner_id, changes).await {
            Ok(updated) => updated,
            Err(e) => {
                if let Some(fresh) = &written {
                    collect_garbage(self.files.as_ref(), fresh.as_slice()).await;
                }
                return Err(e.into());
            }
        };

        let UpdatedMessage { message, replaced } = updated;
        // never drop a file the record still lists
        let orphaned: Vec<String> = replaced
            .into_inner()
            .into_iter()
            .filter(|name| !message.attachments.contains(name))
            .collect();
        info!(owner_id, message_id = id, orphaned = orphaned.len(), "message updated");
        collect_garbage(self.files.as_ref(), &orphaned).await;
        Ok(message)
    }

    /// Remove the row, then its files. The row removal stands even when some
    /// files cannot be removed; those show up in the returned report.
    pub async fn delete(&self, id: Id, owner_id: OwnerId) -> Result<CollectionReport, StoreError> {
        let removed = self.repo.delete_message(id, owner_id).await?;
        info!(owner_id, message_id = id, attachments = removed.attachments.len(), "message deleted");
        Ok(collect_garbage(self.files.as_ref(), removed.attachments.as_slice()).await)
    }
}
