//! In-process store of approval requests awaiting a decision.
//!
//! Records are keyed by the identifier of the approval message posted to the
//! approver. The store is owned by the process and handed to the workflow
//! explicitly; nothing survives a restart. There is no size bound and no
//! eviction, so a request that is never answered stays until shutdown.

use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::domain::approval::{ApprovalDecision, ApprovalRecord, MessageId};
use crate::errors::DomainError;

#[derive(Debug, Default)]
pub struct ApprovalRegistry {
    records: RwLock<HashMap<MessageId, ApprovalRecord>>,
}

impl ApprovalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `record` under its message id. Last write wins; the replaced
    /// record, if any, is returned.
    pub async fn put(&self, record: ApprovalRecord) -> Option<ApprovalRecord> {
        let mut records = self.records.write().await;
        records.insert(record.message_id.clone(), record)
    }

    pub async fn get(&self, message_id: &MessageId) -> Option<ApprovalRecord> {
        let records = self.records.read().await;
        records.get(message_id).cloned()
    }

    pub async fn remove(&self, message_id: &MessageId) -> Option<ApprovalRecord> {
        let mut records = self.records.write().await;
        records.remove(message_id)
    }

    /// Applies `decision` and removes the record under a single write lock.
    ///
    /// Returns `Ok(None)` when nothing is stored under `message_id`, which is
    /// also what a second caller racing the same click observes.
    pub async fn resolve(
        &self,
        message_id: &MessageId,
        decision: ApprovalDecision,
    ) -> Result<Option<ApprovalRecord>, DomainError> {
        let mut records = self.records.write().await;
        let Some(record) = records.get_mut(message_id) else {
            return Ok(None);
        };

        record.resolve(decision)?;
        Ok(records.remove(message_id))
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}
