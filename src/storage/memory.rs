use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::errors::StoreError;
use crate::models::otp::OtpRecord;
use crate::storage::OtpStore;

/// Map-backed store with the same full-record read/write semantics as
/// the Postgres backend. Tests run against this one; nothing in it can
/// fail.
#[derive(Default)]
pub struct MemoryOtpStore {
    records: RwLock<HashMap<String, OtpRecord>>,
}

impl MemoryOtpStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live records, for test assertions.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl OtpStore for MemoryOtpStore {
    async fn fetch(&self, email: &str) -> Result<Option<OtpRecord>, StoreError> {
        Ok(self.records.read().await.get(email).cloned())
    }

    async fn upsert(&self, record: &OtpRecord) -> Result<(), StoreError> {
        self.records
            .write()
            .await
            .insert(record.email.clone(), record.clone());
        Ok(())
    }

    async fn delete(&self, email: &str) -> Result<bool, StoreError> {
        Ok(self.records.write().await.remove(email).is_some())
    }

    async fn sweep_expired(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, record| !record.is_expired(cutoff));
        Ok((before - records.len()) as u64)
    }
}
