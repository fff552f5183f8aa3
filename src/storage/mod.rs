//! Persistence seam for OTP records.
//!
//! The store is deliberately dumb: fetch a whole record, write a whole
//! record, delete, and a bulk sweep of expired rows. All policy
//! (expiry, attempts, rate windows) lives in the service layer, so a
//! backend only needs per-record read/write semantics. Callers pass
//! emails already normalized (trimmed, lowercased).

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::StoreError;
use crate::models::otp::OtpRecord;

pub mod memory;
pub mod postgres;

pub use memory::MemoryOtpStore;
pub use postgres::PgOtpStore;

#[async_trait]
pub trait OtpStore: Send + Sync {
    /// Current record for this email, if one exists.
    async fn fetch(&self, email: &str) -> Result<Option<OtpRecord>, StoreError>;

    /// Full-record write: create the record or replace every field of
    /// the existing one. No partial updates, no compare-and-set.
    async fn upsert(&self, record: &OtpRecord) -> Result<(), StoreError>;

    /// Remove the record. Returns whether one was there to remove.
    async fn delete(&self, email: &str) -> Result<bool, StoreError>;

    /// Remove every record whose code expired at or before `cutoff`.
    /// Returns the number removed.
    async fn sweep_expired(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;
}
