//! Storage seam.
//!
//! [`PgStore`] is the production implementation. [`MemoryStore`] honours the
//! same contract, including unique constraints and conditional updates, and
//! backs the test suite and `memory://` development mode.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{
    app_key::{AppKey, AppKeyFilter, AppKeySettings, AppKeyStatus},
    merchant::Merchant,
    partner::Partner,
    session::{PaymentSession, SessionOutcome},
    transaction::{PageRequest, StatusBucket, Transaction, TransactionFilter, TransactionStatus},
    usage::{UsageBucket, UsageLog, UsageLogFilter},
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A unique constraint rejected the write. Carries what was duplicated.
    #[error("duplicate {0}")]
    Duplicate(&'static str),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Fields of a partner that an admin may change.
#[derive(Debug, Default, Clone)]
pub struct PartnerChanges {
    pub name: Option<String>,
    pub contact_email: Option<String>,
    /// `Some(None)` clears the URL.
    pub webhook_url: Option<Option<String>>,
    pub is_active: Option<bool>,
    pub is_verified: Option<bool>,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn ping(&self) -> StoreResult<()>;

    // Merchants

    async fn insert_merchant(&self, merchant: &Merchant) -> StoreResult<()>;

    async fn find_merchant(&self, id: Uuid) -> StoreResult<Option<Merchant>>;

    // Partners

    /// Fails with `Duplicate("partner code")` when the code is taken.
    async fn insert_partner(&self, partner: &Partner) -> StoreResult<()>;

    async fn find_partner(&self, id: Uuid) -> StoreResult<Option<Partner>>;

    async fn list_partners(&self) -> StoreResult<Vec<Partner>>;

    async fn update_partner(
        &self,
        id: Uuid,
        changes: &PartnerChanges,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Partner>>;

    async fn set_partner_webhook_secret(
        &self,
        id: Uuid,
        secret: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<bool>;

    // App keys

    /// Fails with `Duplicate("public key")` on a public-key collision.
    async fn insert_app_key(&self, key: &AppKey) -> StoreResult<()>;

    async fn find_app_key(&self, id: Uuid) -> StoreResult<Option<AppKey>>;

    async fn find_app_key_by_public_key(&self, public_key: &str) -> StoreResult<Option<AppKey>>;

    async fn list_app_keys(&self, filter: &AppKeyFilter) -> StoreResult<Vec<AppKey>>;

    /// Set the status of a key that is not revoked. Revoking also stamps
    /// `revoked_at` and `revoked_by`. Returns `None` when no row qualified.
    async fn set_app_key_status(
        &self,
        id: Uuid,
        status: AppKeyStatus,
        revoked_by: Option<&str>,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<AppKey>>;

    /// Replace the secret hash unless the key is revoked.
    async fn replace_app_key_secret(
        &self,
        id: Uuid,
        secret_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<AppKey>>;

    async fn update_app_key_settings(
        &self,
        id: Uuid,
        settings: &AppKeySettings,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<AppKey>>;

    // Usage

    /// Append a log row and bump the key's usage counters in one unit.
    async fn record_usage(&self, log: &UsageLog) -> StoreResult<()>;

    async fn usage_buckets(
        &self,
        app_key_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<UsageBucket>>;

    /// Newest first, with the total count matching the filter.
    async fn list_usage_logs(
        &self,
        app_key_id: Uuid,
        filter: &UsageLogFilter,
    ) -> StoreResult<(Vec<UsageLog>, u64)>;

    // Payment sessions

    /// Fails with `Duplicate("reference")` when the merchant already has a
    /// session with this reference.
    async fn insert_session(&self, session: &PaymentSession) -> StoreResult<()>;

    async fn find_session(&self, session_id: Uuid) -> StoreResult<Option<PaymentSession>>;

    /// Stamp `dispatched_at`, only while the session is pending and unclaimed.
    async fn claim_session_dispatch(
        &self,
        session_id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<PaymentSession>>;

    /// Clear `dispatched_at` on a session that is still pending.
    async fn release_session_dispatch(&self, session_id: Uuid) -> StoreResult<()>;

    /// Terminal write, applied only while the session is pending.
    async fn finish_session(
        &self,
        session_id: Uuid,
        outcome: &SessionOutcome,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<PaymentSession>>;

    // Transactions

    /// Fails with `Duplicate("reference")` when the reference exists.
    async fn insert_transaction(&self, tx: &Transaction) -> StoreResult<()>;

    async fn find_transaction(&self, id: Uuid) -> StoreResult<Option<Transaction>>;

    async fn find_transaction_by_reference(
        &self,
        reference: &str,
    ) -> StoreResult<Option<Transaction>>;

    /// Move a pending transaction to `status`. `None` when it was not pending.
    async fn settle_transaction(
        &self,
        reference: &str,
        status: TransactionStatus,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Transaction>>;

    /// Newest first, with the total count matching the filter.
    async fn list_transactions(
        &self,
        merchant_id: Uuid,
        filter: &TransactionFilter,
        page: PageRequest,
    ) -> StoreResult<(Vec<Transaction>, u64)>;

    async fn transaction_buckets(
        &self,
        merchant_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<StatusBucket>>;
}
