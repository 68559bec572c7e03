//! In-memory [`Store`].
//!
//! All tables live behind one async mutex, so every method is atomic the way
//! a single SQL statement is.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{PartnerChanges, Store, StoreError, StoreResult};
use crate::models::{
    app_key::{AppKey, AppKeyFilter, AppKeySettings, AppKeyStatus},
    merchant::Merchant,
    partner::Partner,
    session::{PaymentSession, SessionOutcome},
    transaction::{PageRequest, StatusBucket, Transaction, TransactionFilter, TransactionStatus},
    usage::{UsageBucket, UsageLog, UsageLogFilter},
};

#[derive(Default)]
struct Tables {
    merchants: HashMap<Uuid, Merchant>,
    partners: HashMap<Uuid, Partner>,
    app_keys: HashMap<Uuid, AppKey>,
    usage_logs: Vec<UsageLog>,
    sessions: HashMap<Uuid, PaymentSession>,
    transactions: HashMap<Uuid, Transaction>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn insert_merchant(&self, merchant: &Merchant) -> StoreResult<()> {
        let mut t = self.tables.lock().await;
        if t.merchants.contains_key(&merchant.id) {
            return Err(StoreError::Duplicate("merchant"));
        }
        t.merchants.insert(merchant.id, merchant.clone());
        Ok(())
    }

    async fn find_merchant(&self, id: Uuid) -> StoreResult<Option<Merchant>> {
        Ok(self.tables.lock().await.merchants.get(&id).cloned())
    }

    async fn insert_partner(&self, partner: &Partner) -> StoreResult<()> {
        let mut t = self.tables.lock().await;
        if t.partners.values().any(|p| p.code == partner.code) {
            return Err(StoreError::Duplicate("partner code"));
        }
        t.partners.insert(partner.id, partner.clone());
        Ok(())
    }

    async fn find_partner(&self, id: Uuid) -> StoreResult<Option<Partner>> {
        Ok(self.tables.lock().await.partners.get(&id).cloned())
    }

    async fn list_partners(&self) -> StoreResult<Vec<Partner>> {
        let t = self.tables.lock().await;
        let mut partners: Vec<Partner> = t.partners.values().cloned().collect();
        partners.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(partners)
    }

    async fn update_partner(
        &self,
        id: Uuid,
        changes: &PartnerChanges,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Partner>> {
        let mut t = self.tables.lock().await;
        let Some(partner) = t.partners.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(name) = &changes.name {
            partner.name = name.clone();
        }
        if let Some(email) = &changes.contact_email {
            partner.contact_email = Some(email.clone());
        }
        if let Some(url) = &changes.webhook_url {
            partner.webhook_url = url.clone();
        }
        if let Some(active) = changes.is_active {
            partner.is_active = active;
        }
        if let Some(verified) = changes.is_verified {
            partner.is_verified = verified;
        }
        partner.updated_at = now;
        Ok(Some(partner.clone()))
    }

    async fn set_partner_webhook_secret(
        &self,
        id: Uuid,
        secret: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut t = self.tables.lock().await;
        match t.partners.get_mut(&id) {
            Some(partner) => {
                partner.webhook_secret = secret.to_string();
                partner.updated_at = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn insert_app_key(&self, key: &AppKey) -> StoreResult<()> {
        let mut t = self.tables.lock().await;
        if t.app_keys.values().any(|k| k.public_key == key.public_key) {
            return Err(StoreError::Duplicate("public key"));
        }
        t.app_keys.insert(key.id, key.clone());
        Ok(())
    }

    async fn find_app_key(&self, id: Uuid) -> StoreResult<Option<AppKey>> {
        Ok(self.tables.lock().await.app_keys.get(&id).cloned())
    }

    async fn find_app_key_by_public_key(&self, public_key: &str) -> StoreResult<Option<AppKey>> {
        let t = self.tables.lock().await;
        Ok(t.app_keys
            .values()
            .find(|k| k.public_key == public_key)
            .cloned())
    }

    async fn list_app_keys(&self, filter: &AppKeyFilter) -> StoreResult<Vec<AppKey>> {
        let t = self.tables.lock().await;
        let mut keys: Vec<AppKey> = t
            .app_keys
            .values()
            .filter(|k| filter.partner_id.is_none_or(|p| k.partner_id == p))
            .filter(|k| filter.status.is_none_or(|s| k.status == s))
            .filter(|k| filter.key_type.is_none_or(|kt| k.key_type == kt))
            .cloned()
            .collect();
        keys.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(keys)
    }

    async fn set_app_key_status(
        &self,
        id: Uuid,
        status: AppKeyStatus,
        revoked_by: Option<&str>,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<AppKey>> {
        let mut t = self.tables.lock().await;
        let Some(key) = t.app_keys.get_mut(&id) else {
            return Ok(None);
        };
        if key.status == AppKeyStatus::Revoked {
            return Ok(None);
        }
        key.status = status;
        if status == AppKeyStatus::Revoked {
            key.revoked_at = Some(now);
            key.revoked_by = revoked_by.map(str::to_string);
        }
        key.updated_at = now;
        Ok(Some(key.clone()))
    }

    async fn replace_app_key_secret(
        &self,
        id: Uuid,
        secret_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<AppKey>> {
        let mut t = self.tables.lock().await;
        match t.app_keys.get_mut(&id) {
            Some(key) if key.status != AppKeyStatus::Revoked => {
                key.secret_hash = secret_hash.to_string();
                key.updated_at = now;
                Ok(Some(key.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn update_app_key_settings(
        &self,
        id: Uuid,
        settings: &AppKeySettings,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<AppKey>> {
        let mut t = self.tables.lock().await;
        let Some(key) = t.app_keys.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(name) = &settings.name {
            key.name = name.clone();
        }
        if let Some(scopes) = &settings.scopes {
            key.scopes = scopes.clone();
        }
        if let Some(expires_at) = settings.expires_at {
            key.expires_at = Some(expires_at);
        }
        if let Some(ips) = &settings.allowed_ips {
            key.allowed_ips = ips.clone();
        }
        key.updated_at = now;
        Ok(Some(key.clone()))
    }

    async fn record_usage(&self, log: &UsageLog) -> StoreResult<()> {
        let mut t = self.tables.lock().await;
        if let Some(key) = t.app_keys.get_mut(&log.app_key_id) {
            key.usage_count += 1;
            key.last_used_at = Some(log.created_at);
        }
        t.usage_logs.push(log.clone());
        Ok(())
    }

    async fn usage_buckets(
        &self,
        app_key_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<UsageBucket>> {
        let t = self.tables.lock().await;
        let mut counts: HashMap<(String, u16), u64> = HashMap::new();
        for log in t.usage_logs.iter().filter(|l| {
            l.app_key_id == app_key_id && l.created_at >= start && l.created_at <= end
        }) {
            *counts
                .entry((log.method.clone(), log.status_code))
                .or_default() += 1;
        }
        Ok(counts
            .into_iter()
            .map(|((method, status_code), count)| UsageBucket {
                method,
                status_code,
                count,
            })
            .collect())
    }

    async fn list_usage_logs(
        &self,
        app_key_id: Uuid,
        filter: &UsageLogFilter,
    ) -> StoreResult<(Vec<UsageLog>, u64)> {
        let t = self.tables.lock().await;
        let mut logs: Vec<&UsageLog> = t
            .usage_logs
            .iter()
            .filter(|l| l.app_key_id == app_key_id)
            .filter(|l| {
                filter
                    .method
                    .as_deref()
                    .is_none_or(|m| l.method.eq_ignore_ascii_case(m))
            })
            .filter(|l| filter.status_code.is_none_or(|s| l.status_code == s))
            .collect();
        logs.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = logs.len() as u64;
        let page = logs
            .into_iter()
            .skip(filter.offset() as usize)
            .take(filter.limit() as usize)
            .cloned()
            .collect();
        Ok((page, total))
    }

    async fn insert_session(&self, session: &PaymentSession) -> StoreResult<()> {
        let mut t = self.tables.lock().await;
        if t.sessions.contains_key(&session.session_id) {
            return Err(StoreError::Duplicate("session"));
        }
        if t.sessions.values().any(|s| {
            s.merchant_id == session.merchant_id && s.reference_id == session.reference_id
        }) {
            return Err(StoreError::Duplicate("reference"));
        }
        t.sessions.insert(session.session_id, session.clone());
        Ok(())
    }

    async fn find_session(&self, session_id: Uuid) -> StoreResult<Option<PaymentSession>> {
        Ok(self.tables.lock().await.sessions.get(&session_id).cloned())
    }

    async fn claim_session_dispatch(
        &self,
        session_id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<PaymentSession>> {
        let mut t = self.tables.lock().await;
        let Some(session) = t.sessions.get_mut(&session_id) else {
            return Ok(None);
        };
        if !session.is_pending() || session.dispatched_at.is_some() {
            return Ok(None);
        }
        session.dispatched_at = Some(now);
        Ok(Some(session.clone()))
    }

    async fn release_session_dispatch(&self, session_id: Uuid) -> StoreResult<()> {
        let mut t = self.tables.lock().await;
        if let Some(session) = t.sessions.get_mut(&session_id).filter(|s| s.is_pending()) {
            session.dispatched_at = None;
        }
        Ok(())
    }

    async fn finish_session(
        &self,
        session_id: Uuid,
        outcome: &SessionOutcome,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<PaymentSession>> {
        let mut t = self.tables.lock().await;
        let Some(session) = t.sessions.get_mut(&session_id) else {
            return Ok(None);
        };
        if !session.is_pending() {
            return Ok(None);
        }
        session.status = outcome.status();
        session.completed_at = Some(now);
        match outcome {
            SessionOutcome::Completed {
                gateway_reference,
                payment_url,
            } => {
                session.gateway_reference = gateway_reference.clone();
                session.payment_url = payment_url.clone();
            }
            SessionOutcome::Failed { reason } => {
                session.failure_reason = Some(reason.clone());
            }
        }
        Ok(Some(session.clone()))
    }

    async fn insert_transaction(&self, tx: &Transaction) -> StoreResult<()> {
        let mut t = self.tables.lock().await;
        if t.transactions.values().any(|x| x.reference == tx.reference) {
            return Err(StoreError::Duplicate("reference"));
        }
        t.transactions.insert(tx.id, tx.clone());
        Ok(())
    }

    async fn find_transaction(&self, id: Uuid) -> StoreResult<Option<Transaction>> {
        Ok(self.tables.lock().await.transactions.get(&id).cloned())
    }

    async fn find_transaction_by_reference(
        &self,
        reference: &str,
    ) -> StoreResult<Option<Transaction>> {
        let t = self.tables.lock().await;
        Ok(t.transactions
            .values()
            .find(|x| x.reference == reference)
            .cloned())
    }

    async fn settle_transaction(
        &self,
        reference: &str,
        status: TransactionStatus,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Transaction>> {
        let mut t = self.tables.lock().await;
        match t
            .transactions
            .values_mut()
            .find(|x| x.reference == reference)
        {
            Some(tx) if tx.status == TransactionStatus::Pending => {
                tx.status = status;
                tx.updated_at = now;
                Ok(Some(tx.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn list_transactions(
        &self,
        merchant_id: Uuid,
        filter: &TransactionFilter,
        page: PageRequest,
    ) -> StoreResult<(Vec<Transaction>, u64)> {
        let t = self.tables.lock().await;
        let mut matching: Vec<&Transaction> = t
            .transactions
            .values()
            .filter(|x| x.merchant_id == merchant_id && filter.matches(x))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matching.len() as u64;
        let rows = matching
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.page_size as usize)
            .cloned()
            .collect();
        Ok((rows, total))
    }

    async fn transaction_buckets(
        &self,
        merchant_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<StatusBucket>> {
        let t = self.tables.lock().await;
        let mut buckets: HashMap<TransactionStatus, (u64, i64)> = HashMap::new();
        for tx in t.transactions.values().filter(|x| {
            x.merchant_id == merchant_id && x.created_at >= from && x.created_at <= to
        }) {
            let entry = buckets.entry(tx.status).or_default();
            entry.0 += 1;
            entry.1 += tx.amount_cents;
        }
        Ok(buckets
            .into_iter()
            .map(|(status, (count, volume_cents))| StatusBucket {
                status,
                count,
                volume_cents,
            })
            .collect())
    }
}
