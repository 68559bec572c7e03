//! Transaction model.
//!
//! Every payment session has exactly one transaction, keyed by
//! `reference == session_id`.
//!
//! # Status Values
//!
//! - `pending`: recorded before the gateway is called
//! - `success`: gateway accepted the payment
//! - `failed`: gateway rejected the payment

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::models::money::format_cents;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Success,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Success => "success",
            TransactionStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }
}

impl std::str::FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransactionStatus::Pending),
            "success" => Ok(TransactionStatus::Success),
            "failed" => Ok(TransactionStatus::Failed),
            _ => Err(format!("Invalid transaction status: {}", s)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Transaction {
    pub id: Uuid,

    /// Equals the owning session's `session_id`. Unique.
    pub reference: String,

    pub merchant_id: Uuid,
    pub customer_email: String,
    pub transaction_type: String,
    pub status: TransactionStatus,
    pub payment_method: String,
    pub gateway: String,
    pub currency: String,
    pub amount_cents: i64,
    pub net_amount_cents: i64,
    pub description: Option<String>,
    pub metadata: Value,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Everything the ledger needs to record a new pending transaction.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub reference: String,
    pub merchant_id: Uuid,
    pub customer_email: String,
    pub payment_method: String,
    pub gateway: String,
    pub currency: String,
    pub amount_cents: i64,
    pub description: Option<String>,
    pub metadata: Value,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    pub id: Uuid,
    pub reference: String,
    pub transaction_type: String,
    pub status: TransactionStatus,
    pub payment_method: String,
    pub gateway: String,
    pub currency: String,
    pub amount: String,
    pub net_amount: String,
    pub customer_email: String,
    pub description: Option<String>,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Transaction> for TransactionResponse {
    fn from(tx: Transaction) -> Self {
        Self {
            id: tx.id,
            reference: tx.reference,
            transaction_type: tx.transaction_type,
            status: tx.status,
            payment_method: tx.payment_method,
            gateway: tx.gateway,
            currency: tx.currency,
            amount: format_cents(tx.amount_cents),
            net_amount: format_cents(tx.net_amount_cents),
            customer_email: tx.customer_email,
            description: tx.description,
            metadata: tx.metadata,
            created_at: tx.created_at,
            updated_at: tx.updated_at,
        }
    }
}

/// Query string of `GET /api/v1/transactions`.
///
/// Amount bounds are decimal strings, like request amounts.
#[derive(Debug, Default, Deserialize)]
pub struct TransactionListQuery {
    pub status: Option<TransactionStatus>,
    pub payment_method: Option<String>,
    pub currency: Option<String>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    pub search: Option<String>,
    pub amount_min: Option<String>,
    pub amount_max: Option<String>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

/// Validated transaction filter, always scoped to one merchant.
#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub status: Option<TransactionStatus>,
    pub payment_method: Option<String>,
    pub currency: Option<String>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,

    /// Case-insensitive substring of reference or customer email.
    pub search: Option<String>,

    pub amount_min_cents: Option<i64>,
    pub amount_max_cents: Option<i64>,
}

impl TransactionFilter {
    pub fn matches(&self, tx: &Transaction) -> bool {
        self.status.is_none_or(|s| tx.status == s)
            && self
                .payment_method
                .as_deref()
                .is_none_or(|m| tx.payment_method == m)
            && self.currency.as_deref().is_none_or(|c| tx.currency == c)
            && self.date_from.is_none_or(|from| tx.created_at >= from)
            && self.date_to.is_none_or(|to| tx.created_at <= to)
            && self.amount_min_cents.is_none_or(|min| tx.amount_cents >= min)
            && self.amount_max_cents.is_none_or(|max| tx.amount_cents <= max)
            && self.search.as_deref().is_none_or(|needle| {
                let needle = needle.to_lowercase();
                tx.reference.to_lowercase().contains(&needle)
                    || tx.customer_email.to_lowercase().contains(&needle)
            })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl PageRequest {
    pub const DEFAULT_PAGE_SIZE: u32 = 20;
    pub const MAX_PAGE_SIZE: u32 = 100;

    pub fn new(page: Option<u32>, page_size: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            page_size: page_size
                .unwrap_or(Self::DEFAULT_PAGE_SIZE)
                .clamp(1, Self::MAX_PAGE_SIZE),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.page_size)
    }
}

#[derive(Debug, Serialize)]
pub struct TransactionPage {
    pub transactions: Vec<TransactionResponse>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u64,
}

/// Per-status count and volume in a date range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusBucket {
    pub status: TransactionStatus,
    pub count: u64,
    pub volume_cents: i64,
}

#[derive(Debug, Deserialize)]
pub struct TransactionStatsQuery {
    /// `today`, `week`, `month`, `quarter` or `year`.
    pub period: Option<String>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct TransactionStats {
    pub date_from: DateTime<Utc>,
    pub date_to: DateTime<Utc>,
    pub total_transactions: u64,
    pub by_status: BTreeMap<TransactionStatus, u64>,

    /// Percentage of transactions that succeeded, two decimals.
    pub success_rate: f64,

    /// Sum of successful amounts.
    pub total_volume: String,
}

impl TransactionStats {
    pub fn from_buckets(
        date_from: DateTime<Utc>,
        date_to: DateTime<Utc>,
        buckets: &[StatusBucket],
    ) -> Self {
        let mut by_status = BTreeMap::new();
        let mut total = 0u64;
        let mut successful = 0u64;
        let mut volume = 0i64;

        for bucket in buckets {
            total += bucket.count;
            *by_status.entry(bucket.status).or_insert(0) += bucket.count;
            if bucket.status == TransactionStatus::Success {
                successful += bucket.count;
                volume += bucket.volume_cents;
            }
        }

        let success_rate = if total == 0 {
            0.0
        } else {
            ((successful as f64 * 100.0 / total as f64) * 100.0).round() / 100.0
        };

        Self {
            date_from,
            date_to,
            total_transactions: total,
            by_status,
            success_rate,
            total_volume: format_cents(volume),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_size_is_capped() {
        let page = PageRequest::new(Some(3), Some(500));
        assert_eq!(page.page_size, 100);
        assert_eq!(page.offset(), 200);
        assert_eq!(PageRequest::new(Some(0), None).page, 1);
    }

    #[test]
    fn stats_count_only_successful_volume() {
        let now = Utc::now();
        let stats = TransactionStats::from_buckets(
            now,
            now,
            &[
                StatusBucket { status: TransactionStatus::Success, count: 3, volume_cents: 30_000 },
                StatusBucket { status: TransactionStatus::Failed, count: 1, volume_cents: 500 },
            ],
        );
        assert_eq!(stats.total_transactions, 4);
        assert_eq!(stats.success_rate, 75.0);
        assert_eq!(stats.total_volume, "300.00");
    }
}
