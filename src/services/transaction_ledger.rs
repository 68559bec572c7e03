//! Transaction ledger.
//!
//! One transaction per reference. Status only moves forward:
//!
//! ```text
//! pending ──▶ success
//!    │
//!    └──────▶ failed
//! ```
//!
//! Both the uniqueness and the transition rule are enforced by the store, so
//! concurrent writers cannot both win.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    clock::Clock,
    error::AppError,
    models::{
        money::{normalize_currency, parse_amount},
        transaction::{
            NewTransaction, PageRequest, Transaction, TransactionFilter, TransactionListQuery,
            TransactionPage, TransactionStats, TransactionStatsQuery, TransactionStatus,
        },
    },
    store::{Store, StoreError},
};

/// Window used when no period or date range is given.
const DEFAULT_STATS_DAYS: i64 = 30;

pub struct TransactionLedger {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl TransactionLedger {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Record a pending transaction.
    ///
    /// # Errors
    ///
    /// `Conflict(duplicate_reference)` when the reference already exists.
    pub async fn create_once(&self, new: NewTransaction) -> Result<Transaction, AppError> {
        let now = self.clock.now();
        let tx = Transaction {
            id: Uuid::new_v4(),
            reference: new.reference,
            merchant_id: new.merchant_id,
            customer_email: new.customer_email,
            transaction_type: "payment".to_string(),
            status: TransactionStatus::Pending,
            payment_method: new.payment_method,
            gateway: new.gateway,
            currency: new.currency,
            amount_cents: new.amount_cents,
            net_amount_cents: new.amount_cents,
            description: new.description,
            metadata: new.metadata,
            ip_address: new.ip_address,
            user_agent: new.user_agent,
            created_at: now,
            updated_at: now,
        };

        match self.store.insert_transaction(&tx).await {
            Ok(()) => {
                tracing::info!(
                    transaction_id = %tx.id,
                    reference = %tx.reference,
                    amount_cents = tx.amount_cents,
                    "Transaction recorded"
                );
                Ok(tx)
            }
            Err(StoreError::Duplicate(_)) => Err(AppError::conflict(
                "duplicate_reference",
                format!("Transaction with reference '{}' already exists", tx.reference),
            )),
            Err(e) => Err(e.into()),
        }
    }

    /// Move a pending transaction to `success` or `failed`.
    pub async fn update_status(
        &self,
        reference: &str,
        status: TransactionStatus,
    ) -> Result<Transaction, AppError> {
        if !status.is_terminal() {
            return Err(invalid_transition(status));
        }

        match self
            .store
            .settle_transaction(reference, status, self.clock.now())
            .await?
        {
            Some(tx) => {
                tracing::info!(reference, status = status.as_str(), "Transaction settled");
                Ok(tx)
            }
            None => {
                self.find_by_reference(reference).await?;
                Err(invalid_transition(status))
            }
        }
    }

    pub async fn find_by_reference(&self, reference: &str) -> Result<Transaction, AppError> {
        self.store
            .find_transaction_by_reference(reference)
            .await?
            .ok_or(AppError::NotFound("Transaction"))
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Transaction, AppError> {
        self.store
            .find_transaction(id)
            .await?
            .ok_or(AppError::NotFound("Transaction"))
    }

    pub async fn list(
        &self,
        merchant_id: Uuid,
        query: TransactionListQuery,
    ) -> Result<TransactionPage, AppError> {
        let page = PageRequest::new(query.page, query.page_size);
        let filter = TransactionFilter {
            status: query.status,
            payment_method: query.payment_method.map(|m| m.trim().to_lowercase()),
            currency: query.currency.as_deref().map(normalize_currency),
            date_from: query.date_from,
            date_to: query.date_to,
            search: query
                .search
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            amount_min_cents: amount_bound(query.amount_min)?,
            amount_max_cents: amount_bound(query.amount_max)?,
        };

        let (transactions, total) = self.store.list_transactions(merchant_id, &filter, page).await?;

        Ok(TransactionPage {
            transactions: transactions.into_iter().map(Into::into).collect(),
            total,
            page: page.page,
            page_size: page.page_size,
            total_pages: total.div_ceil(u64::from(page.page_size)),
        })
    }

    pub async fn stats(
        &self,
        merchant_id: Uuid,
        query: TransactionStatsQuery,
    ) -> Result<TransactionStats, AppError> {
        let (from, to) = stats_window(&query, self.clock.now())?;
        let buckets = self.store.transaction_buckets(merchant_id, from, to).await?;
        Ok(TransactionStats::from_buckets(from, to, &buckets))
    }
}

fn invalid_transition(to: TransactionStatus) -> AppError {
    AppError::state(
        "invalid_transition",
        format!("Transaction cannot move to {}", to.as_str()),
    )
}

fn amount_bound(raw: Option<String>) -> Result<Option<i64>, AppError> {
    raw.map(|amount| parse_amount(&Value::String(amount)))
        .transpose()
}

/// Resolve a named period or an explicit range. Periods end at `now`.
fn stats_window(
    query: &TransactionStatsQuery,
    now: DateTime<Utc>,
) -> Result<(DateTime<Utc>, DateTime<Utc>), AppError> {
    if let Some(period) = query.period.as_deref() {
        let from = match period {
            "today" => now
                .date_naive()
                .and_hms_opt(0, 0, 0)
                .map(|start| start.and_utc())
                .unwrap_or(now),
            "week" => now - Duration::days(7),
            "month" => now - Duration::days(30),
            "quarter" => now - Duration::days(90),
            "year" => now - Duration::days(365),
            _ => {
                return Err(AppError::validation(
                    "invalid_period",
                    "Period must be one of: today, week, month, quarter, year",
                ));
            }
        };
        return Ok((from, now));
    }

    let to = query.date_to.unwrap_or(now);
    let from = query
        .date_from
        .unwrap_or(to - Duration::days(DEFAULT_STATS_DAYS));
    if from > to {
        return Err(AppError::validation(
            "invalid_date_range",
            "date_from must not be after date_to",
        ));
    }
    Ok((from, to))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{clock::ManualClock, store::MemoryStore};

    fn ledger() -> TransactionLedger {
        TransactionLedger::new(
            Arc::new(MemoryStore::new()),
            Arc::new(ManualClock::new(Utc::now())),
        )
    }

    fn new_tx(reference: &str) -> NewTransaction {
        NewTransaction {
            reference: reference.to_string(),
            merchant_id: Uuid::new_v4(),
            customer_email: "jane@example.com".into(),
            payment_method: "card".into(),
            gateway: "transvoucher".into(),
            currency: "USD".into(),
            amount_cents: 1000,
            description: None,
            metadata: Value::Null,
            ip_address: None,
            user_agent: None,
        }
    }

    #[tokio::test]
    async fn reference_is_unique() {
        let ledger = ledger();
        ledger.create_once(new_tx("ref-1")).await.unwrap();
        let err = ledger.create_once(new_tx("ref-1")).await.unwrap_err();
        assert_eq!(err.code(), "duplicate_reference");
    }

    #[tokio::test]
    async fn settles_only_once() {
        let ledger = ledger();
        ledger.create_once(new_tx("ref-2")).await.unwrap();

        let tx = ledger
            .update_status("ref-2", TransactionStatus::Success)
            .await
            .unwrap();
        assert_eq!(tx.status, TransactionStatus::Success);

        let err = ledger
            .update_status("ref-2", TransactionStatus::Failed)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "invalid_transition");

        let err = ledger
            .update_status("ref-2", TransactionStatus::Pending)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "invalid_transition");

        let err = ledger
            .update_status("missing", TransactionStatus::Success)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn periods() {
        let now = DateTime::parse_from_rfc3339("2025-06-15T12:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let query = |period: &str| TransactionStatsQuery {
            period: Some(period.to_string()),
            date_from: None,
            date_to: None,
        };

        let (from, to) = stats_window(&query("today"), now).unwrap();
        assert_eq!(from.to_rfc3339(), "2025-06-15T00:00:00+00:00");
        assert_eq!(to, now);

        let (from, _) = stats_window(&query("quarter"), now).unwrap();
        assert_eq!(now - from, Duration::days(90));

        assert_eq!(
            stats_window(&query("decade"), now).unwrap_err().code(),
            "invalid_period"
        );

        let (from, _) = stats_window(
            &TransactionStatsQuery {
                period: None,
                date_from: None,
                date_to: None,
            },
            now,
        )
        .unwrap();
        assert_eq!(now - from, Duration::days(30));
    }
}
