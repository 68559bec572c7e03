//! Per-key call accounting.
//!
//! Recording never fails the API call it describes: storage errors are logged
//! and dropped.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    clock::Clock,
    error::AppError,
    models::usage::{UsageLog, UsageLogFilter, UsageLogPage, UsageStats},
    store::Store,
};

/// One authenticated call as seen by the auth middleware.
#[derive(Debug, Clone)]
pub struct UsageEvent {
    pub app_key_id: Uuid,
    pub method: String,
    pub endpoint: String,
    pub status_code: u16,
    pub reference_id: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

pub struct UsageAccountant {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl UsageAccountant {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn record(&self, event: UsageEvent) {
        let log = UsageLog {
            id: Uuid::new_v4(),
            app_key_id: event.app_key_id,
            method: event.method,
            endpoint: event.endpoint,
            status_code: event.status_code,
            reference_id: event.reference_id,
            ip_address: event.ip_address,
            user_agent: event.user_agent,
            created_at: self.clock.now(),
        };

        if let Err(e) = self.store.record_usage(&log).await {
            tracing::error!(
                app_key_id = %log.app_key_id,
                endpoint = %log.endpoint,
                error = %e,
                "Failed to record API usage"
            );
        }
    }

    /// Aggregate calls in `[start, end]`. An empty range yields zeroed stats.
    pub async fn stats(
        &self,
        app_key_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<UsageStats, AppError> {
        if start > end {
            return Err(AppError::validation(
                "invalid_date_range",
                "start_date must not be after end_date",
            ));
        }

        let buckets = self.store.usage_buckets(app_key_id, start, end).await?;
        Ok(UsageStats::from_buckets(app_key_id, start, end, &buckets))
    }

    pub async fn logs(
        &self,
        app_key_id: Uuid,
        filter: &UsageLogFilter,
    ) -> Result<UsageLogPage, AppError> {
        let (logs, total) = self.store.list_usage_logs(app_key_id, filter).await?;
        Ok(UsageLogPage {
            logs,
            total,
            limit: filter.limit(),
            offset: filter.offset(),
        })
    }
}
