use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One authenticated API call. Append-only.
#[derive(Debug, Clone, Serialize)]
pub struct UsageLog {
    pub id: Uuid,
    pub app_key_id: Uuid,
    pub method: String,
    pub endpoint: String,
    pub status_code: u16,
    pub reference_id: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Count of calls sharing a method and status code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageBucket {
    pub method: String,
    pub status_code: u16,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct UsageStats {
    pub app_key_id: Uuid,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub total_calls: u64,
    pub successful_calls: u64,
    pub error_calls: u64,

    /// Percentage of calls with status < 400, two decimals.
    pub success_rate: f64,

    pub by_status_code: BTreeMap<u16, u64>,
    pub by_method: BTreeMap<String, u64>,
}

impl UsageStats {
    /// Fold storage buckets into totals. No buckets yields zeroed counters.
    pub fn from_buckets(
        app_key_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        buckets: &[UsageBucket],
    ) -> Self {
        let mut stats = UsageStats {
            app_key_id,
            start,
            end,
            total_calls: 0,
            successful_calls: 0,
            error_calls: 0,
            success_rate: 0.0,
            by_status_code: BTreeMap::new(),
            by_method: BTreeMap::new(),
        };

        for bucket in buckets {
            stats.total_calls += bucket.count;
            if bucket.status_code < 400 {
                stats.successful_calls += bucket.count;
            } else {
                stats.error_calls += bucket.count;
            }
            *stats.by_status_code.entry(bucket.status_code).or_default() += bucket.count;
            *stats.by_method.entry(bucket.method.clone()).or_default() += bucket.count;
        }

        if stats.total_calls > 0 {
            let rate = stats.successful_calls as f64 * 100.0 / stats.total_calls as f64;
            stats.success_rate = (rate * 100.0).round() / 100.0;
        }
        stats
    }
}

/// Query string of the usage stats endpoint. Defaults to the last 30 days.
#[derive(Debug, Default, Deserialize)]
pub struct UsageStatsQuery {
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UsageLogFilter {
    pub method: Option<String>,
    pub status_code: Option<u16>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl UsageLogFilter {
    pub const DEFAULT_LIMIT: u32 = 100;
    pub const MAX_LIMIT: u32 = 1000;

    pub fn limit(&self) -> u32 {
        self.limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT)
    }

    pub fn offset(&self) -> u32 {
        self.offset.unwrap_or(0)
    }
}

#[derive(Debug, Serialize)]
pub struct UsageLogPage {
    pub logs: Vec<UsageLog>,
    pub total: u64,
    pub limit: u32,
    pub offset: u32,
}
