//! PostgreSQL [`Store`].
//!
//! Enum columns are TEXT with CHECK constraints; rows are read into plain
//! `FromRow` structs and converted to domain types here. Lifecycle writes are
//! conditional `UPDATE ... RETURNING *` statements, so a row that no longer
//! qualifies comes back as `None` instead of being overwritten.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use super::{PartnerChanges, Store, StoreError, StoreResult};
use crate::{
    db::DbPool,
    models::{
        app_key::{AppKey, AppKeyFilter, AppKeySettings, AppKeyStatus, Scope},
        merchant::Merchant,
        partner::Partner,
        session::{CustomerInfo, PaymentSession, SessionOutcome},
        transaction::{
            PageRequest, StatusBucket, Transaction, TransactionFilter, TransactionStatus,
        },
        usage::{UsageBucket, UsageLog, UsageLogFilter},
    },
};

#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn decode<T: FromStr<Err = String>>(value: &str) -> Result<T, sqlx::Error> {
    value.parse().map_err(|e: String| sqlx::Error::Decode(e.into()))
}

/// Map a unique violation to `Duplicate(what)`.
fn duplicate_as(err: sqlx::Error, what: &'static str) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Duplicate(what),
        _ => StoreError::Database(err),
    }
}

#[derive(sqlx::FromRow)]
struct AppKeyRow {
    id: Uuid,
    partner_id: Uuid,
    name: String,
    key_type: String,
    public_key: String,
    secret_hash: String,
    scopes: Vec<String>,
    allowed_ips: Vec<String>,
    status: String,
    expires_at: Option<DateTime<Utc>>,
    usage_count: i64,
    last_used_at: Option<DateTime<Utc>>,
    revoked_at: Option<DateTime<Utc>>,
    revoked_by: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AppKeyRow> for AppKey {
    type Error = sqlx::Error;

    fn try_from(row: AppKeyRow) -> Result<Self, Self::Error> {
        Ok(AppKey {
            id: row.id,
            partner_id: row.partner_id,
            name: row.name,
            key_type: decode(&row.key_type)?,
            public_key: row.public_key,
            secret_hash: row.secret_hash,
            scopes: row
                .scopes
                .iter()
                .map(|s| decode::<Scope>(s))
                .collect::<Result<_, _>>()?,
            allowed_ips: row.allowed_ips,
            status: decode(&row.status)?,
            expires_at: row.expires_at,
            usage_count: row.usage_count,
            last_used_at: row.last_used_at,
            revoked_at: row.revoked_at,
            revoked_by: row.revoked_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn scope_strings(scopes: &[Scope]) -> Vec<String> {
    scopes.iter().map(|s| s.as_str().to_string()).collect()
}

#[derive(sqlx::FromRow)]
struct UsageLogRow {
    id: Uuid,
    app_key_id: Uuid,
    method: String,
    endpoint: String,
    status_code: i32,
    reference_id: Option<String>,
    ip_address: Option<String>,
    user_agent: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<UsageLogRow> for UsageLog {
    fn from(row: UsageLogRow) -> Self {
        UsageLog {
            id: row.id,
            app_key_id: row.app_key_id,
            method: row.method,
            endpoint: row.endpoint,
            status_code: u16::try_from(row.status_code).unwrap_or_default(),
            reference_id: row.reference_id,
            ip_address: row.ip_address,
            user_agent: row.user_agent,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    session_id: Uuid,
    merchant_id: Uuid,
    partner_id: Option<Uuid>,
    app_key_id: Option<Uuid>,
    amount_cents: i64,
    currency: String,
    customer_email: String,
    customer_name: String,
    customer_phone: String,
    description: String,
    title: String,
    payment_method: String,
    reference_id: String,
    metadata: Value,
    callback_url: Option<String>,
    cancel_url: Option<String>,
    entry_point: String,
    status: String,
    gateway_reference: Option<String>,
    payment_url: Option<String>,
    failure_reason: Option<String>,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    dispatched_at: Option<DateTime<Utc>>,
}

impl TryFrom<SessionRow> for PaymentSession {
    type Error = sqlx::Error;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        Ok(PaymentSession {
            session_id: row.session_id,
            merchant_id: row.merchant_id,
            partner_id: row.partner_id,
            app_key_id: row.app_key_id,
            amount_cents: row.amount_cents,
            currency: row.currency,
            customer: CustomerInfo {
                email: row.customer_email,
                name: row.customer_name,
                phone: row.customer_phone,
            },
            description: row.description,
            title: row.title,
            payment_method: decode(&row.payment_method)?,
            reference_id: row.reference_id,
            metadata: row.metadata,
            callback_url: row.callback_url,
            cancel_url: row.cancel_url,
            entry_point: decode(&row.entry_point)?,
            status: decode(&row.status)?,
            gateway_reference: row.gateway_reference,
            payment_url: row.payment_url,
            failure_reason: row.failure_reason,
            created_at: row.created_at,
            expires_at: row.expires_at,
            completed_at: row.completed_at,
            dispatched_at: row.dispatched_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    reference: String,
    merchant_id: Uuid,
    customer_email: String,
    transaction_type: String,
    status: String,
    payment_method: String,
    gateway: String,
    currency: String,
    amount_cents: i64,
    net_amount_cents: i64,
    description: Option<String>,
    metadata: Value,
    ip_address: Option<String>,
    user_agent: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = sqlx::Error;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        Ok(Transaction {
            id: row.id,
            reference: row.reference,
            merchant_id: row.merchant_id,
            customer_email: row.customer_email,
            transaction_type: row.transaction_type,
            status: decode(&row.status)?,
            payment_method: row.payment_method,
            gateway: row.gateway,
            currency: row.currency,
            amount_cents: row.amount_cents,
            net_amount_cents: row.net_amount_cents,
            description: row.description,
            metadata: row.metadata,
            ip_address: row.ip_address,
            user_agent: row.user_agent,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn push_transaction_filters(
    builder: &mut QueryBuilder<'_, Postgres>,
    merchant_id: Uuid,
    filter: &TransactionFilter,
) {
    builder.push(" WHERE merchant_id = ");
    builder.push_bind(merchant_id);

    if let Some(status) = filter.status {
        builder.push(" AND status = ");
        builder.push_bind(status.as_str().to_string());
    }
    if let Some(method) = &filter.payment_method {
        builder.push(" AND payment_method = ");
        builder.push_bind(method.clone());
    }
    if let Some(currency) = &filter.currency {
        builder.push(" AND currency = ");
        builder.push_bind(currency.clone());
    }
    if let Some(from) = filter.date_from {
        builder.push(" AND created_at >= ");
        builder.push_bind(from);
    }
    if let Some(to) = filter.date_to {
        builder.push(" AND created_at <= ");
        builder.push_bind(to);
    }
    if let Some(min) = filter.amount_min_cents {
        builder.push(" AND amount_cents >= ");
        builder.push_bind(min);
    }
    if let Some(max) = filter.amount_max_cents {
        builder.push(" AND amount_cents <= ");
        builder.push_bind(max);
    }
    if let Some(search) = &filter.search {
        let pattern = format!("%{}%", search.replace('%', "\\%").replace('_', "\\_"));
        builder.push(" AND (reference ILIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" OR customer_email ILIKE ");
        builder.push_bind(pattern);
        builder.push(")");
    }
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn insert_merchant(&self, merchant: &Merchant) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO merchants (id, business_name, is_active, created_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(merchant.id)
        .bind(&merchant.business_name)
        .bind(merchant.is_active)
        .bind(merchant.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| duplicate_as(e, "merchant"))?;
        Ok(())
    }

    async fn find_merchant(&self, id: Uuid) -> StoreResult<Option<Merchant>> {
        let merchant = sqlx::query_as::<_, Merchant>("SELECT * FROM merchants WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(merchant)
    }

    async fn insert_partner(&self, partner: &Partner) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO whitelabel_partners (
                id, name, code, merchant_id, contact_email, webhook_url,
                webhook_secret, is_active, is_verified, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(partner.id)
        .bind(&partner.name)
        .bind(&partner.code)
        .bind(partner.merchant_id)
        .bind(&partner.contact_email)
        .bind(&partner.webhook_url)
        .bind(&partner.webhook_secret)
        .bind(partner.is_active)
        .bind(partner.is_verified)
        .bind(partner.created_at)
        .bind(partner.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| duplicate_as(e, "partner code"))?;
        Ok(())
    }

    async fn find_partner(&self, id: Uuid) -> StoreResult<Option<Partner>> {
        let partner =
            sqlx::query_as::<_, Partner>("SELECT * FROM whitelabel_partners WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(partner)
    }

    async fn list_partners(&self) -> StoreResult<Vec<Partner>> {
        let partners = sqlx::query_as::<_, Partner>(
            "SELECT * FROM whitelabel_partners ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(partners)
    }

    async fn update_partner(
        &self,
        id: Uuid,
        changes: &PartnerChanges,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Partner>> {
        let partner = sqlx::query_as::<_, Partner>(
            r#"
            UPDATE whitelabel_partners
            SET name = COALESCE($2, name),
                contact_email = COALESCE($3, contact_email),
                webhook_url = CASE WHEN $4 THEN $5 ELSE webhook_url END,
                is_active = COALESCE($6, is_active),
                is_verified = COALESCE($7, is_verified),
                updated_at = $8
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&changes.name)
        .bind(&changes.contact_email)
        .bind(changes.webhook_url.is_some())
        .bind(changes.webhook_url.clone().flatten())
        .bind(changes.is_active)
        .bind(changes.is_verified)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(partner)
    }

    async fn set_partner_webhook_secret(
        &self,
        id: Uuid,
        secret: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let updated = sqlx::query(
            "UPDATE whitelabel_partners SET webhook_secret = $2, updated_at = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(secret)
        .bind(now)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(updated == 1)
    }

    async fn insert_app_key(&self, key: &AppKey) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO app_keys (
                id, partner_id, name, key_type, public_key, secret_hash, scopes,
                allowed_ips, status, expires_at, usage_count, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(key.id)
        .bind(key.partner_id)
        .bind(&key.name)
        .bind(key.key_type.as_str())
        .bind(&key.public_key)
        .bind(&key.secret_hash)
        .bind(scope_strings(&key.scopes))
        .bind(&key.allowed_ips)
        .bind(key.status.as_str())
        .bind(key.expires_at)
        .bind(key.usage_count)
        .bind(key.created_at)
        .bind(key.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| duplicate_as(e, "public key"))?;
        Ok(())
    }

    async fn find_app_key(&self, id: Uuid) -> StoreResult<Option<AppKey>> {
        let row = sqlx::query_as::<_, AppKeyRow>("SELECT * FROM app_keys WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(AppKey::try_from).transpose()?)
    }

    async fn find_app_key_by_public_key(&self, public_key: &str) -> StoreResult<Option<AppKey>> {
        let row = sqlx::query_as::<_, AppKeyRow>("SELECT * FROM app_keys WHERE public_key = $1")
            .bind(public_key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(AppKey::try_from).transpose()?)
    }

    async fn list_app_keys(&self, filter: &AppKeyFilter) -> StoreResult<Vec<AppKey>> {
        let rows = sqlx::query_as::<_, AppKeyRow>(
            r#"
            SELECT * FROM app_keys
            WHERE ($1::UUID IS NULL OR partner_id = $1)
              AND ($2::TEXT IS NULL OR status = $2)
              AND ($3::TEXT IS NULL OR key_type = $3)
            ORDER BY created_at DESC
            "#,
        )
        .bind(filter.partner_id)
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.key_type.map(|k| k.as_str()))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(AppKey::try_from)
            .collect::<Result<_, _>>()?)
    }

    async fn set_app_key_status(
        &self,
        id: Uuid,
        status: AppKeyStatus,
        revoked_by: Option<&str>,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<AppKey>> {
        let row = sqlx::query_as::<_, AppKeyRow>(
            r#"
            UPDATE app_keys
            SET status = $2,
                revoked_at = CASE WHEN $2 = 'revoked' THEN $3 ELSE revoked_at END,
                revoked_by = CASE WHEN $2 = 'revoked' THEN $4 ELSE revoked_by END,
                updated_at = $3
            WHERE id = $1 AND status <> 'revoked'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(now)
        .bind(revoked_by)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(AppKey::try_from).transpose()?)
    }

    async fn replace_app_key_secret(
        &self,
        id: Uuid,
        secret_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<AppKey>> {
        let row = sqlx::query_as::<_, AppKeyRow>(
            r#"
            UPDATE app_keys
            SET secret_hash = $2, updated_at = $3
            WHERE id = $1 AND status <> 'revoked'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(secret_hash)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(AppKey::try_from).transpose()?)
    }

    async fn update_app_key_settings(
        &self,
        id: Uuid,
        settings: &AppKeySettings,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<AppKey>> {
        let row = sqlx::query_as::<_, AppKeyRow>(
            r#"
            UPDATE app_keys
            SET name = COALESCE($2, name),
                scopes = COALESCE($3, scopes),
                expires_at = COALESCE($4, expires_at),
                allowed_ips = COALESCE($5, allowed_ips),
                updated_at = $6
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&settings.name)
        .bind(settings.scopes.as_deref().map(scope_strings))
        .bind(settings.expires_at)
        .bind(&settings.allowed_ips)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(AppKey::try_from).transpose()?)
    }

    async fn record_usage(&self, log: &UsageLog) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO app_key_usage_logs (
                id, app_key_id, method, endpoint, status_code, reference_id,
                ip_address, user_agent, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(log.id)
        .bind(log.app_key_id)
        .bind(&log.method)
        .bind(&log.endpoint)
        .bind(i32::from(log.status_code))
        .bind(&log.reference_id)
        .bind(&log.ip_address)
        .bind(&log.user_agent)
        .bind(log.created_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE app_keys SET usage_count = usage_count + 1, last_used_at = $2 WHERE id = $1",
        )
        .bind(log.app_key_id)
        .bind(log.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn usage_buckets(
        &self,
        app_key_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<UsageBucket>> {
        let rows = sqlx::query_as::<_, (String, i32, i64)>(
            r#"
            SELECT method, status_code, COUNT(*)::BIGINT
            FROM app_key_usage_logs
            WHERE app_key_id = $1 AND created_at >= $2 AND created_at <= $3
            GROUP BY method, status_code
            "#,
        )
        .bind(app_key_id)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(method, status_code, count)| UsageBucket {
                method,
                status_code: u16::try_from(status_code).unwrap_or_default(),
                count: u64::try_from(count).unwrap_or_default(),
            })
            .collect())
    }

    async fn list_usage_logs(
        &self,
        app_key_id: Uuid,
        filter: &UsageLogFilter,
    ) -> StoreResult<(Vec<UsageLog>, u64)> {
        let method = filter.method.as_deref().map(str::to_ascii_uppercase);
        let status_code = filter.status_code.map(i32::from);

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)::BIGINT FROM app_key_usage_logs
            WHERE app_key_id = $1
              AND ($2::TEXT IS NULL OR method = $2)
              AND ($3::INT IS NULL OR status_code = $3)
            "#,
        )
        .bind(app_key_id)
        .bind(&method)
        .bind(status_code)
        .fetch_one(&self.pool)
        .await?;

        let rows = sqlx::query_as::<_, UsageLogRow>(
            r#"
            SELECT * FROM app_key_usage_logs
            WHERE app_key_id = $1
              AND ($2::TEXT IS NULL OR method = $2)
              AND ($3::INT IS NULL OR status_code = $3)
            ORDER BY created_at DESC
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(app_key_id)
        .bind(&method)
        .bind(status_code)
        .bind(i64::from(filter.limit()))
        .bind(i64::from(filter.offset()))
        .fetch_all(&self.pool)
        .await?;

        Ok((
            rows.into_iter().map(UsageLog::from).collect(),
            u64::try_from(total).unwrap_or_default(),
        ))
    }

    async fn insert_session(&self, session: &PaymentSession) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO payment_sessions (
                session_id, merchant_id, partner_id, app_key_id, amount_cents, currency,
                customer_email, customer_name, customer_phone, description, title,
                payment_method, reference_id, metadata, callback_url, cancel_url,
                entry_point, status, created_at, expires_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
            "#,
        )
        .bind(session.session_id)
        .bind(session.merchant_id)
        .bind(session.partner_id)
        .bind(session.app_key_id)
        .bind(session.amount_cents)
        .bind(&session.currency)
        .bind(&session.customer.email)
        .bind(&session.customer.name)
        .bind(&session.customer.phone)
        .bind(&session.description)
        .bind(&session.title)
        .bind(session.payment_method.as_str())
        .bind(&session.reference_id)
        .bind(&session.metadata)
        .bind(&session.callback_url)
        .bind(&session.cancel_url)
        .bind(session.entry_point.as_str())
        .bind(session.status.as_str())
        .bind(session.created_at)
        .bind(session.expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db)
                if db.is_unique_violation() && db.constraint() == Some("payment_sessions_pkey") =>
            {
                StoreError::Duplicate("session")
            }
            _ => duplicate_as(e, "reference"),
        })?;
        Ok(())
    }

    async fn find_session(&self, session_id: Uuid) -> StoreResult<Option<PaymentSession>> {
        let row = sqlx::query_as::<_, SessionRow>(
            "SELECT * FROM payment_sessions WHERE session_id = $1",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(PaymentSession::try_from).transpose()?)
    }

    async fn claim_session_dispatch(
        &self,
        session_id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<PaymentSession>> {
        let row = sqlx::query_as::<_, SessionRow>(
            r#"
            UPDATE payment_sessions
            SET dispatched_at = $2
            WHERE session_id = $1 AND status = 'pending' AND dispatched_at IS NULL
            RETURNING *
            "#,
        )
        .bind(session_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(PaymentSession::try_from).transpose()?)
    }

    async fn release_session_dispatch(&self, session_id: Uuid) -> StoreResult<()> {
        sqlx::query(
            "UPDATE payment_sessions SET dispatched_at = NULL WHERE session_id = $1 AND status = 'pending'",
        )
        .bind(session_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn finish_session(
        &self,
        session_id: Uuid,
        outcome: &SessionOutcome,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<PaymentSession>> {
        let (gateway_reference, payment_url, failure_reason) = match outcome {
            SessionOutcome::Completed {
                gateway_reference,
                payment_url,
            } => (gateway_reference.clone(), payment_url.clone(), None),
            SessionOutcome::Failed { reason } => (None, None, Some(reason.clone())),
        };

        let row = sqlx::query_as::<_, SessionRow>(
            r#"
            UPDATE payment_sessions
            SET status = $2,
                completed_at = $3,
                gateway_reference = COALESCE($4, gateway_reference),
                payment_url = COALESCE($5, payment_url),
                failure_reason = $6
            WHERE session_id = $1 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(session_id)
        .bind(outcome.status().as_str())
        .bind(now)
        .bind(gateway_reference)
        .bind(payment_url)
        .bind(failure_reason)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(PaymentSession::try_from).transpose()?)
    }

    async fn insert_transaction(&self, tx: &Transaction) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO transactions (
                id, reference, merchant_id, customer_email, transaction_type, status,
                payment_method, gateway, currency, amount_cents, net_amount_cents,
                description, metadata, ip_address, user_agent, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(tx.id)
        .bind(&tx.reference)
        .bind(tx.merchant_id)
        .bind(&tx.customer_email)
        .bind(&tx.transaction_type)
        .bind(tx.status.as_str())
        .bind(&tx.payment_method)
        .bind(&tx.gateway)
        .bind(&tx.currency)
        .bind(tx.amount_cents)
        .bind(tx.net_amount_cents)
        .bind(&tx.description)
        .bind(&tx.metadata)
        .bind(&tx.ip_address)
        .bind(&tx.user_agent)
        .bind(tx.created_at)
        .bind(tx.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| duplicate_as(e, "reference"))?;
        Ok(())
    }

    async fn find_transaction(&self, id: Uuid) -> StoreResult<Option<Transaction>> {
        let row = sqlx::query_as::<_, TransactionRow>("SELECT * FROM transactions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Transaction::try_from).transpose()?)
    }

    async fn find_transaction_by_reference(
        &self,
        reference: &str,
    ) -> StoreResult<Option<Transaction>> {
        let row =
            sqlx::query_as::<_, TransactionRow>("SELECT * FROM transactions WHERE reference = $1")
                .bind(reference)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(Transaction::try_from).transpose()?)
    }

    async fn settle_transaction(
        &self,
        reference: &str,
        status: TransactionStatus,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Transaction>> {
        let row = sqlx::query_as::<_, TransactionRow>(
            r#"
            UPDATE transactions
            SET status = $2, updated_at = $3
            WHERE reference = $1 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(reference)
        .bind(status.as_str())
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Transaction::try_from).transpose()?)
    }

    async fn list_transactions(
        &self,
        merchant_id: Uuid,
        filter: &TransactionFilter,
        page: PageRequest,
    ) -> StoreResult<(Vec<Transaction>, u64)> {
        let mut count: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT COUNT(*)::BIGINT FROM transactions");
        push_transaction_filters(&mut count, merchant_id, filter);
        let total = count
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        let mut select: QueryBuilder<Postgres> = QueryBuilder::new("SELECT * FROM transactions");
        push_transaction_filters(&mut select, merchant_id, filter);
        select.push(" ORDER BY created_at DESC LIMIT ");
        select.push_bind(i64::from(page.page_size));
        select.push(" OFFSET ");
        select.push_bind(i64::try_from(page.offset()).unwrap_or(i64::MAX));

        let rows = select
            .build_query_as::<TransactionRow>()
            .fetch_all(&self.pool)
            .await?;

        Ok((
            rows.into_iter()
                .map(Transaction::try_from)
                .collect::<Result<_, _>>()?,
            u64::try_from(total).unwrap_or_default(),
        ))
    }

    async fn transaction_buckets(
        &self,
        merchant_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<StatusBucket>> {
        let rows = sqlx::query_as::<_, (String, i64, i64)>(
            r#"
            SELECT status, COUNT(*)::BIGINT, COALESCE(SUM(amount_cents), 0)::BIGINT
            FROM transactions
            WHERE merchant_id = $1 AND created_at >= $2 AND created_at <= $3
            GROUP BY status
            "#,
        )
        .bind(merchant_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(status, count, volume_cents)| -> Result<StatusBucket, sqlx::Error> {
                Ok(StatusBucket {
                    status: decode(&status)?,
                    count: u64::try_from(count).unwrap_or_default(),
                    volume_cents,
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::from)
    }
}
