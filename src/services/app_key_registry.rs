//! App key lifecycle.
//!
//! This is the only writer of `secret_hash`. Raw secrets leave this module
//! exactly once, in the return value of [`AppKeyRegistry::create`] or
//! [`AppKeyRegistry::regenerate_secret`].
//!
//! # Lifecycle
//!
//! ```text
//! active ◀──▶ suspended
//!    │            │
//!    └────────────┴──▶ revoked (final)
//! ```

use std::{collections::BTreeSet, net::IpAddr, sync::Arc};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    clock::Clock,
    config::KeyMaterialConfig,
    error::AppError,
    keys::KeyMaterial,
    models::{
        app_key::{AppKey, AppKeyFilter, AppKeySettings, AppKeyStatus, KeyType, Scope},
        partner::Partner,
    },
    store::{Store, StoreError},
};

/// Validated key creation input.
#[derive(Debug, Clone)]
pub struct NewAppKey {
    pub name: String,
    pub key_type: KeyType,
    pub scopes: Vec<Scope>,
    pub expires_at: Option<DateTime<Utc>>,
    pub allowed_ips: Vec<String>,
}

pub struct AppKeyRegistry {
    store: Arc<dyn Store>,
    material: KeyMaterial,
    clock: Arc<dyn Clock>,
    max_attempts: u32,
}

impl AppKeyRegistry {
    pub fn new(store: Arc<dyn Store>, config: &KeyMaterialConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            material: KeyMaterial::new(config),
            clock,
            max_attempts: config.max_provision_attempts.max(1),
        }
    }

    /// Issue a key pair for `partner`.
    ///
    /// # Errors
    ///
    /// - `Validation`: partner inactive, no scopes, expiry in the past, bad IP
    /// - `Provisioning`: every attempt collided on the public key
    pub async fn create(
        &self,
        partner: &Partner,
        request: NewAppKey,
    ) -> Result<(AppKey, String), AppError> {
        if !partner.is_active {
            return Err(AppError::validation(
                "partner_inactive",
                "Cannot issue keys for an inactive partner",
            ));
        }
        let now = self.clock.now();
        validate_scopes(&request.scopes)?;
        validate_expiry(request.expires_at, now)?;
        validate_ips(&request.allowed_ips)?;

        for attempt in 1..=self.max_attempts {
            let pair = self.material.generate_key_pair(request.key_type);
            let key = AppKey {
                id: Uuid::new_v4(),
                partner_id: partner.id,
                name: request.name.clone(),
                key_type: request.key_type,
                public_key: pair.public_key,
                secret_hash: pair.secret_hash,
                scopes: request.scopes.clone(),
                allowed_ips: request.allowed_ips.clone(),
                status: AppKeyStatus::Active,
                expires_at: request.expires_at,
                usage_count: 0,
                last_used_at: None,
                revoked_at: None,
                revoked_by: None,
                created_at: now,
                updated_at: now,
            };

            match self.store.insert_app_key(&key).await {
                Ok(()) => {
                    tracing::info!(
                        app_key_id = %key.id,
                        partner_id = %partner.id,
                        key_type = key.key_type.as_str(),
                        "App key issued"
                    );
                    return Ok((key, pair.raw_secret));
                }
                Err(StoreError::Duplicate(_)) => {
                    tracing::warn!(attempt, "Public key collision, regenerating");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(AppError::Provisioning(format!(
            "no free public key after {} attempts",
            self.max_attempts
        )))
    }

    pub async fn get(&self, id: Uuid) -> Result<AppKey, AppError> {
        self.store
            .find_app_key(id)
            .await?
            .ok_or(AppError::NotFound("App key"))
    }

    pub async fn list(&self, filter: &AppKeyFilter) -> Result<Vec<AppKey>, AppError> {
        Ok(self.store.list_app_keys(filter).await?)
    }

    /// Revoke a key. Revoking an already revoked key returns it unchanged.
    pub async fn revoke(&self, id: Uuid, revoked_by: &str) -> Result<AppKey, AppError> {
        let key = self.get(id).await?;
        if key.status == AppKeyStatus::Revoked {
            return Ok(key);
        }

        let now = self.clock.now();
        match self
            .store
            .set_app_key_status(id, AppKeyStatus::Revoked, Some(revoked_by), now)
            .await?
        {
            Some(key) => {
                tracing::info!(app_key_id = %id, revoked_by, "App key revoked");
                Ok(key)
            }
            // Lost a race with another revoke.
            None => self.get(id).await,
        }
    }

    pub async fn suspend(&self, id: Uuid) -> Result<AppKey, AppError> {
        self.set_status(id, AppKeyStatus::Suspended).await
    }

    /// Re-enable a suspended key. Revoked keys stay revoked.
    pub async fn activate(&self, id: Uuid) -> Result<AppKey, AppError> {
        self.set_status(id, AppKeyStatus::Active).await
    }

    async fn set_status(&self, id: Uuid, status: AppKeyStatus) -> Result<AppKey, AppError> {
        let key = self.get(id).await?;
        if key.status == AppKeyStatus::Revoked {
            return Err(key_revoked());
        }

        let key = self
            .store
            .set_app_key_status(id, status, None, self.clock.now())
            .await?
            .ok_or_else(key_revoked)?;

        tracing::info!(app_key_id = %id, status = status.as_str(), "App key status changed");
        Ok(key)
    }

    /// Replace the secret, keeping id, public key and scopes.
    ///
    /// # Errors
    ///
    /// `State(key_revoked)` when the key is revoked, including when it was
    /// revoked between the read and the write.
    pub async fn regenerate_secret(&self, id: Uuid) -> Result<(AppKey, String), AppError> {
        let key = self.get(id).await?;
        if key.status == AppKeyStatus::Revoked {
            return Err(key_revoked());
        }

        let raw_secret = self.material.generate_secret(key.key_type);
        let secret_hash = self.material.hash_secret(&raw_secret);

        let key = self
            .store
            .replace_app_key_secret(id, &secret_hash, self.clock.now())
            .await?
            .ok_or_else(key_revoked)?;

        tracing::info!(app_key_id = %id, "App key secret regenerated");
        Ok((key, raw_secret))
    }

    pub async fn update_settings(
        &self,
        id: Uuid,
        settings: AppKeySettings,
    ) -> Result<AppKey, AppError> {
        let key = self.get(id).await?;
        if key.status == AppKeyStatus::Revoked {
            return Err(key_revoked());
        }
        if let Some(scopes) = &settings.scopes {
            validate_scopes(scopes)?;
        }
        validate_expiry(settings.expires_at, self.clock.now())?;
        if let Some(ips) = &settings.allowed_ips {
            validate_ips(ips)?;
        }

        self.store
            .update_app_key_settings(id, &settings, self.clock.now())
            .await?
            .ok_or(AppError::NotFound("App key"))
    }
}

fn key_revoked() -> AppError {
    AppError::state("key_revoked", "App key has been revoked")
}

/// Parse scope names, dropping duplicates. Unknown names are rejected.
pub fn parse_scopes(names: &[String]) -> Result<Vec<Scope>, AppError> {
    let scopes = names
        .iter()
        .map(|name| {
            name.parse::<Scope>()
                .map_err(|e| AppError::validation("invalid_scopes", e))
        })
        .collect::<Result<BTreeSet<_>, _>>()?;
    Ok(scopes.into_iter().collect())
}

fn validate_scopes(scopes: &[Scope]) -> Result<(), AppError> {
    if scopes.is_empty() {
        return Err(AppError::validation(
            "invalid_scopes",
            "At least one scope is required",
        ));
    }
    Ok(())
}

fn validate_expiry(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Result<(), AppError> {
    match expires_at {
        Some(at) if at <= now => Err(AppError::validation(
            "invalid_expiry",
            "Expiry must be in the future",
        )),
        _ => Ok(()),
    }
}

fn validate_ips(ips: &[String]) -> Result<(), AppError> {
    match ips.iter().find(|ip| ip.parse::<IpAddr>().is_err()) {
        Some(bad) => Err(AppError::validation(
            "invalid_ip",
            format!("Invalid IP address: {bad}"),
        )),
        None => Ok(()),
    }
}
