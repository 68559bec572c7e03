//! Merchant and partner administration.

use std::sync::Arc;

use uuid::Uuid;

use crate::{
    clock::Clock,
    error::AppError,
    keys::generate_webhook_secret,
    models::{
        merchant::{CreateMerchantRequest, Merchant},
        partner::{CreatePartnerRequest, Partner, UpdatePartnerRequest, validate_partner_code},
    },
    services::webhook_service::validate_webhook_url,
    store::{PartnerChanges, Store, StoreError},
};

pub struct PartnerService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl PartnerService {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn create_merchant(&self, request: CreateMerchantRequest) -> Result<Merchant, AppError> {
        let business_name = required(request.business_name, "business_name")?;

        let merchant = Merchant {
            id: Uuid::new_v4(),
            business_name,
            is_active: true,
            created_at: self.clock.now(),
        };
        self.store.insert_merchant(&merchant).await?;

        tracing::info!(merchant_id = %merchant.id, "Merchant created");
        Ok(merchant)
    }

    pub async fn get_merchant(&self, id: Uuid) -> Result<Merchant, AppError> {
        self.store
            .find_merchant(id)
            .await?
            .ok_or(AppError::NotFound("Merchant"))
    }

    /// Create a partner with a fresh webhook signing secret.
    ///
    /// The code defaults to `merchant_<merchant_id>` when a merchant is given.
    pub async fn create_partner(&self, request: CreatePartnerRequest) -> Result<Partner, AppError> {
        let name = required(request.name, "name")?;

        if let Some(merchant_id) = request.merchant_id {
            self.get_merchant(merchant_id).await?;
        }

        let code = match (request.code, request.merchant_id) {
            (Some(code), _) => code.trim().to_string(),
            (None, Some(merchant_id)) => format!("merchant_{merchant_id}"),
            (None, None) => {
                return Err(AppError::validation(
                    "missing_fields",
                    "Missing required fields: code",
                ));
            }
        };
        validate_partner_code(&code)?;

        let webhook_url = non_empty(request.webhook_url);
        if let Some(url) = &webhook_url {
            validate_webhook_url(url)?;
        }

        let now = self.clock.now();
        let partner = Partner {
            id: Uuid::new_v4(),
            name,
            code,
            merchant_id: request.merchant_id,
            contact_email: non_empty(request.contact_email),
            webhook_url,
            webhook_secret: generate_webhook_secret(),
            is_active: true,
            is_verified: false,
            created_at: now,
            updated_at: now,
        };

        match self.store.insert_partner(&partner).await {
            Ok(()) => {}
            Err(StoreError::Duplicate(_)) => {
                return Err(AppError::conflict(
                    "duplicate_partner_code",
                    format!("Partner code '{}' is already in use", partner.code),
                ));
            }
            Err(e) => return Err(e.into()),
        }

        tracing::info!(partner_id = %partner.id, code = %partner.code, "Partner created");
        Ok(partner)
    }

    pub async fn get(&self, id: Uuid) -> Result<Partner, AppError> {
        self.store
            .find_partner(id)
            .await?
            .ok_or(AppError::NotFound("Partner"))
    }

    pub async fn list(&self) -> Result<Vec<Partner>, AppError> {
        Ok(self.store.list_partners().await?)
    }

    pub async fn update(&self, id: Uuid, request: UpdatePartnerRequest) -> Result<Partner, AppError> {
        let webhook_url = match request.webhook_url {
            None => None,
            Some(url) if url.trim().is_empty() => Some(None),
            Some(url) => {
                validate_webhook_url(&url)?;
                Some(Some(url))
            }
        };

        if let Some(name) = &request.name
            && name.trim().is_empty()
        {
            return Err(AppError::validation("invalid_name", "Name cannot be empty"));
        }

        let changes = PartnerChanges {
            name: request.name,
            contact_email: request.contact_email,
            webhook_url,
            is_active: request.is_active,
            is_verified: request.is_verified,
        };

        let partner = self
            .store
            .update_partner(id, &changes, self.clock.now())
            .await?
            .ok_or(AppError::NotFound("Partner"))?;

        tracing::info!(partner_id = %id, "Partner updated");
        Ok(partner)
    }

    /// Replace the webhook signing secret and return the new raw value.
    pub async fn rotate_webhook_secret(&self, id: Uuid) -> Result<String, AppError> {
        let secret = generate_webhook_secret();
        if !self
            .store
            .set_partner_webhook_secret(id, &secret, self.clock.now())
            .await?
        {
            return Err(AppError::NotFound("Partner"));
        }

        tracing::info!(partner_id = %id, "Webhook secret rotated");
        Ok(secret)
    }
}

fn required(value: Option<String>, field: &str) -> Result<String, AppError> {
    non_empty(value).ok_or_else(|| {
        AppError::validation("missing_fields", format!("Missing required fields: {field}"))
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{clock::ManualClock, store::MemoryStore};

    fn service() -> PartnerService {
        PartnerService::new(Arc::new(MemoryStore::new()), Arc::new(ManualClock::new(chrono::Utc::now())))
    }

    #[tokio::test]
    async fn code_defaults_to_merchant_id() {
        let svc = service();
        let merchant = svc
            .create_merchant(CreateMerchantRequest {
                business_name: Some("Acme".into()),
            })
            .await
            .unwrap();

        let partner = svc
            .create_partner(CreatePartnerRequest {
                name: Some("Acme Pay".into()),
                merchant_id: Some(merchant.id),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(partner.code, format!("merchant_{}", merchant.id));
        assert!(partner.webhook_secret.starts_with("whsec_"));
    }

    #[tokio::test]
    async fn duplicate_code_conflicts() {
        let svc = service();
        let request = || CreatePartnerRequest {
            name: Some("Acme".into()),
            code: Some("acme".into()),
            ..Default::default()
        };
        svc.create_partner(request()).await.unwrap();

        let err = svc.create_partner(request()).await.unwrap_err();
        assert_eq!(err.code(), "duplicate_partner_code");
    }

    #[tokio::test]
    async fn unknown_merchant_is_not_found() {
        let err = service()
            .create_partner(CreatePartnerRequest {
                name: Some("Ghost".into()),
                merchant_id: Some(Uuid::new_v4()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound("Merchant")));
    }

    #[tokio::test]
    async fn empty_webhook_url_clears_it() {
        let svc = service();
        let partner = svc
            .create_partner(CreatePartnerRequest {
                name: Some("Acme".into()),
                code: Some("acme".into()),
                webhook_url: Some("https://acme.example/hooks".into()),
                ..Default::default()
            })
            .await
            .unwrap();

        let updated = svc
            .update(
                partner.id,
                UpdatePartnerRequest {
                    webhook_url: Some(String::new()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.webhook_url, None);
    }
}
