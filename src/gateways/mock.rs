//! In-process gateways with a fixed behaviour.
//!
//! Used by the test suite and by `memory://` development mode when no
//! provider credentials are configured.

use std::{
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use serde_json::json;
use uuid::Uuid;

use super::{
    CardGateway, CardPaymentRequest, CryptoGateway, CryptoInvoiceRequest, GatewayError,
    GatewayResponse, GatewayStatus,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockBehavior {
    /// Accept every payment.
    Accept,
    /// Decline with the given message.
    Reject(String),
    /// Behave like an unreachable provider.
    Unavailable,
    /// Accept after a pause.
    Slow(Duration),
}

impl MockBehavior {
    async fn respond(&self, hosted_base: &str) -> Result<GatewayResponse, GatewayError> {
        match self {
            MockBehavior::Slow(pause) => {
                tokio::time::sleep(*pause).await;
                Ok(accepted(hosted_base))
            }
            MockBehavior::Accept => Ok(accepted(hosted_base)),
            MockBehavior::Reject(message) => Ok(GatewayResponse::rejected(message.clone())),
            MockBehavior::Unavailable => Err(GatewayError::Timeout),
        }
    }

    fn status(&self) -> &'static str {
        match self {
            MockBehavior::Accept | MockBehavior::Slow(_) => "completed",
            MockBehavior::Reject(_) => "failed",
            MockBehavior::Unavailable => "unknown",
        }
    }
}

fn accepted(hosted_base: &str) -> GatewayResponse {
    let reference = Uuid::new_v4().simple().to_string();
    GatewayResponse::accepted(Some(format!("{hosted_base}{reference}")), Some(reference))
}

#[derive(Debug)]
pub struct MockCardGateway {
    behavior: MockBehavior,
    calls: AtomicUsize,
}

impl MockCardGateway {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of `create_payment` calls received.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CardGateway for MockCardGateway {
    fn name(&self) -> &'static str {
        "transvoucher"
    }

    async fn create_payment(
        &self,
        _request: &CardPaymentRequest,
    ) -> Result<GatewayResponse, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.behavior
            .respond("https://mock.transvoucher.local/pay/")
            .await
    }

    async fn payment_status(&self, gateway_reference: &str) -> Result<GatewayStatus, GatewayError> {
        if self.behavior == MockBehavior::Unavailable {
            return Err(GatewayError::Timeout);
        }
        Ok(GatewayStatus {
            gateway: self.name(),
            gateway_reference: gateway_reference.to_string(),
            status: self.behavior.status().to_string(),
            raw: json!({ "mock": true }),
        })
    }

    fn verify_webhook(&self, _payload: &[u8], signature: &str) -> bool {
        signature == "mock-signature"
    }
}

#[derive(Debug)]
pub struct MockCryptoGateway {
    behavior: MockBehavior,
    calls: AtomicUsize,
}

impl MockCryptoGateway {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CryptoGateway for MockCryptoGateway {
    fn name(&self) -> &'static str {
        "uniwire"
    }

    async fn create_invoice(
        &self,
        _request: &CryptoInvoiceRequest,
    ) -> Result<GatewayResponse, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.behavior
            .respond("https://mock.uniwire.local/invoice/")
            .await
    }

    async fn invoice_status(&self, invoice_id: &str) -> Result<GatewayStatus, GatewayError> {
        if self.behavior == MockBehavior::Unavailable {
            return Err(GatewayError::Timeout);
        }
        Ok(GatewayStatus {
            gateway: self.name(),
            gateway_reference: invoice_id.to_string(),
            status: self.behavior.status().to_string(),
            raw: json!({ "mock": true }),
        })
    }

    fn verify_webhook(&self, _payload: &[u8], signature: &str) -> bool {
        signature == "mock-signature"
    }
}
