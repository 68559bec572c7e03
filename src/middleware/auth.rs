//! API key authentication middleware.
//!
//! This middleware intercepts every partner-facing request to:
//! 1. Extract the credential from `Authorization: Bearer` or `X-API-Key`
//! 2. Look up the public key and verify the secret against its hash
//! 3. Check key status, owning partner and IP allowlist
//! 4. Inject an [`AuthContext`] into the request
//! 5. Record the call for usage accounting once the handler has answered
//!
//! # Credential formats
//!
//! ```text
//! Authorization: Bearer pk_live_...:sk_live_...
//! X-API-Key: acme/pk_live_...:sk_live_...
//! ```
//!
//! A Bearer header always wins. `X-API-Key` is consulted only when there is
//! no Bearer header; other schemes such as `Basic` are ignored.

use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{Extensions, HeaderMap},
    middleware::Next,
    response::Response,
};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    clock::Clock,
    error::{AppError, AuthError},
    keys::{KeyMaterial, UNMATCHABLE_HASH},
    models::{
        app_key::{AppKey, KeyType, Scope},
        partner::Partner,
    },
    services::usage_accountant::UsageEvent,
    state::AppState,
    store::Store,
};

/// Authentication context attached to authenticated requests.
///
/// Handlers extract it with `Extension<AuthContext>`.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub partner_id: Uuid,
    pub partner_name: String,
    pub partner_code: String,

    /// Merchant the partner books payments against, if bound to one.
    pub merchant_id: Option<Uuid>,

    pub app_key_id: Uuid,
    pub key_type: KeyType,
    pub scopes: Vec<Scope>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl AuthContext {
    fn new(partner: &Partner, key: &AppKey) -> Self {
        Self {
            partner_id: partner.id,
            partner_name: partner.name.clone(),
            partner_code: partner.code.clone(),
            merchant_id: partner.merchant_id,
            app_key_id: key.id,
            key_type: key.key_type,
            scopes: key.scopes.clone(),
            expires_at: key.expires_at,
        }
    }

    /// Fail with 403 unless the key carries `scope`.
    pub fn require(&self, scope: Scope) -> Result<(), AppError> {
        if self.scopes.contains(&scope) {
            Ok(())
        } else {
            Err(AppError::insufficient_permissions())
        }
    }

    /// Merchant this request acts for.
    pub fn merchant(&self) -> Result<Uuid, AppError> {
        self.merchant_id.ok_or_else(|| AppError::PermissionDenied {
            code: "merchant_required",
            message: "No merchant account is associated with this API key".to_string(),
        })
    }
}

/// Reference a handler attaches to its response so the usage log can link
/// the call to a payment.
#[derive(Debug, Clone)]
pub struct UsageReference(pub String);

/// Credential split into its parts.
#[derive(Debug, PartialEq, Eq)]
pub struct Credential<'a> {
    /// Present in the structured `<partner_code>/<public_key>:<secret>` form.
    pub partner_code: Option<&'a str>,
    pub public_key: &'a str,
    pub secret: &'a str,
}

/// Pick the raw credential out of the request headers.
pub fn extract_credential(headers: &HeaderMap) -> Result<&str, AuthError> {
    let bearer = headers
        .get_all("Authorization")
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(|value| value.strip_prefix("Bearer "));

    let raw = match bearer {
        Some(credential) => credential,
        None => headers
            .get("X-API-Key")
            .ok_or(AuthError::MissingCredential)?
            .to_str()
            .map_err(|_| AuthError::MalformedCredential)?,
    };

    let raw = raw.trim();
    if raw.is_empty() {
        return Err(AuthError::MissingCredential);
    }
    Ok(raw)
}

pub fn parse_credential(raw: &str) -> Result<Credential<'_>, AuthError> {
    let (key_part, secret) = raw.split_once(':').ok_or(AuthError::MalformedCredential)?;

    let (partner_code, public_key) = match key_part.split_once('/') {
        Some((code, public_key)) => (Some(code), public_key),
        None => (None, key_part),
    };

    if public_key.is_empty() || secret.is_empty() || partner_code.is_some_and(str::is_empty) {
        return Err(AuthError::MalformedCredential);
    }

    Ok(Credential {
        partner_code,
        public_key,
        secret,
    })
}

/// Verifies credentials. Authentication is a pure read.
pub struct ApiKeyAuthenticator {
    store: Arc<dyn Store>,
    material: KeyMaterial,
    clock: Arc<dyn Clock>,
}

impl ApiKeyAuthenticator {
    pub fn new(store: Arc<dyn Store>, material: KeyMaterial, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            material,
            clock,
        }
    }

    /// Resolve a raw credential to its partner and key.
    ///
    /// # Errors
    ///
    /// An [`AuthError`] for every refusal. Unknown keys and wrong secrets are
    /// indistinguishable to the caller.
    pub async fn authenticate(
        &self,
        raw: &str,
        client_ip: Option<&str>,
    ) -> Result<(Partner, AppKey), AppError> {
        let credential = parse_credential(raw)?;

        let Some(key) = self
            .store
            .find_app_key_by_public_key(credential.public_key)
            .await?
        else {
            // Same hashing work as a known key with a wrong secret.
            self.material.verify_secret(credential.secret, UNMATCHABLE_HASH);
            tracing::warn!(public_key = credential.public_key, "Unknown API key");
            return Err(AuthError::UnknownKey.into());
        };

        if !self.material.verify_secret(credential.secret, &key.secret_hash) {
            tracing::warn!(app_key_id = %key.id, "Invalid API secret");
            return Err(AuthError::InvalidSecret.into());
        }

        let partner = match self.store.find_partner(key.partner_id).await? {
            Some(partner) if credential.partner_code.is_none_or(|code| code == partner.code) => {
                partner
            }
            _ => {
                tracing::warn!(app_key_id = %key.id, "Credential partner does not match key");
                return Err(AuthError::UnknownKey.into());
            }
        };

        if !key.is_usable(self.clock.now()) {
            tracing::warn!(app_key_id = %key.id, status = key.status.as_str(), "Inactive or expired API key");
            return Err(AuthError::InactiveOrExpired.into());
        }

        if !partner.is_active {
            tracing::warn!(app_key_id = %key.id, partner_id = %partner.id, "API key of inactive partner");
            return Err(AuthError::PartnerInactive.into());
        }

        if !key.ip_allowed(client_ip) {
            tracing::warn!(
                app_key_id = %key.id,
                client_ip = client_ip.unwrap_or("unknown"),
                "Client address not on key allowlist"
            );
            return Err(AuthError::IpNotAllowed.into());
        }

        tracing::debug!(app_key_id = %key.id, partner_id = %partner.id, "API key authenticated");
        Ok((partner, key))
    }
}

/// Client address.
///
/// Forwarding headers are read only when the socket peer is one of
/// `trusted_proxies`. `X-Forwarded-For` is then walked from the right,
/// skipping trusted hops, and the first other address is the client;
/// `X-Real-IP` is the fallback. Any other peer is taken as the client itself.
pub fn client_ip(
    headers: &HeaderMap,
    extensions: &Extensions,
    trusted_proxies: &[IpAddr],
) -> Option<String> {
    let peer = extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())?;
    if !trusted_proxies.contains(&peer) {
        return Some(peer.to_string());
    }

    let forwarded: Vec<IpAddr> = headers
        .get_all("X-Forwarded-For")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|hop| hop.trim().parse().ok())
        .collect();

    let client = forwarded
        .into_iter()
        .rev()
        .find(|hop| !trusted_proxies.contains(hop))
        .or_else(|| {
            headers
                .get("X-Real-IP")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok())
        })
        .unwrap_or(peer);
    Some(client.to_string())
}

pub fn user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get("User-Agent")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// API key authentication middleware function.
///
/// Rejects with 401 before the handler runs. After the handler answers, the
/// call is recorded on a spawned task so accounting never delays or fails the
/// response.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let ip = client_ip(request.headers(), request.extensions(), &state.trusted_proxies);
    let credential = extract_credential(request.headers())?.to_string();

    let (partner, key) = state
        .authenticator
        .authenticate(&credential, ip.as_deref())
        .await?;

    let method = request.method().to_string();
    let endpoint = request.uri().path().to_string();
    let agent = user_agent(request.headers());

    request
        .extensions_mut()
        .insert(AuthContext::new(&partner, &key));

    let response = next.run(request).await;

    let event = UsageEvent {
        app_key_id: key.id,
        method,
        endpoint,
        status_code: response.status().as_u16(),
        reference_id: response
            .extensions()
            .get::<UsageReference>()
            .map(|r| r.0.clone()),
        ip_address: ip,
        user_agent: agent,
    };
    let usage = state.usage.clone();
    tokio::spawn(async move { usage.record(event).await });

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn bearer_wins_over_api_key_header() {
        let h = headers(&[
            ("Authorization", "Bearer pk_a:sk_a"),
            ("X-API-Key", "pk_b:sk_b"),
        ]);
        assert_eq!(extract_credential(&h), Ok("pk_a:sk_a"));
    }

    #[test]
    fn other_schemes_fall_back_to_api_key_header() {
        let h = headers(&[
            ("Authorization", "Basic dXNlcjpwYXNz"),
            ("X-API-Key", "pk_b:sk_b"),
        ]);
        assert_eq!(extract_credential(&h), Ok("pk_b:sk_b"));

        let h = headers(&[("Authorization", "Basic dXNlcjpwYXNz")]);
        assert_eq!(extract_credential(&h), Err(AuthError::MissingCredential));
    }

    #[test]
    fn credential_shapes() {
        assert_eq!(
            parse_credential("pk_live_abc:sk_live_def"),
            Ok(Credential {
                partner_code: None,
                public_key: "pk_live_abc",
                secret: "sk_live_def",
            })
        );
        assert_eq!(
            parse_credential("acme/pk_live_abc:sk_live_def"),
            Ok(Credential {
                partner_code: Some("acme"),
                public_key: "pk_live_abc",
                secret: "sk_live_def",
            })
        );
        assert_eq!(
            parse_credential("pk_live_abc"),
            Err(AuthError::MalformedCredential)
        );
        assert_eq!(
            parse_credential("/pk_live_abc:sk"),
            Err(AuthError::MalformedCredential)
        );
        assert_eq!(parse_credential(":sk"), Err(AuthError::MalformedCredential));
    }

    fn from_peer(peer: [u8; 4], pairs: &[(&'static str, &'static str)]) -> Request {
        let mut builder = axum::http::Request::builder();
        for (name, value) in pairs {
            builder = builder.header(*name, *value);
        }
        let mut request = builder.body(axum::body::Body::empty()).unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from((peer, 443))));
        request
    }

    #[test]
    fn forwarded_for_skips_trusted_hops() {
        let trusted: Vec<IpAddr> = vec!["10.0.0.1".parse().unwrap(), "10.0.0.2".parse().unwrap()];
        let request = from_peer(
            [10, 0, 0, 2],
            &[("X-Forwarded-For", "198.51.100.1, 203.0.113.7, 10.0.0.1")],
        );
        assert_eq!(
            client_ip(request.headers(), request.extensions(), &trusted).as_deref(),
            Some("203.0.113.7")
        );

        let request = from_peer([10, 0, 0, 2], &[("X-Real-IP", "203.0.113.9")]);
        assert_eq!(
            client_ip(request.headers(), request.extensions(), &trusted).as_deref(),
            Some("203.0.113.9")
        );
    }

    #[test]
    fn untrusted_peer_cannot_forward() {
        let trusted: Vec<IpAddr> = vec!["10.0.0.1".parse().unwrap()];
        let request = from_peer(
            [198, 51, 100, 9],
            &[("X-Forwarded-For", "203.0.113.7"), ("X-Real-IP", "203.0.113.7")],
        );
        assert_eq!(
            client_ip(request.headers(), request.extensions(), &trusted).as_deref(),
            Some("198.51.100.9")
        );

        let request = axum::http::Request::builder()
            .header("X-Forwarded-For", "203.0.113.7")
            .body(axum::body::Body::empty())
            .unwrap();
        assert_eq!(client_ip(request.headers(), request.extensions(), &trusted), None);
    }
}
