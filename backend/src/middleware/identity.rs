//! Resolves who is calling before any handler runs.
//!
//! Authentication itself happens upstream: the auth proxy forwards the
//! signed-in user's id in a configurable header. Requests without it are
//! anonymous.

use axum::{
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;

use crate::{error::AppError, models::UserTier, state::AppState, types::UserId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    /// Set only for authenticated callers.
    pub user_id: Option<UserId>,
    pub tier: UserTier,
    /// Best-effort client address, used to key anonymous rate limits.
    pub client_ip: Option<String>,
}

impl Caller {
    pub fn anonymous() -> Self {
        Self {
            user_id: None,
            tier: UserTier::Anonymous,
            client_ip: None,
        }
    }

    /// The authenticated id wins over whatever the client claims; anonymous
    /// callers keep their claimed id, trimmed, or get a fresh one.
    pub fn resolve_user_id(&self, claimed: Option<&str>) -> UserId {
        if let Some(id) = &self.user_id {
            return id.clone();
        }
        claimed
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(UserId::from)
            .unwrap_or_else(UserId::anonymous)
    }
}

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<Caller>()
            .cloned()
            .unwrap_or_else(Caller::anonymous))
    }
}

pub async fn identify_caller(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let user_id = request
        .headers()
        .get(state.config.auth_user_header.as_str())
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty() && v.len() <= 128)
        .map(UserId::from);

    let client_ip = extract_ip(request.headers()).or_else(|| {
        request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
    });

    let caller = Caller {
        tier: if user_id.is_some() {
            UserTier::Authenticated
        } else {
            UserTier::Anonymous
        },
        user_id,
        client_ip,
    };
    request.extensions_mut().insert(caller);
    next.run(request).await
}

pub fn extract_ip(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        return value
            .split(',')
            .next()
            .map(|ip| ip.trim().to_string())
            .filter(|ip| !ip.is_empty());
    }
    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn extract_ip_prefers_first_forwarded_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("10.0.0.1, 10.0.0.2"));
        headers.insert("x-real-ip", HeaderValue::from_static("10.9.9.9"));
        assert_eq!(extract_ip(&headers).as_deref(), Some("10.0.0.1"));
    }

    #[test]
    fn extract_ip_falls_back_to_real_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static(" 10.9.9.9 "));
        assert_eq!(extract_ip(&headers).as_deref(), Some("10.9.9.9"));
        assert_eq!(extract_ip(&HeaderMap::new()), None);
    }

    #[test]
    fn authenticated_id_overrides_claimed_id() {
        let caller = Caller {
            user_id: Some(UserId::from("auth-1")),
            tier: UserTier::Authenticated,
            client_ip: None,
        };
        assert_eq!(caller.resolve_user_id(Some("spoofed")), UserId::from("auth-1"));
    }

    #[test]
    fn anonymous_caller_keeps_trimmed_claim_or_mints_id() {
        let caller = Caller::anonymous();
        assert_eq!(caller.resolve_user_id(Some(" u-1 ")), UserId::from("u-1"));
        assert!(caller.resolve_user_id(None).as_str().starts_with("user-"));
        assert!(caller.resolve_user_id(Some("   ")).as_str().starts_with("user-"));
    }
}
