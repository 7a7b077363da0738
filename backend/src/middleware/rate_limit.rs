use axum::body::{to_bytes, Body};
use axum::http::{header::CONTENT_TYPE, HeaderValue, Response, StatusCode};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response as AxumResponse,
};
use governor::middleware::StateInformationMiddleware;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::PeerIpKeyExtractor, GovernorError,
    GovernorLayer,
};

use crate::config::Config;
use crate::middleware::identity::Caller;
use crate::models::UserTier;
use crate::state::AppState;

const VOTE_WINDOW: Duration = Duration::from_secs(60);
/// Windows are pruned once the map grows past this many participants.
const CLEANUP_THRESHOLD: usize = 10_000;
const CLEANUP_INTERVAL: Duration = Duration::from_secs(300);
/// Vote bodies are tiny; anything bigger is rejected downstream anyway.
const MAX_PEEKED_BODY_BYTES: usize = 16 * 1024;

#[derive(Debug, Default)]
struct Windows {
    requests: HashMap<String, VecDeque<Instant>>,
    last_cleanup: Option<Instant>,
}

/// Sliding one-minute window per participant, sized by tier.
#[derive(Debug)]
pub struct ParticipantRateLimiter {
    anonymous_per_minute: u32,
    authenticated_per_minute: u32,
    windows: Mutex<Windows>,
}

impl ParticipantRateLimiter {
    pub fn new(anonymous_per_minute: u32, authenticated_per_minute: u32) -> Self {
        Self {
            anonymous_per_minute,
            authenticated_per_minute,
            windows: Mutex::new(Windows::default()),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.votes_per_minute(UserTier::Anonymous),
            config.votes_per_minute(UserTier::Authenticated),
        )
    }

    fn budget(&self, tier: UserTier) -> u32 {
        match tier {
            UserTier::Anonymous => self.anonymous_per_minute,
            UserTier::Authenticated => self.authenticated_per_minute,
        }
    }

    /// Records one request for `key`. `Err` carries seconds until a slot
    /// frees up. A zero budget disables the limit.
    pub fn check(&self, key: &str, tier: UserTier, now: Instant) -> Result<(), u64> {
        let max_requests = self.budget(tier);
        if max_requests == 0 {
            return Ok(());
        }
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());

        let due = windows
            .last_cleanup
            .map(|at| now.duration_since(at) >= CLEANUP_INTERVAL)
            .unwrap_or(false);
        if windows.requests.len() > CLEANUP_THRESHOLD || due {
            windows.requests.retain(|_, entry| {
                prune_expired(entry, now, VOTE_WINDOW);
                !entry.is_empty()
            });
            windows.last_cleanup = Some(now);
        } else if windows.last_cleanup.is_none() {
            windows.last_cleanup = Some(now);
        }

        let entry = windows.requests.entry(key.to_string()).or_default();
        prune_expired(entry, now, VOTE_WINDOW);
        if entry.len() >= max_requests as usize {
            let retry_after = entry
                .front()
                .map(|oldest| {
                    VOTE_WINDOW
                        .saturating_sub(now.duration_since(*oldest))
                        .as_secs()
                        .max(1)
                })
                .unwrap_or(1);
            return Err(retry_after);
        }
        entry.push_back(now);
        Ok(())
    }

    pub fn tracked_keys(&self) -> usize {
        self.windows
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .requests
            .len()
    }
}

fn prune_expired(entry: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(oldest) = entry.front() {
        if now.duration_since(*oldest) >= window {
            entry.pop_front();
        } else {
            break;
        }
    }
}

/// Limits votes per participant. The key is the authenticated id, else the
/// `userId` in the JSON body, else the client address.
pub async fn participant_rate_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> AxumResponse {
    let caller = request
        .extensions()
        .get::<Caller>()
        .cloned()
        .unwrap_or_else(Caller::anonymous);

    let (parts, body) = request.into_parts();
    let bytes = match to_bytes(body, MAX_PEEKED_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(_) => {
            return json_error_response(
                StatusCode::PAYLOAD_TOO_LARGE,
                "PAYLOAD_TOO_LARGE",
                "Request body too large.",
                None,
            )
        }
    };

    let key = caller
        .user_id
        .as_ref()
        .map(|id| format!("user:{}", id))
        .or_else(|| claimed_user_id(&bytes).map(|id| format!("participant:{}", id)))
        .or_else(|| caller.client_ip.as_ref().map(|ip| format!("ip:{}", ip)));

    let Some(key) = key else {
        return json_error_response(
            StatusCode::BAD_REQUEST,
            "BAD_REQUEST",
            "Unable to determine participant identity.",
            None,
        );
    };

    if let Err(retry_after) = state
        .rate_limiter
        .check(&key, caller.tier, Instant::now())
    {
        tracing::warn!(key, tier = ?caller.tier, retry_after, "Vote rate limit exceeded");
        return json_error_response(
            StatusCode::TOO_MANY_REQUESTS,
            "RATE_LIMITED",
            "Too many votes. Please slow down.",
            Some(retry_after),
        );
    }

    next.run(Request::from_parts(parts, Body::from(bytes))).await
}

fn claimed_user_id(body: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    value
        .get("userId")?
        .as_str()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

/// Per-IP limiter for session creation. `None` when the configuration
/// cannot produce a valid quota.
pub fn create_session_rate_limiter(
    config: &Config,
) -> Option<GovernorLayer<PeerIpKeyExtractor, StateInformationMiddleware, Body>> {
    let governor_conf = GovernorConfigBuilder::default()
        .period(Duration::from_secs(config.rate_limit_create_period_secs.max(1)))
        .burst_size(config.rate_limit_create_burst.max(1))
        .key_extractor(PeerIpKeyExtractor)
        .use_headers()
        .finish();
    let Some(governor_conf) = governor_conf else {
        tracing::warn!("Invalid session creation rate limit, limiter disabled");
        return None;
    };

    Some(GovernorLayer::new(Arc::new(governor_conf)).error_handler(rate_limit_error_handler))
}

fn rate_limit_error_handler(error: GovernorError) -> Response<Body> {
    match error {
        GovernorError::TooManyRequests { wait_time, headers } => {
            tracing::warn!(wait_time, "Session creation rate limit exceeded");
            let mut response = json_error_response(
                StatusCode::TOO_MANY_REQUESTS,
                "RATE_LIMITED",
                "Too many sessions created. Please try again later.",
                Some(wait_time),
            );
            if let Some(headers) = headers {
                response.headers_mut().extend(headers);
            }
            response
        }
        GovernorError::UnableToExtractKey => json_error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "Unable to determine request identity.",
            None,
        ),
        GovernorError::Other { code, msg, headers } => {
            let mut response = json_error_response(
                code,
                "RATE_LIMITED",
                &msg.unwrap_or_else(|| "Rate limit error".to_string()),
                None,
            );
            if let Some(headers) = headers {
                response.headers_mut().extend(headers);
            }
            response
        }
    }
}

/// Same `{error, code, details?}` shape as handler errors.
fn json_error_response(
    status: StatusCode,
    code: &str,
    message: &str,
    retry_after: Option<u64>,
) -> Response<Body> {
    let mut body = serde_json::json!({
        "error": message,
        "code": code,
    });
    if let Some(retry_after) = retry_after {
        body["details"] = serde_json::json!({ "retryAfter": retry_after });
    }

    let mut response = Response::new(Body::from(body.to_string()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Some(retry_after) = retry_after {
        if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
            response.headers_mut().insert("retry-after", value);
        }
    }
    response
}
