//! Rate Limit Guard Middleware
//!
//! Wraps a route so every request is evaluated before the handler runs.
//! Authenticated callers are keyed by user ID; everyone else goes through the
//! guest identifier resolver.

use crate::application::clock::Clock;
use crate::application::config::ThrottleConfig;
use crate::application::evaluate::EvaluateUseCase;
use crate::application::guest_identity::GuestIdentifierResolver;
use crate::domain::repository::CounterRepository;
use crate::domain::value_objects::{Decision, Quota, user_identifier};
use axum::Router;
use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{HeaderName, HeaderValue, Request, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Request extension placed by the upstream authentication layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedCaller {
    pub user_id: String,
}

/// Middleware state: which endpoint is governed, and by what quota
#[derive(Clone)]
pub struct RateLimitGuardState<R>
where
    R: CounterRepository + Clone + Send + Sync + 'static,
{
    pub repo: Arc<R>,
    pub config: Arc<ThrottleConfig>,
    pub clock: Arc<dyn Clock>,
    pub endpoint: Arc<str>,
    pub quota: Quota,
}

impl<R> RateLimitGuardState<R>
where
    R: CounterRepository + Clone + Send + Sync + 'static,
{
    pub fn new(
        repo: Arc<R>,
        config: Arc<ThrottleConfig>,
        clock: Arc<dyn Clock>,
        endpoint: &str,
        quota: Quota,
    ) -> Self {
        Self {
            repo,
            config,
            clock,
            endpoint: Arc::from(endpoint),
            quota,
        }
    }
}

/// Middleware that denies requests over the endpoint's quota
pub async fn enforce_rate_limit<R>(
    state: RateLimitGuardState<R>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, Response>
where
    R: CounterRepository + Clone + Send + Sync + 'static,
{
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    let ip = platform::client::client_ip(
        req.headers(),
        peer,
        state.config.trust_forwarded_headers,
    );

    let (identifier, minted_token) = match req.extensions().get::<AuthenticatedCaller>() {
        Some(caller) => (user_identifier(&caller.user_id), None),
        None => {
            let token = platform::cookie::extract_cookie(
                req.headers(),
                &state.config.guest_cookie_name,
            );
            let guest = GuestIdentifierResolver::from_config(&state.config, state.clock.clone())
                .resolve(ip, token.as_deref());
            (guest.rate_limit_key(), guest.minted_token)
        }
    };

    let use_case = EvaluateUseCase::new(state.repo.clone(), state.clock.clone());
    let allowance = use_case
        .execute(&identifier, ip, &state.endpoint, &state.quota)
        .await
        .and_then(Decision::into_result)
        .map_err(IntoResponse::into_response)?;

    let mut response = next.run(req).await;

    let headers = response.headers_mut();
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(allowance.limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(allowance.remaining));
    headers.insert(
        X_RATELIMIT_RESET,
        HeaderValue::from(allowance.window_resets_at.timestamp()),
    );
    if let Some(token) = minted_token {
        match state.config.guest_cookie().set_cookie_header(&token) {
            Some(cookie) => {
                headers.append(header::SET_COOKIE, cookie);
            }
            None => tracing::error!("Guest token is not a valid header value"),
        }
    }

    Ok(response)
}

/// Put every route of `router` behind the guard
pub fn governed<S, R>(router: Router<S>, state: RateLimitGuardState<R>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    R: CounterRepository + Clone + Send + Sync + 'static,
{
    router.route_layer(axum::middleware::from_fn(
        move |req: Request<Body>, next: Next| enforce_rate_limit(state.clone(), req, next),
    ))
}
