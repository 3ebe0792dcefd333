//! Rate limiting middleware.
//!
//! Every response passing through carries `X-RateLimit-Limit`,
//! `X-RateLimit-Remaining` and `X-RateLimit-Window`, plus `X-RateLimit-Reset`
//! when the shared store reported one. Over-quota requests get a 429 with
//! `Retry-After`.

use actix_web::{
    Error, HttpResponse,
    body::EitherBody,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
    http::header::{HeaderMap, HeaderName, HeaderValue, RETRY_AFTER},
};
use std::future::{Future, Ready, ready};
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;

use vigil_core::ports::RateLimitResult;
use vigil_infra::RateLimiter;
use vigil_shared::ErrorResponse;

use crate::config::RateLimitPolicy;

/// Header carrying the caller's API key, preferred over the peer address.
pub const API_KEY_HEADER: &str = "X-API-Key";

const LIMIT_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-limit");
const REMAINING_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
const WINDOW_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-window");
const RESET_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Rate limiting middleware factory.
pub struct RateLimitMiddleware {
    limiter: Arc<RateLimiter>,
    policy: RateLimitPolicy,
}

impl RateLimitMiddleware {
    pub fn new(limiter: Arc<RateLimiter>, policy: RateLimitPolicy) -> Self {
        Self { limiter, policy }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RateLimitMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = RateLimitMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RateLimitMiddlewareService {
            service: Rc::new(service),
            limiter: self.limiter.clone(),
            policy: self.policy,
        }))
    }
}

pub struct RateLimitMiddlewareService<S> {
    service: Rc<S>,
    limiter: Arc<RateLimiter>,
    policy: RateLimitPolicy,
}

impl<S, B> Service<ServiceRequest> for RateLimitMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let limiter = self.limiter.clone();
        let policy = self.policy;

        Box::pin(async move {
            let key = client_key(&req, policy.trust_proxy_headers);
            let (limited, info) = limiter
                .is_rate_limited(&key, policy.max_requests, policy.window_secs)
                .await;

            if limited {
                tracing::warn!(
                    client_key = %key,
                    requests = info.requests,
                    limit = info.limit,
                    "Rate limit exceeded"
                );

                let retry_after = retry_after_secs(&info, chrono::Utc::now().timestamp());
                let error = ErrorResponse::too_many_requests(info.limit, info.window)
                    .with_retry_after(retry_after);

                let mut response = HttpResponse::TooManyRequests()
                    .insert_header((RETRY_AFTER, retry_after.to_string()))
                    .json(error);
                apply_headers(response.headers_mut(), &info);

                let (http_req, _payload) = req.into_parts();
                return Ok(ServiceResponse::new(http_req, response).map_into_right_body());
            }

            let mut res = service.call(req).await?;
            apply_headers(res.headers_mut(), &info);
            Ok(res.map_into_left_body())
        })
    }
}

/// Identify the caller: API key when presented, otherwise the client address.
///
/// The address is the socket peer unless `trust_proxy_headers` is set, in
/// which case `Forwarded` / `X-Forwarded-For` win. Clients control those
/// headers, so trusting them without a rewriting proxy in front lets a caller
/// pick a fresh key per request.
pub fn client_key(req: &ServiceRequest, trust_proxy_headers: bool) -> String {
    if let Some(api_key) = req
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
    {
        return format!("key:{}", api_key);
    }

    let addr = if trust_proxy_headers {
        req.connection_info().realip_remote_addr().map(str::to_string)
    } else {
        req.peer_addr().map(|addr| addr.ip().to_string())
    };
    format!("ip:{}", addr.as_deref().unwrap_or("unknown"))
}

/// Attach usage headers derived from `info`.
pub fn apply_headers(headers: &mut HeaderMap, info: &RateLimitResult) {
    headers.insert(LIMIT_HEADER, HeaderValue::from(info.limit));
    headers.insert(REMAINING_HEADER, HeaderValue::from(info.remaining));
    headers.insert(WINDOW_HEADER, HeaderValue::from(info.window));
    if let Some(reset) = info.reset_time {
        headers.insert(RESET_HEADER, HeaderValue::from(reset));
    }
}

/// Seconds until the window resets, or the full window when unknown.
fn retry_after_secs(info: &RateLimitResult, now: i64) -> u64 {
    match info.reset_time {
        Some(reset) => reset.saturating_sub(now).max(1) as u64,
        None => info.window.max(1),
    }
}
