//! Per-user rate limiting middleware using the Governor crate
//!
//! Keyed by the [`Identity`] the auth layer attached, so it must sit inside
//! [`AuthLayer`](crate::middleware::auth::AuthLayer).

use axum::{
    body::Body,
    http::Request,
    response::{IntoResponse, Response},
};
use futures::future::BoxFuture;
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use std::{
    num::NonZeroU32,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    task::{Context, Poll},
};
use tower::{Layer, Service};
use tracing::{debug, warn};

use crate::error::AppError;
use crate::middleware::auth::Identity;

const ANONYMOUS: &str = "anonymous";

/// Checks between sweeps of replenished keys
const PRUNE_EVERY: usize = 1024;

/// Keyed limiter whose key map is swept every [`PRUNE_EVERY`] checks, so
/// one-off user ids do not accumulate
#[derive(Clone)]
struct SharedRateLimiter {
    limiter: Arc<DefaultKeyedRateLimiter<String>>,
    checks: Arc<AtomicUsize>,
}

impl SharedRateLimiter {
    fn new(quota: Quota) -> Self {
        Self {
            limiter: Arc::new(RateLimiter::keyed(quota)),
            checks: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn check(&self, key: &str) -> bool {
        let allowed = self.limiter.check_key(&key.to_owned()).is_ok();
        if self.checks.fetch_add(1, Ordering::Relaxed) % PRUNE_EVERY == PRUNE_EVERY - 1 {
            self.prune();
        }
        allowed
    }

    /// Drop keys whose quota has fully replenished
    fn prune(&self) {
        let before = self.limiter.len();
        self.limiter.retain_recent();
        self.limiter.shrink_to_fit();
        debug!(before, after = self.limiter.len(), "Pruned rate limiter keys");
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> usize {
        self.limiter.len()
    }
}

/// Rate limiting layer
#[derive(Clone)]
pub struct RateLimitLayer {
    limiter: SharedRateLimiter,
}

impl RateLimitLayer {
    pub fn per_minute(requests_per_minute: u32, burst_size: u32) -> Self {
        let rate = NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(burst_size).unwrap_or(rate);
        let quota = Quota::per_minute(rate).allow_burst(burst);

        Self {
            limiter: SharedRateLimiter::new(quota),
        }
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitMiddleware {
            inner,
            limiter: self.limiter.clone(),
        }
    }
}

/// Rate limiting middleware service
#[derive(Clone)]
pub struct RateLimitMiddleware<S> {
    inner: S,
    limiter: SharedRateLimiter,
}

impl<S> Service<Request<Body>> for RateLimitMiddleware<S>
where
    S: Service<Request<Body>, Response = Response> + Send + Clone + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let key = request
            .extensions()
            .get::<Identity>()
            .map(|identity| identity.user_id.clone())
            .unwrap_or_else(|| ANONYMOUS.to_string());

        if self.limiter.check(&key) {
            let future = self.inner.call(request);
            Box::pin(async move { future.await })
        } else {
            warn!(user_id = %key, path = %request.uri().path(), "Rate limit exceeded");
            Box::pin(async move { Ok(AppError::RateLimitExceeded.into_response()) })
        }
    }
}
