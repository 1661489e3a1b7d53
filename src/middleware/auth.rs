//! Session authentication middleware
//!
//! Resolves the caller's session into an [`Identity`] and stores it in the
//! request extensions, where handlers pick it up with
//! `Extension<Identity>`. Requests without a resolvable identity are
//! answered with 401 before the handler runs.

use axum::{
    body::Body,
    http::{header::AUTHORIZATION, HeaderMap, HeaderName, Request},
    response::{IntoResponse, Response},
};
use futures::future::BoxFuture;
use std::{
    collections::HashMap,
    sync::Arc,
    task::{Context, Poll},
};
use tower::{Layer, Service};
use tracing::{debug, warn};

use crate::config::AuthConfig;
use crate::error::AppError;

/// The signed-in user a request acts for
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    pub user_id: String,
}

impl Identity {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}

/// Maps request credentials to users
#[derive(Debug, Default)]
pub struct SessionResolver {
    sessions: HashMap<String, String>,
    trusted_header: Option<HeaderName>,
}

impl SessionResolver {
    pub fn new(sessions: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            sessions: sessions.into_iter().collect(),
            trusted_header: None,
        }
    }

    /// Also accept a user id from `header`, as set by an identity-aware proxy
    pub fn with_trusted_header(mut self, header: HeaderName) -> Self {
        self.trusted_header = Some(header);
        self
    }

    pub fn from_config(config: &AuthConfig) -> Result<Self, AppError> {
        let resolver = Self::new(
            config
                .sessions
                .iter()
                .map(|s| (s.token.clone(), s.user_id.clone())),
        );

        match &config.trusted_header {
            Some(name) => {
                let header = HeaderName::try_from(name.as_str()).map_err(|e| {
                    AppError::Config(config::ConfigError::Message(format!(
                        "Invalid auth.trusted_header '{}': {}",
                        name, e
                    )))
                })?;
                Ok(resolver.with_trusted_header(header))
            }
            None => Ok(resolver),
        }
    }

    /// Identity for these headers, if any credential checks out
    pub fn resolve(&self, headers: &HeaderMap) -> Option<Identity> {
        if let Some(header) = &self.trusted_header {
            let user_id = headers
                .get(header)
                .and_then(|h| h.to_str().ok())
                .map(str::trim)
                .filter(|id| !id.is_empty());
            if let Some(user_id) = user_id {
                return Some(Identity::new(user_id));
            }
        }

        let token = headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .map(|h| h.strip_prefix("Bearer ").unwrap_or(h).trim())?;

        self.sessions.get(token).map(Identity::new)
    }
}

/// Authentication layer
#[derive(Clone)]
pub struct AuthLayer {
    resolver: Arc<SessionResolver>,
}

impl AuthLayer {
    pub fn new(resolver: SessionResolver) -> Self {
        Self {
            resolver: Arc::new(resolver),
        }
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthMiddleware {
            inner,
            resolver: self.resolver.clone(),
        }
    }
}

/// Authentication middleware service
#[derive(Clone)]
pub struct AuthMiddleware<S> {
    inner: S,
    resolver: Arc<SessionResolver>,
}

impl<S> Service<Request<Body>> for AuthMiddleware<S>
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

    fn call(&mut self, mut request: Request<Body>) -> Self::Future {
        match self.resolver.resolve(request.headers()) {
            Some(identity) => {
                debug!(user_id = %identity.user_id, path = %request.uri().path(), "Authenticated request");
                request.extensions_mut().insert(identity);
                let future = self.inner.call(request);
                Box::pin(async move { future.await })
            }
            None => {
                warn!(path = %request.uri().path(), "Rejected request without a valid session");
                Box::pin(async move {
                    Ok(AppError::Unauthorized(
                        "Sign in required. Provide a session via Authorization: 'Bearer <token>'"
                            .to_string(),
                    )
                    .into_response())
                })
            }
        }
    }
}
