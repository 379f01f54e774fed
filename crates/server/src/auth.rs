//! Bearer-key authentication for the `/v1` surface.

use std::{
    sync::Arc,
    task::{Context, Poll},
};

use axum::{
    body::Body,
    http::{Request, Response, StatusCode, header},
    response::IntoResponse,
};
use secrecy::{ExposeSecret, SecretString};
use tower::{Layer, Service};

/// Tower layer enforcing `Authorization: Bearer <server_api_key>`.
///
/// With no key configured the layer is a pass-through; the gateway then
/// relies on whatever sits in front of it.
#[derive(Clone)]
pub struct AuthLayer {
    key: Option<Arc<SecretString>>,
}

impl AuthLayer {
    pub fn new(key: Option<SecretString>) -> Self {
        Self {
            key: key.map(Arc::new),
        }
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthService<S>;

    fn layer(&self, next: S) -> Self::Service {
        AuthService {
            next,
            key: self.key.clone(),
        }
    }
}

#[derive(Clone)]
pub struct AuthService<S> {
    next: S,
    key: Option<Arc<SecretString>>,
}

impl<S> Service<Request<Body>> for AuthService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = std::pin::Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.next.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let Some(expected) = self.key.clone() else {
            let future = self.next.call(request);
            return Box::pin(future);
        };

        let presented = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "));

        let authorized = presented.is_some_and(|presented| constant_time_eq(presented, expected.expose_secret()));

        if !authorized {
            log::debug!("Rejected request with missing or mismatching bearer key");
            return Box::pin(async move { Ok(unauthorized()) });
        }

        let future = self.next.call(request);
        Box::pin(future)
    }
}

fn unauthorized() -> Response<Body> {
    let body = serde_json::json!({
        "error": {
            "type": "authentication",
            "message": "Missing or invalid API key",
        }
    });

    (
        StatusCode::UNAUTHORIZED,
        [(header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response()
}

/// Byte comparison that does not short-circuit on the first mismatch, so
/// timing does not reveal how much of the key matched.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();

    if a.len() != b.len() {
        return false;
    }

    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_keys_compare_equal() {
        assert!(constant_time_eq("sk-secret", "sk-secret"));
    }

    #[test]
    fn different_keys_compare_unequal() {
        assert!(!constant_time_eq("sk-secret", "sk-Secret"));
        assert!(!constant_time_eq("sk-secret", "sk-secret-longer"));
        assert!(!constant_time_eq("", "sk-secret"));
    }
}
