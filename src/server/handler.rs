// src/server/handler.rs
use hyper::header::{
    HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_MAX_AGE, CACHE_CONTROL, CONTENT_TYPE,
};
use hyper::{Body, Method, Request, Response, StatusCode};
use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;
use tower::Service;
use tracing::{error, Instrument};
use uuid::Uuid;

use crate::aggregator::Aggregator;
use crate::discovery::{routing_domain_for, TargetSet};
use crate::metrics::MetricsCollector;

const TARGETS_CACHE: &str = "public, max-age=300";
const LEGACY_CACHE: &str = "public, max-age=60";
const NO_CACHE: &str = "no-cache";

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("invalid target key: {0}")]
    InvalidKey(String),

    #[error("unknown target: {0}")]
    UnknownTarget(String),

    #[error("missing query parameter: {0}")]
    MissingParameter(&'static str),

    #[error("failed to serialize response: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("failed to build response: {0}")]
    Response(#[from] hyper::http::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidKey(_) | ApiError::MissingParameter(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::UnknownTarget(_) => StatusCode::NOT_FOUND,
            ApiError::Serialization(_) | ApiError::Response(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn title(&self) -> &'static str {
        match self {
            ApiError::InvalidKey(_) | ApiError::MissingParameter(_) => "Bad request",
            ApiError::UnknownTarget(_) => "Not found",
            ApiError::Serialization(_) | ApiError::Response(_) => "Internal server error",
        }
    }

    /// `{error, message}` body; cannot fail.
    pub fn into_response(self) -> Response<Body> {
        let body = serde_json::json!({
            "error": self.title(),
            "message": self.to_string(),
        });
        let mut response = Response::new(Body::from(body.to_string()));
        *response.status_mut() = self.status();
        let headers = response.headers_mut();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
        response
    }
}

fn json_response<T: Serialize>(value: &T, cache_control: &'static str) -> Result<Response<Body>, ApiError> {
    let body = serde_json::to_vec(value)?;
    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, "application/json")
        .header(CACHE_CONTROL, cache_control)
        .header(ACCESS_CONTROL_ALLOW_ORIGIN, "*")
        .body(Body::from(body))?)
}

fn preflight() -> Result<Response<Body>, ApiError> {
    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(ACCESS_CONTROL_ALLOW_ORIGIN, "*")
        .header(ACCESS_CONTROL_ALLOW_METHODS, "GET, POST, OPTIONS")
        .header(ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type")
        .header(ACCESS_CONTROL_MAX_AGE, "86400")
        .body(Body::empty())?)
}

fn not_found() -> Result<Response<Body>, ApiError> {
    Ok(Response::builder()
        .status(StatusCode::NOT_FOUND)
        .body(Body::from("Not found"))?)
}

/// Maps a `/api/health/{key}` path segment to a routing domain.
///
/// Empty or `root` means the base domain. A key without a dot is a subdomain
/// of the base, as is a full host under the base. A dotted key is first read
/// as a multi-level subdomain (`beta.pay` → `beta.pay.{base}`) and then as a
/// full host; either reading must match a discovered target.
pub fn resolve_domain(
    key: &str,
    base_domain: &str,
    targets: &TargetSet,
) -> Result<String, ApiError> {
    let key = key.trim_matches('/').to_ascii_lowercase();
    if key.is_empty() || key == "root" {
        return Ok(base_domain.to_string());
    }
    let valid = key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
        && !key.starts_with('.')
        && !key.ends_with('.');
    if !valid {
        return Err(ApiError::InvalidKey(key));
    }

    if key == base_domain || key.ends_with(&format!(".{}", base_domain)) {
        return Ok(key);
    }
    let under_base = routing_domain_for(&key, base_domain);
    if !key.contains('.') {
        return Ok(under_base);
    }

    let discovered = |domain: &str| targets.iter().any(|t| t.routing_domain == domain);
    if discovered(&under_base) {
        Ok(under_base)
    } else if discovered(&key) {
        Ok(key)
    } else {
        Err(ApiError::UnknownTarget(key))
    }
}

fn query_param(query: Option<&str>, name: &str) -> Option<String> {
    url::form_urlencoded::parse(query?.as_bytes())
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

#[derive(Clone)]
pub struct ApiHandler {
    aggregator: Arc<Aggregator>,
    base_domain: Arc<str>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl ApiHandler {
    pub fn new(
        aggregator: Arc<Aggregator>,
        base_domain: &str,
        metrics: Option<Arc<MetricsCollector>>,
    ) -> Self {
        Self {
            aggregator,
            base_domain: Arc::from(base_domain),
            metrics,
        }
    }

    pub async fn handle(&self, req: Request<Body>) -> Response<Body> {
        let request_id = Uuid::new_v4();
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        let query = req.uri().query().map(str::to_string);
        let span = tracing::info_span!("request", %request_id, %method, %path);

        let (route, result) = self
            .route(&method, &path, query.as_deref())
            .instrument(span)
            .await;
        let mut response = result.unwrap_or_else(|e| {
            if e.status().is_server_error() {
                error!(%request_id, "{} {} failed: {}", method, path, e);
            }
            e.into_response()
        });

        if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
            response.headers_mut().insert("x-request-id", value);
        }
        if let Some(metrics) = &self.metrics {
            metrics.record_http_request(route, response.status().as_u16());
        }
        response
    }

    async fn route(
        &self,
        method: &Method,
        path: &str,
        query: Option<&str>,
    ) -> (&'static str, Result<Response<Body>, ApiError>) {
        if method == Method::OPTIONS {
            return ("preflight", preflight());
        }
        if method != Method::GET && method != Method::HEAD {
            return ("not_found", not_found());
        }

        match path {
            "/api/targets" => ("targets", self.targets().await),
            "/api/snapshot" => ("snapshot", self.snapshot().await),
            "/json" => ("legacy", self.legacy().await),
            "/api/health" => ("health", self.health("").await),
            p if p.starts_with("/api/health/") => {
                ("health", self.health(&p["/api/health/".len()..]).await)
            }
            "/api/manifest" => ("manifest", self.manifest("").await),
            p if p.starts_with("/api/manifest/") => {
                ("manifest", self.manifest(&p["/api/manifest/".len()..]).await)
            }
            "/health/proxy/status" => match query_param(query, "domain") {
                Some(domain) => ("health", self.health(&domain).await),
                None => ("health", Err(ApiError::MissingParameter("domain"))),
            },
            "/health/proxy/manifest" => match query_param(query, "domain") {
                Some(domain) => ("manifest", self.manifest(&domain).await),
                None => ("manifest", Err(ApiError::MissingParameter("domain"))),
            },
            _ => ("not_found", not_found()),
        }
    }

    async fn targets(&self) -> Result<Response<Body>, ApiError> {
        let targets = self.aggregator.targets().await;
        json_response(targets.as_ref(), TARGETS_CACHE)
    }

    async fn snapshot(&self) -> Result<Response<Body>, ApiError> {
        let snapshot = self.aggregator.latest_or_build().await;
        json_response(snapshot.as_ref(), NO_CACHE)
    }

    async fn legacy(&self) -> Result<Response<Body>, ApiError> {
        let snapshot = self.aggregator.latest_or_build().await;
        json_response(&snapshot.to_legacy(), LEGACY_CACHE)
    }

    async fn health(&self, key: &str) -> Result<Response<Body>, ApiError> {
        let domain = self.resolve(key).await?;
        let result = self.aggregator.check_domain(&domain).await;
        json_response(&result, NO_CACHE)
    }

    async fn manifest(&self, key: &str) -> Result<Response<Body>, ApiError> {
        let domain = self.resolve(key).await?;
        let result = self.aggregator.check_manifest(&domain).await;
        json_response(&result, NO_CACHE)
    }

    async fn resolve(&self, key: &str) -> Result<String, ApiError> {
        let targets = self.aggregator.targets().await;
        resolve_domain(key, &self.base_domain, &targets)
    }
}

impl Service<Request<Body>> for ApiHandler {
    type Response = Response<Body>;
    type Error = Infallible;
    type Future = futures::future::BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let handler = self.clone();
        Box::pin(async move { Ok(handler.handle(req).await) })
    }
}
