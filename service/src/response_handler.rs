use crate::domain::cache_policy::{http_date, HeaderPolicy, Outcome};
use crate::domain::error::ErrorResponse;
use crate::domain::health::HealthStatus;
use crate::domain::image_path::ImagePath;
use crate::router::{empty, full};
use crate::service::{InternalResponse, ResolvedImage};
use chrono::Utc;
use http_body_util::combinators::BoxBody;
use hyper::body::Bytes;
use hyper::header::{
    HeaderMap, HeaderValue, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    ACCESS_CONTROL_MAX_AGE, CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE, ETAG, EXPIRES,
    LAST_MODIFIED, VARY,
};
use hyper::{Response, StatusCode};
use serde_json::json;
use std::error;
use tracing::{error, info, instrument};

const JSON_CONTENT_TYPE: &str = "application/json";
const SERVER_TIMING_HEADER_NAME: &str = "server-timing";
const IMAGE_SOURCE_HEADER_NAME: &str = "x-image-source";
const HEALTH_CACHE_CONTROL: &str = "no-store";
const ALLOWED_METHODS: &str = "GET, HEAD, OPTIONS";
const PREFLIGHT_MAX_AGE: &str = "86400";

pub type ResultResponse =
    Result<Response<BoxBody<Bytes, hyper::Error>>, Box<dyn error::Error + Send + Sync>>;

/// The parts of the incoming request that shape the response.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub include_body: bool,
    pub if_none_match: Option<String>,
}

#[instrument(skip_all, fields(path = %path))]
pub fn transform(
    response: InternalResponse,
    path: &ImagePath,
    policy: &HeaderPolicy,
    request: &RequestContext,
) -> ResultResponse {
    match response.and_then(|resolved| image_response(&resolved, path, policy, request)) {
        Ok(response) => Ok(response),
        Err(e) => error_response(&e, policy, request.include_body),
    }
}

fn image_response(
    resolved: &ResolvedImage,
    path: &ImagePath,
    policy: &HeaderPolicy,
    request: &RequestContext,
) -> Result<Response<BoxBody<Bytes, hyper::Error>>, ErrorResponse> {
    let image = &resolved.image;
    let headers = policy
        .compute(
            Outcome::Served {
                source: image.source,
                path,
            },
            Some(&image.metadata),
        )
        .map_err(|e| ErrorResponse::unexpected(path.as_str(), e))?;

    let not_modified = match (&request.if_none_match, &headers.etag) {
        (Some(candidates), Some(etag)) => etag_matches(candidates, etag),
        _ => false,
    };

    let served_from = if resolved.cache_hit {
        "cache".to_string()
    } else {
        image.source.to_string()
    };

    let mut builder = Response::builder()
        .status(if not_modified {
            StatusCode::NOT_MODIFIED
        } else {
            StatusCode::OK
        })
        .header(CONTENT_TYPE, image.content_type.as_str())
        .header(CACHE_CONTROL, headers.cache_control)
        .header(EXPIRES, headers.expires)
        .header(
            LAST_MODIFIED,
            headers.last_modified.unwrap_or_else(|| http_date(Utc::now())),
        )
        .header(VARY, "Accept-Encoding")
        .header(IMAGE_SOURCE_HEADER_NAME, served_from);
    if let Some(etag) = headers.etag {
        builder = builder.header(ETAG, etag);
    }
    if !resolved.server_timing.is_empty() {
        builder = builder.header(SERVER_TIMING_HEADER_NAME, resolved.server_timing.to_string());
    }

    let body = if not_modified {
        empty()
    } else {
        builder = builder.header(CONTENT_LENGTH, image.bytes.len());
        if request.include_body {
            full(image.bytes.clone())
        } else {
            empty()
        }
    };

    builder
        .body(body)
        .map_err(|e| ErrorResponse::unexpected(path.as_str(), e))
}

pub fn error_response(
    err: &ErrorResponse,
    policy: &HeaderPolicy,
    include_body: bool,
) -> ResultResponse {
    match err {
        ErrorResponse::InvalidPathError { path, reason } => {
            info!("Rejected path {path}: {reason}")
        }
        ErrorResponse::ImageNotFoundError { path } => info!("Image not found: {path}"),
        ErrorResponse::UnexpectedError { path, source } => {
            error!(error = ?source, "Unexpected error serving {path}: {source}")
        }
    }

    let headers = policy.compute(Outcome::Failed, None)?;
    let status = err.status();
    let body = if include_body {
        full(
            json!({
                "error": err.to_string(),
                "status": status.as_u16(),
            })
            .to_string(),
        )
    } else {
        empty()
    };

    Ok(Response::builder()
        .status(status)
        .header(CONTENT_TYPE, JSON_CONTENT_TYPE)
        .header(CACHE_CONTROL, headers.cache_control)
        .header(EXPIRES, headers.expires)
        .body(body)?)
}

pub fn health_response(health: &HealthStatus) -> ResultResponse {
    let (status, body) = match serde_json::to_vec(health) {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => {
            error!("Could not serialize health status: {e}");
            let body = json!({
                "status": "error",
                "message": "Health check failed",
            });
            (StatusCode::INTERNAL_SERVER_ERROR, body.to_string().into_bytes())
        }
    };

    Ok(Response::builder()
        .status(status)
        .header(CONTENT_TYPE, JSON_CONTENT_TYPE)
        .header(CACHE_CONTROL, HEALTH_CACHE_CONTROL)
        .body(full(body))?)
}

/// `If-None-Match` comparison, weak per RFC 9110.
fn etag_matches(candidates: &str, etag: &str) -> bool {
    let strip = |tag: &str| tag.trim().trim_start_matches("W/").to_string();
    let etag = strip(etag);
    candidates
        .split(',')
        .any(|candidate| candidate.trim() == "*" || strip(candidate) == etag)
}

/// Origins allowed to read images cross-site.
#[derive(Debug, Clone, Default)]
pub struct CorsPolicy {
    allowed_origins: Vec<String>,
}

impl CorsPolicy {
    pub fn new(origins: impl IntoIterator<Item = String>) -> CorsPolicy {
        CorsPolicy {
            allowed_origins: origins
                .into_iter()
                .map(|o| o.trim().trim_end_matches('/').to_string())
                .filter(|o| !o.is_empty())
                .collect(),
        }
    }

    pub fn allows(&self, origin: &str) -> bool {
        self.allowed_origins.iter().any(|allowed| allowed == origin)
    }

    pub fn apply(&self, origin: Option<&str>, headers: &mut HeaderMap) {
        headers.append(VARY, HeaderValue::from_static("Origin"));
        let Some(origin) = origin.filter(|o| self.allows(o)) else {
            return;
        };
        if let Ok(value) = HeaderValue::from_str(origin) {
            headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, value);
            headers.insert(
                ACCESS_CONTROL_ALLOW_METHODS,
                HeaderValue::from_static(ALLOWED_METHODS),
            );
            headers.insert(
                ACCESS_CONTROL_MAX_AGE,
                HeaderValue::from_static(PREFLIGHT_MAX_AGE),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn etag_comparison() {
        assert!(etag_matches("\"abc\"", "\"abc\""));
        assert!(etag_matches("W/\"abc\"", "\"abc\""));
        assert!(etag_matches("\"x\", \"abc\"", "W/\"abc\""));
        assert!(etag_matches("*", "\"abc\""));
        assert!(!etag_matches("\"abd\"", "\"abc\""));
    }

    #[test]
    fn cors_only_for_allowed_origins() {
        let cors = CorsPolicy::new(vec![
            "https://www.example-consulting.com/".to_string(),
            " ".to_string(),
        ]);

        let mut headers = HeaderMap::new();
        cors.apply(Some("https://www.example-consulting.com"), &mut headers);
        assert_eq!(
            headers[ACCESS_CONTROL_ALLOW_ORIGIN],
            "https://www.example-consulting.com"
        );
        assert_eq!(headers[ACCESS_CONTROL_ALLOW_METHODS], ALLOWED_METHODS);

        let mut headers = HeaderMap::new();
        cors.apply(Some("https://evil.example"), &mut headers);
        assert!(!headers.contains_key(ACCESS_CONTROL_ALLOW_ORIGIN));
        assert_eq!(headers[VARY], "Origin");

        let mut headers = HeaderMap::new();
        cors.apply(None, &mut headers);
        assert!(!headers.contains_key(ACCESS_CONTROL_ALLOW_ORIGIN));
    }
}
