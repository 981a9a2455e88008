use crate::domain::cache_policy::HeaderPolicy;
use crate::domain::error::ErrorResponse;
use crate::domain::image_path::ImagePath;
use crate::observability::propagators::HyperHeaderExtractor;
use crate::repository::ImageRepository;
use crate::response_handler::{
    error_response, health_response, transform, CorsPolicy, RequestContext, ResultResponse,
};
use crate::service::ImageService;
use http_body_util::{combinators::BoxBody, BodyExt, Empty, Full};
use hyper::body::Bytes;
use hyper::header::{HeaderValue, ALLOW, IF_NONE_MATCH, ORIGIN};
use hyper::{Method, Request, Response, StatusCode};
use opentelemetry::Context;
use std::sync::Arc;
use tracing::instrument;
use tracing_opentelemetry::OpenTelemetrySpanExt;

const STATUS_PATH: &str = "/private/status";

/// Everything a request needs, built once at startup and shared by all connections.
pub struct AppState<R, L> {
    pub service: ImageService<R, L>,
    pub headers: HeaderPolicy,
    pub cors: CorsPolicy,
    pub route_prefix: String,
}

#[instrument(skip_all, fields(method = %req.method(), path = %req.uri().path()))]
pub async fn router<B, R, L>(req: Request<B>, state: Arc<AppState<R, L>>) -> ResultResponse
where
    R: ImageRepository,
    L: ImageRepository,
{
    let (parts, _) = req.into_parts();
    let context: Context = opentelemetry::global::get_text_map_propagator(|propagator| {
        propagator.extract(&HyperHeaderExtractor(&parts.headers))
    });
    tracing::Span::current().set_parent(context);

    let origin = parts
        .headers
        .get(ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let path = parts.uri.path();

    let mut response = match (&parts.method, path) {
        (&Method::GET, STATUS_PATH) => Ok(Response::new(full("OK"))),
        (&Method::GET, _) | (&Method::HEAD, _) => {
            let request = RequestContext {
                include_body: parts.method == Method::GET,
                if_none_match: parts
                    .headers
                    .get(IF_NONE_MATCH)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string),
            };
            serve_image(path, &state, &request).await
        }
        (&Method::OPTIONS, _) => health_response(&state.service.health().await),
        _ => {
            let mut not_allowed = Response::new(full("Method not allowed"));
            *not_allowed.status_mut() = StatusCode::METHOD_NOT_ALLOWED;
            not_allowed
                .headers_mut()
                .insert(ALLOW, HeaderValue::from_static("GET, HEAD, OPTIONS"));
            Ok(not_allowed)
        }
    }?;

    state.cors.apply(origin.as_deref(), response.headers_mut());
    Ok(response)
}

async fn serve_image<R, L>(
    raw_path: &str,
    state: &AppState<R, L>,
    request: &RequestContext,
) -> ResultResponse
where
    R: ImageRepository,
    L: ImageRepository,
{
    match ImagePath::parse(raw_path, &state.route_prefix) {
        Ok(path) => {
            let resolved = state.service.resolve(&path).await;
            transform(resolved, &path, &state.headers, request)
        }
        Err(reason) => {
            let rejected = ErrorResponse::InvalidPathError {
                path: raw_path.to_string(),
                reason,
            };
            error_response(&rejected, &state.headers, request.include_body)
        }
    }
}

pub fn full<T: Into<Bytes>>(chunk: T) -> BoxBody<Bytes, hyper::Error> {
    Full::new(chunk.into())
        .map_err(|never| match never {})
        .boxed()
}

pub fn empty() -> BoxBody<Bytes, hyper::Error> {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::cache_policy::Environment;
    use crate::domain::ImageSource;
    use crate::repository::cache_repository::CacheRepository;
    use crate::service::tests::MockTier;
    use std::time::Duration;
    use hyper::header::{
        ACCESS_CONTROL_ALLOW_ORIGIN, CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE, ETAG,
        LAST_MODIFIED,
    };
    use serde_json::Value;

    const SITE: &str = "https://www.example-consulting.com";

    struct Harness {
        remote: MockTier,
        local: MockTier,
        state: Arc<AppState<MockTier, MockTier>>,
    }

    fn harness(remote: MockTier, local: MockTier, environment: Environment) -> Harness {
        let state = Arc::new(AppState {
            service: ImageService::new(Some(remote.clone()), Some(local.clone()), None),
            headers: HeaderPolicy::new(environment),
            cors: CorsPolicy::new(vec![SITE.to_string()]),
            route_prefix: "/images/".to_string(),
        });
        Harness {
            remote,
            local,
            state,
        }
    }

    fn production(remote: MockTier, local: MockTier) -> Harness {
        harness(remote, local, Environment::Production)
    }

    async fn send(
        harness: &Harness,
        method: Method,
        uri: &str,
        headers: &[(&str, &str)],
    ) -> Response<BoxBody<Bytes, hyper::Error>> {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        router(builder.body(()).unwrap(), harness.state.clone())
            .await
            .unwrap()
    }

    async fn body_bytes(response: Response<BoxBody<Bytes, hyper::Error>>) -> Bytes {
        response.into_body().collect().await.unwrap().to_bytes()
    }

    #[tokio::test]
    async fn remote_only_logo_is_immutable() {
        let h = production(
            MockTier::new(ImageSource::Remote).with("logos/company-logo.png", b"logo-bytes"),
            MockTier::new(ImageSource::Local),
        );

        let response = send(&h, Method::GET, "/logos/company-logo.png", &[]).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[CACHE_CONTROL],
            "public, max-age=31536000, immutable"
        );
        assert_eq!(response.headers()[CONTENT_TYPE], "image/png");
        assert_eq!(response.headers()[CONTENT_LENGTH], "10");
        assert!(response.headers().contains_key(LAST_MODIFIED));
        assert!(response.headers().contains_key(ETAG));
        assert_eq!(response.headers()["x-image-source"], "r2");
        assert_eq!(&body_bytes(response).await[..], b"logo-bytes");
        assert_eq!(h.local.call_count(), 0);
    }

    #[tokio::test]
    async fn hero_banner_prefers_remote_with_critical_directive() {
        let h = production(
            MockTier::new(ImageSource::Remote).with("hero/banner-home.jpg", b"remote"),
            MockTier::new(ImageSource::Local).with("hero/banner-home.jpg", b"local"),
        );

        let response = send(&h, Method::GET, "/images/hero/banner-home.jpg", &[]).await;

        assert_eq!(response.status(), StatusCode::OK);
        let cache_control = response.headers()[CACHE_CONTROL].to_str().unwrap().to_string();
        assert!(cache_control.contains("max-age=604800"));
        assert!(cache_control.contains("stale-while-revalidate=2592000"));
        assert_eq!(&body_bytes(response).await[..], b"remote");
    }

    #[tokio::test]
    async fn local_fallback_still_succeeds() {
        let h = production(
            MockTier::new(ImageSource::Remote),
            MockTier::new(ImageSource::Local).with("team/jordan.webp", b"local"),
        );

        let response = send(&h, Method::GET, "/team/jordan.webp", &[]).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[CACHE_CONTROL],
            "public, max-age=86400, stale-while-revalidate=604800"
        );
        assert_eq!(response.headers()["x-image-source"], "local");
        assert_eq!(&body_bytes(response).await[..], b"local");
    }

    #[tokio::test]
    async fn missing_everywhere_is_404() {
        let h = production(
            MockTier::new(ImageSource::Remote),
            MockTier::new(ImageSource::Local),
        );

        let response = send(&h, Method::GET, "/portfolio/ghost.png", &[]).await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(
            response.headers()[CACHE_CONTROL],
            "public, max-age=300, must-revalidate"
        );
        let body: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(body["status"], 404);
    }

    #[tokio::test]
    async fn invalid_paths_never_reach_a_tier() {
        let h = production(
            MockTier::new(ImageSource::Remote).with("a.png", b"a"),
            MockTier::new(ImageSource::Local).with("a.png", b"a"),
        );

        for uri in [
            "/../../etc/passwd.jpg",
            "/~admin/a.png",
            "/docs/readme.txt",
            "/logos/a%20b.png",
            "/a.gif",
        ] {
            let response = send(&h, Method::GET, uri, &[]).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
        }
        let response = send(&h, Method::HEAD, "/../../etc/passwd.jpg", &[]).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        assert_eq!(h.remote.call_count(), 0);
        assert_eq!(h.local.call_count(), 0);
    }

    #[tokio::test]
    async fn dot_segments_are_rejected_before_any_tier() {
        let h = production(
            MockTier::new(ImageSource::Remote).with("logos/a.png", b"a"),
            MockTier::new(ImageSource::Local).with("logos/a.png", b"a"),
        );

        for uri in ["/./logos/./a.png", "/images/./logos/a.png", "/logos/./a.png"] {
            let response = send(&h, Method::GET, uri, &[]).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
        }
        assert_eq!(h.remote.call_count(), 0);
        assert_eq!(h.local.call_count(), 0);
    }

    #[tokio::test]
    async fn local_read_failure_is_500_json() {
        let h = production(
            MockTier::new(ImageSource::Remote),
            MockTier::new(ImageSource::Local).failing_io(),
        );

        let response = send(&h, Method::GET, "/portfolio/case.jpg", &[]).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(
            response.headers()[CACHE_CONTROL],
            "public, max-age=300, must-revalidate"
        );
        let body: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(body["status"], 500);
        assert_eq!(body["error"], "Image could not be served.");
        assert_eq!(h.remote.call_count(), 1);
        assert_eq!(h.local.call_count(), 1);
    }

    #[tokio::test]
    async fn repeat_requests_are_served_from_cache() {
        let remote = MockTier::new(ImageSource::Remote).with("logos/a.png", b"logo");
        let state = Arc::new(AppState {
            service: ImageService::new(
                Some(remote.clone()),
                Some(MockTier::new(ImageSource::Local)),
                Some(CacheRepository::new(Duration::from_secs(60), 8, 1024)),
            ),
            headers: HeaderPolicy::new(Environment::Production),
            cors: CorsPolicy::default(),
            route_prefix: "/images/".to_string(),
        });
        let get = || {
            let request = Request::builder().uri("/images/logos/a.png").body(()).unwrap();
            router(request, state.clone())
        };

        let first = get().await.unwrap();
        assert_eq!(first.headers()["x-image-source"], "r2");

        let second = get().await.unwrap();
        assert_eq!(second.status(), StatusCode::OK);
        assert_eq!(second.headers()["x-image-source"], "cache");
        assert_eq!(
            second.headers()[CACHE_CONTROL],
            "public, max-age=31536000, immutable"
        );
        assert_eq!(&body_bytes(second).await[..], b"logo");
        assert_eq!(remote.call_count(), 1);
    }

    #[tokio::test]
    async fn head_has_headers_but_no_body() {
        let h = production(
            MockTier::new(ImageSource::Remote).with("logos/a.png", b"12345"),
            MockTier::new(ImageSource::Local),
        );

        let response = send(&h, Method::HEAD, "/logos/a.png", &[]).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_LENGTH], "5");
        assert!(body_bytes(response).await.is_empty());

        let response = send(&h, Method::HEAD, "/logos/missing.png", &[]).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(body_bytes(response).await.is_empty());
    }

    #[tokio::test]
    async fn repeated_gets_are_identical() {
        let h = production(
            MockTier::new(ImageSource::Remote).with("portfolio/case.jpg", b"jpeg-data"),
            MockTier::new(ImageSource::Local),
        );

        let first = send(&h, Method::GET, "/portfolio/case.jpg", &[]).await;
        let second = send(&h, Method::GET, "/portfolio/case.jpg", &[]).await;
        assert_eq!(first.headers()[CONTENT_TYPE], second.headers()[CONTENT_TYPE]);
        assert_eq!(body_bytes(first).await, body_bytes(second).await);
    }

    #[tokio::test]
    async fn matching_etag_is_not_modified() {
        let h = production(
            MockTier::new(ImageSource::Remote).with("logos/a.png", b"12345"),
            MockTier::new(ImageSource::Local),
        );

        let first = send(&h, Method::GET, "/logos/a.png", &[]).await;
        let etag = first.headers()[ETAG].to_str().unwrap().to_string();

        let response = send(&h, Method::GET, "/logos/a.png", &[("if-none-match", etag.as_str())]).await;
        assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
        assert!(response.headers().contains_key(CACHE_CONTROL));
        assert!(body_bytes(response).await.is_empty());
    }

    #[tokio::test]
    async fn development_disables_caching() {
        let h = harness(
            MockTier::new(ImageSource::Remote).with("hero/a.jpg", b"a"),
            MockTier::new(ImageSource::Local),
            Environment::Development,
        );

        let response = send(&h, Method::GET, "/hero/a.jpg", &[]).await;
        assert_eq!(
            response.headers()[CACHE_CONTROL],
            "no-store, no-cache, max-age=0, must-revalidate"
        );
    }

    #[tokio::test]
    async fn options_reports_health() {
        let h = production(
            MockTier::new(ImageSource::Remote),
            MockTier::new(ImageSource::Local),
        );

        let response = send(&h, Method::OPTIONS, "/anything.jpg", &[]).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["r2"], true);
        assert_eq!(body["local"], true);
        assert_eq!(body["cache"], false);
    }

    #[tokio::test]
    async fn options_reports_degraded_remote() {
        let h = production(
            MockTier::new(ImageSource::Remote).unreachable(),
            MockTier::new(ImageSource::Local),
        );

        let response = send(&h, Method::OPTIONS, "/anything.jpg", &[]).await;
        let body: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(body["status"], "degraded");
        assert_eq!(body["r2"], false);
    }

    #[tokio::test]
    async fn cors_for_known_origins_only() {
        let h = production(
            MockTier::new(ImageSource::Remote).with("logos/a.png", b"a"),
            MockTier::new(ImageSource::Local),
        );

        let response = send(&h, Method::GET, "/logos/a.png", &[("origin", SITE)]).await;
        assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], SITE);

        let response = send(&h, Method::GET, "/logos/a.png", &[("origin", "https://other.example")]).await;
        assert!(!response.headers().contains_key(ACCESS_CONTROL_ALLOW_ORIGIN));
    }

    #[tokio::test]
    async fn status_and_unsupported_methods() {
        let h = production(
            MockTier::new(ImageSource::Remote),
            MockTier::new(ImageSource::Local),
        );

        let response = send(&h, Method::GET, "/private/status", &[]).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(&body_bytes(response).await[..], b"OK");

        let response = send(&h, Method::DELETE, "/logos/a.png", &[]).await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[ALLOW], "GET, HEAD, OPTIONS");
    }
}
