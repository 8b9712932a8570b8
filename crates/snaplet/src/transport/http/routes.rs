//! HTTP route handlers.

use std::sync::Arc;

use axum::{
    Router,
    extract::{Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use crate::engine::ImageFormat;
use crate::health::HealthResponse;
use crate::render::RenderOptions;
use crate::service::{HealthSnapshot, RenderError, RenderService};
use crate::upload::Uploader;
use crate::version::VersionInfo;

#[derive(Clone)]
pub struct AppState {
    service: Arc<RenderService>,
    uploader: Arc<Uploader>,
}

#[derive(Debug, Serialize)]
pub struct HealthCheckResponse {
    pub status: HealthResponse,
    pub version: VersionInfo,
    pub engine: &'static str,
    pub started_at: String,
    pub slots: SlotInfo,
}

#[derive(Debug, Serialize)]
pub struct SlotInfo {
    pub available: usize,
    pub total: usize,
}

impl HealthCheckResponse {
    pub fn from_snapshot(snapshot: HealthSnapshot) -> Self {
        let status = if snapshot.is_busy() {
            HealthResponse::Busy
        } else {
            snapshot.state.into()
        };

        Self {
            status,
            version: snapshot.version,
            engine: snapshot.engine,
            started_at: snapshot.started_at.to_rfc3339(),
            slots: SlotInfo {
                available: snapshot.available_slots,
                total: snapshot.total_slots,
            },
        }
    }
}

async fn health_check(State(state): State<AppState>) -> Json<HealthCheckResponse> {
    let snapshot = state.service.health().await;
    Json(HealthCheckResponse::from_snapshot(snapshot))
}

async fn shutdown(State(state): State<AppState>) -> impl IntoResponse {
    tracing::info!("Shutdown requested via HTTP");
    state.service.trigger_shutdown();
    (StatusCode::OK, Json(serde_json::json!({})))
}

fn default_query_width() -> u32 {
    1280
}

fn default_query_height() -> u32 {
    720
}

fn default_query_quality() -> u8 {
    100
}

/// Query parameters of `GET /screenshot`, with the original short names.
#[derive(Debug, Deserialize)]
struct ScreenshotQuery {
    url: String,
    #[serde(default = "default_query_width", rename = "w")]
    width: u32,
    #[serde(default = "default_query_height", rename = "h")]
    height: u32,
    #[serde(default, rename = "fp")]
    full_page: bool,
    #[serde(default, rename = "l")]
    locator: Option<String>,
    #[serde(default, rename = "f")]
    format: Option<String>,
    #[serde(default = "default_query_quality", rename = "q")]
    quality: u8,
}

impl ScreenshotQuery {
    fn into_options(self) -> RenderOptions {
        let mut options = RenderOptions::for_url(self.url);
        options.width = self.width;
        options.height = self.height;
        options.full_page = self.full_page;
        options.selector = self.locator;
        options.format = ImageFormat::parse_lenient(self.format.as_deref());
        options.quality = self.quality;
        options
    }
}

fn render_error_response(error: RenderError) -> Response {
    let status = match &error {
        RenderError::NotReady | RenderError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
        RenderError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        RenderError::Acquire(_) => StatusCode::BAD_GATEWAY,
        RenderError::Page(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(serde_json::json!({
            "error": error.to_string(),
            "status": "failed"
        })),
    )
        .into_response()
}

/// `GET /screenshot`: render and return raw image bytes.
async fn get_screenshot(
    State(state): State<AppState>,
    Query(query): Query<ScreenshotQuery>,
) -> Response {
    match state.service.render(query.into_options()).await {
        Ok(rendered) => (
            [(header::CONTENT_TYPE, rendered.content_type)],
            rendered.bytes,
        )
            .into_response(),
        Err(e) => render_error_response(e),
    }
}

#[derive(Debug, Deserialize)]
struct PresignedQuery {
    #[serde(default)]
    presigned_url: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScreenshotResponse {
    id: String,
    status: &'static str,
    content_type: &'static str,
    /// Inline data URI; present when no presigned URL was supplied.
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    uploaded: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    console: Vec<String>,
    network_errors: Vec<String>,
    render_time: f64,
}

/// `POST /screenshot`: render and respond with JSON, uploading the image to
/// a presigned URL when one is supplied, inlining it as a data URI otherwise.
///
/// Render failures and timeouts are data, not HTTP errors: JSON callers get a
/// 200 with a terminal status. Only an unavailable service is an HTTP error.
async fn post_screenshot(
    State(state): State<AppState>,
    Query(query): Query<PresignedQuery>,
    Json(options): Json<RenderOptions>,
) -> Response {
    let rendered = match state.service.render(options).await {
        Ok(rendered) => rendered,
        Err(e @ (RenderError::NotReady | RenderError::ShuttingDown)) => {
            return render_error_response(e);
        }
        Err(e) => {
            let status = match &e {
                RenderError::Timeout(_) => "timeout",
                _ => "failed",
            };
            return (
                StatusCode::OK,
                Json(serde_json::json!({
                    "status": status,
                    "error": e.to_string()
                })),
            )
                .into_response();
        }
    };

    let content_type = rendered.content_type;
    let mut response = ScreenshotResponse {
        id: rendered.id,
        status: "succeeded",
        content_type,
        image: None,
        uploaded: None,
        error: None,
        console: rendered.logs.console,
        network_errors: rendered.logs.network_errors,
        render_time: rendered.render_time.as_secs_f64(),
    };

    match query.presigned_url {
        Some(ref url) => match state
            .uploader
            .put_presigned(url, rendered.bytes, content_type)
            .await
        {
            Ok(()) => response.uploaded = Some(true),
            Err(e) => {
                response.status = "upload_failed";
                response.uploaded = Some(false);
                response.error = Some(e.to_string());
            }
        },
        None => {
            use base64::Engine as _;
            let encoded = base64::engine::general_purpose::STANDARD.encode(&rendered.bytes);
            response.image = Some(format!("data:{content_type};base64,{encoded}"));
        }
    }

    (StatusCode::OK, Json(response)).into_response()
}

pub fn routes(service: Arc<RenderService>) -> Router {
    let state = AppState {
        service,
        uploader: Arc::new(Uploader::new()),
    };

    Router::new()
        .route("/health-check", get(health_check))
        .route("/shutdown", post(shutdown))
        .route("/screenshot", get(get_screenshot).post(post_screenshot))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::Health;
    use crate::pool::{EnginePool, PoolConfig};
    use crate::testing::{MOCK_IMAGE, MockEngine};
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    async fn response_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn service_with_engine(engine: &Arc<MockEngine>, health: Health) -> Arc<RenderService> {
        let pool = Arc::new(EnginePool::new(Arc::<MockEngine>::clone(engine), PoolConfig::default()));
        let service = Arc::new(
            RenderService::new(pool, 3).with_version(VersionInfo::new().with_engine("mock")),
        );
        service.set_health(health).await;
        service
    }

    #[tokio::test]
    async fn health_check_returns_status_and_version() {
        let engine = MockEngine::new();
        let service = service_with_engine(&engine, Health::Starting).await;
        let app = routes(service);

        let response = app
            .oneshot(Request::get("/health-check").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = response_json(response).await;
        assert_eq!(json["status"], "STARTING");
        assert!(json["version"]["snaplet"].is_string());
        assert_eq!(json["engine"], "mock");
        assert_eq!(json["slots"]["total"], 3);
    }

    #[tokio::test]
    async fn health_check_reports_ready() {
        let engine = MockEngine::new();
        let service = service_with_engine(&engine, Health::Ready).await;
        let app = routes(service);

        let response = app
            .oneshot(Request::get("/health-check").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let json = response_json(response).await;
        assert_eq!(json["status"], "READY");
        assert_eq!(json["slots"]["available"], 3);
    }

    #[tokio::test]
    async fn shutdown_route_triggers_signal() {
        let engine = MockEngine::new();
        let service = service_with_engine(&engine, Health::Ready).await;
        let mut rx = service.shutdown_rx();
        let app = routes(Arc::clone(&service));

        let response = app
            .oneshot(Request::post("/shutdown").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        rx.changed().await.unwrap();
        assert!(*rx.borrow());
    }

    #[tokio::test]
    async fn get_screenshot_returns_image_bytes() {
        let engine = MockEngine::new();
        let service = service_with_engine(&engine, Health::Ready).await;
        let app = routes(service);

        let response = app
            .oneshot(
                Request::get("/screenshot?url=https://example.com&f=png")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "image/png"
        );
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], MOCK_IMAGE);
    }

    #[tokio::test]
    async fn get_screenshot_requires_url() {
        let engine = MockEngine::new();
        let service = service_with_engine(&engine, Health::Ready).await;
        let app = routes(service);

        let response = app
            .oneshot(Request::get("/screenshot").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn get_screenshot_unavailable_before_ready() {
        let engine = MockEngine::new();
        let service = service_with_engine(&engine, Health::Starting).await;
        let app = routes(service);

        let response = app
            .oneshot(
                Request::get("/screenshot?url=https://example.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let json = response_json(response).await;
        assert_eq!(json["status"], "failed");
    }

    #[tokio::test]
    async fn post_screenshot_inlines_image_without_presigned_url() {
        let engine = MockEngine::new();
        let service = service_with_engine(&engine, Health::Ready).await;
        let app = routes(service);

        let response = app
            .oneshot(
                Request::post("/screenshot")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"url":"https://example.com"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = response_json(response).await;
        assert_eq!(json["status"], "succeeded");
        assert_eq!(json["contentType"], "image/jpeg");
        assert!(json["image"]
            .as_str()
            .unwrap()
            .starts_with("data:image/jpeg;base64,"));
        assert!(json["console"].as_array().is_some());
        assert!(json.get("uploaded").is_none());
    }

    #[tokio::test]
    async fn post_screenshot_uploads_to_presigned_url() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let upload_server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&upload_server)
            .await;

        let engine = MockEngine::new();
        let service = service_with_engine(&engine, Health::Ready).await;
        let app = routes(service);

        let uri = format!(
            "/screenshot?presigned_url={}/bucket/shot.jpg",
            upload_server.uri()
        );
        let response = app
            .oneshot(
                Request::post(&uri)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"url":"https://example.com"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = response_json(response).await;
        assert_eq!(json["status"], "succeeded");
        assert_eq!(json["uploaded"], true);
        assert!(json.get("image").is_none());
    }

    #[tokio::test]
    async fn post_screenshot_reports_upload_failure() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let upload_server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&upload_server)
            .await;

        let engine = MockEngine::new();
        let service = service_with_engine(&engine, Health::Ready).await;
        let app = routes(service);

        let uri = format!("/screenshot?presigned_url={}/up", upload_server.uri());
        let response = app
            .oneshot(
                Request::post(&uri)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"url":"https://example.com"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = response_json(response).await;
        assert_eq!(json["status"], "upload_failed");
        assert_eq!(json["uploaded"], false);
        assert!(json["error"].is_string());
    }

    #[tokio::test]
    async fn post_screenshot_timeout_is_terminal_data() {
        let engine = MockEngine::new();
        engine.set_navigate_delay(std::time::Duration::from_secs(5));
        let service = service_with_engine(&engine, Health::Ready).await;
        let app = routes(service);

        let response = app
            .oneshot(
                Request::post("/screenshot")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        r#"{"url":"https://example.com","timeoutSeconds":1}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = response_json(response).await;
        assert_eq!(json["status"], "timeout");
        // The lease must still have been settled.
        assert_eq!(engine.session_closes(), 1);
    }
}
