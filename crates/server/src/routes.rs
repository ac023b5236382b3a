use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, StatusCode, Uri},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use percent_encoding::percent_decode_str;
use tower_http::trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{debug, info, Level};

use common::utils::text::{truncate_for_log, LOG_FIELD_LIMIT};
use service::KvStore;

use crate::codec::{self, FOUND, NOT_FOUND, OKAY, SUCCESS};
use crate::errors::ApiError;
use crate::observability;
use crate::operation::{self, Operation, Outcome};

/// Shared handler state: the opened store, valid for the whole serve loop.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn KvStore>,
}

async fn root() -> Response {
    codec::envelope(OKAY, SUCCESS)
}

async fn probe(State(state): State<AppState>, uri: Uri) -> Result<Response, ApiError> {
    let [key] = path_params::<1>(&uri)?;
    respond(&state, Operation::Probe { key: non_empty(key)? }).await
}

/// Serves both `/submit/{key}/{value}` and `/submit/{key}/`; the latter stores
/// an empty value.
async fn submit(State(state): State<AppState>, uri: Uri) -> Result<Response, ApiError> {
    let [key, value] = path_params::<2>(&uri)?;
    respond(&state, Operation::Submit { key: non_empty(key)?, value }).await
}

async fn fetch(State(state): State<AppState>, uri: Uri) -> Result<Response, ApiError> {
    let [key] = path_params::<1>(&uri)?;
    respond(&state, Operation::Fetch { key: non_empty(key)? }).await
}

async fn remove(State(state): State<AppState>, uri: Uri) -> Result<Response, ApiError> {
    let [key] = path_params::<1>(&uri)?;
    respond(&state, Operation::Remove { key: non_empty(key)? }).await
}

async fn metrics() -> (StatusCode, String) {
    observability::encode_metrics()
}

/// Unmatched paths: wrong segment count for a known operation, or an unknown route.
async fn fallback(uri: Uri) -> ApiError {
    if operation::is_operation_path(uri.path()) {
        ApiError::Validation
    } else {
        ApiError::UnknownRoute
    }
}

/// Percent-decoded segments after the operation name, as raw bytes.
///
/// The route table has already fixed the segment count; `N` only has to agree
/// with it. Segments are decoded here rather than through `Path<String>` so
/// keys and values need not be UTF-8.
fn path_params<const N: usize>(uri: &Uri) -> Result<[Vec<u8>; N], ApiError> {
    let segments: Vec<Vec<u8>> = uri
        .path()
        .trim_start_matches('/')
        .split('/')
        .skip(1)
        .map(|seg| percent_decode_str(seg).collect())
        .collect();
    segments.try_into().map_err(|_| ApiError::Validation)
}

fn non_empty(key: Vec<u8>) -> Result<Vec<u8>, ApiError> {
    if key.is_empty() {
        return Err(ApiError::Validation);
    }
    Ok(key)
}

/// Run `op` on the blocking pool; engine calls may touch the disk.
async fn respond(state: &AppState, op: Operation) -> Result<Response, ApiError> {
    let name = op.name();
    let store = Arc::clone(&state.store);
    let outcome = tokio::task::spawn_blocking(move || op.execute(store.as_ref())).await??;
    debug!(op = name, "operation executed");
    Ok(match outcome {
        Outcome::Found => codec::envelope(OKAY, FOUND),
        Outcome::Missing => codec::envelope(OKAY, NOT_FOUND),
        Outcome::Value(value) => codec::plain_text(value),
        Outcome::Done => codec::envelope(OKAY, SUCCESS),
    })
}

/// Swap axum's empty 405 body for an envelope, keeping the `Allow` header.
fn method_not_allowed(resp: Response) -> Response {
    let allow = resp.headers().get(header::ALLOW).cloned();
    let mut out = ApiError::MethodNotAllowed.into_response();
    if let Some(allow) = allow {
        out.headers_mut().insert(header::ALLOW, allow);
    }
    out
}

/// Access log + metrics for every request.
async fn access_log(req: Request, next: Next) -> Response {
    let remote = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let method = req.method().clone();
    let op = operation::label_for_path(req.uri().path());
    let path = truncate_for_log(req.uri().path(), LOG_FIELD_LIMIT);
    let started = Instant::now();

    let mut resp = next.run(req).await;
    if resp.status() == StatusCode::METHOD_NOT_ALLOWED {
        resp = method_not_allowed(resp);
    }

    let elapsed = started.elapsed();
    observability::record_request(op, resp.status(), elapsed);
    info!(
        %remote,
        %method,
        %path,
        status = resp.status().as_u16(),
        elapsed_us = elapsed.as_micros() as u64,
        "request handled"
    );
    resp
}

/// Build the application router: the four operations, `/`, `/metrics`, and the
/// 400/404 fallback.
pub fn build_router(store: Arc<dyn KvStore>) -> Router {
    let state = AppState { store };

    Router::new()
        .route("/", get(root))
        .route("/probe/:key", get(probe))
        .route("/submit/:key/:value", get(submit))
        .route("/submit/:key/", get(submit))
        .route("/fetch/:key", get(fetch))
        .route("/delete/:key", get(remove))
        .route("/metrics", get(metrics))
        .fallback(fallback)
        .with_state(state)
        .layer(middleware::from_fn(access_log))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(
                    DefaultMakeSpan::new()
                        .level(Level::INFO)
                        .include_headers(false),
                )
                .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                .on_response(
                    DefaultOnResponse::new()
                        .level(Level::DEBUG)
                        .include_headers(false),
                )
                .on_failure(DefaultOnFailure::new().level(Level::ERROR)),
        )
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::body::Body;
    use axum::http::Request;
    use service::{SledStore, StorageError};
    use tower::Service;
    use uuid::Uuid;

    use super::*;

    struct Reply {
        status: StatusCode,
        content_type: Option<String>,
        allow: Option<String>,
        bytes: Vec<u8>,
        body: String,
    }

    fn header_str(resp: &Response, name: header::HeaderName) -> Option<String> {
        resp.headers().get(name).and_then(|v| v.to_str().ok()).map(str::to_string)
    }

    async fn send(app: &Router, method: &str, uri: &str) -> anyhow::Result<Reply> {
        let req = Request::builder().method(method).uri(uri).body(Body::empty())?;
        let resp = app.clone().call(req).await?;
        let status = resp.status();
        let content_type = header_str(&resp, header::CONTENT_TYPE);
        let allow = header_str(&resp, header::ALLOW);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await?.to_vec();
        let body = String::from_utf8_lossy(&bytes).into_owned();
        Ok(Reply { status, content_type, allow, bytes, body })
    }

    async fn get_path(app: &Router, uri: &str) -> anyhow::Result<Reply> {
        send(app, "GET", uri).await
    }

    fn sled_app() -> anyhow::Result<(Router, PathBuf)> {
        let path = std::env::temp_dir().join(format!("routes_{}", Uuid::new_v4()));
        let store: Arc<dyn KvStore> = Arc::new(SledStore::open(&path)?);
        Ok((build_router(store), path))
    }

    /// Counts every call; behaves like an empty store.
    #[derive(Default)]
    struct CountingStore {
        calls: AtomicUsize,
    }

    impl KvStore for CountingStore {
        fn get(&self, _key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        }
        fn put(&self, _key: &[u8], _value: &[u8]) -> Result<(), StorageError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn delete(&self, _key: &[u8]) -> Result<(), StorageError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingStore;

    impl KvStore for FailingStore {
        fn get(&self, _key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
            Err(StorageError::Engine("disk unavailable".into()))
        }
        fn put(&self, _key: &[u8], _value: &[u8]) -> Result<(), StorageError> {
            Err(StorageError::Engine("disk unavailable".into()))
        }
        fn delete(&self, _key: &[u8]) -> Result<(), StorageError> {
            Err(StorageError::Engine("disk unavailable".into()))
        }
    }

    #[tokio::test]
    async fn root_reports_success() -> anyhow::Result<()> {
        let app = build_router(Arc::new(CountingStore::default()));
        let reply = get_path(&app, "/").await?;
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.content_type.as_deref(), Some("application/json"));
        assert_eq!(reply.body, r#"{"status":200,"data":"success"}"#);
        Ok(())
    }

    #[tokio::test]
    async fn submit_fetch_probe_delete_scenario() -> anyhow::Result<()> {
        let (app, path) = sled_app()?;

        let r = get_path(&app, "/submit/user:1/alice").await?;
        assert_eq!(r.body, r#"{"status":200,"data":"success"}"#);

        let r = get_path(&app, "/fetch/user:1").await?;
        assert_eq!(r.status, StatusCode::OK);
        assert_eq!(r.content_type.as_deref(), Some("text/plain"));
        assert_eq!(r.body, "alice");

        let r = get_path(&app, "/probe/user:1").await?;
        assert_eq!(r.body, r#"{"status":200,"data":"found"}"#);

        let r = get_path(&app, "/delete/user:1").await?;
        assert_eq!(r.body, r#"{"status":200,"data":"success"}"#);

        let r = get_path(&app, "/probe/user:1").await?;
        assert_eq!(r.body, r#"{"status":200,"data":"not found"}"#);

        let r = get_path(&app, "/fetch/user:1").await?;
        assert_eq!(r.content_type.as_deref(), Some("application/json"));
        assert_eq!(r.body, r#"{"status":200,"data":"not found"}"#);

        drop(app);
        let _ = std::fs::remove_dir_all(&path);
        Ok(())
    }

    #[tokio::test]
    async fn empty_value_round_trips() -> anyhow::Result<()> {
        let (app, path) = sled_app()?;

        let r = get_path(&app, "/submit/blank/").await?;
        assert_eq!(r.body, r#"{"status":200,"data":"success"}"#);

        let r = get_path(&app, "/probe/blank").await?;
        assert_eq!(r.body, r#"{"status":200,"data":"found"}"#);

        let r = get_path(&app, "/fetch/blank").await?;
        assert_eq!(r.content_type.as_deref(), Some("text/plain"));
        assert_eq!(r.body, "");

        drop(app);
        let _ = std::fs::remove_dir_all(&path);
        Ok(())
    }

    #[tokio::test]
    async fn percent_encoded_segments_are_decoded() -> anyhow::Result<()> {
        let (app, path) = sled_app()?;

        get_path(&app, "/submit/a%2Fb/hello%20world").await?;
        let r = get_path(&app, "/fetch/a%2Fb").await?;
        assert_eq!(r.body, "hello world");

        drop(app);
        let _ = std::fs::remove_dir_all(&path);
        Ok(())
    }

    #[tokio::test]
    async fn non_utf8_keys_and_values_round_trip() -> anyhow::Result<()> {
        let (app, path) = sled_app()?;

        let r = get_path(&app, "/submit/%FF%00k/%C3%28v").await?;
        assert_eq!(r.status, StatusCode::OK);
        assert_eq!(r.body, r#"{"status":200,"data":"success"}"#);

        let r = get_path(&app, "/probe/%FF%00k").await?;
        assert_eq!(r.body, r#"{"status":200,"data":"found"}"#);

        let r = get_path(&app, "/fetch/%FF%00k").await?;
        assert_eq!(r.status, StatusCode::OK);
        assert_eq!(r.content_type.as_deref(), Some("text/plain"));
        assert_eq!(r.bytes, vec![0xC3, 0x28, b'v']);

        let r = get_path(&app, "/submit/k/%FF").await?;
        assert_eq!(r.status, StatusCode::OK);
        let r = get_path(&app, "/fetch/k").await?;
        assert_eq!(r.bytes, vec![0xFF]);

        let r = get_path(&app, "/delete/%FF%00k").await?;
        assert_eq!(r.body, r#"{"status":200,"data":"success"}"#);
        let r = get_path(&app, "/fetch/%FF%00k").await?;
        assert_eq!(r.body, r#"{"status":200,"data":"not found"}"#);

        drop(app);
        let _ = std::fs::remove_dir_all(&path);
        Ok(())
    }

    #[tokio::test]
    async fn wrong_method_gets_envelope() -> anyhow::Result<()> {
        let store = Arc::new(CountingStore::default());
        let app = build_router(store.clone());

        for (method, uri) in [("POST", "/probe/k"), ("PUT", "/submit/k/v"), ("DELETE", "/delete/k")] {
            let r = send(&app, method, uri).await?;
            assert_eq!(r.status, StatusCode::METHOD_NOT_ALLOWED, "{method} {uri}");
            assert_eq!(r.content_type.as_deref(), Some("application/json"));
            assert_eq!(r.body, r#"{"status":405,"data":"method not allowed"}"#);
            assert!(r.allow.as_deref().is_some_and(|a| a.contains("GET")), "{method} {uri}");
        }
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[tokio::test]
    async fn deleting_missing_key_reports_success() -> anyhow::Result<()> {
        let (app, path) = sled_app()?;
        let r = get_path(&app, "/delete/ghost").await?;
        assert_eq!(r.status, StatusCode::OK);
        assert_eq!(r.body, r#"{"status":200,"data":"success"}"#);
        drop(app);
        let _ = std::fs::remove_dir_all(&path);
        Ok(())
    }

    #[tokio::test]
    async fn missing_segments_rejected_before_storage() -> anyhow::Result<()> {
        let store = Arc::new(CountingStore::default());
        let app = build_router(store.clone());

        for uri in [
            "/probe",
            "/probe/",
            "/fetch",
            "/fetch/",
            "/delete",
            "/delete/",
            "/submit",
            "/submit/",
            "/submit/only-key",
            "/probe/a/b",
            "/submit/k/v/extra",
        ] {
            let r = get_path(&app, uri).await?;
            assert_eq!(r.status, StatusCode::BAD_REQUEST, "uri {uri}");
            assert_eq!(r.body, r#"{"status":400,"data":"Json data not detected"}"#, "uri {uri}");
        }
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[tokio::test]
    async fn unknown_route_is_404_envelope() -> anyhow::Result<()> {
        let store = Arc::new(CountingStore::default());
        let app = build_router(store.clone());
        let r = get_path(&app, "/nope/k").await?;
        assert_eq!(r.status, StatusCode::NOT_FOUND);
        assert_eq!(r.body, r#"{"status":404,"data":"unknown route"}"#);
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[tokio::test]
    async fn engine_failures_map_to_server_error() -> anyhow::Result<()> {
        let app = build_router(Arc::new(FailingStore));
        for uri in ["/probe/k", "/submit/k/v", "/fetch/k", "/delete/k"] {
            let r = get_path(&app, uri).await?;
            assert_eq!(r.status, StatusCode::INTERNAL_SERVER_ERROR, "uri {uri}");
            assert_eq!(r.body, r#"{"status":500,"data":"server error"}"#, "uri {uri}");
        }
        // the router keeps serving after failures
        let r = get_path(&app, "/").await?;
        assert_eq!(r.status, StatusCode::OK);
        Ok(())
    }

    #[tokio::test]
    async fn metrics_endpoint_exports_request_counters() -> anyhow::Result<()> {
        let app = build_router(Arc::new(CountingStore::default()));
        get_path(&app, "/probe/k").await?;
        let r = get_path(&app, "/metrics").await?;
        assert_eq!(r.status, StatusCode::OK);
        assert!(r.body.contains("kv_requests_total"));
        Ok(())
    }
}
