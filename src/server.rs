//!
//! filewarden HTTP server
//! ----------------------
//! Axum front for the protected-file delivery path.
//!
//! Responsibilities:
//! - Build a `RequestContext` per request (query parameters, request id, caller).
//! - Confine the requested file under the upload directory.
//! - Ask the configured `AccessPolicy` before anything is streamed.
//! - Stream the file through the delivery pipeline on a blocking worker.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tracing::{debug, info};

pub mod policy;
pub mod stream;

pub use policy::{policy_for, AccessPolicy, AccessRequest, GroupAllowListPolicy, UpstreamHeaderPolicy};

use crate::config::Settings;
use crate::error::{AppError, AppResult};
use crate::filestore::protection::DEFAULT_OBJECT_TYPE;
use crate::filestore::{resolve_under_root, ConfiguredLimits, FileDelivery};
use crate::groups::memberships_of;
use crate::identity::{Principal, RequestContext, UserDirectory};

/// Header carrying the authenticated user id, set by the fronting proxy.
pub const USER_ID_HEADER: &str = "x-user-id";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Shared server state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub delivery: Arc<FileDelivery>,
    pub policy: Arc<dyn AccessPolicy>,
    pub directory: Arc<dyn UserDirectory>,
}

impl AppState {
    pub fn new(settings: Arc<Settings>, directory: Arc<dyn UserDirectory>) -> Self {
        let delivery = Arc::new(FileDelivery::from_settings(&settings));
        let policy: Arc<dyn AccessPolicy> = Arc::from(policy_for(&settings));
        Self { settings, delivery, policy, directory }
    }

    pub fn with_policy(mut self, policy: Arc<dyn AccessPolicy>) -> Self {
        self.policy = policy;
        self
    }
}

/// URL path of the delivery endpoint.
pub fn delivery_route(settings: &Settings) -> String {
    format!("/{}", settings.delivery_script.trim_matches('/'))
}

pub fn router(state: AppState) -> Router {
    let route = delivery_route(&state.settings);
    Router::new()
        .route("/", get(|| async { "filewarden ok" }))
        .route(&route, get(get_file))
        .with_state(state)
}

pub async fn run(state: AppState) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{}", state.settings.http_port).parse()?;
    info!(
        target: "filewarden::server",
        "serving {} on {} (policy={}, download_type={:?})",
        delivery_route(&state.settings), addr, state.policy.name(), state.delivery.download_type()
    );
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

pub async fn get_file(
    State(state): State<AppState>,
    uri: Uri,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    match serve_file(&state, &uri, &headers, params).await {
        Ok(response) => response,
        Err(e) => error_response(&e),
    }
}

async fn serve_file(state: &AppState, uri: &Uri, headers: &HeaderMap, params: HashMap<String, String>) -> AppResult<Response> {
    let ctx = request_context(state, uri, headers, params);
    let file = ctx.request_parameter("file", "");
    let object_type = ctx.request_parameter("object_type", DEFAULT_OBJECT_TYPE);
    if file.is_empty() {
        return Err(AppError::user("missing_file", "the 'file' parameter is required"));
    }
    // rule files and other dot-files stay private
    if file.split('/').any(|seg| seg.starts_with('.')) {
        return Err(AppError::user("invalid_path", "hidden files are not served"));
    }

    let upload_dir = state
        .settings
        .upload_dir
        .as_deref()
        .ok_or_else(|| AppError::config("upload_dir_unset", "upload_dir is not configured"))?;
    let path = resolve_under_root(upload_dir, &file).map_err(|e| AppError::user("invalid_path".to_string(), e.to_string()))?;

    let groups = memberships_of(ctx.principal.as_ref(), state.directory.clone());
    let request = AccessRequest { context: &ctx, headers, object_type: &object_type, file: &file, groups: &groups };
    if !state.policy.is_allowed(&request) {
        info!(
            target: "filewarden::server",
            "denied {} for request {:?} (policy={})",
            ctx.request_url(), ctx.request_id, state.policy.name()
        );
        return Err(AppError::forbidden("access_denied", "access to this file is not granted"));
    }

    let is_image = state.settings.is_image_name(&file);
    let limits = Arc::new(ConfiguredLimits::new(
        state.settings.safe_mode,
        state.settings.execution_time_limit.map(Duration::from_secs),
    ));
    debug!(target: "filewarden::server", "delivering {} (object_type={}, inline={})", path.display(), object_type, is_image);
    stream::deliver_streaming(state.delivery.clone(), path, is_image, limits).await
}

fn request_context(state: &AppState, uri: &Uri, headers: &HeaderMap, params: HashMap<String, String>) -> RequestContext {
    let mut ctx = RequestContext::new(uri.to_string()).with_query(params);
    ctx.request_id = header_str(headers, REQUEST_ID_HEADER).map(str::to_string);
    let user = header_str(headers, USER_ID_HEADER)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|id| *id > 0)
        .and_then(|id| state.directory.user_by_id(id));
    if let Some(user) = user {
        let mut principal = Principal::new(user.id, user.roles);
        principal.attrs.request_id = ctx.request_id.clone();
        ctx = ctx.with_principal(principal);
    }
    ctx
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

pub fn error_response(e: &AppError) -> Response {
    let status = StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(json!({"status": "error", "code": e.code_str(), "message": e.message()}))).into_response()
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
