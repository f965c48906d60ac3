//! Build artifacts, served from each extension's build directory under
//! `<ws_path>/<uuid>/assets/`.

use axum::body::Body;
use axum::extract::{Path, Request, State};
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use tower::ServiceExt;
use tower_http::services::ServeDir;
use tracing::debug;

use crate::server::AppState;

/// Route pattern for assets below `ws_path`.
pub fn assets_route(ws_path: &str) -> String {
    format!("{}/{{uuid}}/assets/{{*path}}", ws_path.trim_end_matches('/'))
}

/// `GET <ws_path>/{uuid}/assets/{*path}`
///
/// 404 when the extension is unknown or has not reported a build directory.
pub async fn assets_handler(
    State(state): State<AppState>,
    Path((uuid, _path)): Path<(String, String)>,
    req: Request,
) -> Response {
    let Some(build_dir) = state.store.get(&uuid).and_then(|i| i.payload.build_dir) else {
        debug!(%uuid, "no build directory for extension");
        return StatusCode::NOT_FOUND.into_response();
    };

    let prefix = format!("{}/{uuid}/assets", state.config.ws_path.trim_end_matches('/'));
    let Some(uri) = strip_prefix(req.uri(), &prefix) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let (mut parts, body) = req.into_parts();
    parts.uri = uri;
    match ServeDir::new(&build_dir)
        .oneshot(Request::from_parts(parts, body))
        .await
    {
        Ok(resp) => resp.map(Body::new).into_response(),
        Err(never) => match never {},
    }
}

// Works on the raw (still percent-encoded) path so the file service decodes once.
fn strip_prefix(uri: &Uri, prefix: &str) -> Option<Uri> {
    let rest = uri.path().strip_prefix(prefix)?;
    if !rest.starts_with('/') {
        return None;
    }
    let rebased = match uri.query() {
        Some(query) => format!("{rest}?{query}"),
        None => rest.to_owned(),
    };
    rebased.parse().ok()
}
