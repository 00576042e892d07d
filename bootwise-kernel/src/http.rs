/**
 * HTTP API - Boot-time endpoints hit by PXE/iPXE clients and switches
 *
 * ROLE:
 * Devices chain-load from here while booting. Each request is turned into a
 * LookupRequest, pushed through the ProfileService, and answered with the
 * rendered artifact as plain text.
 *
 * ROUTES:
 * - GET  /health, /system/health           liveness and kernel status
 * - GET  /profiles?macs=..&ips=..           compute nodes
 * - GET  /profiles/switch?vendor=..         switches, identified by source IP
 * - POST /profiles/switch/error             switch task runner failure reports
 * - GET  /profiles/library[/{name}]         artifact templates
 * - PUT  /profiles/library/{name}           upload a template (x-api-key)
 *
 * ERRORS:
 * KernelError renders as `{"error": message}` with its carried status.
 */

use axum::body::Bytes;
use axum::extract::{ConnectInfo, FromRequestParts, Path, Query, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::request::Parts;
use axum::http::{HeaderMap, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::Value;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::ProxyHeadersConf;
use crate::error::{KernelError, KernelResult};
use crate::health::{HealthTracker, KernelHealth};
use crate::lookup::{LookupRequest, ProxyAddress};
use crate::models::ProfileDescriptor;
use crate::ports::StoreStats;
use crate::render::{ProfileInfo, RenderScope};
use crate::service::ProfileService;

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ProfileService>,
    pub health: HealthTracker,
    pub stats: Option<Arc<dyn StoreStats>>,
    pub proxy_headers: ProxyHeadersConf,
}

/// Source address of the TCP peer, when the server was started with connect info.
#[derive(Debug, Clone)]
pub struct RequesterIp(pub Option<String>);

impl<S> FromRequestParts<S> for RequesterIp
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ip = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_canonical().to_string());
        Ok(RequesterIp(ip))
    }
}

async fn require_api_key(req: Request, next: Next) -> Result<Response, StatusCode> {
    // only library uploads mutate anything
    if req.method() != Method::PUT {
        return Ok(next.run(req).await);
    }

    let expected = std::env::var("BOOTWISE_API_KEY").unwrap_or_default();
    if expected.is_empty() {
        warn!("BOOTWISE_API_KEY not set, library uploads denied");
        return Err(StatusCode::UNAUTHORIZED);
    }

    let ok = req
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == expected)
        .unwrap_or(false);

    if !ok {
        warn!(path = %req.uri().path(), "rejected upload with bad api key");
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(next.run(req).await)
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/system/health", get(get_system_health))
        .route("/profiles", get(get_profiles))
        .route("/profiles/switch", get(get_profiles_switch))
        .route("/profiles/switch/error", post(post_switch_error))
        .route("/profiles/library", get(list_library))
        .route("/profiles/library/{name}", get(get_library_profile).put(put_library_profile))
        .with_state(app_state)
        .layer(middleware::from_fn(require_api_key))
}

/// Gathers every value for `keys`, accepting repeated keys, `key[]` and CSV.
/// Blank entries are kept so parallel lists stay aligned.
fn collect_list(params: &[(String, String)], keys: &[&str]) -> Option<Vec<String>> {
    let mut found = false;
    let mut out = Vec::new();
    for (key, value) in params {
        if keys.contains(&key.trim_end_matches("[]")) {
            found = true;
            out.extend(value.split(',').map(|v| v.trim().to_string()));
        }
    }
    found.then_some(out)
}

fn proxy_from_headers(headers: &HeaderMap, names: &ProxyHeadersConf) -> Option<ProxyAddress> {
    let read = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };
    let ip = read(&names.ip)?;
    Some(ProxyAddress { ip, port: read(&names.port) })
}

fn plain(body: String) -> Response {
    ([(CONTENT_TYPE, TEXT_PLAIN)], body).into_response()
}

async fn render_descriptor(app: &AppState, descriptor: &ProfileDescriptor, requester_ip: Option<String>) -> KernelResult<Response> {
    let scope = RenderScope { requester_ip };
    let body = app.service.render(descriptor, &scope).await?;
    debug!(profile = %descriptor.profile, bytes = body.len(), "profile rendered");
    Ok(plain(body))
}

// GET /system/health
async fn get_system_health(State(app): State<AppState>) -> Json<KernelHealth> {
    Json(app.health.get_health(app.stats.as_deref()))
}

// GET /profiles
async fn get_profiles(
    State(app): State<AppState>,
    RequesterIp(requester_ip): RequesterIp,
    headers: HeaderMap,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Response, KernelError> {
    let req = LookupRequest {
        macs: collect_list(&params, &["macs", "mac"])
            .map(|macs| macs.into_iter().map(|m| m.to_lowercase()).collect()),
        ips: collect_list(&params, &["ips"]),
        requester_ip,
        proxy: proxy_from_headers(&headers, &app.proxy_headers),
    };

    let descriptor = app.service.get_profiles(&req).await?;
    render_descriptor(&app, &descriptor, req.requester_ip).await
}

#[derive(Debug, Deserialize)]
struct SwitchParams {
    vendor: Option<String>,
}

// GET /profiles/switch
async fn get_profiles_switch(
    State(app): State<AppState>,
    RequesterIp(requester_ip): RequesterIp,
    Query(params): Query<SwitchParams>,
) -> Result<Response, KernelError> {
    let Some(ip) = requester_ip else {
        return Err(KernelError::bad_request("Unable to determine requester address"));
    };
    let descriptor = app.service.get_profiles_switch_vendor(&ip, params.vendor.as_deref()).await?;
    render_descriptor(&app, &descriptor, Some(ip)).await
}

// POST /profiles/switch/error
async fn post_switch_error(State(app): State<AppState>, Json(report): Json<Value>) -> Json<Value> {
    app.service.report_switch_error(&report).await;
    Json(serde_json::json!({}))
}

// GET /profiles/library
async fn list_library(State(app): State<AppState>) -> Result<Json<Vec<ProfileInfo>>, KernelError> {
    Ok(Json(app.service.library().list().await?))
}

// GET /profiles/library/{name}
async fn get_library_profile(State(app): State<AppState>, Path(name): Path<String>) -> Result<Response, KernelError> {
    Ok(plain(app.service.library().get(&name).await?))
}

// PUT /profiles/library/{name}
async fn put_library_profile(
    State(app): State<AppState>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<Json<ProfileInfo>, KernelError> {
    Ok(Json(app.service.library().put(&name, &body).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_collect_list_flattens_csv_and_repeats() {
        let p = params(&[("macs", "a,b"), ("macs[]", "c"), ("mac", "d"), ("ips", "1.1.1.1,,")]);
        assert_eq!(collect_list(&p, &["macs", "mac"]).unwrap(), vec!["a", "b", "c", "d"]);
        assert_eq!(collect_list(&p, &["ips"]).unwrap(), vec!["1.1.1.1", "", ""]);
        assert!(collect_list(&p, &["vendor"]).is_none());
    }

    #[test]
    fn test_proxy_headers() {
        let names = ProxyHeadersConf::default();
        let mut headers = HeaderMap::new();
        assert!(proxy_from_headers(&headers, &names).is_none());

        headers.insert("x-rackhd-api-proxy-ip", "12.1.1.1".parse().unwrap());
        headers.insert("x-rackhd-api-proxy-port", "7070".parse().unwrap());
        let proxy = proxy_from_headers(&headers, &names).unwrap();
        assert_eq!(proxy.url(), "http://12.1.1.1:7070");
    }
}
