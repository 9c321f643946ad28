//! Handler for short URL redirect.

use axum::{
    extract::{ConnectInfo, Path, State},
    http::{HeaderMap, header},
    response::{IntoResponse, Redirect},
};
use serde_json::json;
use std::net::SocketAddr;
use tracing::{debug, error};

use crate::domain::hit_event::{ClientMetadata, HitEvent};
use crate::error::AppError;
use crate::state::AppState;
use crate::utils::short_code::validate_short_code;
use crate::utils::user_agent::{browser_family, device_class};

/// Country header set by common CDNs in front of the service.
const COUNTRY_HEADERS: &[&str] = &["cf-ipcountry", "cloudfront-viewer-country", "x-country-code"];

/// Redirects a short code to its original URL.
///
/// # Endpoint
///
/// `GET /{code}`
///
/// # Request Flow
///
/// 1. Check cache for URL
/// 2. On cache miss, ask the link resolver
/// 3. Asynchronously update cache
/// 4. Record a hit event (never blocks the response)
/// 5. Return 307 Temporary Redirect
///
/// # Cache Strategy
///
/// - **Cache hit**: Immediate redirect
/// - **Cache miss**: Resolve, spawn async cache write
/// - **Cache error**: Log and fall back to the resolver
///
/// # Hit Tracking
///
/// Hits are handed to [`crate::application::services::HitRecorder`]. If its
/// buffer is full the hit is dropped; the redirect is unaffected.
///
/// # Errors
///
/// Returns 400 Bad Request for malformed codes, 404 Not Found for unknown or
/// inactive codes (no hit is recorded) and 503 when the link store is down.
pub async fn redirect_handler(
    Path(code): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> Result<impl IntoResponse, AppError> {
    validate_short_code(&code)?;

    let long_url = match state.cache.get_url(&code).await {
        Ok(Some(cached_url)) => {
            debug!("Cache HIT for {}", code);
            cached_url
        }
        Ok(None) => {
            debug!("Cache MISS for {}", code);
            let long_url = resolve(&state, &code).await?;

            let cache = state.cache.clone();
            let code_clone = code.clone();
            let url_clone = long_url.clone();
            tokio::spawn(async move {
                if let Err(e) = cache.set_url(&code_clone, &url_clone, None).await {
                    error!("Failed to cache URL: {}", e);
                }
            });

            long_url
        }
        Err(e) => {
            error!("Cache error: {}", e);
            resolve(&state, &code).await?
        }
    };

    let client = client_metadata(&headers, addr);
    state.recorder.record(HitEvent::new(code, client));

    Ok(Redirect::temporary(&long_url))
}

async fn resolve(state: &AppState, code: &str) -> Result<String, AppError> {
    state
        .resolver
        .resolve(code)
        .await?
        .ok_or_else(|| AppError::not_found("Short link not found", json!({ "code": code })))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Builds hit metadata from request headers and the peer address.
fn client_metadata(headers: &HeaderMap, addr: SocketAddr) -> ClientMetadata {
    let user_agent = header_str(headers, header::USER_AGENT.as_str());

    ClientMetadata {
        ip_address: Some(addr.ip().to_string()),
        user_agent: user_agent.map(str::to_string),
        referer: header_str(headers, header::REFERER.as_str()).map(str::to_string),
        country: COUNTRY_HEADERS
            .iter()
            .find_map(|name| header_str(headers, name))
            .map(|c| c.to_ascii_uppercase()),
        device_type: user_agent.map(|ua| device_class(ua).to_string()),
        browser: user_agent.and_then(browser_family).map(str::to_string),
    }
}
