use std::net::SocketAddr;

use anyhow::Context;
use axum::body::Bytes;
use axum::extract::{RawQuery, State};
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get, post};
use axum::{Json, Router};
use tracing::{error, info, warn};

use crate::relay::postback::PostbackParams;
use crate::telegram::Update;
use crate::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/sigmapostback", any(postback))
        .route("/download", get(download))
        .route("/telegram/webhook", post(telegram_webhook))
        .route("/health", get(|| async { "OK" }))
        .with_state(state)
}

pub async fn serve(state: AppState, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("🚀 Server running on {}", listener.local_addr()?);
    axum::serve(listener, router(state))
        .await
        .context("HTTP server stopped")
}

/// GET reads the query string, everything else reads the body
/// (falling back to the query string when the body carries nothing).
fn postback_params(method: &Method, headers: &HeaderMap, query: Option<&str>, body: &[u8]) -> PostbackParams {
    let from_query = || PostbackParams::from_urlencoded(query.unwrap_or_default().as_bytes());
    if *method == Method::GET {
        return from_query();
    }
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    let params = PostbackParams::from_body(content_type, body).unwrap_or_else(|e| {
        warn!("📥 Postback body ignored: {}", e);
        PostbackParams::default()
    });
    if params.is_empty() {
        from_query()
    } else {
        params
    }
}

async fn postback(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> (StatusCode, &'static str) {
    let params = postback_params(&method, &headers, query.as_deref(), &body);
    match state.store.append(params.into_event()).await {
        Ok(record) => {
            info!(
                "✅ Postback saved: trader={} status={} payout={} eid={}",
                record.trader_id, record.status, record.payout, record.event_id
            );
            (StatusCode::OK, "OK")
        }
        Err(e) => {
            error!("❌ Postback not saved: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Error")
        }
    }
}

async fn download(State(state): State<AppState>) -> Response {
    match state.store.snapshot_json().await {
        Ok(bytes) => (
            [
                (header::CONTENT_TYPE, "application/json"),
                (header::CONTENT_DISPOSITION, "attachment; filename=\"data.json\""),
            ],
            bytes,
        )
            .into_response(),
        Err(e) => {
            error!("❌ Download failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Error").into_response()
        }
    }
}

async fn telegram_webhook(State(state): State<AppState>, Json(update): Json<Update>) -> StatusCode {
    state.bot.dispatch(update);
    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_get_reads_query_only() {
        let p = postback_params(&Method::GET, &HeaderMap::new(), Some("uid=1&payout=2"), b"uid=9");
        assert_eq!(p.uid.as_deref(), Some("1"));
    }

    #[test]
    fn test_post_prefers_body_then_query() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let p = postback_params(&Method::POST, &headers, Some("uid=1"), br#"{"uid":"9"}"#);
        assert_eq!(p.uid.as_deref(), Some("9"));

        let p = postback_params(&Method::POST, &headers, Some("uid=1"), b"");
        assert_eq!(p.uid.as_deref(), Some("1"));

        // Broken JSON is recovered as "no body".
        let p = postback_params(&Method::POST, &headers, None, b"{oops");
        assert!(p.is_empty());
    }
}
