use std::time::Instant;

use axum::{
    body::Body,
    http::{HeaderValue, Method, Request, StatusCode, Uri, header::RETRY_AFTER},
    middleware::Next,
    response::Response,
};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::application::error::ErrorReport;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Correlation id for one request, taken from the gateway when it sent one.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
}

pub async fn set_request_context(mut request: Request<Body>, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty() && value.len() <= 128)
        .map(str::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let ctx = RequestContext { request_id };
    request.extensions_mut().insert(ctx.clone());

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&ctx.request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response.extensions_mut().insert(ctx);
    response
}

struct ResponseLog {
    method: Method,
    uri: Uri,
    request_id: String,
    elapsed_ms: u128,
}

impl ResponseLog {
    fn success(&self, status: StatusCode) {
        debug!(
            target = "pixelwar::http::response",
            status = status.as_u16(),
            method = %self.method,
            path = %self.uri.path(),
            elapsed_ms = self.elapsed_ms,
            request_id = %self.request_id,
            "request served",
        );
    }

    fn failure(&self, status: StatusCode, report: Option<ErrorReport>, retry_after: Option<&str>) {
        let (source, messages) = match report {
            Some(report) => (report.source, report.messages),
            None => ("unknown", Vec::new()),
        };
        let detail = messages.first().map(String::as_str).unwrap_or("no diagnostic available");

        if status.is_server_error() {
            error!(
                target = "pixelwar::http::response",
                status = status.as_u16(),
                method = %self.method,
                path = %self.uri.path(),
                elapsed_ms = self.elapsed_ms,
                source,
                detail,
                chain = ?messages,
                request_id = %self.request_id,
                "request failed",
            );
        } else {
            warn!(
                target = "pixelwar::http::response",
                status = status.as_u16(),
                method = %self.method,
                path = %self.uri.path(),
                query = self.uri.query().unwrap_or(""),
                elapsed_ms = self.elapsed_ms,
                source,
                detail,
                retry_after = retry_after.unwrap_or(""),
                request_id = %self.request_id,
                "request rejected",
            );
        }
    }
}

pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let uri = request.uri().clone();
    let request_id = request
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| ctx.request_id.clone())
        .unwrap_or_default();

    let mut response = next.run(request).await;
    let status = response.status();
    let log = ResponseLog {
        method,
        uri,
        request_id,
        elapsed_ms: start.elapsed().as_millis(),
    };

    if status.is_client_error() || status.is_server_error() {
        let report = response.extensions_mut().remove::<ErrorReport>();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok());
        log.failure(status, report, retry_after);
    } else {
        log.success(status);
    }

    response
}
