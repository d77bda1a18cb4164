use std::error::Error as StdError;

use axum::Json;
use axum::http::{HeaderValue, StatusCode, header::RETRY_AFTER};
use axum::response::{IntoResponse, Response};
use pixelwar_api_types::{ApiErrorBody, ApiErrorMessage};

use crate::application::error::ErrorReport;
use crate::application::placement::PlacementError;
use crate::application::snapshot::CanvasError;
use crate::cache::CacheError;

use super::auth::AuthError;

pub mod codes {
    pub const BAD_REQUEST: &str = "bad_request";
    pub const UNAUTHORIZED: &str = "unauthorized";
    pub const NOT_FOUND: &str = "not_found";
    pub const IDENTITY_MISMATCH: &str = "identity_mismatch";
    pub const INVALID_COLOR: &str = "invalid_color";
    pub const COOLDOWN_ACTIVE: &str = "cooldown_active";
    pub const OUT_OF_BOUNDS: &str = "out_of_bounds";
    pub const DURABLE_WRITE_FAILED: &str = "durable_write_failed";
    pub const CACHE_UNAVAILABLE: &str = "cache_unavailable";
    pub const REPO: &str = "repo_error";
}

const SOURCE: &str = "infra::http::error";

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: &'static str,
    hint: Option<String>,
    retry_after: Option<u64>,
    report: ErrorReport,
}

impl ApiError {
    pub fn new(
        status: StatusCode,
        code: &'static str,
        message: &'static str,
        hint: Option<String>,
    ) -> Self {
        let report = ErrorReport::from_message(
            SOURCE,
            status,
            format!("{code}: {}", hint.as_deref().unwrap_or(message)),
        );
        Self {
            status,
            code,
            message,
            hint,
            retry_after: None,
            report,
        }
    }

    /// Like [`ApiError::new`], logging the full source chain of `error`.
    pub fn from_error(
        status: StatusCode,
        code: &'static str,
        message: &'static str,
        error: &dyn StdError,
    ) -> Self {
        Self {
            report: ErrorReport::from_error(SOURCE, status, error),
            ..Self::new(status, code, message, None)
        }
    }

    pub fn bad_request(message: &'static str, hint: Option<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, codes::BAD_REQUEST, message, hint)
    }

    pub fn not_found(message: &'static str) -> Self {
        Self::new(StatusCode::NOT_FOUND, codes::NOT_FOUND, message, None)
    }

    pub fn cooldown(remaining_seconds: u64) -> Self {
        Self {
            retry_after: Some(remaining_seconds),
            ..Self::new(
                StatusCode::TOO_MANY_REQUESTS,
                codes::COOLDOWN_ACTIVE,
                "Cooldown active",
                Some(format!("Retry after {remaining_seconds} seconds")),
            )
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.code
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            error: ApiErrorMessage {
                code: self.code.to_string(),
                message: self.message.to_string(),
                hint: self.hint,
            },
        };
        let mut response = (self.status, Json(body)).into_response();
        if let Some(seconds) = self.retry_after
            && let Ok(value) = HeaderValue::from_str(&seconds.to_string())
        {
            response.headers_mut().insert(RETRY_AFTER, value);
        }
        self.report.attach(&mut response);
        response
    }
}

impl From<PlacementError> for ApiError {
    fn from(error: PlacementError) -> Self {
        match &error {
            PlacementError::IdentityMismatch { .. } => ApiError::new(
                StatusCode::UNAUTHORIZED,
                codes::IDENTITY_MISMATCH,
                "Player does not match the verified identity",
                None,
            ),
            PlacementError::InvalidColor(value) => ApiError::new(
                StatusCode::BAD_REQUEST,
                codes::INVALID_COLOR,
                "Color is not part of the palette",
                Some(format!("`{value}` is not one of the codes listed by /palette")),
            ),
            PlacementError::CooldownActive { remaining_seconds } => {
                ApiError::cooldown(*remaining_seconds)
            }
            PlacementError::OutOfBounds { width, height, .. } => ApiError::new(
                StatusCode::BAD_REQUEST,
                codes::OUT_OF_BOUNDS,
                "Cell is outside the canvas",
                Some(format!("x must be in 0..{width} and y in 0..{height}")),
            ),
            PlacementError::DurableWriteFailure(_) => ApiError::from_error(
                StatusCode::SERVICE_UNAVAILABLE,
                codes::DURABLE_WRITE_FAILED,
                "Placement could not be recorded",
                &error,
            ),
            PlacementError::CacheUnavailable(_) => ApiError::from_error(
                StatusCode::SERVICE_UNAVAILABLE,
                codes::CACHE_UNAVAILABLE,
                "Canvas cache unavailable",
                &error,
            ),
        }
    }
}

impl From<CanvasError> for ApiError {
    fn from(error: CanvasError) -> Self {
        let code = match error {
            CanvasError::Repo(_) => codes::REPO,
            CanvasError::Cache(_) => codes::CACHE_UNAVAILABLE,
        };
        ApiError::from_error(
            StatusCode::SERVICE_UNAVAILABLE,
            code,
            "Canvas temporarily unavailable",
            &error,
        )
    }
}

impl From<CacheError> for ApiError {
    fn from(error: CacheError) -> Self {
        ApiError::from_error(
            StatusCode::SERVICE_UNAVAILABLE,
            codes::CACHE_UNAVAILABLE,
            "Canvas cache unavailable",
            &error,
        )
    }
}

impl From<AuthError> for ApiError {
    fn from(error: AuthError) -> Self {
        ApiError::new(
            StatusCode::UNAUTHORIZED,
            codes::UNAUTHORIZED,
            "Verified identity required",
            Some(error.to_string()),
        )
    }
}
