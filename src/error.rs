//! API error responses
//! ハンドラ共通のエラーレスポンスと、ドメインエラー → HTTP ステータスの変換

use axum::{extract::rejection::JsonRejection, http::StatusCode, response::Json};
use serde::Serialize;
use tracing::warn;

use crate::config::Environment;
use crate::pricing::PricingError;
use crate::provider::ProviderError;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    /// 開発環境のみ
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn error_response(status: StatusCode, message: String) -> ApiError {
    warn!("API error {}: {}", status.as_u16(), message);
    (
        status,
        Json(ErrorResponse {
            success: false,
            error: message,
            details: None,
        }),
    )
}

/// `details` は production 以外でのみ付与する
pub fn error_with_details(
    status: StatusCode,
    message: String,
    details: String,
    environment: Environment,
) -> ApiError {
    let (status, Json(mut body)) = error_response(status, message);
    if !environment.is_production() {
        body.details = Some(details);
    }
    (status, Json(body))
}

pub fn from_pricing_error(err: &PricingError, environment: Environment) -> ApiError {
    let status = if err.is_client_error() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    error_with_details(status, err.to_string(), format!("{:?}", err), environment)
}

pub fn from_provider_error(err: &ProviderError, environment: Environment) -> ApiError {
    error_with_details(
        StatusCode::INTERNAL_SERVER_ERROR,
        "Could not create payment order. Please try again.".to_string(),
        err.to_string(),
        environment,
    )
}

/// 不正な JSON ボディは 400
pub fn from_json_rejection(rejection: JsonRejection) -> ApiError {
    error_response(
        StatusCode::BAD_REQUEST,
        format!("Invalid request body: {}", rejection.body_text()),
    )
}
