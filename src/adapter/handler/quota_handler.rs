use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::domain::entity::{DenyReason, QuotaDecision};
use crate::usecase::build_capabilities::BuildCapabilitiesError;
use crate::usecase::check_and_consume::{CheckAndConsumeError, CheckAndConsumeInput};
use crate::usecase::release_quota::{ReleaseQuotaError, ReleaseQuotaInput};

/// POST /api/v1/subjects/:subject_id/quota/consume
pub async fn consume_quota(
    State(state): State<AppState>,
    Path(subject_id): Path<String>,
    Json(req): Json<QuotaRequest>,
) -> Response {
    let input = CheckAndConsumeInput {
        subject_id,
        module_key: req.module_key,
        function_key: req.function_key,
    };

    match state.check_and_consume_uc.execute(&input).await {
        Ok(decision) => (decision_status(&decision), Json(decision)).into_response(),
        Err(CheckAndConsumeError::Validation(msg)) => {
            error_response(StatusCode::BAD_REQUEST, "SYS_QUOTA_VALIDATION", &msg)
        }
        Err(e @ CheckAndConsumeError::SubscriptionUnavailable(_)) => error_response(
            StatusCode::NOT_FOUND,
            "SYS_QUOTA_SUBSCRIPTION_NOT_FOUND",
            &e.to_string(),
        ),
        Err(e @ CheckAndConsumeError::Internal(_)) => {
            tracing::error!(subject_id = %input.subject_id, error = %e, "quota consume failed");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "SYS_QUOTA_INTERNAL",
                &e.to_string(),
            )
        }
    }
}

/// POST /api/v1/subjects/:subject_id/quota/release
pub async fn release_quota(
    State(state): State<AppState>,
    Path(subject_id): Path<String>,
    Json(req): Json<QuotaRequest>,
) -> Response {
    let input = ReleaseQuotaInput {
        subject_id,
        module_key: req.module_key,
        function_key: req.function_key,
    };

    match state.release_quota_uc.execute(&input).await {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(ReleaseQuotaError::Validation(msg)) => {
            error_response(StatusCode::BAD_REQUEST, "SYS_QUOTA_VALIDATION", &msg)
        }
        Err(e @ ReleaseQuotaError::SubscriptionUnavailable(_)) => error_response(
            StatusCode::NOT_FOUND,
            "SYS_QUOTA_SUBSCRIPTION_NOT_FOUND",
            &e.to_string(),
        ),
        Err(e @ ReleaseQuotaError::Internal(_)) => {
            tracing::error!(subject_id = %input.subject_id, error = %e, "quota release failed");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "SYS_QUOTA_INTERNAL",
                &e.to_string(),
            )
        }
    }
}

/// GET /api/v1/subjects/:subject_id/capabilities
pub async fn get_capabilities(
    State(state): State<AppState>,
    Path(subject_id): Path<String>,
) -> Response {
    match state.build_capabilities_uc.execute(&subject_id).await {
        Ok(capabilities) => (StatusCode::OK, Json(capabilities)).into_response(),
        Err(e @ BuildCapabilitiesError::SubscriptionUnavailable(_)) => error_response(
            StatusCode::NOT_FOUND,
            "SYS_QUOTA_SUBSCRIPTION_NOT_FOUND",
            &e.to_string(),
        ),
        Err(e @ BuildCapabilitiesError::Internal(_)) => {
            tracing::error!(subject_id = %subject_id, error = %e, "building capabilities failed");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "SYS_QUOTA_INTERNAL",
                &e.to_string(),
            )
        }
    }
}

/// 拒否理由ごとの HTTP ステータス。
fn decision_status(decision: &QuotaDecision) -> StatusCode {
    match decision.reason {
        None => StatusCode::OK,
        Some(DenyReason::QuotaExceeded) => StatusCode::TOO_MANY_REQUESTS,
        Some(DenyReason::QuotaZero) | Some(DenyReason::NoRule) => StatusCode::FORBIDDEN,
    }
}

fn error_response(status: StatusCode, code: &str, message: &str) -> Response {
    (status, Json(ErrorResponse::new(code, message))).into_response()
}

// --- Request / Response types ---

#[derive(Debug, Deserialize)]
pub struct QuotaRequest {
    pub module_key: String,
    #[serde(default)]
    pub function_key: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: &str, message: &str) -> Self {
        Self {
            error: ErrorBody {
                code: code.to_string(),
                message: message.to_string(),
            },
        }
    }
}
