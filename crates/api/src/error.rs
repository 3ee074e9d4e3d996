use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use tracing::error;

use courier_core::error::{StoreError, ValidationError};
use courier_core::verify::ResyncError;
use courier_worker::PublishError;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    NotFound(String),
    Conflict(String),
    VerificationFailed(String),
    Provider(String),
    Internal,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "invalid_request", msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg),
            ApiError::VerificationFailed(msg) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "verification_failed", msg)
            }
            ApiError::Provider(msg) => (StatusCode::BAD_GATEWAY, "provider_error", msg),
            ApiError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "Unexpected error".to_string(),
            ),
        };

        (
            status,
            Json(ErrorResponse {
                error: ErrorBody {
                    code: code.to_string(),
                    message,
                },
            }),
        )
            .into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, .. } => ApiError::NotFound(format!("{} not found", entity)),
            StoreError::Conflict(msg) => ApiError::Conflict(msg),
            StoreError::InvalidState(msg) => ApiError::Conflict(msg),
            StoreError::Validation(err) => ApiError::BadRequest(err.to_string()),
            StoreError::Backend(source) => {
                error!(error = %source, "store backend error");
                ApiError::Internal
            }
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<PublishError> for ApiError {
    fn from(err: PublishError) -> Self {
        match err {
            PublishError::NotFound(_) => ApiError::NotFound("post not found".to_string()),
            PublishError::NotPending { .. } => ApiError::Conflict(err.to_string()),
            PublishError::Store(err) => err.into(),
        }
    }
}

impl From<ResyncError> for ApiError {
    fn from(err: ResyncError) -> Self {
        match err {
            ResyncError::NoChatRef(_) => ApiError::BadRequest(err.to_string()),
            ResyncError::Delivery(err) => ApiError::Provider(err.to_string()),
            ResyncError::Store(err) => err.into(),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use courier_core::error::DeliveryError;

    fn rt() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
    }

    async fn body_json(err: ApiError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let body = to_bytes(response.into_body(), 4096).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[test]
    fn test_bad_request_response() {
        rt().block_on(async {
            let (status, json) = body_json(ApiError::BadRequest("missing field".into())).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(json["error"]["code"], "invalid_request");
            assert_eq!(json["error"]["message"], "missing field");
        });
    }

    #[test]
    fn test_unauthorized_response() {
        rt().block_on(async {
            let (status, json) =
                body_json(ApiError::Unauthorized("missing X-User-Id header".into())).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
            assert_eq!(json["error"]["code"], "unauthorized");
        });
    }

    #[test]
    fn test_verification_failed_response() {
        rt().block_on(async {
            let (status, json) =
                body_json(ApiError::VerificationFailed("channel not found or inaccessible".into()))
                    .await;
            assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
            assert_eq!(json["error"]["code"], "verification_failed");
        });
    }

    #[test]
    fn test_internal_error_hides_details() {
        rt().block_on(async {
            let err: ApiError = StoreError::backend(std::io::Error::other("disk on fire")).into();
            let (status, json) = body_json(err).await;
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(json["error"]["message"], "Unexpected error");
        });
    }

    #[test]
    fn test_store_error_mapping() {
        assert!(matches!(
            ApiError::from(StoreError::not_found("post", "post_1")),
            ApiError::NotFound(msg) if msg == "post not found"
        ));
        assert!(matches!(
            ApiError::from(StoreError::InvalidState("post is sent".into())),
            ApiError::Conflict(_)
        ));
        assert!(matches!(
            ApiError::from(StoreError::Conflict("dup".into())),
            ApiError::Conflict(_)
        ));
    }

    #[test]
    fn test_publish_and_resync_mapping() {
        assert!(matches!(
            ApiError::from(PublishError::NotPending {
                id: "post_1".into(),
                status: "sent"
            }),
            ApiError::Conflict(_)
        ));
        assert!(matches!(
            ApiError::from(ResyncError::Delivery(DeliveryError::Network("reset".into()))),
            ApiError::Provider(_)
        ));
    }
}
