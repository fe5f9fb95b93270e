use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use taskwarden_core::error::{CoreError, StoreError, ValidationError};

/// Unified error type for HTTP responses.
///
/// Malformed inbound payloads map to 400, unknown trigger ids to 404,
/// everything else to 500. The per-request body is always a JSON object
/// with a single `error` field.
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = if let Some(v) = self.0.downcast_ref::<ValidationError>() {
            match v {
                ValidationError::MissingField(_)
                | ValidationError::InvalidField { .. }
                | ValidationError::UnsupportedEvent { .. } => StatusCode::BAD_REQUEST,
            }
        } else if let Some(s) = self.0.downcast_ref::<StoreError>() {
            match s {
                StoreError::UnknownTrigger(_) => StatusCode::NOT_FOUND,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            }
        } else if let Some(c) = self.0.downcast_ref::<CoreError>() {
            match c {
                CoreError::Validation(_) => StatusCode::BAD_REQUEST,
                CoreError::Store(StoreError::UnknownTrigger(_)) => StatusCode::NOT_FOUND,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            }
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self.0, "request failed");
        }
        let body = serde_json::json!({ "error": self.0.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_field_maps_to_400() {
        let err = AppError(ValidationError::MissingField("event_id").into());
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn unsupported_event_maps_to_400() {
        let err = AppError(
            ValidationError::UnsupportedEvent {
                event_source: "github".into(),
                kind: "deleted".into(),
            }
            .into(),
        );
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn unknown_trigger_maps_to_404() {
        let err = AppError(StoreError::UnknownTrigger("t-1".into()).into());
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn store_failure_maps_to_500() {
        let err = AppError(StoreError::Unavailable("locked".into()).into());
        assert_eq!(
            err.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn wrapped_core_error_maps_by_inner_kind() {
        let err = AppError(CoreError::Validation(ValidationError::MissingField("item")).into());
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
