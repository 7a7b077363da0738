use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;

use crate::{selection::SelectionError, services::session_store::SessionError};

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    Forbidden(String),
    Conflict(String),
    BadRequest(String),
    ServiceUnavailable(String),
    InternalServerError(anyhow::Error),
    Validation(Vec<String>),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::BadRequest(_) | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code carried in the `code` field.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::Conflict(_) => "CONFLICT",
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            AppError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code().to_string();
        let (error, details) = match self {
            AppError::NotFound(msg)
            | AppError::Forbidden(msg)
            | AppError::Conflict(msg)
            | AppError::BadRequest(msg)
            | AppError::ServiceUnavailable(msg) => (msg, None),
            AppError::Validation(errors) => (
                "Validation failed".to_string(),
                Some(serde_json::json!({ "errors": errors })),
            ),
            AppError::InternalServerError(err) => {
                tracing::error!(error = ?err, "Unhandled error while serving request");
                ("Internal server error".to_string(), None)
            }
        };

        (
            status,
            Json(ErrorResponse {
                error,
                code,
                details,
            }),
        )
            .into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalServerError(err)
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AppError::NotFound("Resource not found".to_string()),
            _ => AppError::InternalServerError(err.into()),
        }
    }
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NotFound(code) => {
                tracing::debug!(%code, "Session lookup missed");
                AppError::NotFound("Session not found".to_string())
            }
            SessionError::RestaurantNotFound { restaurant_id, .. } => {
                tracing::debug!(%restaurant_id, "Vote for unknown restaurant");
                AppError::NotFound("Restaurant not found in this session".to_string())
            }
            SessionError::Conflict(_) => AppError::Conflict("Session already exists".to_string()),
            SessionError::InvalidState(msg) => AppError::BadRequest(msg),
            SessionError::Forbidden(msg) => AppError::Forbidden(msg),
            SessionError::CodeSpaceExhausted(attempts) => {
                tracing::error!(attempts, "Session code space exhausted");
                AppError::ServiceUnavailable(
                    "Could not allocate a session code, try again".to_string(),
                )
            }
        }
    }
}

impl From<SelectionError> for AppError {
    fn from(err: SelectionError) -> Self {
        match err {
            SelectionError::NoResults => AppError::NotFound("No restaurants found".to_string()),
            SelectionError::UpstreamUnavailable { provider, reason } => {
                tracing::warn!(provider, reason = %reason, "Place data unavailable");
                AppError::ServiceUnavailable(
                    "No restaurants found: place data is temporarily unavailable".to_string(),
                )
            }
            SelectionError::InvalidQuery(msg) => AppError::BadRequest(msg),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut messages = Vec::new();
        collect_validation_messages("", &errors, &mut messages);
        messages.sort();
        AppError::Validation(messages)
    }
}

/// Flattens nested payload errors into `path.to.field: code` lines.
fn collect_validation_messages(
    prefix: &str,
    errors: &validator::ValidationErrors,
    out: &mut Vec<String>,
) {
    use validator::ValidationErrorsKind;

    for (field, kind) in errors.errors() {
        let path = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{}.{}", prefix, field)
        };
        match kind {
            ValidationErrorsKind::Field(errs) => {
                out.extend(errs.iter().map(|e| format!("{}: {}", path, e.code)));
            }
            ValidationErrorsKind::Struct(inner) => collect_validation_messages(&path, inner, out),
            ValidationErrorsKind::List(items) => {
                for (index, inner) in items {
                    collect_validation_messages(&format!("{}[{}]", path, index), inner, out);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RestaurantId, SessionCode};

    async fn response_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        serde_json::from_slice(&bytes).expect("json")
    }

    #[tokio::test]
    async fn host_only_refusal_keeps_its_message() {
        let err = AppError::from(SessionError::Forbidden(
            "Only the host can close voting".to_string(),
        ));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = response_json(response).await;
        assert_eq!(body["error"], "Only the host can close voting");
        assert_eq!(body["code"], "FORBIDDEN");
        assert!(body.get("details").is_none());
    }

    #[tokio::test]
    async fn empty_selection_is_reported_as_not_found() {
        let response = AppError::from(SelectionError::NoResults).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = response_json(response).await;
        assert_eq!(body["error"], "No restaurants found");
        assert_eq!(body["code"], "NOT_FOUND");
    }

    #[test]
    fn every_variant_has_status_and_code() {
        let cases = [
            (AppError::Conflict("taken".into()), 409, "CONFLICT"),
            (AppError::BadRequest("closed".into()), 400, "BAD_REQUEST"),
            (AppError::Validation(Vec::new()), 400, "VALIDATION_ERROR"),
            (AppError::ServiceUnavailable("retry".into()), 503, "SERVICE_UNAVAILABLE"),
            (
                AppError::InternalServerError(anyhow::anyhow!("db down")),
                500,
                "INTERNAL_SERVER_ERROR",
            ),
        ];
        for (err, status, code) in cases {
            assert_eq!(err.status().as_u16(), status);
            assert_eq!(err.code(), code);
        }
    }

    #[tokio::test]
    async fn validation_failure_lists_field_errors() {
        let response =
            AppError::Validation(vec!["location.lat: range".to_string()]).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = response_json(response).await;
        assert_eq!(body["error"], "Validation failed");
        assert_eq!(body["details"]["errors"][0], "location.lat: range");
    }

    #[test]
    fn nested_validation_errors_are_flattened_with_paths() {
        use validator::Validate;

        #[derive(Validate)]
        struct Inner {
            #[validate(range(min = 0, max = 5))]
            rating: i32,
        }

        #[derive(Validate)]
        struct Outer {
            #[validate(nested)]
            filters: Inner,
        }

        let errors = Outer {
            filters: Inner { rating: 9 },
        }
        .validate()
        .unwrap_err();
        match AppError::from(errors) {
            AppError::Validation(messages) => {
                assert_eq!(messages, vec!["filters.rating: range".to_string()]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn internal_errors_hide_their_cause() {
        let response =
            AppError::from(anyhow::anyhow!("connection refused by outcome store")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = response_json(response).await;
        assert_eq!(body["error"], "Internal server error");
        assert!(!body.to_string().contains("connection refused"));
    }

    #[test]
    fn session_errors_map_to_http_semantics() {
        let code = SessionCode::parse("ABCD").unwrap();
        assert!(matches!(
            AppError::from(SessionError::NotFound(code.clone())),
            AppError::NotFound(_)
        ));
        assert!(matches!(
            AppError::from(SessionError::RestaurantNotFound {
                code: code.clone(),
                restaurant_id: RestaurantId::from("r9"),
            }),
            AppError::NotFound(_)
        ));
        assert!(matches!(
            AppError::from(SessionError::Conflict(code)),
            AppError::Conflict(_)
        ));
        assert!(matches!(
            AppError::from(SessionError::InvalidState("closed".into())),
            AppError::BadRequest(_)
        ));
        assert!(matches!(
            AppError::from(SessionError::Forbidden("host only".into())),
            AppError::Forbidden(_)
        ));
        assert!(matches!(
            AppError::from(SessionError::CodeSpaceExhausted(10)),
            AppError::ServiceUnavailable(_)
        ));
    }

    #[test]
    fn selection_errors_hide_upstream_detail() {
        let err = AppError::from(SelectionError::UpstreamUnavailable {
            provider: "google_places",
            reason: "timeout".into(),
        });
        match err {
            AppError::ServiceUnavailable(msg) => assert!(!msg.contains("timeout")),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            AppError::from(SelectionError::NoResults),
            AppError::NotFound(_)
        ));
    }
}
