//! Mapping of service outcomes onto HTTP responses.

use crate::error::{ErrorBody, ErrorCode, ServiceError};
use crate::types::EntityKind;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::error;

pub fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::AuthenticationRequired => StatusCode::UNAUTHORIZED,
        ErrorCode::Forbidden => StatusCode::FORBIDDEN,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::ValidationFailed => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorCode::IntegrityConflict => StatusCode::CONFLICT,
        ErrorCode::DatabaseError | ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// A form page: the values to show and, after a rejected submission, why.
#[derive(Debug, Serialize)]
pub struct FormView<I> {
    pub kind: EntityKind,
    /// `create` or `update`.
    pub action: &'static str,
    pub values: I,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<ErrorBody>,
}

/// Error returned by a handler.
///
/// A rejected form submission carries the submitted values so the form can be
/// shown again with its field errors.
#[derive(Debug)]
pub struct ApiError {
    error: ServiceError,
    form: Option<serde_json::Value>,
}

impl ApiError {
    /// Attach the submitted form to a validation failure. Other errors are
    /// returned unchanged.
    pub fn with_form<I: Serialize>(
        error: ServiceError,
        kind: EntityKind,
        action: &'static str,
        input: &I,
    ) -> Self {
        let form = match &error {
            ServiceError::ValidationFailed(_) => serde_json::to_value(FormView {
                kind,
                action,
                values: input,
                errors: Some(ErrorBody::from(&error)),
            })
            .ok(),
            _ => None,
        };
        Self { error, form }
    }

    pub fn error(&self) -> &ServiceError {
        &self.error
    }
}

impl From<ServiceError> for ApiError {
    fn from(error: ServiceError) -> Self {
        Self { error, form: None }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(self.error.code());
        if status.is_server_error() {
            error!(error = %self.error, "Request failed");
        }
        match self.form {
            Some(form) => (status, Json(form)).into_response(),
            None => (status, Json(ErrorBody::from(&self.error))).into_response(),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::NamedInput;

    #[test]
    fn every_code_has_a_distinct_client_or_server_status() {
        assert_eq!(status_for(ErrorCode::AuthenticationRequired), StatusCode::UNAUTHORIZED);
        assert_eq!(status_for(ErrorCode::Forbidden), StatusCode::FORBIDDEN);
        assert_eq!(status_for(ErrorCode::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_for(ErrorCode::ValidationFailed), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(status_for(ErrorCode::IntegrityConflict), StatusCode::CONFLICT);
        assert!(status_for(ErrorCode::DatabaseError).is_server_error());
    }

    #[test]
    fn rejected_form_keeps_submitted_values() {
        let input = NamedInput::new("");
        let err = ApiError::with_form(
            ServiceError::invalid("name", "this field is required"),
            EntityKind::Tag,
            "create",
            &input,
        );
        let form = err.form.as_ref().unwrap();
        assert_eq!(form["kind"], "tag");
        assert_eq!(form["values"]["name"], "");
        assert_eq!(form["errors"]["fields"]["name"], "this field is required");

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn non_validation_errors_drop_the_form() {
        let err = ApiError::with_form(
            ServiceError::forbidden("requires manage:tag"),
            EntityKind::Tag,
            "create",
            &NamedInput::new("x"),
        );
        assert!(err.form.is_none());
        assert_eq!(err.into_response().status(), StatusCode::FORBIDDEN);
    }
}
