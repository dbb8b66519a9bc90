//! Structured error types for service operations.

use crate::types::{EntityKind, Id};
use serde::Serialize;
use std::collections::BTreeMap;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    AuthenticationRequired,
    Forbidden,
    NotFound,
    ValidationFailed,
    IntegrityConflict,
    DatabaseError,
    InternalError,
}

/// Field name -> reason, ordered by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, String>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a problem with a field. The first reason for a field wins.
    pub fn add(&mut self, field: &str, reason: impl Into<String>) {
        self.0.entry(field.to_string()).or_insert_with(|| reason.into());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// `Ok(())` when nothing was recorded, `ValidationFailed` otherwise.
    pub fn into_result(self) -> ServiceResult<()> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(ServiceError::ValidationFailed(self))
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("authentication required")]
    AuthenticationRequired,

    #[error("forbidden: {reason}")]
    Forbidden { reason: String },

    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: Id },

    #[error("validation failed for {}", .0.fields().collect::<Vec<_>>().join(", "))]
    ValidationFailed(FieldErrors),

    #[error("integrity conflict: {message}")]
    IntegrityConflict { message: String },

    #[error("database error: {0}")]
    Database(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self::Forbidden {
            reason: reason.into(),
        }
    }

    pub fn not_found(kind: EntityKind, id: Id) -> Self {
        Self::NotFound { kind, id }
    }

    pub fn invalid(field: &str, reason: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.add(field, reason);
        Self::ValidationFailed(errors)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::IntegrityConflict {
            message: message.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            ServiceError::AuthenticationRequired => ErrorCode::AuthenticationRequired,
            ServiceError::Forbidden { .. } => ErrorCode::Forbidden,
            ServiceError::NotFound { .. } => ErrorCode::NotFound,
            ServiceError::ValidationFailed(_) => ErrorCode::ValidationFailed,
            ServiceError::IntegrityConflict { .. } => ErrorCode::IntegrityConflict,
            ServiceError::Database(_) => ErrorCode::DatabaseError,
            ServiceError::Internal(_) => ErrorCode::InternalError,
        }
    }

    pub fn field_errors(&self) -> Option<&FieldErrors> {
        match self {
            ServiceError::ValidationFailed(errors) => Some(errors),
            _ => None,
        }
    }
}

// The store works in anyhow; service errors raised inside it survive the round trip.
impl From<anyhow::Error> for ServiceError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<ServiceError>() {
            Ok(service_err) => service_err,
            Err(err) => match err.downcast::<rusqlite::Error>() {
                Ok(sql_err) => ServiceError::Database(sql_err.to_string()),
                Err(err) => ServiceError::Internal(err.to_string()),
            },
        }
    }
}

impl From<rusqlite::Error> for ServiceError {
    fn from(err: rusqlite::Error) -> Self {
        ServiceError::Database(err.to_string())
    }
}

/// Serialized error body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<FieldErrors>,
}

impl From<&ServiceError> for ErrorBody {
    fn from(err: &ServiceError) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
            fields: err.field_errors().cloned(),
        }
    }
}

/// Result type for service operations.
pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_field_errors_pass() {
        assert!(FieldErrors::new().into_result().is_ok());
    }

    #[test]
    fn first_reason_per_field_is_kept() {
        let mut errors = FieldErrors::new();
        errors.add("name", "is required");
        errors.add("name", "is too long");
        errors.add("deadline", "is not a valid date");
        assert_eq!(errors.len(), 2);
        assert_eq!(errors.get("name"), Some("is required"));

        let err = errors.into_result().unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationFailed);
        assert_eq!(err.to_string(), "validation failed for deadline, name");
    }

    #[test]
    fn service_errors_survive_anyhow() {
        let wrapped = anyhow::Error::new(ServiceError::not_found(EntityKind::Task, 7));
        let err = ServiceError::from(wrapped);
        assert!(matches!(
            err,
            ServiceError::NotFound {
                kind: EntityKind::Task,
                id: 7
            }
        ));
    }

    #[test]
    fn error_body_carries_fields_only_for_validation() {
        let body = ErrorBody::from(&ServiceError::invalid("priority", "must be one of: urgent"));
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["code"], "VALIDATION_FAILED");
        assert_eq!(json["fields"]["priority"], "must be one of: urgent");

        let body = ErrorBody::from(&ServiceError::AuthenticationRequired);
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("fields").is_none());
    }
}
