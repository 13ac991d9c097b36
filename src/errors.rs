// src/errors.rs
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use mongodb::error::{ErrorKind, WriteFailure};
use serde_json::json;
use thiserror::Error;

const DUPLICATE_KEY_CODE: i32 = 11000;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("MongoDB error: {0}")]
    MongoDB(mongodb::error::Error),

    #[error("BSON error: {0}")]
    Bson(String),

    #[error("Invalid ObjectId: {0}")]
    InvalidObjectId(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Duplicate key error")]
    DuplicateKey,

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    ValidationError(String),

    #[error("Validation failed")]
    FieldValidation(validator::ValidationErrors),

    #[error("{0}")]
    BadRequest(String),

    /// Business-rule rejection carrying a machine-readable code for clients.
    #[error("{message}")]
    Rule {
        status: StatusCode,
        code: &'static str,
        message: String,
    },

    #[error("{0}")]
    Conflict(String),

    #[error("Payment gateway error: {0}")]
    PaymentGateway(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Service error: {0}")]
    ServiceError(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::MongoDB(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Bson(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::InvalidObjectId(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::DuplicateKey => StatusCode::CONFLICT,
            AppError::AuthError(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::FieldValidation(_) => StatusCode::BAD_REQUEST,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Rule { status, .. } => *status,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::PaymentGateway(_) => StatusCode::BAD_GATEWAY,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::ServiceError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to API clients. Internal failures stay generic.
    fn public_message(&self) -> String {
        match self {
            AppError::MongoDB(_) | AppError::Bson(_) => "Database error".to_string(),
            AppError::InvalidObjectId(_) => "Invalid ID format".to_string(),
            AppError::DuplicateKey => "Duplicate entry".to_string(),
            AppError::AuthError(_) => "Not authorized".to_string(),
            AppError::PaymentGateway(_) => "Payment gateway error".to_string(),
            AppError::ConfigurationError(_) | AppError::ServiceError(_) => {
                "Internal server error".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "request rejected");
        }

        let mut body = json!({
            "success": false,
            "message": self.public_message(),
        });

        match &self {
            AppError::Rule { code, .. } => {
                body["code"] = json!(code);
            }
            AppError::FieldValidation(errors) => {
                body["details"] = json!(validation_details(errors));
            }
            _ => {}
        }

        (status, Json(body)).into_response()
    }
}

fn validation_details(errors: &validator::ValidationErrors) -> Vec<serde_json::Value> {
    errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| {
                json!({
                    "field": field,
                    "message": e
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| e.code.to_string()),
                })
            })
        })
        .collect()
}

pub fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(e)) => e.code == DUPLICATE_KEY_CODE,
        ErrorKind::Command(e) => e.code == DUPLICATE_KEY_CODE,
        _ => false,
    }
}

impl From<mongodb::error::Error> for AppError {
    fn from(err: mongodb::error::Error) -> Self {
        if is_duplicate_key(&err) {
            AppError::DuplicateKey
        } else {
            AppError::MongoDB(err)
        }
    }
}

impl From<mongodb::bson::oid::Error> for AppError {
    fn from(err: mongodb::bson::oid::Error) -> Self {
        AppError::InvalidObjectId(err.to_string())
    }
}

impl From<mongodb::bson::ser::Error> for AppError {
    fn from(err: mongodb::bson::ser::Error) -> Self {
        AppError::Bson(err.to_string())
    }
}

impl From<mongodb::bson::de::Error> for AppError {
    fn from(err: mongodb::bson::de::Error) -> Self {
        AppError::Bson(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::FieldValidation(err)
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        AppError::AuthError(err.to_string())
    }
}

impl From<bcrypt::BcryptError> for AppError {
    fn from(err: bcrypt::BcryptError) -> Self {
        AppError::ServiceError(format!("Password hashing failed: {}", err))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::PaymentGateway(format!("HTTP request failed: {}", err))
    }
}

// Helper conversion functions
impl AppError {
    pub fn invalid_data(msg: impl Into<String>) -> Self {
        AppError::ValidationError(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        AppError::BadRequest(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        AppError::Forbidden(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        AppError::Conflict(msg.into())
    }

    pub fn rule(status: StatusCode, code: &'static str, msg: impl Into<String>) -> Self {
        AppError::Rule {
            status,
            code,
            message: msg.into(),
        }
    }

    pub fn gateway(msg: impl Into<String>) -> Self {
        AppError::PaymentGateway(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        AppError::ConfigurationError(msg.into())
    }

    pub fn service(msg: impl Into<String>) -> Self {
        AppError::ServiceError(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_error_kinds_to_status_codes() {
        assert_eq!(AppError::NotFound("Booking").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::DuplicateKey.status_code(), StatusCode::CONFLICT);
        assert_eq!(
            AppError::AuthError("expired".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(AppError::forbidden("no").status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            AppError::InvalidObjectId("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(AppError::gateway("down").status_code(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn rule_errors_carry_their_own_status() {
        let err = AppError::rule(StatusCode::CONFLICT, "DUPLICATE_TRXID", "used");
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert_eq!(err.to_string(), "used");
    }

    #[test]
    fn internal_errors_hide_details() {
        let err = AppError::service("secret connection string leaked");
        assert_eq!(err.public_message(), "Internal server error");
        let err = AppError::NotFound("Gig");
        assert_eq!(err.public_message(), "Gig not found");
    }
}
