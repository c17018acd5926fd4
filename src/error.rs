use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use sea_orm::DbErr;
use validator::ValidationErrors;

/// Error returned by every store, service and handler of the backend.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Bad input: missing field, non-positive amount, overdraft...
    #[error("{0}")]
    Validation(String),
    /// Field-level errors collected by `validator`
    #[error("invalid fields: {0}")]
    InvalidFields(#[from] ValidationErrors),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    /// The gateway call failed (network, permission, constraint)
    #[error("storage error: {0}")]
    Storage(#[from] DbErr),
    /// A multi-write sequence did not land as one unit, or the stored balance drifted
    #[error("consistency error: {0}")]
    Consistency(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation(message.into())
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        AppError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Bad input, whether caught by a business rule or by field validation
    pub fn is_validation(&self) -> bool {
        matches!(self, AppError::Validation(_) | AppError::InvalidFields(_))
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::InvalidFields(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Consistency(_) => StatusCode::CONFLICT,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            AppError::InvalidFields(errors) => HttpResponse::build(self.status_code())
                .json(serde_json::json!({ "error": "invalid fields", "fields": errors })),
            AppError::Storage(e) => {
                tracing::error!(error = %e, "storage call failed");
                HttpResponse::build(self.status_code())
                    .json(serde_json::json!({ "error": format!("Database error: {}", e) }))
            }
            _ => HttpResponse::build(self.status_code())
                .json(serde_json::json!({ "error": self.to_string() })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_taxonomy_to_status_codes() {
        assert_eq!(
            AppError::validation("amount must be positive").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::not_found("budget", 7).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::Consistency("drift".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::Storage(DbErr::Custom("down".into())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn not_found_message_names_the_entity() {
        assert_eq!(AppError::not_found("expense", 3).to_string(), "expense 3 not found");
    }
}
