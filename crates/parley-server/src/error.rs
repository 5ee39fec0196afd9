use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use parley::errors::ParleyError;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {env_var}")]
    MissingEnvVar { env_var: String },

    #[error("Invalid value for {env_var}: {reason}")]
    InvalidValue { env_var: String, reason: String },

    #[error("Configuration error: {0}")]
    Other(#[from] config::ConfigError),
}

/// Environment variable for a dotted configuration key, e.g.
/// `agent.api_key` becomes `PARLEY_AGENT__API_KEY`.
pub fn to_env_var(field_path: &str) -> String {
    let path = field_path
        .split('.')
        .filter(|part| !part.is_empty())
        .map(str::to_uppercase)
        .collect::<Vec<_>>()
        .join("__");
    format!("PARLEY_{}", path)
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

/// A core error rendered as a JSON response
#[derive(Debug)]
pub struct ApiError(pub ParleyError);

impl From<ParleyError> for ApiError {
    fn from(error: ParleyError) -> Self {
        ApiError(error)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            ParleyError::NotFound { .. } => StatusCode::NOT_FOUND,
            ParleyError::InvalidRequest(_) | ParleyError::Protocol(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self.0);
        }
        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_env_var() {
        assert_eq!(to_env_var("agent.api_key"), "PARLEY_AGENT__API_KEY");
        assert_eq!(to_env_var("server.port"), "PARLEY_SERVER__PORT");
        assert_eq!(to_env_var("embedding"), "PARLEY_EMBEDDING");
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError(ParleyError::not_found("Conversation", "c")).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError(ParleyError::InvalidRequest("empty".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError(ParleyError::Storage("disk".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
