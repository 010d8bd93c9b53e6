use lambda_http::{
    Body, Response,
    http::{HeaderValue, StatusCode, header::CONTENT_TYPE},
};
use serde_json::json;
use stack_string::StackString;
use thiserror::Error;

use htsget_elsa_lib::errors::ElsaLibError;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("InvalidInput: {0}")]
    InvalidInput(StackString),
    #[error("InvalidRange: {0}")]
    InvalidRange(StackString),
    #[error("UnsupportedFormat: {0}")]
    UnsupportedFormat(StackString),
    #[error("NotFound: {0}")]
    NotFound(StackString),
    #[error("PermissionDenied: {0}")]
    PermissionDenied(StackString),
    #[error("MethodNotAllowed: {0}")]
    MethodNotAllowed(StackString),
    #[error("ElsaLibError {0}")]
    ElsaLibError(#[from] ElsaLibError),
}

impl ServiceError {
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidInput(_) | Self::InvalidRange(_) | Self::UnsupportedFormat(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::PermissionDenied(_) => StatusCode::FORBIDDEN,
            Self::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Self::ElsaLibError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Error name in the htsget error body.
    #[must_use]
    pub fn htsget_error(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) | Self::MethodNotAllowed(_) => "InvalidInput",
            Self::InvalidRange(_) => "InvalidRange",
            Self::UnsupportedFormat(_) => "UnsupportedFormat",
            Self::NotFound(_) => "NotFound",
            Self::PermissionDenied(_) => "PermissionDenied",
            Self::ElsaLibError(_) => "InternalError",
        }
    }

    fn message(&self) -> &str {
        match self {
            Self::InvalidInput(msg)
            | Self::InvalidRange(msg)
            | Self::UnsupportedFormat(msg)
            | Self::NotFound(msg)
            | Self::PermissionDenied(msg)
            | Self::MethodNotAllowed(msg) => msg.as_str(),
            Self::ElsaLibError(_) => "Internal Server Error",
        }
    }

    #[must_use]
    pub fn into_response(self) -> Response<Body> {
        let body = json!({
            "htsget": {
                "error": self.htsget_error(),
                "message": self.message(),
            }
        });
        let mut response = Response::new(Body::from(body.to_string()));
        *response.status_mut() = self.status_code();
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        response
    }
}
