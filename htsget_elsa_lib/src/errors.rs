use aws_sdk_s3::{
    operation::{get_object::GetObjectError, put_object::PutObjectError},
    presigning::PresigningConfigError,
};
use aws_smithy_runtime_api::client::result::SdkError;
use aws_smithy_types::byte_stream::error::Error as AwsByteStreamError;
use regex::Error as RegexError;
use reqwest::Error as ReqwestError;
use serde_json::Error as SerdeJsonError;
use stack_string::StackString;
use thiserror::Error;
use url::ParseError as UrlParseError;

type AwsSdkError<T> = SdkError<T, aws_smithy_runtime_api::http::Response>;

#[derive(Error, Debug)]
pub enum ElsaLibError {
    #[error("{0}")]
    CustomError(StackString),
    #[error("{0}")]
    StaticCustomError(&'static str),
    #[error("InvalidManifestUri {0}")]
    InvalidManifestUri(StackString),
    #[error("UnsupportedManifestFeature {0}")]
    UnsupportedManifestFeature(StackString),
    #[error("InvalidReleaseKey {0}")]
    InvalidReleaseKey(StackString),
    #[error("InvalidStackConfig {0}")]
    InvalidStackConfig(StackString),
    #[error("DuplicateStack {0}")]
    DuplicateStack(StackString),
    #[error("io Error {0}")]
    IoError(#[from] std::io::Error),
    #[error("RegexError {0}")]
    RegexError(#[from] RegexError),
    #[error("ReqwestError {0}")]
    ReqwestError(#[from] ReqwestError),
    #[error("UrlParseError {0}")]
    UrlParseError(#[from] UrlParseError),
    #[error("SerdeJsonError {0}")]
    SerdeJsonError(#[from] SerdeJsonError),
    #[error("AwsByteStreamError {0}")]
    AwsByteStreamError(#[from] AwsByteStreamError),
    #[error("PresigningConfigError {0}")]
    PresigningConfigError(#[from] PresigningConfigError),

    #[error("GetObjectError {0}")]
    GetObjectError(Box<AwsSdkError<GetObjectError>>),
    #[error("PutObjectError {0}")]
    PutObjectError(Box<AwsSdkError<PutObjectError>>),
}

impl From<AwsSdkError<GetObjectError>> for ElsaLibError {
    fn from(value: AwsSdkError<GetObjectError>) -> Self {
        Self::GetObjectError(Box::new(value))
    }
}

impl From<AwsSdkError<PutObjectError>> for ElsaLibError {
    fn from(value: AwsSdkError<PutObjectError>) -> Self {
        Self::PutObjectError(Box::new(value))
    }
}

impl ElsaLibError {
    /// True when the error is S3 reporting that the requested key does not exist.
    #[must_use]
    pub fn is_no_such_key(&self) -> bool {
        match self {
            Self::GetObjectError(err) => err
                .as_service_error()
                .is_some_and(GetObjectError::is_no_such_key),
            _ => false,
        }
    }
}
