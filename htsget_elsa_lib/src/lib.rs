#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod config;
pub mod elsa_endpoint;
pub mod elsa_manifest;
pub mod errors;
pub mod format;
pub mod resolver;
pub mod s3_instance;
pub mod stack;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use url::Url;

use crate::{errors::ElsaLibError, resolver::Resolver};

/// Key/value store for resolved release manifests.
#[async_trait]
pub trait Cache {
    type Item: Send;

    /// Returns `None` when nothing is stored or the stored item has expired.
    async fn get(&self, key: &str) -> Result<Option<Self::Item>, ElsaLibError>;
    async fn put(&self, key: &str, item: Self::Item, max_age: u64) -> Result<(), ElsaLibError>;
}

#[async_trait]
pub trait GetObject {
    async fn get_object<T: DeserializeOwned + Send>(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<T, ElsaLibError>;
}

#[async_trait]
pub trait PresignObject {
    async fn presign_object(&self, bucket: &str, key: &str) -> Result<Url, ElsaLibError>;
}

#[async_trait]
pub trait ResolversFromElsa {
    async fn try_get(&self, release_key: &str) -> Result<Vec<Resolver>, ElsaLibError>;
}
