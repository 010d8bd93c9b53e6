use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_s3::{Client as S3Client, presigning::PresigningConfig, primitives::ByteStream};
use bytes::Bytes;
use log::debug;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use stack_string::StackString;
use std::{fmt, time::Duration};
use time::OffsetDateTime;
use url::Url;

use crate::{Cache, GetObject, PresignObject, errors::ElsaLibError, resolver::Resolver};

#[derive(Clone)]
pub struct S3Instance {
    s3_client: S3Client,
    cache_bucket: StackString,
    presign_expiry: Duration,
}

impl fmt::Debug for S3Instance {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "S3Instance {}", self.cache_bucket)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CacheItem {
    item: Vec<Resolver>,
    max_age: u64,
}

/// Whether an object written at `last_modified` is still within `max_age` seconds of `now`.
#[must_use]
pub fn is_fresh(last_modified: Option<i64>, max_age: u64, now: i64) -> bool {
    let max_age = i64::try_from(max_age).unwrap_or(i64::MAX);
    last_modified.is_some_and(|modified| modified.saturating_add(max_age) >= now)
}

impl S3Instance {
    #[must_use]
    pub fn new(sdk_config: &SdkConfig, cache_bucket: &str, presign_expiry: Duration) -> Self {
        Self {
            s3_client: S3Client::from_conf(sdk_config.into()),
            cache_bucket: cache_bucket.into(),
            presign_expiry,
        }
    }

    #[must_use]
    pub fn cache_bucket(&self) -> &str {
        &self.cache_bucket
    }

    async fn get_object_with_modified<T: DeserializeOwned>(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<(T, Option<i64>), ElsaLibError> {
        let output = self
            .s3_client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await?;
        let last_modified = output.last_modified().map(|modified| modified.secs());
        let body = output.body.collect().await?.into_bytes();
        Ok((serde_json::from_slice(&body)?, last_modified))
    }
}

#[async_trait]
impl GetObject for S3Instance {
    async fn get_object<T: DeserializeOwned + Send>(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<T, ElsaLibError> {
        debug!("get_object s3://{bucket}/{key}");
        Ok(self.get_object_with_modified(bucket, key).await?.0)
    }
}

#[async_trait]
impl Cache for S3Instance {
    type Item = Vec<Resolver>;

    async fn get(&self, key: &str) -> Result<Option<Self::Item>, ElsaLibError> {
        match self
            .get_object_with_modified::<CacheItem>(&self.cache_bucket, key)
            .await
        {
            Ok((cached, last_modified)) => {
                let now = OffsetDateTime::now_utc().unix_timestamp();
                if is_fresh(last_modified, cached.max_age, now) {
                    Ok(Some(cached.item))
                } else {
                    debug!("cached resolvers for {key} expired");
                    Ok(None)
                }
            }
            Err(e) if e.is_no_such_key() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn put(&self, key: &str, item: Self::Item, max_age: u64) -> Result<(), ElsaLibError> {
        let body = serde_json::to_vec(&CacheItem { item, max_age })?;
        self.s3_client
            .put_object()
            .bucket(self.cache_bucket.as_str())
            .key(key)
            .content_type("application/json")
            .body(ByteStream::from(Bytes::from(body)))
            .send()
            .await?;
        debug!("cached resolvers at s3://{}/{key}", self.cache_bucket);
        Ok(())
    }
}

#[async_trait]
impl PresignObject for S3Instance {
    async fn presign_object(&self, bucket: &str, key: &str) -> Result<Url, ElsaLibError> {
        let presigning_config = PresigningConfig::expires_in(self.presign_expiry)?;
        let request = self
            .s3_client
            .get_object()
            .bucket(bucket)
            .key(key)
            .presigned(presigning_config)
            .await?;
        Url::parse(request.uri()).map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use crate::s3_instance::is_fresh;

    #[test]
    fn test_is_fresh() {
        let now = 1_700_000_000;
        assert!(is_fresh(Some(now - 10), 86400, now));
        assert!(is_fresh(Some(now - 86400), 86400, now));
        assert!(!is_fresh(Some(now - 86401), 86400, now));
        assert!(!is_fresh(Some(now - 1), 0, now));
        assert!(!is_fresh(None, 86400, now));
        assert!(is_fresh(Some(now), u64::MAX, now));
    }
}
