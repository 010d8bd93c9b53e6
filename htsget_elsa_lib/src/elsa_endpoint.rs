use async_trait::async_trait;
use log::{debug, error, warn};
use reqwest::Client;
use stack_string::format_sstr;
use std::fmt;
use url::Url;

use crate::{
    Cache, GetObject, ResolversFromElsa,
    elsa_manifest::{ElsaManifest, ElsaResponse},
    errors::ElsaLibError,
    resolver::Resolver,
};

pub const ENDPOINT_PATH: &str = "/manifest/htsget";

pub struct ElsaEndpoint<C, S> {
    base_url: Url,
    client: Client,
    cache: C,
    get_object: S,
}

impl<C, S> fmt::Debug for ElsaEndpoint<C, S> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ElsaEndpoint {}", self.base_url)
    }
}

impl<C, S> ElsaEndpoint<C, S>
where
    C: Cache<Item = Vec<Resolver>>,
    S: GetObject,
{
    /// # Errors
    /// Returns error if the authority does not form a valid url or the https client fails to build
    pub fn new(authority: &str, cache: C, get_object: S) -> Result<Self, ElsaLibError> {
        let base_url = Url::parse(&format_sstr!("https://{authority}"))?;
        if base_url.path() != "/" || base_url.query().is_some() {
            return Err(ElsaLibError::CustomError(format_sstr!(
                "elsa endpoint {authority} must be a host with an optional port"
            )));
        }
        let client = Client::builder()
            .use_rustls_tls()
            .https_only(true)
            .build()?;
        Ok(Self::with_client(base_url, client, cache, get_object))
    }

    pub fn with_client(base_url: Url, client: Client, cache: C, get_object: S) -> Self {
        Self {
            base_url,
            client,
            cache,
            get_object,
        }
    }

    /// # Errors
    /// Returns error if the release key cannot be used as a single path segment
    pub fn manifest_url(&self, release_key: &str) -> Result<Url, ElsaLibError> {
        validate_release_key(release_key)?;
        let mut url = self
            .base_url
            .join(&format_sstr!("{ENDPOINT_PATH}/{release_key}"))?;
        url.query_pairs_mut().append_pair("type", "S3");
        Ok(url)
    }

    pub async fn get_response(&self, release_key: &str) -> Result<ElsaResponse, ElsaLibError> {
        let url = self.manifest_url(release_key)?;
        debug!("requesting elsa manifest location {url}");
        self.client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .map_err(Into::into)
    }

    pub async fn get_manifest(&self, response: &ElsaResponse) -> Result<ElsaManifest, ElsaLibError> {
        self.get_object
            .get_object(&response.location.bucket, &response.location.key)
            .await
    }
}

fn validate_release_key(release_key: &str) -> Result<(), ElsaLibError> {
    if release_key.chars().all(|c| c == '.') || release_key.contains(['/', '?', '#', '%']) {
        Err(ElsaLibError::InvalidReleaseKey(release_key.into()))
    } else {
        Ok(())
    }
}

#[async_trait]
impl<C, S> ResolversFromElsa for ElsaEndpoint<C, S>
where
    C: Cache<Item = Vec<Resolver>> + Send + Sync,
    S: GetObject + Send + Sync,
{
    async fn try_get(&self, release_key: &str) -> Result<Vec<Resolver>, ElsaLibError> {
        validate_release_key(release_key)?;

        match self.cache.get(release_key).await {
            Ok(Some(cached)) => {
                debug!("cache hit for release {release_key}");
                return Ok(cached);
            }
            Ok(None) => debug!("cache miss for release {release_key}"),
            Err(e) => warn!("failed to read cached resolvers for {release_key}: {e}"),
        }

        let response = self.get_response(release_key).await?;
        let manifest = self.get_manifest(&response).await?;
        let resolvers: Vec<Resolver> = manifest.try_into()?;

        if let Err(e) = self
            .cache
            .put(release_key, resolvers.clone(), response.max_age)
            .await
        {
            error!("failed to cache resolvers for {release_key}: {e}");
        }

        Ok(resolvers)
    }
}
