use serde::Deserialize;
use stack_string::{StackString, format_sstr};
use std::{
    collections::{BTreeMap, BTreeSet},
    convert::TryFrom,
};
use url::Url;

use crate::{
    errors::ElsaLibError,
    format::Format,
    resolver::{AllowGuard, Interval, ReferenceNames, Resolver, Storage},
};

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ElsaLocation {
    pub bucket: StackString,
    pub key: StackString,
}

/// Reply from the Elsa htsget manifest endpoint.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ElsaResponse {
    pub location: ElsaLocation,
    pub max_age: u64,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum Chromosome {
    Number(u64),
    Name(StackString),
}

impl Chromosome {
    #[must_use]
    pub fn reference_name(&self) -> String {
        match self {
            Self::Number(n) => n.to_string(),
            Self::Name(name) => name.to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ElsaRestriction {
    pub chromosome: Option<Chromosome>,
    pub start: Option<u32>,
    pub end: Option<u32>,
}

impl ElsaRestriction {
    fn allow_guard(&self, format: Format) -> AllowGuard {
        let reference_names = match &self.chromosome {
            Some(chromosome) => {
                ReferenceNames::List(BTreeSet::from([chromosome.reference_name()]))
            }
            None => ReferenceNames::All,
        };
        AllowGuard::default()
            .with_allow_formats(vec![format])
            .with_allow_reference_names(reference_names)
            .with_allow_interval(Interval::new(self.start, self.end))
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ElsaManifestEntry {
    pub url: StackString,
    pub format: Option<Format>,
    #[serde(default)]
    pub restrictions: Vec<ElsaRestriction>,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ElsaManifest {
    #[serde(alias = "id")]
    pub release_key: StackString,
    #[serde(default)]
    pub reads: BTreeMap<StackString, ElsaManifestEntry>,
    #[serde(default)]
    pub variants: BTreeMap<StackString, ElsaManifestEntry>,
}

impl ElsaManifest {
    /// Build the resolver that maps `<release_key>/<id>` onto the object behind `url`.
    ///
    /// # Errors
    /// Returns error if the url is not a usable `s3://bucket/key` uri
    pub fn resolver_from_manifest_parts(
        release_key: &str,
        url: &str,
        id: &str,
        format: Format,
        restriction: Option<&ElsaRestriction>,
    ) -> Result<Resolver, ElsaLibError> {
        let uri = Url::parse(url).map_err(|e| {
            ElsaLibError::InvalidManifestUri(format_sstr!("{url}: {e}"))
        })?;

        if !uri.scheme().eq_ignore_ascii_case("s3") {
            return Err(ElsaLibError::UnsupportedManifestFeature(
                "only S3 manifest uris are supported".into(),
            ));
        }

        let bucket = uri
            .host_str()
            .filter(|bucket| !bucket.is_empty())
            .ok_or_else(|| {
                ElsaLibError::InvalidManifestUri(format_sstr!("missing bucket from uri {url}"))
            })?;

        let path = uri.path().trim_start_matches('/');
        if path.is_empty() {
            return Err(ElsaLibError::InvalidManifestUri(format_sstr!(
                "missing object path from uri {url}"
            )));
        }
        let key = path.strip_suffix(format.file_ending()).unwrap_or(path);

        let allow_guard = restriction.map_or_else(
            || AllowGuard::default().with_allow_formats(vec![format]),
            |restriction| restriction.allow_guard(format),
        );

        Resolver::new(
            Storage::S3 {
                bucket: bucket.into(),
            },
            &format_sstr!("^{}/{}$", regex::escape(release_key), regex::escape(id)),
            key,
            allow_guard,
        )
    }

    fn entry_resolvers(
        release_key: &str,
        id: &str,
        entry: &ElsaManifestEntry,
        default_format: Format,
    ) -> Result<Vec<Resolver>, ElsaLibError> {
        let format = entry.format.unwrap_or(default_format);
        if entry.restrictions.is_empty() {
            let resolver =
                Self::resolver_from_manifest_parts(release_key, &entry.url, id, format, None)?;
            return Ok(vec![resolver]);
        }
        entry
            .restrictions
            .iter()
            .map(|restriction| {
                Self::resolver_from_manifest_parts(
                    release_key,
                    &entry.url,
                    id,
                    format,
                    Some(restriction),
                )
            })
            .collect()
    }
}

impl TryFrom<ElsaManifest> for Vec<Resolver> {
    type Error = ElsaLibError;

    fn try_from(manifest: ElsaManifest) -> Result<Self, Self::Error> {
        let release_key = manifest.release_key.as_str();
        let reads = manifest.reads.iter().map(|(id, entry)| {
            ElsaManifest::entry_resolvers(release_key, id, entry, Format::Bam)
        });
        let variants = manifest.variants.iter().map(|(id, entry)| {
            ElsaManifest::entry_resolvers(release_key, id, entry, Format::Vcf)
        });
        let mut resolvers = Vec::new();
        for entry_resolvers in reads.chain(variants) {
            resolvers.extend(entry_resolvers?);
        }
        Ok(resolvers)
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Error;
    use std::collections::BTreeSet;

    use crate::{
        elsa_manifest::{ElsaManifest, ElsaResponse},
        errors::ElsaLibError,
        format::Format,
        resolver::{Interval, ReferenceNames, Resolver, Storage},
    };

    fn has_resolver(
        resolvers: &[Resolver],
        regex: &str,
        substitution: &str,
        format: Format,
        reference_name: &str,
        interval: Interval,
    ) -> bool {
        resolvers.iter().any(|resolver| {
            resolver.regex().as_str() == regex
                && resolver.substitution_string() == substitution
                && resolver.storage()
                    == &Storage::S3 {
                        bucket: "umccr-10g-data-dev".into(),
                    }
                && resolver.allow_guard().allow_formats() == [format]
                && resolver.allow_guard().allow_reference_names()
                    == &ReferenceNames::List(BTreeSet::from([reference_name.to_string()]))
                && resolver.allow_guard().allow_interval() == interval
        })
    }

    #[test]
    fn test_elsa_response() -> Result<(), Error> {
        let data = include_str!("../tests/data/elsa_response.json");
        let response: ElsaResponse = serde_json::from_str(data)?;
        assert_eq!(response.location.bucket, "elsa-data-tmp");
        assert_eq!(response.location.key, "htsget-manifests/R004");
        assert_eq!(response.max_age, 86400);
        Ok(())
    }

    #[test]
    fn test_manifest_resolvers() -> Result<(), Error> {
        let data = include_str!("../tests/data/elsa_manifest.json");
        let manifest: ElsaManifest = serde_json::from_str(data)?;
        assert_eq!(manifest.release_key, "R004");

        let resolvers: Vec<Resolver> = manifest.try_into()?;
        assert_eq!(resolvers.len(), 4);

        assert!(has_resolver(
            &resolvers,
            "^R004/30F9F3FED8F711ED8C35DBEF59E9F537$",
            "HG00097/HG00097",
            Format::Bam,
            "1",
            Interval::new(Some(1), Some(10)),
        ));
        assert!(has_resolver(
            &resolvers,
            "^R004/30F9FFD4D8F711ED8C353BBCB8861211$",
            "HG00096/HG00096",
            Format::Bam,
            "2",
            Interval::new(None, Some(10)),
        ));
        assert!(has_resolver(
            &resolvers,
            "^R004/30F9F3FED8F711ED8C35DBEF59E9F537$",
            "HG00097/HG00097.hard-filtered",
            Format::Vcf,
            "3",
            Interval::new(Some(10), None),
        ));
        assert!(has_resolver(
            &resolvers,
            "^R004/30F9FFD4D8F711ED8C353BBCB8861211$",
            "HG00096/HG00096.hard-filtered",
            Format::Vcf,
            "4",
            Interval::new(None, None),
        ));
        Ok(())
    }

    #[test]
    fn test_resolver_from_manifest_parts() -> Result<(), Error> {
        let resolver = ElsaManifest::resolver_from_manifest_parts(
            "R001",
            "S3://bucket/dir/sample.cram",
            "ID1",
            Format::Cram,
            None,
        )?;
        assert_eq!(resolver.regex().as_str(), "^R001/ID1$");
        assert_eq!(resolver.substitution_string(), "dir/sample");
        assert_eq!(
            resolver.allow_guard().allow_reference_names(),
            &ReferenceNames::All
        );

        let other_ending = ElsaManifest::resolver_from_manifest_parts(
            "R001",
            "s3://bucket/dir/sample.bam",
            "ID1",
            Format::Cram,
            None,
        )?;
        assert_eq!(other_ending.substitution_string(), "dir/sample.bam");
        Ok(())
    }

    #[test]
    fn test_invalid_manifest_uris() {
        let result = ElsaManifest::resolver_from_manifest_parts(
            "R001",
            "https://bucket.s3.amazonaws.com/sample.bam",
            "ID1",
            Format::Bam,
            None,
        );
        assert!(matches!(
            result,
            Err(ElsaLibError::UnsupportedManifestFeature(_))
        ));

        let result =
            ElsaManifest::resolver_from_manifest_parts("R001", "s3://bucket", "ID1", Format::Bam, None);
        assert!(matches!(result, Err(ElsaLibError::InvalidManifestUri(_))));

        let result =
            ElsaManifest::resolver_from_manifest_parts("R001", "not a uri", "ID1", Format::Bam, None);
        assert!(matches!(result, Err(ElsaLibError::InvalidManifestUri(_))));
    }

    #[test]
    fn test_manifest_string_chromosome() -> Result<(), Error> {
        let manifest: ElsaManifest = serde_json::from_str(
            r#"{
                "releaseKey": "R010",
                "reads": {
                    "A": {
                        "url": "s3://bucket/a.bam",
                        "restrictions": [{"chromosome": "chrX"}, {"chromosome": "chrY", "start": 5}]
                    }
                }
            }"#,
        )?;
        let resolvers: Vec<Resolver> = manifest.try_into()?;
        assert_eq!(resolvers.len(), 2);
        assert_eq!(
            resolvers[0].allow_guard().allow_reference_names(),
            &ReferenceNames::List(BTreeSet::from(["chrX".to_string()]))
        );
        assert_eq!(
            resolvers[1].allow_guard().allow_interval(),
            Interval::new(Some(5), None)
        );
        Ok(())
    }
}
