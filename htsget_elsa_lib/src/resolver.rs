use regex::Regex;
use serde::{Deserialize, Serialize};
use stack_string::{StackString, format_sstr};
use std::collections::BTreeSet;

use crate::{errors::ElsaLibError, format::Format};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    start: Option<u32>,
    end: Option<u32>,
}

impl Interval {
    #[must_use]
    pub fn new(start: Option<u32>, end: Option<u32>) -> Self {
        Self { start, end }
    }

    #[must_use]
    pub fn start(&self) -> Option<u32> {
        self.start
    }

    #[must_use]
    pub fn end(&self) -> Option<u32> {
        self.end
    }

    /// True when `other` lies inside this interval. A missing bound on `other`
    /// is unbounded, so it only fits when this side is unbounded too.
    #[must_use]
    pub fn contains_interval(&self, other: Self) -> bool {
        let start_ok = match self.start {
            None => true,
            Some(start) => other.start.is_some_and(|s| s >= start),
        };
        let end_ok = match self.end {
            None => true,
            Some(end) => other.end.is_some_and(|e| e <= end),
        };
        start_ok && end_ok
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReferenceNames {
    #[default]
    All,
    List(BTreeSet<String>),
}

impl ReferenceNames {
    #[must_use]
    pub fn allows(&self, reference_name: Option<&str>) -> bool {
        match self {
            Self::All => true,
            Self::List(names) => reference_name.is_some_and(|name| names.contains(name)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowGuard {
    #[serde(default)]
    allow_reference_names: ReferenceNames,
    #[serde(default = "default_allow_formats")]
    allow_formats: Vec<Format>,
    #[serde(default)]
    allow_interval: Interval,
}

fn default_allow_formats() -> Vec<Format> {
    vec![Format::Bam, Format::Cram, Format::Vcf, Format::Bcf]
}

impl Default for AllowGuard {
    fn default() -> Self {
        Self {
            allow_reference_names: ReferenceNames::All,
            allow_formats: default_allow_formats(),
            allow_interval: Interval::default(),
        }
    }
}

impl AllowGuard {
    #[must_use]
    pub fn with_allow_formats(mut self, allow_formats: Vec<Format>) -> Self {
        self.allow_formats = allow_formats;
        self
    }

    #[must_use]
    pub fn with_allow_reference_names(mut self, allow_reference_names: ReferenceNames) -> Self {
        self.allow_reference_names = allow_reference_names;
        self
    }

    #[must_use]
    pub fn with_allow_interval(mut self, allow_interval: Interval) -> Self {
        self.allow_interval = allow_interval;
        self
    }

    #[must_use]
    pub fn allow_reference_names(&self) -> &ReferenceNames {
        &self.allow_reference_names
    }

    #[must_use]
    pub fn allow_formats(&self) -> &[Format] {
        &self.allow_formats
    }

    #[must_use]
    pub fn allow_interval(&self) -> Interval {
        self.allow_interval
    }

    #[must_use]
    pub fn query_allowed(&self, query: &Query) -> bool {
        self.allow_formats.contains(&query.format)
            && self
                .allow_reference_names
                .allows(query.reference_name())
            && self.allow_interval.contains_interval(query.interval)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Storage {
    S3 { bucket: StackString },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Class {
    Header,
    #[default]
    Body,
}

/// An htsget request reduced to the fields a resolver cares about.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Query {
    id: StackString,
    format: Format,
    class: Class,
    reference_name: Option<StackString>,
    interval: Interval,
}

impl Query {
    #[must_use]
    pub fn new(id: impl Into<StackString>, format: Format) -> Self {
        Self {
            id: id.into(),
            format,
            class: Class::default(),
            reference_name: None,
            interval: Interval::default(),
        }
    }

    #[must_use]
    pub fn with_class(mut self, class: Class) -> Self {
        self.class = class;
        self
    }

    #[must_use]
    pub fn with_reference_name(mut self, reference_name: impl Into<StackString>) -> Self {
        self.reference_name = Some(reference_name.into());
        self
    }

    #[must_use]
    pub fn with_interval(mut self, interval: Interval) -> Self {
        self.interval = interval;
        self
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn format(&self) -> Format {
        self.format
    }

    #[must_use]
    pub fn class(&self) -> Class {
        self.class
    }

    #[must_use]
    pub fn reference_name(&self) -> Option<&str> {
        self.reference_name.as_ref().map(StackString::as_str)
    }

    #[must_use]
    pub fn interval(&self) -> Interval {
        self.interval
    }
}

mod regex_pattern {
    use regex::Regex;
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(regex: &Regex, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(regex.as_str())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Regex, D::Error> {
        let pattern = String::deserialize(deserializer)?;
        Regex::new(&pattern).map_err(D::Error::custom)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Resolver {
    #[serde(with = "regex_pattern")]
    regex: Regex,
    substitution_string: StackString,
    storage: Storage,
    #[serde(flatten)]
    allow_guard: AllowGuard,
}

impl Resolver {
    /// # Errors
    /// Returns error if `regex` is not a valid regular expression
    pub fn new(
        storage: Storage,
        regex: &str,
        substitution_string: &str,
        allow_guard: AllowGuard,
    ) -> Result<Self, ElsaLibError> {
        Ok(Self {
            regex: Regex::new(regex)?,
            substitution_string: substitution_string.into(),
            storage,
            allow_guard,
        })
    }

    #[must_use]
    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    #[must_use]
    pub fn substitution_string(&self) -> &str {
        &self.substitution_string
    }

    #[must_use]
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    #[must_use]
    pub fn allow_guard(&self) -> &AllowGuard {
        &self.allow_guard
    }

    /// Substituted id when the regex matches, ignoring the guard.
    #[must_use]
    pub fn resolve_id(&self, id: &str) -> Option<StackString> {
        if self.regex.is_match(id) {
            Some(
                self.regex
                    .replace(id, self.substitution_string.as_str())
                    .as_ref()
                    .into(),
            )
        } else {
            None
        }
    }

    #[must_use]
    pub fn resolve(&self, query: &Query) -> Option<ResolvedId> {
        if !self.allow_guard.query_allowed(query) {
            return None;
        }
        let key = self.resolve_id(query.id())?;
        Some(ResolvedId {
            storage: self.storage.clone(),
            key,
            format: query.format(),
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedId {
    pub storage: Storage,
    pub key: StackString,
    pub format: Format,
}

impl ResolvedId {
    /// Full object key including the format's file ending.
    #[must_use]
    pub fn object_key(&self) -> StackString {
        format_sstr!("{}{}", self.key, self.format.file_ending())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    Resolved(ResolvedId),
    /// Some resolver matched the id but none of the matching guards allowed the query.
    Denied,
    NotFound,
}

/// First resolver, in order, that matches the id and allows the query wins.
#[must_use]
pub fn resolve_query(resolvers: &[Resolver], query: &Query) -> Resolution {
    let mut matched = false;
    for resolver in resolvers {
        if let Some(resolved) = resolver.resolve(query) {
            return Resolution::Resolved(resolved);
        }
        matched |= resolver.regex.is_match(query.id());
    }
    if matched {
        Resolution::Denied
    } else {
        Resolution::NotFound
    }
}
