use stack_string::{StackString, format_sstr};

use htsget_elsa_lib::{
    format::{Format, READS_FORMATS, VARIANTS_FORMATS},
    resolver::{Class, Interval, Query},
};

use crate::errors::ServiceError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Endpoint {
    Reads,
    Variants,
}

impl Endpoint {
    #[must_use]
    pub fn datatype(self) -> &'static str {
        match self {
            Self::Reads => "reads",
            Self::Variants => "variants",
        }
    }

    #[must_use]
    pub fn formats(self) -> [Format; 2] {
        match self {
            Self::Reads => READS_FORMATS,
            Self::Variants => VARIANTS_FORMATS,
        }
    }

    #[must_use]
    pub fn default_format(self) -> Format {
        match self {
            Self::Reads => Format::Bam,
            Self::Variants => Format::Vcf,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Route {
    ServiceInfo(Endpoint),
    Ticket { endpoint: Endpoint, id: StackString },
}

impl Route {
    /// Anything before the first `reads` or `variants` segment (an API stage,
    /// for instance) is ignored.
    pub fn parse(path: &str) -> Result<Self, ServiceError> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let (position, endpoint) = segments
            .iter()
            .enumerate()
            .find_map(|(i, segment)| match *segment {
                "reads" => Some((i, Endpoint::Reads)),
                "variants" => Some((i, Endpoint::Variants)),
                _ => None,
            })
            .ok_or_else(|| ServiceError::NotFound(format_sstr!("no route for {path}")))?;

        let id = segments[position + 1..].join("/");
        match id.as_str() {
            "" => Err(ServiceError::NotFound(format_sstr!("missing id in {path}"))),
            "service-info" => Ok(Self::ServiceInfo(endpoint)),
            _ => Ok(Self::Ticket {
                endpoint,
                id: id.into(),
            }),
        }
    }
}

fn parse_position(name: &str, value: Option<&str>) -> Result<Option<u32>, ServiceError> {
    value
        .map(|v| {
            v.parse().map_err(|_| {
                ServiceError::InvalidInput(format_sstr!("{name} must be a non-negative integer: {v}"))
            })
        })
        .transpose()
}

/// Build a [`Query`] for `id` from htsget query parameters.
pub fn parse_query<'a>(
    endpoint: Endpoint,
    id: &str,
    params: impl Fn(&str) -> Option<&'a str>,
) -> Result<Query, ServiceError> {
    let format = match params("format") {
        Some(format) => format
            .parse::<Format>()
            .map_err(|_| ServiceError::UnsupportedFormat(format_sstr!("unknown format {format}")))?,
        None => endpoint.default_format(),
    };
    if !endpoint.formats().contains(&format) {
        return Err(ServiceError::UnsupportedFormat(format_sstr!(
            "{format} is not a {} format",
            endpoint.datatype()
        )));
    }

    let class = match params("class") {
        None | Some("body") => Class::Body,
        Some("header") => Class::Header,
        Some(class) => {
            return Err(ServiceError::InvalidInput(format_sstr!(
                "unknown class {class}"
            )));
        }
    };

    let reference_name = params("referenceName");
    let start = parse_position("start", params("start"))?;
    let end = parse_position("end", params("end"))?;

    if (start.is_some() || end.is_some()) && matches!(reference_name, None | Some("*")) {
        return Err(ServiceError::InvalidInput(
            "start and end require a specific referenceName".into(),
        ));
    }
    if let (Some(start), Some(end)) = (start, end) {
        if start > end {
            return Err(ServiceError::InvalidRange(format_sstr!(
                "start {start} is greater than end {end}"
            )));
        }
    }

    let mut query = Query::new(id, format)
        .with_class(class)
        .with_interval(Interval::new(start, end));
    if let Some(reference_name) = reference_name {
        query = query.with_reference_name(reference_name);
    }
    Ok(query)
}

#[cfg(test)]
mod tests {
    use anyhow::Error;
    use std::collections::HashMap;

    use htsget_elsa_lib::{
        format::Format,
        resolver::{Class, Interval},
    };

    use crate::{
        errors::ServiceError,
        routes::{Endpoint, Route, parse_query},
    };

    fn query_params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_route_parse() -> Result<(), Error> {
        assert_eq!(
            Route::parse("/reads/service-info")?,
            Route::ServiceInfo(Endpoint::Reads)
        );
        assert_eq!(
            Route::parse("/prod/variants/R004/30F9F3FED8F711ED8C35DBEF59E9F537")?,
            Route::Ticket {
                endpoint: Endpoint::Variants,
                id: "R004/30F9F3FED8F711ED8C35DBEF59E9F537".into(),
            }
        );
        assert!(matches!(
            Route::parse("/reads/"),
            Err(ServiceError::NotFound(_))
        ));
        assert!(matches!(
            Route::parse("/something/else"),
            Err(ServiceError::NotFound(_))
        ));
        Ok(())
    }

    #[test]
    fn test_parse_query_defaults() -> Result<(), Error> {
        let params = query_params(&[]);
        let query = parse_query(Endpoint::Variants, "R004/ID", |k| {
            params.get(k).map(String::as_str)
        })?;
        assert_eq!(query.format(), Format::Vcf);
        assert_eq!(query.class(), Class::Body);
        assert_eq!(query.reference_name(), None);
        assert_eq!(query.interval(), Interval::default());
        Ok(())
    }

    #[test]
    fn test_parse_query_region() -> Result<(), Error> {
        let params = query_params(&[
            ("format", "CRAM"),
            ("class", "header"),
            ("referenceName", "chr1"),
            ("start", "100"),
            ("end", "200"),
        ]);
        let query = parse_query(Endpoint::Reads, "R004/ID", |k| {
            params.get(k).map(String::as_str)
        })?;
        assert_eq!(query.id(), "R004/ID");
        assert_eq!(query.format(), Format::Cram);
        assert_eq!(query.class(), Class::Header);
        assert_eq!(query.reference_name(), Some("chr1"));
        assert_eq!(query.interval(), Interval::new(Some(100), Some(200)));
        Ok(())
    }

    #[test]
    fn test_parse_query_errors() {
        let cases = [
            (vec![("format", "VCF")], "UnsupportedFormat"),
            (vec![("format", "SAM")], "UnsupportedFormat"),
            (vec![("class", "other")], "InvalidInput"),
            (vec![("start", "10")], "InvalidInput"),
            (vec![("referenceName", "*"), ("end", "10")], "InvalidInput"),
            (vec![("referenceName", "1"), ("start", "-1")], "InvalidInput"),
            (
                vec![("referenceName", "1"), ("start", "20"), ("end", "10")],
                "InvalidRange",
            ),
        ];
        for (pairs, expected) in cases {
            let params = query_params(&pairs);
            let result = parse_query(Endpoint::Reads, "R004/ID", |k| {
                params.get(k).map(String::as_str)
            });
            match result {
                Err(e) => assert_eq!(e.htsget_error(), expected, "{pairs:?}"),
                Ok(query) => panic!("{pairs:?} parsed as {query:?}"),
            }
        }
    }
}
