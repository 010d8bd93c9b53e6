use serde::{Deserialize, Serialize};
use stack_string::format_sstr;
use std::{convert::TryFrom, fmt, str::FromStr};

use crate::errors::ElsaLibError;

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Format {
    Bam,
    Cram,
    Vcf,
    Bcf,
}

pub const READS_FORMATS: [Format; 2] = [Format::Bam, Format::Cram];
pub const VARIANTS_FORMATS: [Format; 2] = [Format::Vcf, Format::Bcf];

impl Format {
    /// Suffix of the data file in object storage.
    #[must_use]
    pub fn file_ending(self) -> &'static str {
        match self {
            Self::Bam => ".bam",
            Self::Cram => ".cram",
            Self::Vcf => ".vcf.gz",
            Self::Bcf => ".bcf",
        }
    }

    #[must_use]
    pub fn is_reads(self) -> bool {
        READS_FORMATS.contains(&self)
    }

    #[must_use]
    pub fn is_variants(self) -> bool {
        VARIANTS_FORMATS.contains(&self)
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Bam => "BAM",
            Self::Cram => "CRAM",
            Self::Vcf => "VCF",
            Self::Bcf => "BCF",
        })
    }
}

impl FromStr for Format {
    type Err = ElsaLibError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BAM" | "bam" => Ok(Self::Bam),
            "CRAM" | "cram" => Ok(Self::Cram),
            "VCF" | "vcf" => Ok(Self::Vcf),
            "BCF" | "bcf" => Ok(Self::Bcf),
            _ => Err(ElsaLibError::CustomError(format_sstr!(
                "{s} is not a Format"
            ))),
        }
    }
}

impl From<Format> for String {
    fn from(item: Format) -> Self {
        item.to_string()
    }
}

impl TryFrom<&str> for Format {
    type Error = ElsaLibError;
    fn try_from(item: &str) -> Result<Self, Self::Error> {
        item.parse()
    }
}

impl TryFrom<String> for Format {
    type Error = ElsaLibError;
    fn try_from(item: String) -> Result<Self, Self::Error> {
        item.parse()
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Error;

    use crate::format::Format;

    #[test]
    fn test_format_parse() -> Result<(), Error> {
        assert_eq!("BAM".parse::<Format>()?, Format::Bam);
        assert_eq!("vcf".parse::<Format>()?, Format::Vcf);
        assert!("SAM".parse::<Format>().is_err());
        assert_eq!(Format::Cram.to_string(), "CRAM");
        Ok(())
    }

    #[test]
    fn test_format_serde() -> Result<(), Error> {
        let formats: Vec<Format> = serde_json::from_str(r#"["BCF", "bam"]"#)?;
        assert_eq!(formats, vec![Format::Bcf, Format::Bam]);
        assert_eq!(serde_json::to_string(&Format::Vcf)?, r#""VCF""#);
        Ok(())
    }

    #[test]
    fn test_format_kind() {
        assert!(Format::Bam.is_reads());
        assert!(!Format::Bam.is_variants());
        assert!(Format::Bcf.is_variants());
        assert_eq!(Format::Vcf.file_ending(), ".vcf.gz");
    }
}
