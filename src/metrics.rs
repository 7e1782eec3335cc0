//! The metrics record handed from the fetcher to the patcher.

use crate::error::{MetricsError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Publication count used when the profile page yields no rows.
pub const DEFAULT_PUBLICATIONS: PublicationCount = PublicationCount {
    count: 30,
    at_least: true,
};

/// Citation metrics for one profile.
///
/// A `None` field means the value is unknown and its badge is left alone.
/// The fetcher always fills every field; partial records come from manual
/// `patch` invocations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsRecord {
    /// Total citations ("All" column)
    pub citations: Option<u64>,
    /// h-index ("All" column)
    pub h_index: Option<u32>,
    /// i10-index ("All" column)
    pub i10_index: Option<u32>,
    /// Number of listed publications
    pub publications: Option<PublicationCount>,
}

impl MetricsRecord {
    /// Build a record from hand-typed values such as `"12,345"` or `"42+"`.
    pub fn from_raw(
        citations: Option<&str>,
        h_index: Option<&str>,
        i10_index: Option<&str>,
        publications: Option<&str>,
    ) -> Result<Self> {
        fn field<T>(
            name: &str,
            raw: Option<&str>,
            parse: fn(&str) -> Result<T>,
        ) -> Result<Option<T>> {
            raw.map(parse)
                .transpose()
                .map_err(|e| MetricsError::Parse(format!("{}: {}", name, e)))
        }

        Ok(Self {
            citations: field("citations", citations, parse_count)?,
            h_index: field("h-index", h_index, parse_index)?,
            i10_index: field("i10-index", i10_index, parse_index)?,
            publications: field("publications", publications, str::parse::<PublicationCount>)?,
        })
    }

    /// True when no field carries a value.
    pub fn is_empty(&self) -> bool {
        self.citations.is_none()
            && self.h_index.is_none()
            && self.i10_index.is_none()
            && self.publications.is_none()
    }
}

impl fmt::Display for MetricsRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn field<T: fmt::Display>(v: &Option<T>) -> String {
            v.as_ref().map_or_else(|| "-".to_string(), |v| v.to_string())
        }
        write!(
            f,
            "citations={} h-index={} i10-index={} publications={}",
            field(&self.citations),
            field(&self.h_index),
            field(&self.i10_index),
            field(&self.publications)
        )
    }
}

/// A publication count, possibly a lower bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicationCount {
    pub count: u32,
    /// The provider listed at least `count` publications, maybe more.
    pub at_least: bool,
}

impl PublicationCount {
    pub fn exact(count: u32) -> Self {
        Self {
            count,
            at_least: false,
        }
    }

    pub fn at_least(count: u32) -> Self {
        Self {
            count,
            at_least: true,
        }
    }
}

impl fmt::Display for PublicationCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.at_least {
            write!(f, "{}+", self.count)
        } else {
            write!(f, "{}", self.count)
        }
    }
}

impl FromStr for PublicationCount {
    type Err = MetricsError;

    /// Accepts `"42"` and `"42+"`.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (digits, at_least) = match s.strip_suffix('+') {
            Some(rest) => (rest, true),
            None => (s, false),
        };
        let count = parse_count(digits)?;
        let count = u32::try_from(count)
            .map_err(|_| MetricsError::Parse(format!("publication count out of range: {}", s)))?;
        Ok(Self { count, at_least })
    }
}

/// Parse a count that may contain thousands separators, e.g. `"12,345"`.
pub fn parse_count(raw: &str) -> Result<u64> {
    let digits: String = raw
        .trim()
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();

    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(MetricsError::Parse(format!("not a count: '{}'", raw)));
    }

    digits
        .parse::<u64>()
        .map_err(|e| MetricsError::Parse(format!("not a count: '{}': {}", raw, e)))
}

/// Parse an index value (h-index, i10-index).
pub fn parse_index(raw: &str) -> Result<u32> {
    let value = parse_count(raw)?;
    u32::try_from(value).map_err(|_| MetricsError::Parse(format!("index out of range: {}", raw)))
}

/// Render a count with `,` between thousands groups.
pub fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_count_with_separators() {
        assert_eq!(parse_count("12,345").expect("parse"), 12345);
        assert_eq!(parse_count("12345").expect("parse"), 12345);
        assert_eq!(parse_count(" 1,234,567 ").expect("parse"), 1_234_567);
    }

    #[test]
    fn test_parse_count_rejects_garbage() {
        assert!(parse_count("").is_err());
        assert!(parse_count(",").is_err());
        assert!(parse_count("12a").is_err());
        assert!(parse_count("-3").is_err());
    }

    #[test]
    fn test_publication_count_from_str() {
        let plain: PublicationCount = "42".parse().expect("parse");
        assert_eq!(plain, PublicationCount::exact(42));

        let bound: PublicationCount = "17+".parse().expect("parse");
        assert_eq!(bound, PublicationCount::at_least(17));
        assert_eq!(bound.to_string(), "17+");
    }

    #[test]
    fn test_from_raw_partial_record() {
        let record = MetricsRecord::from_raw(Some("12,345"), None, Some("7"), Some("17+"))
            .expect("valid values");
        assert_eq!(record.citations, Some(12345));
        assert_eq!(record.h_index, None);
        assert_eq!(record.i10_index, Some(7));
        assert_eq!(record.publications, Some(PublicationCount::at_least(17)));

        let empty = MetricsRecord::from_raw(None, None, None, None).expect("no values");
        assert!(empty.is_empty());
    }

    #[test]
    fn test_from_raw_names_bad_field() {
        let err = MetricsRecord::from_raw(None, Some("twelve"), None, None)
            .expect_err("h-index is not a number");
        assert!(err.to_string().contains("h-index"));
    }

    #[test]
    fn test_group_thousands() {
        assert_eq!(group_thousands(0), "0");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(1000), "1,000");
        assert_eq!(group_thousands(12345), "12,345");
        assert_eq!(group_thousands(1_234_567), "1,234,567");
    }

    #[test]
    fn test_record_json_channel_shape() {
        let record = MetricsRecord {
            citations: Some(1200),
            h_index: Some(12),
            i10_index: Some(14),
            publications: Some(PublicationCount::at_least(30)),
        };
        let json = serde_json::to_string(&record).expect("serialize");
        let back: MetricsRecord = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, record);
        assert!(!back.is_empty());
        assert!(MetricsRecord::default().is_empty());
    }
}
