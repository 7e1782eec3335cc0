//! README badge patching.
//!
//! Each badge is located by a marker: a literal label fragment, the numeric
//! value, and a literal style fragment (e.g. `Citations-1,234-green`). Only
//! the value span is replaced; label and style survive byte-for-byte.

use crate::error::{MetricsError, Result};
use crate::metrics::{group_thousands, MetricsRecord};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, error, info};

/// Label and style fragments surrounding one badge value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Marker {
    pub label: String,
    pub style: String,
}

impl Marker {
    pub fn new(label: &str, style: &str) -> Self {
        Self {
            label: label.to_string(),
            style: style.to_string(),
        }
    }
}

/// Markers for the four badges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MarkerSet {
    pub citations: Marker,
    pub h_index: Marker,
    pub i10_index: Marker,
    pub publications: Marker,
}

impl Default for MarkerSet {
    fn default() -> Self {
        Self {
            citations: Marker::new("Citations-", "-green"),
            h_index: Marker::new("H--Index-", "-blue"),
            i10_index: Marker::new("i10--Index-", "-a855f7"),
            publications: Marker::new("Publications-", "-orange"),
        }
    }
}

/// Result of patching a document in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchOutcome {
    pub text: String,
    pub changed: bool,
}

/// Outcome of a read-patch-write cycle on a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateStatus {
    /// Document rewritten with new values
    Updated,
    /// Values already current, nothing written
    Unchanged,
    /// No metrics available, document not touched
    Skipped,
    /// Reading or writing failed
    Failed(String),
}

/// Compiled badge patterns.
pub struct Patcher {
    citations: Regex,
    h_index: Regex,
    i10_index: Regex,
    publications: Regex,
}

impl Patcher {
    pub fn new(markers: &MarkerSet) -> Result<Self> {
        Ok(Self {
            citations: compile(&markers.citations, r"[0-9,]+\+?")?,
            h_index: compile(&markers.h_index, r"\d+")?,
            i10_index: compile(&markers.i10_index, r"\d+")?,
            publications: compile(&markers.publications, r"\d+\+?")?,
        })
    }

    /// Rewrite every badge the record has a value for.
    ///
    /// Badges whose marker is missing from `text` are skipped.
    pub fn patch(&self, text: &str, record: Option<&MetricsRecord>) -> PatchOutcome {
        let Some(record) = record else {
            return PatchOutcome {
                text: text.to_string(),
                changed: false,
            };
        };

        let mut content = text.to_string();

        if let Some(h) = record.h_index {
            content = replace_value(&self.h_index, "h-index", &content, &h.to_string());
        }

        if let Some(citations) = record.citations {
            let rendered = group_thousands(citations);
            content = replace_value(&self.citations, "citations", &content, &rendered);
        }

        if let Some(pubs) = record.publications {
            let rendered = format!("{}+", pubs.count);
            content = replace_value(&self.publications, "publications", &content, &rendered);
        }

        if let Some(i10) = record.i10_index {
            content = replace_value(&self.i10_index, "i10-index", &content, &i10.to_string());
        }

        let changed = content != text;
        PatchOutcome {
            text: content,
            changed,
        }
    }

    /// Read `path`, patch it, and write it back if anything changed.
    ///
    /// I/O failures are logged and reported, never returned as errors.
    pub fn update_file(&self, path: &Path, record: Option<&MetricsRecord>) -> UpdateStatus {
        let Some(record) = record else {
            info!("No metrics to update");
            return UpdateStatus::Skipped;
        };

        let original = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                error!(path = %path.display(), error = %e, "Failed to read document");
                return UpdateStatus::Failed(format!("read {}: {}", path.display(), e));
            }
        };

        let outcome = self.patch(&original, Some(record));
        if !outcome.changed {
            info!("No changes needed - metrics are up to date");
            return UpdateStatus::Unchanged;
        }

        match std::fs::write(path, &outcome.text) {
            Ok(()) => {
                info!(path = %path.display(), metrics = %record, "Document updated");
                UpdateStatus::Updated
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "Failed to write document");
                UpdateStatus::Failed(format!("write {}: {}", path.display(), e))
            }
        }
    }
}

fn compile(marker: &Marker, value_pattern: &str) -> Result<Regex> {
    if marker.label.is_empty() || marker.style.is_empty() {
        return Err(MetricsError::Config(
            "badge markers need a non-empty label and style".to_string(),
        ));
    }
    let pattern = format!(
        "({}){}({})",
        regex::escape(&marker.label),
        value_pattern,
        regex::escape(&marker.style)
    );
    Regex::new(&pattern).map_err(|e| MetricsError::Config(format!("Invalid marker pattern: {}", e)))
}

fn replace_value(re: &Regex, name: &str, content: &str, value: &str) -> String {
    if !re.is_match(content) {
        debug!(badge = name, "Marker not found, skipping");
        return content.to_string();
    }
    re.replace_all(content, |caps: &Captures| format!("{}{}{}", &caps[1], value, &caps[2]))
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::PublicationCount;
    use tempfile::NamedTempFile;

    const README: &str = "\
# Jane Doe
![Citations](https://img.shields.io/badge/Citations-1,000-green)
![H-Index](https://img.shields.io/badge/H--Index-10-blue)
![i10-Index](https://img.shields.io/badge/i10--Index-9-a855f7)
![Publications](https://img.shields.io/badge/Publications-25+-orange)
";

    fn patcher() -> Patcher {
        Patcher::new(&MarkerSet::default()).expect("default markers compile")
    }

    fn full_record() -> MetricsRecord {
        MetricsRecord {
            citations: Some(12345),
            h_index: Some(21),
            i10_index: Some(33),
            publications: Some(PublicationCount::exact(42)),
        }
    }

    #[test]
    fn test_patch_rewrites_all_badges() {
        let outcome = patcher().patch(README, Some(&full_record()));
        assert!(outcome.changed);
        assert!(outcome.text.contains("badge/Citations-12,345-green"));
        assert!(outcome.text.contains("badge/H--Index-21-blue"));
        assert!(outcome.text.contains("badge/i10--Index-33-a855f7"));
        assert!(outcome.text.contains("badge/Publications-42+-orange"));
        assert!(outcome.text.starts_with("# Jane Doe\n"));
    }

    #[test]
    fn test_patch_is_idempotent() {
        let p = patcher();
        let first = p.patch(README, Some(&full_record()));
        let second = p.patch(&first.text, Some(&full_record()));
        assert!(!second.changed);
        assert_eq!(second.text, first.text);
    }

    #[test]
    fn test_publications_qualifier_is_idempotent() {
        let p = patcher();
        let record = MetricsRecord {
            publications: Some("17+".parse().expect("parse")),
            ..Default::default()
        };
        let first = p.patch(README, Some(&record));
        assert!(first.text.contains("Publications-17+-orange"));
        let second = p.patch(&first.text, Some(&record));
        assert!(!second.changed);
    }

    #[test]
    fn test_citations_drop_trailing_qualifier() {
        let doc = "Citations-900+-green";
        let record = MetricsRecord {
            citations: Some(900),
            ..Default::default()
        };
        let outcome = patcher().patch(doc, Some(&record));
        assert!(outcome.changed);
        assert_eq!(outcome.text, "Citations-900-green");
    }

    #[test]
    fn test_absent_record_leaves_text_untouched() {
        let outcome = patcher().patch(README, None);
        assert!(!outcome.changed);
        assert_eq!(outcome.text, README);
    }

    #[test]
    fn test_missing_marker_skips_only_that_badge() {
        let doc: String = README
            .lines()
            .filter(|l| !l.contains("H--Index"))
            .map(|l| format!("{}\n", l))
            .collect();
        let outcome = patcher().patch(&doc, Some(&full_record()));
        assert!(outcome.changed);
        assert!(!outcome.text.contains("H--Index"));
        assert!(outcome.text.contains("Citations-12,345-green"));
        assert!(outcome.text.contains("i10--Index-33-a855f7"));
        assert!(outcome.text.contains("Publications-42+-orange"));
    }

    #[test]
    fn test_custom_markers() {
        let markers = MarkerSet {
            citations: Marker::new("cites: ", " total"),
            ..Default::default()
        };
        let p = Patcher::new(&markers).expect("compile");
        let record = MetricsRecord {
            citations: Some(2048),
            ..Default::default()
        };
        let outcome = p.patch("cites: 17 total", Some(&record));
        assert_eq!(outcome.text, "cites: 2,048 total");
    }

    #[test]
    fn test_empty_marker_rejected() {
        let markers = MarkerSet {
            h_index: Marker::new("", "-blue"),
            ..Default::default()
        };
        assert!(Patcher::new(&markers).is_err());
    }

    #[test]
    fn test_update_file_writes_once() -> Result<()> {
        let temp = NamedTempFile::new()?;
        std::fs::write(temp.path(), README)?;
        let p = patcher();

        assert_eq!(p.update_file(temp.path(), Some(&full_record())), UpdateStatus::Updated);
        let written = std::fs::read_to_string(temp.path())?;
        assert!(written.contains("Citations-12,345-green"));

        assert_eq!(p.update_file(temp.path(), Some(&full_record())), UpdateStatus::Unchanged);
        assert_eq!(p.update_file(temp.path(), None), UpdateStatus::Skipped);
        Ok(())
    }

    #[test]
    fn test_update_file_reports_io_failure() {
        let status =
            patcher().update_file(Path::new("/nonexistent/README.md"), Some(&full_record()));
        assert!(matches!(status, UpdateStatus::Failed(_)));
    }
}
