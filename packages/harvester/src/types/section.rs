//! Section buckets and the classified-section map.
//!
//! Bucket names form a closed, versioned set. Markup the mapping table does
//! not recognize lands in [`SectionBucket::Unknown`] instead of being dropped.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Version of the scroll-anchor mapping table. Bump when buckets or anchors change.
pub const SECTION_TABLE_VERSION: u32 = 1;

/// Semantic category a list fragment is classified into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionBucket {
    Requirements,
    Technologies,
    #[serde(rename = "technologies_expected_1")]
    TechnologiesExpected1,
    #[serde(rename = "technologies_optional_1")]
    TechnologiesOptional1,
    RequirementsExpected,
    #[serde(rename = "requirements_expected_1")]
    RequirementsExpected1,
    #[serde(rename = "requirements_expected_2")]
    RequirementsExpected2,
    RequirementsOptional,
    #[serde(rename = "requirements_optional_1")]
    RequirementsOptional1,
    #[serde(rename = "requirements_optional_2")]
    RequirementsOptional2,
    Responsibilities,
    #[serde(rename = "responsibilities_1")]
    Responsibilities1,
    #[serde(rename = "responsibilities_2")]
    Responsibilities2,
    ResponsibilitiesExpected,
    #[serde(rename = "responsibilities_expected_1")]
    ResponsibilitiesExpected1,
    #[serde(rename = "responsibilities_expected_2")]
    ResponsibilitiesExpected2,
    ResponsibilitiesOptional,
    #[serde(rename = "responsibilities_optional_1")]
    ResponsibilitiesOptional1,
    #[serde(rename = "responsibilities_optional_2")]
    ResponsibilitiesOptional2,
    ResponsibilitiesHeader,
    MissionsHeader,
    RequirementsHeader,
    Offered,
    TechnologiesOs,
    Unknown,
}

impl SectionBucket {
    /// Every bucket, in serialization order.
    pub const ALL: [SectionBucket; 25] = [
        Self::Requirements,
        Self::Technologies,
        Self::TechnologiesExpected1,
        Self::TechnologiesOptional1,
        Self::RequirementsExpected,
        Self::RequirementsExpected1,
        Self::RequirementsExpected2,
        Self::RequirementsOptional,
        Self::RequirementsOptional1,
        Self::RequirementsOptional2,
        Self::Responsibilities,
        Self::Responsibilities1,
        Self::Responsibilities2,
        Self::ResponsibilitiesExpected,
        Self::ResponsibilitiesExpected1,
        Self::ResponsibilitiesExpected2,
        Self::ResponsibilitiesOptional,
        Self::ResponsibilitiesOptional1,
        Self::ResponsibilitiesOptional2,
        Self::ResponsibilitiesHeader,
        Self::MissionsHeader,
        Self::RequirementsHeader,
        Self::Offered,
        Self::TechnologiesOs,
        Self::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Requirements => "requirements",
            Self::Technologies => "technologies",
            Self::TechnologiesExpected1 => "technologies_expected_1",
            Self::TechnologiesOptional1 => "technologies_optional_1",
            Self::RequirementsExpected => "requirements_expected",
            Self::RequirementsExpected1 => "requirements_expected_1",
            Self::RequirementsExpected2 => "requirements_expected_2",
            Self::RequirementsOptional => "requirements_optional",
            Self::RequirementsOptional1 => "requirements_optional_1",
            Self::RequirementsOptional2 => "requirements_optional_2",
            Self::Responsibilities => "responsibilities",
            Self::Responsibilities1 => "responsibilities_1",
            Self::Responsibilities2 => "responsibilities_2",
            Self::ResponsibilitiesExpected => "responsibilities_expected",
            Self::ResponsibilitiesExpected1 => "responsibilities_expected_1",
            Self::ResponsibilitiesExpected2 => "responsibilities_expected_2",
            Self::ResponsibilitiesOptional => "responsibilities_optional",
            Self::ResponsibilitiesOptional1 => "responsibilities_optional_1",
            Self::ResponsibilitiesOptional2 => "responsibilities_optional_2",
            Self::ResponsibilitiesHeader => "responsibilities_header",
            Self::MissionsHeader => "missions_header",
            Self::RequirementsHeader => "requirements_header",
            Self::Offered => "offered",
            Self::TechnologiesOs => "technologies_os",
            Self::Unknown => "unknown",
        }
    }

    /// Resolve a `data-scroll-id` anchor value against the mapping table.
    ///
    /// Matching is case-insensitive. Returns `None` for anchors the table does
    /// not know, so the caller can keep walking up the tree.
    pub fn from_scroll_anchor(anchor: &str) -> Option<Self> {
        let bucket = match anchor.trim().to_lowercase().as_str() {
            "section-requirements" | "requirements" | "section-must-have" | "must-have" => {
                Self::Requirements
            }
            "section-technologies" => Self::Technologies,
            "technologies-expected-1" => Self::TechnologiesExpected1,
            "technologies-optional-1" => Self::TechnologiesOptional1,
            "requirements-expected" => Self::RequirementsExpected,
            "requirements-expected-1" => Self::RequirementsExpected1,
            "requirements-expected-2" => Self::RequirementsExpected2,
            "requirements-optional" => Self::RequirementsOptional,
            "requirements-optional-1" => Self::RequirementsOptional1,
            "requirements-optional-2" => Self::RequirementsOptional2,
            "section-responsibilities" | "responsibilities" => Self::Responsibilities,
            "responsibilities-1" => Self::Responsibilities1,
            "responsibilities-2" => Self::Responsibilities2,
            "responsibilities-expected" => Self::ResponsibilitiesExpected,
            "responsibilities-expected-1" => Self::ResponsibilitiesExpected1,
            "responsibilities-expected-2" => Self::ResponsibilitiesExpected2,
            "responsibilities-optional" => Self::ResponsibilitiesOptional,
            "responsibilities-optional-1" => Self::ResponsibilitiesOptional1,
            "responsibilities-optional-2" => Self::ResponsibilitiesOptional2,
            "section-responsibilities-header" => Self::ResponsibilitiesHeader,
            "section-missions-header" => Self::MissionsHeader,
            "section-requirements-header" => Self::RequirementsHeader,
            "section-offered" | "offered" | "offered-1" => Self::Offered,
            _ => return None,
        };
        Some(bucket)
    }
}

impl std::fmt::Display for SectionBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Text fragments grouped by bucket, in document order.
///
/// Duplicate fragments are kept; this layer does not deduplicate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassifiedSection(BTreeMap<SectionBucket, Vec<String>>);

impl ClassifiedSection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment to the end of a bucket.
    pub fn push(&mut self, bucket: SectionBucket, text: impl Into<String>) {
        self.0.entry(bucket).or_default().push(text.into());
    }

    /// Fragments of a bucket (empty if the page had none).
    pub fn get(&self, bucket: SectionBucket) -> &[String] {
        self.0.get(&bucket).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of non-empty buckets.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Total number of fragments across buckets.
    pub fn fragment_count(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    /// Whether anything fell through the mapping table.
    pub fn has_unknown(&self) -> bool {
        !self.get(SectionBucket::Unknown).is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SectionBucket, &Vec<String>)> {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_as_str_matches_serde_name() {
        for bucket in SectionBucket::ALL {
            let json = serde_json::to_string(&bucket).unwrap();
            assert_eq!(json, format!("\"{}\"", bucket.as_str()));
        }
    }

    #[test]
    fn test_scroll_anchor_case_insensitive() {
        assert_eq!(
            SectionBucket::from_scroll_anchor("SECTION-Requirements"),
            Some(SectionBucket::Requirements)
        );
        assert_eq!(
            SectionBucket::from_scroll_anchor("must-have"),
            Some(SectionBucket::Requirements)
        );
        assert_eq!(
            SectionBucket::from_scroll_anchor("offered-1"),
            Some(SectionBucket::Offered)
        );
        assert_eq!(SectionBucket::from_scroll_anchor("employer-name"), None);
        assert_eq!(SectionBucket::from_scroll_anchor(""), None);
    }

    #[test]
    fn test_unknown_and_os_not_reachable_from_anchors() {
        assert_eq!(SectionBucket::from_scroll_anchor("unknown"), None);
        assert_eq!(SectionBucket::from_scroll_anchor("technologies_os"), None);
    }

    #[test]
    fn test_section_preserves_order_and_duplicates() {
        let mut sections = ClassifiedSection::new();
        sections.push(SectionBucket::Technologies, "Rust");
        sections.push(SectionBucket::Technologies, "Rust");
        sections.push(SectionBucket::Technologies, "Go");

        assert_eq!(sections.get(SectionBucket::Technologies), ["Rust", "Rust", "Go"]);
        assert_eq!(sections.len(), 1);
        assert_eq!(sections.fragment_count(), 3);
        assert!(!sections.has_unknown());
    }

    #[test]
    fn test_section_serializes_as_object() {
        let mut sections = ClassifiedSection::new();
        sections.push(SectionBucket::RequirementsExpected1, "3 years");
        sections.push(SectionBucket::Unknown, "misc");

        let value = serde_json::to_value(&sections).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "requirements_expected_1": ["3 years"],
                "unknown": ["misc"],
            })
        );

        let back: ClassifiedSection = serde_json::from_value(value).unwrap();
        assert_eq!(back, sections);
    }
}
