//! The normalized record persisted for each harvested listing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::listing::ListingDescriptor;
use super::section::{ClassifiedSection, SECTION_TABLE_VERSION};

/// One harvested job listing.
///
/// `url` is the unique key within a persisted collection. Scalar fields are
/// empty strings when extraction found nothing; they are never null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub url: String,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub company: String,

    #[serde(default)]
    pub location: String,

    #[serde(default)]
    pub salary_low: String,

    #[serde(default)]
    pub salary_high: String,

    #[serde(default)]
    pub work_type: String,

    #[serde(default)]
    pub experience: String,

    #[serde(default)]
    pub contract_type: String,

    #[serde(default)]
    pub operating_mode: String,

    /// Publication date copied from the descriptor
    #[serde(default)]
    pub date: String,

    /// List fragments grouped by bucket
    #[serde(default)]
    pub sections: ClassifiedSection,

    /// Mapping table version the sections were classified with
    #[serde(default = "default_sections_version")]
    pub sections_version: u32,

    /// When the page was fetched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetched_at: Option<DateTime<Utc>>,

    /// Originating descriptor, verbatim
    pub source: ListingDescriptor,
}

fn default_sections_version() -> u32 {
    SECTION_TABLE_VERSION
}

impl JobRecord {
    /// An empty record for a descriptor: every scalar blank, no sections.
    pub fn from_descriptor(descriptor: &ListingDescriptor) -> Self {
        Self {
            url: descriptor.link.trim().to_string(),
            title: String::new(),
            company: String::new(),
            location: String::new(),
            salary_low: String::new(),
            salary_high: String::new(),
            work_type: String::new(),
            experience: String::new(),
            contract_type: String::new(),
            operating_mode: String::new(),
            date: descriptor.date_hint().to_string(),
            sections: ClassifiedSection::new(),
            sections_version: SECTION_TABLE_VERSION,
            fetched_at: None,
            source: descriptor.clone(),
        }
    }

    /// Set the fetch timestamp.
    pub fn with_fetched_at(mut self, fetched_at: DateTime<Utc>) -> Self {
        self.fetched_at = Some(fetched_at);
        self
    }
}
