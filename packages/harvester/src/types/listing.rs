//! Listing descriptors supplied by the external link-collection process.

use serde::{Deserialize, Serialize};
use url::Url;

/// One remote job posting to harvest.
///
/// Only `link` is required; the hints are carried into the resulting record
/// as provenance and used as fallbacks when live extraction finds nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingDescriptor {
    /// Listing URL, the unique key of the resulting record
    pub link: String,

    /// Title as seen on the listing index
    #[serde(default)]
    pub title: Option<String>,

    /// Company as seen on the listing index
    #[serde(default)]
    pub company: Option<String>,

    /// Location as seen on the listing index
    #[serde(default)]
    pub location: Option<String>,

    /// Publication date as seen on the listing index (usually `YYYY-MM-DD`)
    #[serde(default)]
    pub date: Option<String>,
}

impl ListingDescriptor {
    /// Create a descriptor with no hints.
    pub fn new(link: impl Into<String>) -> Self {
        Self {
            link: link.into(),
            title: None,
            company: None,
            location: None,
            date: None,
        }
    }

    /// Set the title hint.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set the company hint.
    pub fn with_company(mut self, company: impl Into<String>) -> Self {
        self.company = Some(company.into());
        self
    }

    /// Set the location hint.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Set the date hint.
    pub fn with_date(mut self, date: impl Into<String>) -> Self {
        self.date = Some(date.into());
        self
    }

    /// Whether the link is an absolute http(s) URL we can fetch.
    pub fn is_fetchable(&self) -> bool {
        let link = self.link.trim();
        if link.is_empty() {
            return false;
        }
        Url::parse(link)
            .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
            .unwrap_or(false)
    }

    pub fn title_hint(&self) -> &str {
        self.title.as_deref().unwrap_or("")
    }

    pub fn company_hint(&self) -> &str {
        self.company.as_deref().unwrap_or("")
    }

    pub fn location_hint(&self) -> &str {
        self.location.as_deref().unwrap_or("")
    }

    pub fn date_hint(&self) -> &str {
        self.date.as_deref().unwrap_or("")
    }
}
