//! Section classifier.
//!
//! Picks the list items of a listing page and files each one under a
//! [`SectionBucket`] by looking up the nearest ancestor's `data-scroll-id`
//! in the mapping table.

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};

use crate::types::section::{ClassifiedSection, SectionBucket};

/// List items under the known container classes, or carrying a technology marker.
static ITEM_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(
        "li.offer-view_tkzmjn3, \
         li.offer-view_catru5k, \
         li[data-test='item-technologies-os'], \
         li[data-test^='item-technologies']",
    )
    .expect("static selector")
});

static OS_MASK_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("mask[id]").expect("static selector"));

const OS_MARKER: &str = "item-technologies-os";
const OS_ID_PREFIX: &str = "gp_system_";
const SCROLL_ANCHOR_ATTR: &str = "data-scroll-id";

/// Classify every matching list item of a parsed page.
///
/// A page with no matching items yields an empty map.
pub fn classify(document: &Html) -> ClassifiedSection {
    let mut sections = ClassifiedSection::new();

    for item in document.select(&ITEM_SELECTOR) {
        let (bucket, text) = if item.value().attr("data-test") == Some(OS_MARKER) {
            (SectionBucket::TechnologiesOs, os_label(item))
        } else {
            (bucket_from_ancestors(item), normalized_text(item))
        };
        sections.push(bucket, text);
    }

    sections
}

/// Label of an operating-system marker: the nested mask id without its
/// prefix, or the visible text when there is no such mask.
fn os_label(item: ElementRef<'_>) -> String {
    item.select(&OS_MASK_SELECTOR)
        .next()
        .and_then(|mask| mask.value().attr("id"))
        .and_then(|id| id.strip_prefix(OS_ID_PREFIX))
        .map(str::to_string)
        .unwrap_or_else(|| normalized_text(item))
}

/// First ancestor whose scroll anchor is in the mapping table decides.
fn bucket_from_ancestors(item: ElementRef<'_>) -> SectionBucket {
    item.ancestors()
        .filter_map(ElementRef::wrap)
        .filter_map(|el| el.value().attr(SCROLL_ANCHOR_ATTR))
        .find_map(SectionBucket::from_scroll_anchor)
        .unwrap_or(SectionBucket::Unknown)
}

/// Visible text with every whitespace run collapsed to one space.
pub(crate) fn normalized_text(el: ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}
