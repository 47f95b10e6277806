//! Record assembler.
//!
//! Combines classifier output with single-node field lookups into one
//! [`JobRecord`]. Every lookup is independent: a missing node is an empty
//! string, never an error, so one defeated selector cannot lose the rest of
//! the record.

use std::sync::LazyLock;

use chrono::Utc;
use scraper::{ElementRef, Html, Selector};

use crate::classify::{classify, normalized_text};
use crate::fetch::Document;
use crate::types::listing::ListingDescriptor;
use crate::types::record::JobRecord;
use crate::types::section::ClassifiedSection;

struct FieldSelectors {
    title: Selector,
    company: Selector,
    location: Selector,
    salary: Selector,
    work_type: Selector,
    experience: Selector,
    contract_type: Selector,
    operating_mode: Selector,
}

static FIELDS: LazyLock<FieldSelectors> = LazyLock::new(|| {
    let parse = |s: &str| Selector::parse(s).expect("static selector");
    FieldSelectors {
        title: parse(r#"[data-test="text-positionName"]"#),
        company: parse(r#"h2[data-scroll-id="employer-name"]"#),
        location: parse(
            r#"[data-test="sections-benefit-workplaces"] [data-test="offer-badge-title"]"#,
        ),
        salary: parse(r#"[data-test="text-earningAmount"]"#),
        work_type: parse(
            r#"[data-test="sections-benefit-work-schedule"] [data-test="offer-badge-title"]"#,
        ),
        experience: parse(
            r#"[data-test="sections-benefit-employment-type-name"] [data-test="offer-badge-title"]"#,
        ),
        contract_type: parse(
            r#"[data-test="sections-benefit-contracts"] [data-test="offer-badge-title"]"#,
        ),
        operating_mode: parse(
            r#"[data-scroll-id="work-modes"] [data-test="offer-badge-title"]"#,
        ),
    }
});

/// Build the record for a listing from its parsed page and sections.
pub fn assemble(
    descriptor: &ListingDescriptor,
    document: &Html,
    sections: ClassifiedSection,
) -> JobRecord {
    let fields = &*FIELDS;
    let mut record = JobRecord::from_descriptor(descriptor);

    record.title = or_hint(text_of(document, &fields.title), descriptor.title_hint());
    record.company = or_hint(
        direct_text_of(document, &fields.company),
        descriptor.company_hint(),
    );
    record.location = or_hint(
        text_of(document, &fields.location),
        descriptor.location_hint(),
    );

    let (low, high) = split_salary(&text_of(document, &fields.salary));
    record.salary_low = low;
    record.salary_high = high;

    record.work_type = text_of(document, &fields.work_type);
    record.experience = text_of(document, &fields.experience);
    record.contract_type = text_of(document, &fields.contract_type);
    record.operating_mode = text_of(document, &fields.operating_mode);
    record.sections = sections;

    record
}

/// Parse, classify and assemble in one synchronous step.
///
/// The parsed tree lives only for the duration of this call.
pub fn extract_record(descriptor: &ListingDescriptor, document: &Document) -> JobRecord {
    let html = document.parse();
    let sections = classify(&html);
    assemble(descriptor, &html, sections).with_fetched_at(Utc::now())
}

/// Split a salary range on the first en-dash, else the first hyphen.
///
/// Without a separator the whole text is the low bound.
pub fn split_salary(salary: &str) -> (String, String) {
    let salary = salary.replace('\u{a0}', " ");
    let salary = salary.trim();

    let parts = salary
        .split_once('\u{2013}')
        .or_else(|| salary.split_once('-'));

    match parts {
        Some((low, high)) => (low.trim().to_string(), high.trim().to_string()),
        None => (salary.to_string(), String::new()),
    }
}

fn first<'a>(document: &'a Html, selector: &Selector) -> Option<ElementRef<'a>> {
    document.select(selector).next()
}

/// Whitespace-normalized text of the first match, or "".
fn text_of(document: &Html, selector: &Selector) -> String {
    first(document, selector)
        .map(normalized_text)
        .unwrap_or_default()
}

/// First non-blank text node directly under the first match, or "".
///
/// Descendant elements are skipped so nested boilerplate never leaks in.
fn direct_text_of(document: &Html, selector: &Selector) -> String {
    first(document, selector)
        .and_then(|el| {
            el.children()
                .filter_map(|child| child.value().as_text())
                .map(|text| text.trim())
                .find(|text| !text.is_empty())
                .map(str::to_string)
        })
        .unwrap_or_default()
}

fn or_hint(value: String, hint: &str) -> String {
    if value.is_empty() {
        hint.trim().to_string()
    } else {
        value
    }
}
