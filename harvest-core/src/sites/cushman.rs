use super::{end_when, marker_links, settle};
use crate::extract::{LayoutAttempt, PropertyHeader, SiteStrategy, UnitFields};
use crate::markup::{
    Document, definition_pairs, first_in, labeled_value, node_text, non_empty, select_in, text_in,
};
use harvest_scanner::{Advance, DiscoveryPlan, Entry};

const SEARCH_URL: &str = "https://www.cushmanwakefield.com/en/united-states/properties/lease/lease-property-search#sort=%40propertylastupdateddate%20descending&f:PropertyType=[Office]&f:Country=[United%20States]";
const PAGE_TEMPLATE: &str = "https://www.cushmanwakefield.com/en/united-states/properties/lease/lease-property-search#first={offset}&sort=%40propertylastupdateddate%20descending&f:PropertyType=[Office]&f:Country=[United%20States]";
const PAGE_SIZE: usize = 12;

const RESULTS_READY: &str = "js:() => document.querySelectorAll('div.CoveoResult').length > 1";

pub struct Cushman;

impl SiteStrategy for Cushman {
    fn id(&self) -> &'static str {
        "cushman"
    }

    fn display_name(&self) -> &'static str {
        "Cushman & Wakefield"
    }

    fn discovery_plan(&self) -> DiscoveryPlan {
        DiscoveryPlan::new(
            Entry::Direct(SEARCH_URL.to_string()),
            marker_links("properties/for-lease/office"),
            end_when(last_page),
        )
        .with_setup_script(&settle(5000))
        .with_advance(Advance::PageUrl {
            template: PAGE_TEMPLATE.to_string(),
            page_size: PAGE_SIZE,
            wait_for: Some(RESULTS_READY.to_string()),
        })
    }

    fn header(&self, doc: &Document) -> PropertyHeader {
        PropertyHeader {
            name: doc.text_of("div.updated-page-title h1.updated-page-title-main"),
            street: doc.text_of("div.updated-page-title h5.updated-page-title-sub"),
            locality: None,
        }
    }

    fn layouts(&self) -> Vec<LayoutAttempt> {
        vec![
            LayoutAttempt {
                name: "availabilities",
                parse: availabilities,
            },
            LayoutAttempt {
                name: "property-statistics",
                parse: property_statistics,
            },
        ]
    }
}

/// The pager's next item is missing or disabled.
fn last_page(doc: &Document) -> bool {
    match doc.select_first("li.coveo-pager-next") {
        Some(next) => next
            .value()
            .classes()
            .any(|c| c == "coveo-pager-list-item-disabled"),
        None => true,
    }
}

fn availabilities(doc: &Document) -> Vec<UnitFields> {
    doc.select("div.availabilities-container-parent")
        .into_iter()
        .map(|container| {
            let floor_or_suite = first_in(container, "div.blue-color-title-div").and_then(|title| {
                let floor = text_in(title, "b.font-bold").unwrap_or_default();
                let suite = select_in(title, "span")
                    .into_iter()
                    .map(node_text)
                    .find(|text| text.contains("Suite"))
                    .unwrap_or_default();
                non_empty(format!("{} {}", floor, suite))
            });

            let details = select_in(container, "div.availabilities-second-level-description");
            UnitFields::new(
                floor_or_suite,
                labeled_value(&details, "p.m-1", "b.bold-font", "Available Space"),
                labeled_value(&details, "p.m-1", "b.bold-font", "Rental Price"),
            )
        })
        .collect()
}

/// Single-space listings only carry the statistics panel. A divisible range
/// wins over the plain available figure.
fn property_statistics(doc: &Document) -> Vec<UnitFields> {
    let Some(panel) = doc.select_first("div.mix_propertyStatistics") else {
        return Vec::new();
    };

    let mut price = None;
    let mut available = None;
    let mut min_divisible = None;
    let mut max_contiguous = None;
    for (term, value) in definition_pairs(panel) {
        let value = non_empty(value);
        if term.contains("Rental Price") {
            price = value;
        } else if term.contains("Available Space") {
            available = value;
        } else if term.contains("Min Divisible") {
            min_divisible = value;
        } else if term.contains("Max Contiguous") {
            max_contiguous = value;
        }
    }

    let space = match (min_divisible, max_contiguous) {
        (Some(min), Some(max)) => Some(format!("{} - {}", min, max)),
        _ => available,
    };

    if space.is_none() && price.is_none() {
        return Vec::new();
    }
    vec![UnitFields::new(None, space, price)]
}
