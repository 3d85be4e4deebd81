//! Pieces shared by brokers that embed the Buildout listing platform.
//!
//! The broker's own site shows a search frame. Each result links back to a
//! broker page that in turn embeds the property's Buildout document, whose
//! "spaces" tab carries the lease table.

use super::marker_links;
use crate::extract::{PropertyHeader, UnitFields};
use crate::markup::{Document, node_text, non_empty, select_in};
use harvest_scanner::render::frame_source;
use harvest_scanner::{FetchConfig, LinkPredicate, ListingUrl};

pub const FRAME: &str = "#buildout iframe";
pub const DETAIL_READY: &str = "css:.pdt-header1, .pdt-header2, .js-lease-space-row-toggle";

/// Buildout search results link to `...?propertyId=...` pages.
pub fn property_links() -> LinkPredicate {
    marker_links("propertyId")
}

/// Ready when the type filter or any result card exists.
pub const SEARCH_READY: &str = r#"js:() => {
    const select = document.getElementById("q_type_use_offset_eq_any");
    const cards = document.querySelectorAll('.property-card');
    return select !== null || cards.length > 0;
}"#;

/// Selects office space for lease in the search form.
pub const SELECT_OFFICE_LEASE: &str = r#"
await new Promise(r => setTimeout(r, 3000));
const pick = (id, value) => {
    const select = document.getElementById(id);
    if (!select) {
        return;
    }
    for (const option of select.options) {
        if (option.value === value) {
            option.selected = true;
            select.dispatchEvent(new Event('change', { bubbles: true }));
            break;
        }
    }
};
pick('q_type_use_offset_eq_any', '1');
pick('q_sale_or_lease_eq', 'lease');
"#;

pub fn property_fetch_config() -> FetchConfig {
    FetchConfig::default().wait_for(&format!("css:{}", FRAME))
}

pub fn detail_fetch_config() -> FetchConfig {
    FetchConfig::default().wait_for(DETAIL_READY)
}

/// The embedded Buildout document, opened on its spaces tab.
pub fn resolve_spaces_tab(markup: &str, page_url: &ListingUrl) -> Option<ListingUrl> {
    frame_source(markup, page_url.as_str(), FRAME).map(|src| src.with_query_pair("tab", "spaces"))
}

/// `h1` is the property name. `h2` reads `street | locality`; without a
/// separator it only carries the locality and the name doubles as the street.
pub fn header(doc: &Document) -> PropertyHeader {
    let name = doc.text_of(".pdt-header1 h1");
    let Some(line) = doc.text_of(".pdt-header2 h2") else {
        return PropertyHeader {
            street: name.clone(),
            name,
            locality: None,
        };
    };

    match line.split_once('|') {
        Some((street, locality)) => PropertyHeader {
            name,
            street: non_empty(street.to_string()),
            locality: non_empty(locality.to_string()),
        },
        None => PropertyHeader {
            street: name.clone(),
            name,
            locality: Some(line),
        },
    }
}

/// Rows of the lease spaces table: suite, type, size, rate, and more.
pub fn lease_spaces(doc: &Document) -> Vec<UnitFields> {
    doc.select(".js-lease-space-row-toggle.spaces")
        .into_iter()
        .filter_map(|row| {
            let cells: Vec<String> = select_in(row, "th, td").into_iter().map(node_text).collect();
            if cells.len() < 5 {
                return None;
            }
            Some(UnitFields::new(
                non_empty(cells[0].clone()),
                non_empty(cells[2].clone()),
                non_empty(cells[3].clone()),
            ))
        })
        .collect()
}
