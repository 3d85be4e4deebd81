use super::{end_when, marker_links, settle};
use crate::extract::{LayoutAttempt, PropertyHeader, SiteStrategy, UnitFields};
use crate::markup::{Document, definition_pairs, node_text, non_empty, select_in, text_lines};
use harvest_scanner::{Advance, DiscoveryPlan, Entry, FetchConfig};

const SEARCH_URL: &str =
    "https://property.jll.com/search?tenureType=rent&propertyTypes=office&orderBy=desc&sortBy=dateModified";

const NEXT_BUTTON: &str = r#"nav[role="navigation"] ul li:last-child button"#;

const NEXT_PAGE: &str = r#"
const button = document.querySelector('nav[role="navigation"] ul li:last-child button');
if (!button || button.disabled || button.getAttribute('aria-disabled') === 'true') {
    return false;
}
button.click();
await new Promise(r => setTimeout(r, 5000));
return true;
"#;

pub struct Jll;

impl SiteStrategy for Jll {
    fn id(&self) -> &'static str {
        "jll"
    }

    fn display_name(&self) -> &'static str {
        "JLL"
    }

    fn discovery_plan(&self) -> DiscoveryPlan {
        DiscoveryPlan::new(
            Entry::Direct(SEARCH_URL.to_string()),
            marker_links("/listings/"),
            end_when(last_page),
        )
        .with_setup_script(&settle(3000))
        .with_advance(Advance::Script {
            code: NEXT_PAGE.to_string(),
            wait_for: None,
        })
    }

    fn fetch_config(&self) -> FetchConfig {
        FetchConfig::default().script(&settle(5000))
    }

    fn header(&self, doc: &Document) -> PropertyHeader {
        let mut address = doc
            .select_first("main address")
            .map(text_lines)
            .unwrap_or_default()
            .into_iter();

        PropertyHeader {
            name: doc.text_of("main h1"),
            street: address.next(),
            locality: non_empty(address.collect::<Vec<_>>().join(", ")),
        }
    }

    fn layouts(&self) -> Vec<LayoutAttempt> {
        vec![
            LayoutAttempt {
                name: "availability-table",
                parse: availability_table,
            },
            LayoutAttempt {
                name: "summary",
                parse: summary,
            },
        ]
    }
}

/// The last pager item's button is disabled on the final page.
fn last_page(doc: &Document) -> bool {
    match doc.select_first(NEXT_BUTTON) {
        Some(button) => {
            let attrs = button.value();
            attrs.attr("disabled").is_some() || attrs.attr("aria-disabled") == Some("true")
        }
        None => false,
    }
}

fn column(headers: &[String], names: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|header| names.iter().any(|name| header.contains(name)))
}

/// Units listed in a table whose columns are identified by their headers.
fn availability_table(doc: &Document) -> Vec<UnitFields> {
    for table in doc.select("table") {
        let headers: Vec<String> = select_in(table, "thead th")
            .into_iter()
            .map(|th| node_text(th).to_lowercase())
            .collect();

        let Some(size_col) = column(&headers, &["size", "space", "area"]) else {
            continue;
        };
        let floor_col = column(&headers, &["floor", "suite", "unit"]);
        let rent_col = column(&headers, &["rent", "rate", "price"]);

        let units: Vec<UnitFields> = select_in(table, "tbody tr")
            .into_iter()
            .filter_map(|row| {
                let cells: Vec<String> =
                    select_in(row, "th, td").into_iter().map(node_text).collect();
                if cells.is_empty() {
                    return None;
                }
                let cell = |idx: Option<usize>| {
                    idx.and_then(|i| cells.get(i).cloned()).and_then(non_empty)
                };
                Some(UnitFields::new(cell(floor_col), cell(Some(size_col)), cell(rent_col)))
            })
            .collect();

        if !units.is_empty() {
            return units;
        }
    }
    Vec::new()
}

fn summary(doc: &Document) -> Vec<UnitFields> {
    let mut space = None;
    let mut price = None;
    for dl in doc.select("dl") {
        for (term, value) in definition_pairs(dl) {
            let term = term.to_lowercase();
            if space.is_none() && (term.contains("available") || term.contains("size")) {
                space = non_empty(value);
            } else if price.is_none() && (term.contains("rent") || term.contains("price")) {
                price = non_empty(value);
            }
        }
    }

    if space.is_none() && price.is_none() {
        return Vec::new();
    }
    vec![UnitFields::new(None, space, price)]
}
