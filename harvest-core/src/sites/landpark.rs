use super::{marker_links, settle};
use crate::extract::{LayoutAttempt, PropertyHeader, SiteStrategy, UnitFields};
use crate::markup::{Document, select_in, text_in};
use harvest_scanner::render::frame_source;
use harvest_scanner::{DiscoveryPlan, Entry, FetchConfig, ListingUrl};
use std::sync::Arc;

const SEARCH_URL: &str = "https://properties.landparkco.com/";
const DETAIL_FRAME: &str = "#iframe";

/// Picks office / lease in the search filters and waits for the grid to refresh.
const SELECT_OFFICE: &str = r#"
await new Promise(r => setTimeout(r, 3000));
const pick = (name, value) => {
    const select = document.querySelector(`select[name="${name}"]`);
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
pick('property-type', '55');
pick('offering-type', '54');
await new Promise(r => setTimeout(r, 3500));
"#;

pub struct Landpark;

impl SiteStrategy for Landpark {
    fn id(&self) -> &'static str {
        "landpark"
    }

    fn display_name(&self) -> &'static str {
        "Landpark"
    }

    /// Every listing fits on one page once the filters are applied.
    fn discovery_plan(&self) -> DiscoveryPlan {
        DiscoveryPlan::new(
            Entry::Direct(SEARCH_URL.to_string()),
            marker_links("/properties/"),
            Arc::new(|_: &str| false),
        )
        .with_setup_script(SELECT_OFFICE)
    }

    fn fetch_config(&self) -> FetchConfig {
        FetchConfig::default().wait_for(&format!("css:{}", DETAIL_FRAME))
    }

    fn requires_resolution(&self) -> bool {
        true
    }

    fn resolve_detail_url(&self, markup: &str, page_url: &ListingUrl) -> Option<ListingUrl> {
        frame_source(markup, page_url.as_str(), DETAIL_FRAME)
    }

    fn detail_fetch_config(&self) -> FetchConfig {
        FetchConfig::default().script(&settle(500))
    }

    fn header(&self, doc: &Document) -> PropertyHeader {
        PropertyHeader {
            name: doc.text_of("div.hero__text h1.hero__title"),
            street: doc.text_of("div.hero__text h2.hero__sub-title"),
            locality: None,
        }
    }

    fn layouts(&self) -> Vec<LayoutAttempt> {
        vec![LayoutAttempt {
            name: "availability-cards",
            parse: availability_cards,
        }]
    }
}

fn availability_cards(doc: &Document) -> Vec<UnitFields> {
    doc.select("div.availability-card-v2")
        .into_iter()
        .map(|card| {
            let total_size = select_in(card, "div.availability-card-info-item")
                .into_iter()
                .find(|item| {
                    text_in(*item, "span")
                        .map(|label| label.contains("Total Size"))
                        .unwrap_or(false)
                })
                .and_then(|item| text_in(item, "p.availability-card-info-item-value"));

            UnitFields::new(
                text_in(card, "div.availability-card-name h3"),
                total_size,
                text_in(card, "div.availability-card-rent h3"),
            )
        })
        .collect()
}
