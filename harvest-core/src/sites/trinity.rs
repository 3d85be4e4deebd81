use super::buildout;
use super::end_when;
use crate::extract::{LayoutAttempt, PropertyHeader, SiteStrategy};
use crate::markup::Document;
use harvest_scanner::{Advance, DiscoveryPlan, Entry, FetchConfig, ListingUrl};

const LANDING_URL: &str = "https://www.trinity-partners.com/listings";

/// Most recently updated first.
const SORT_BY_UPDATED: &str = r#"
await new Promise(r => setTimeout(r, 1500));
const sort = document.getElementById('sortFilter');
if (sort) {
    const current = sort.querySelector('option[selected="selected"]');
    if (current) {
        current.removeAttribute('selected');
    }
    for (const option of sort.options) {
        if (option.value === '') {
            option.selected = true;
            option.setAttribute('selected', 'selected');
            sort.dispatchEvent(new Event('change', { bubbles: true }));
            break;
        }
    }
}
await new Promise(r => setTimeout(r, 5000));
"#;

const NEXT_PAGE: &str = r#"
const active = document.querySelector('.js-paginate-btn.active');
const next = active ? active.nextElementSibling : null;
if (!next || !next.classList.contains('js-paginate-btn')) {
    return false;
}
next.click();
await new Promise(r => setTimeout(r, 1500));
return true;
"#;

const RESULTS_READY: &str = "js:() => document.querySelectorAll('div.result-list-item').length > 1";

pub struct TrinityPartners;

impl SiteStrategy for TrinityPartners {
    fn id(&self) -> &'static str {
        "trinity"
    }

    fn display_name(&self) -> &'static str {
        "Trinity Partners"
    }

    fn discovery_plan(&self) -> DiscoveryPlan {
        let setup = format!("{}{}", buildout::SELECT_OFFICE_LEASE, SORT_BY_UPDATED);
        DiscoveryPlan::new(
            Entry::Embedded {
                landing: LANDING_URL.to_string(),
                frame_selector: buildout::FRAME.to_string(),
            },
            buildout::property_links(),
            end_when(last_page),
        )
        .with_setup_script(&setup)
        .with_wait_for(buildout::SEARCH_READY)
        .with_advance(Advance::Script {
            code: NEXT_PAGE.to_string(),
            wait_for: Some(RESULTS_READY.to_string()),
        })
    }

    fn fetch_config(&self) -> FetchConfig {
        buildout::property_fetch_config()
    }

    fn requires_resolution(&self) -> bool {
        true
    }

    fn resolve_detail_url(&self, markup: &str, page_url: &ListingUrl) -> Option<ListingUrl> {
        buildout::resolve_spaces_tab(markup, page_url)
    }

    fn detail_fetch_config(&self) -> FetchConfig {
        buildout::detail_fetch_config()
    }

    fn header(&self, doc: &Document) -> PropertyHeader {
        buildout::header(doc)
    }

    fn layouts(&self) -> Vec<LayoutAttempt> {
        vec![LayoutAttempt {
            name: "lease-spaces",
            parse: buildout::lease_spaces,
        }]
    }
}

/// The final page button is the active one.
fn last_page(doc: &Document) -> bool {
    doc.select(".js-paginate-btn")
        .last()
        .map(|button| button.value().classes().any(|c| c == "active"))
        .unwrap_or(false)
}
