use super::buildout;
use super::end_when;
use crate::extract::{LayoutAttempt, PropertyHeader, SiteStrategy};
use crate::markup::Document;
use harvest_scanner::{Advance, DiscoveryPlan, Entry, FetchConfig, ListingUrl};

const LANDING_URL: &str = "https://www.lee-associates.com/properties/";

const NEXT_PAGE: &str = r#"
const button = document.querySelector('span.js-next');
if (!button) {
    return false;
}
button.click();
await new Promise(r => setTimeout(r, 1000));
return true;
"#;

pub struct LeeAssociates;

impl SiteStrategy for LeeAssociates {
    fn id(&self) -> &'static str {
        "lee"
    }

    fn display_name(&self) -> &'static str {
        "Lee & Associates"
    }

    fn discovery_plan(&self) -> DiscoveryPlan {
        let setup = format!(
            "{}\nawait new Promise(r => setTimeout(r, 5000));",
            buildout::SELECT_OFFICE_LEASE
        );
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
            wait_for: None,
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

/// The next control is hidden, not removed, on the final page.
fn last_page(doc: &Document) -> bool {
    doc.attr_of("span.js-next", "style")
        .map(|style| style.contains("display: none"))
        .unwrap_or(false)
}
