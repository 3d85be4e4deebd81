use super::{end_when, has_class, marker_links, settle};
use crate::extract::{LayoutAttempt, PropertyHeader, SiteStrategy, UnitFields};
use crate::markup::{Document, labeled_value, node_text, non_empty, select_in, text_in, text_lines};
use harvest_scanner::{Advance, DiscoveryPlan, Entry};
use url::Url;

const SEARCH_URL: &str = "https://www.cbre.com/properties/properties-for-lease/commercial-space?sort=lastupdated%2Bdescending&propertytype=Office&transactiontype=isLetting&initialpolygon=%5B%5B67.12117833969766%2C-28.993985994685787%5D%2C%5B-26.464978515643416%2C-141.84554849468577%5D%5D";
const LINK_BASE: &str = "https://www.cbre.com";

const NEXT_PAGE: &str = r#"
const button = document.querySelector('li.cbre-c-pl-pager__next');
if (!button) {
    return false;
}
button.click();
return true;
"#;

const RESULTS_READY: &str = "js:() => document.querySelectorAll('div.CoveoResult').length > 1";

pub struct Cbre;

impl SiteStrategy for Cbre {
    fn id(&self) -> &'static str {
        "cbre"
    }

    fn display_name(&self) -> &'static str {
        "CBRE"
    }

    fn discovery_plan(&self) -> DiscoveryPlan {
        let plan = DiscoveryPlan::new(
            Entry::Direct(SEARCH_URL.to_string()),
            marker_links("US-SMPL"),
            end_when(last_page),
        )
        .with_setup_script(&settle(5000))
        .with_advance(Advance::Script {
            code: NEXT_PAGE.to_string(),
            wait_for: Some(RESULTS_READY.to_string()),
        });

        match Url::parse(LINK_BASE) {
            Ok(base) => plan.with_link_base(base),
            Err(_) => plan,
        }
    }

    fn header(&self, doc: &Document) -> PropertyHeader {
        // The heading holds the building name and, on a second line, the street.
        let (name, street) = match doc.select_first(".cbre-c-pd-header-address-heading") {
            Some(heading) => {
                let mut lines = text_lines(heading).into_iter();
                (lines.next(), lines.next())
            }
            None => (None, None),
        };

        PropertyHeader {
            name,
            street,
            locality: doc.text_of(".cbre-c-pd-header-address-subheading"),
        }
    }

    fn layouts(&self) -> Vec<LayoutAttempt> {
        vec![
            LayoutAttempt {
                name: "spaces-available",
                parse: spaces_available,
            },
            LayoutAttempt {
                name: "summary",
                parse: summary,
            },
        ]
    }
}

fn last_page(doc: &Document) -> bool {
    has_class(doc, "li.cbre-c-pl-pager__next", "cbre-c-pl-pager__disabled")
}

fn spaces_available(doc: &Document) -> Vec<UnitFields> {
    doc.select(".cbre-c-pd-spacesAvailable__mainContent")
        .into_iter()
        .filter_map(|row| {
            let name = text_in(row, ".cbre-c-pd-spacesAvailable__name")?;
            let areas = select_in(row, ".cbre-c-pd-spacesAvailable__areaTypeItem");
            let size = areas.first().map(|el| node_text(*el))?;
            Some(UnitFields::new(
                Some(name),
                non_empty(size),
                text_in(row, ".cbre-c-pd-spacesAvailable__price"),
            ))
        })
        .collect()
}

/// Single-unit properties only show totals in the size and pricing panels.
fn summary(doc: &Document) -> Vec<UnitFields> {
    let space_blocks =
        doc.select(".cbre-c-pd-sizeSection__content .cbre-c-pd-sizeSection__spaceInfo");
    let space = labeled_value(
        &space_blocks,
        ".cbre-c-pd-sizeSection__spaceInfoHeading",
        ".cbre-c-pd-sizeSection__spaceInfoText",
        "Total Space Available",
    );

    let price_blocks = doc.select(
        ".cbre-c-pd-pricingInformation__content .cbre-c-pd-pricingInformation__priceInfo",
    );
    let price = labeled_value(
        &price_blocks,
        ".cbre-c-pd-pricingInformation__priceInfoHeading",
        ".cbre-c-pd-pricingInformation__priceInfoText",
        "Lease Rate",
    );

    if space.is_none() && price.is_none() {
        return Vec::new();
    }
    vec![UnitFields::new(None, space, price)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::extract_records;
    use crate::model::MISSING_FLOOR;
    use harvest_scanner::{ListingUrl, RenderedPage};

    fn url() -> ListingUrl {
        ListingUrl::parse("https://www.cbre.com/properties/US-SMPL-42").unwrap()
    }

    const HEADER: &str = r#"
        <h1 class="cbre-c-pd-header-address-heading">Congress Plaza
            <br>111 Congress Ave</h1>
        <p class="cbre-c-pd-header-address-subheading">Austin, TX 78701</p>"#;

    #[test]
    fn test_spaces_available_rows() {
        let markup = format!(
            r#"{HEADER}
            <div class="cbre-c-pd-spacesAvailable__mainContent">
              <span class="cbre-c-pd-spacesAvailable__name">Suite 400</span>
              <span class="cbre-c-pd-spacesAvailable__areaTypeItem">3,500 SF</span>
              <span class="cbre-c-pd-spacesAvailable__areaTypeItem">Office</span>
              <span class="cbre-c-pd-spacesAvailable__price">$38.00 /SF/YR</span>
            </div>
            <div class="cbre-c-pd-spacesAvailable__mainContent">
              <span class="cbre-c-pd-spacesAvailable__name">Suite 900</span>
              <span class="cbre-c-pd-spacesAvailable__areaTypeItem">7,250 SF</span>
            </div>"#
        );

        let extraction = extract_records(&Cbre, &markup, &url());

        assert_eq!(extraction.layout, Some("spaces-available"));
        let records = extraction.records;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].property_name, "Congress Plaza");
        assert_eq!(records[0].address, "111 Congress Ave, Austin, TX 78701");
        assert_eq!(records[0].floor_or_suite, "Suite 400");
        assert_eq!(records[0].space_available, "3,500 SF");
        assert_eq!(records[0].price, "$38.00 /SF/YR");
        assert_eq!(records[1].price, "Contact for pricing");
    }

    #[test]
    fn test_summary_fallback() {
        let markup = format!(
            r#"{HEADER}
            <div class="cbre-c-pd-sizeSection__content">
              <div class="cbre-c-pd-sizeSection__spaceInfo">
                <span class="cbre-c-pd-sizeSection__spaceInfoHeading">Building Size</span>
                <span class="cbre-c-pd-sizeSection__spaceInfoText">80,000 SF</span>
              </div>
              <div class="cbre-c-pd-sizeSection__spaceInfo">
                <span class="cbre-c-pd-sizeSection__spaceInfoHeading">Total Space Available</span>
                <span class="cbre-c-pd-sizeSection__spaceInfoText">1,200 SF</span>
              </div>
            </div>
            <div class="cbre-c-pd-pricingInformation__content">
              <div class="cbre-c-pd-pricingInformation__priceInfo">
                <span class="cbre-c-pd-pricingInformation__priceInfoHeading">Lease Rate</span>
                <span class="cbre-c-pd-pricingInformation__priceInfoText">$24/SF</span>
              </div>
            </div>"#
        );

        let extraction = extract_records(&Cbre, &markup, &url());

        assert_eq!(extraction.layout, Some("summary"));
        assert_eq!(extraction.records.len(), 1);
        let record = &extraction.records[0];
        assert_eq!(record.space_available, "1,200 SF");
        assert_eq!(record.price, "$24/SF");
        assert_eq!(record.floor_or_suite, MISSING_FLOOR);
    }

    #[test]
    fn test_end_of_results() {
        let plan = Cbre.discovery_plan();
        assert!((plan.end)(
            r#"<li class="cbre-c-pl-pager__next cbre-c-pl-pager__disabled">Next</li>"#
        ));
        assert!(!(plan.end)(r#"<li class="cbre-c-pl-pager__next">Next</li>"#));
    }

    #[test]
    fn test_relative_links_resolve_against_cbre() {
        let plan = Cbre.discovery_plan();
        let page = RenderedPage {
            url: SEARCH_URL.to_string(),
            markup: r#"<a href="/properties/properties-for-lease/office/details/US-SMPL-77/plaza">x</a>
                       <a href="/properties/sold">y</a>"#
                .to_string(),
            links: Vec::new(),
            script_result: None,
        };

        let links: Vec<String> = plan.page_links(&page).iter().map(|u| u.to_string()).collect();
        assert_eq!(
            links,
            vec!["https://www.cbre.com/properties/properties-for-lease/office/details/US-SMPL-77/plaza"]
        );
    }
}
