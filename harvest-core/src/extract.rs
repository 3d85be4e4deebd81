//! Turning a rendered detail page into unit records.
//!
//! Each site declares an ordered list of page layouts. The first layout that
//! yields at least one unit is used for the whole page. A page where no
//! layout matches still produces exactly one record, filled with placeholders,
//! so every fetched property appears in the output.

use crate::markup::Document;
use crate::model::{MISSING_FLOOR, MISSING_PRICE, MISSING_SPACE, MISSING_TEXT, UnitRecord};
use chrono::{DateTime, Utc};
use harvest_scanner::{DiscoveryPlan, FetchConfig, ListingUrl};
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyHeader {
    pub name: Option<String>,
    pub street: Option<String>,
    pub locality: Option<String>,
}

impl PropertyHeader {
    /// `street, locality` when both exist, else whichever does.
    pub fn address(&self) -> Option<String> {
        match (&self.street, &self.locality) {
            (Some(street), Some(locality)) => Some(format!("{}, {}", street, locality)),
            (Some(only), None) | (None, Some(only)) => Some(only.clone()),
            (None, None) => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnitFields {
    pub floor_or_suite: Option<String>,
    pub space_available: Option<String>,
    pub price: Option<String>,
}

impl UnitFields {
    pub fn new(
        floor_or_suite: Option<String>,
        space_available: Option<String>,
        price: Option<String>,
    ) -> Self {
        Self {
            floor_or_suite,
            space_available,
            price,
        }
    }
}

/// One way a site lays out its units.
#[derive(Clone, Copy)]
pub struct LayoutAttempt {
    pub name: &'static str,
    pub parse: fn(&Document) -> Vec<UnitFields>,
}

impl std::fmt::Debug for LayoutAttempt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayoutAttempt").field("name", &self.name).finish()
    }
}

/// Everything the pipeline needs to know about one listing site.
pub trait SiteStrategy: Send + Sync {
    /// Short stable identifier, used on the command line and in file names.
    fn id(&self) -> &'static str;

    fn display_name(&self) -> &'static str;

    fn discovery_plan(&self) -> DiscoveryPlan;

    /// How discovered property pages are fetched.
    fn fetch_config(&self) -> FetchConfig {
        FetchConfig::default()
    }

    fn header(&self, doc: &Document) -> PropertyHeader;

    fn layouts(&self) -> Vec<LayoutAttempt>;

    /// Sites whose unit data lives in a separate document embedded in the
    /// property page.
    fn requires_resolution(&self) -> bool {
        false
    }

    /// Locate the document holding the unit data, given the property page.
    fn resolve_detail_url(&self, _markup: &str, _page_url: &ListingUrl) -> Option<ListingUrl> {
        None
    }

    /// How resolved detail documents are fetched.
    fn detail_fetch_config(&self) -> FetchConfig {
        self.fetch_config()
    }
}

#[derive(Debug, Clone)]
pub struct Extraction {
    pub records: Vec<UnitRecord>,
    /// Layout that produced the units; `None` when the placeholder was used.
    pub layout: Option<&'static str>,
}

impl Extraction {
    pub fn is_gap(&self) -> bool {
        self.layout.is_none()
    }
}

pub fn extract_records(
    strategy: &dyn SiteStrategy,
    markup: &str,
    source_url: &ListingUrl,
) -> Extraction {
    extract_records_at(strategy, markup, source_url, Utc::now())
}

/// Deterministic in everything but `observed_at`, which is stamped on every
/// record.
pub fn extract_records_at(
    strategy: &dyn SiteStrategy,
    markup: &str,
    source_url: &ListingUrl,
    observed_at: DateTime<Utc>,
) -> Extraction {
    let doc = Document::parse(markup);
    let header = strategy.header(&doc);

    let address = header.address();
    let property_name = header
        .name
        .clone()
        .or_else(|| address.clone())
        .unwrap_or_else(|| MISSING_TEXT.to_string());
    let address = address.unwrap_or_else(|| MISSING_TEXT.to_string());

    let record = |unit: UnitFields| UnitRecord {
        property_name: property_name.clone(),
        address: address.clone(),
        listing_url: source_url.clone(),
        floor_or_suite: unit.floor_or_suite.unwrap_or_else(|| MISSING_FLOOR.to_string()),
        space_available: unit.space_available.unwrap_or_else(|| MISSING_SPACE.to_string()),
        price: unit.price.unwrap_or_else(|| MISSING_PRICE.to_string()),
        observed_at,
    };

    for layout in strategy.layouts() {
        let units = (layout.parse)(&doc);
        if !units.is_empty() {
            debug!(
                "{}: {} units via '{}' layout on {}",
                strategy.id(),
                units.len(),
                layout.name,
                source_url
            );
            return Extraction {
                records: units.into_iter().map(&record).collect(),
                layout: Some(layout.name),
            };
        }
    }

    debug!("{}: no unit layout matched on {}", strategy.id(), source_url);
    Extraction {
        records: vec![record(UnitFields::default())],
        layout: None,
    }
}
