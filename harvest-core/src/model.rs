use chrono::{DateTime, Utc};
use harvest_scanner::ListingUrl;
use serde::{Deserialize, Serialize};

pub const MISSING_FLOOR: &str = "N/A";
pub const MISSING_SPACE: &str = "Contact for Details";
pub const MISSING_PRICE: &str = "Contact for pricing";
pub const MISSING_TEXT: &str = "N/A";

/// One leasable unit of one property, as observed at `observed_at`.
///
/// `listing_url` is always the property's own detail page, even when the
/// fields were read from an embedded frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitRecord {
    pub property_name: String,
    pub address: String,
    pub listing_url: ListingUrl,
    #[serde(rename = "floor_suite")]
    pub floor_or_suite: String,
    pub space_available: String,
    pub price: String,
    #[serde(rename = "updated_at")]
    pub observed_at: DateTime<Utc>,
}

impl UnitRecord {
    /// True when the record carries no unit data at all.
    pub fn is_placeholder(&self) -> bool {
        self.floor_or_suite == MISSING_FLOOR
            && self.space_available == MISSING_SPACE
            && self.price == MISSING_PRICE
    }

    /// Compare everything except the observation time.
    pub fn same_listing_data(&self, other: &UnitRecord) -> bool {
        self.property_name == other.property_name
            && self.address == other.address
            && self.listing_url == other.listing_url
            && self.floor_or_suite == other.floor_or_suite
            && self.space_available == other.space_available
            && self.price == other.price
    }
}
