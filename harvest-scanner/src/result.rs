use crate::listing::ListingUrl;
use serde::{Deserialize, Serialize};

/// What the dispatcher produced for one submitted URL. Exactly one per URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FetchOutcome {
    Success {
        url: ListingUrl,
        markup: String,
        links: Vec<String>,
    },
    Failure {
        url: ListingUrl,
        reason: String,
    },
}

impl FetchOutcome {
    pub fn success(url: ListingUrl, markup: String, links: Vec<String>) -> Self {
        FetchOutcome::Success { url, markup, links }
    }

    pub fn failure(url: ListingUrl, reason: impl Into<String>) -> Self {
        FetchOutcome::Failure {
            url,
            reason: reason.into(),
        }
    }

    pub fn url(&self) -> &ListingUrl {
        match self {
            FetchOutcome::Success { url, .. } | FetchOutcome::Failure { url, .. } => url,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, FetchOutcome::Success { .. })
    }
}
