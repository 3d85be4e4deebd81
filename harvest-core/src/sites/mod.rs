//! Per-site discovery plans and page layouts.

pub mod buildout;
pub mod cbre;
pub mod cushman;
pub mod jll;
pub mod landpark;
pub mod lee;
pub mod trinity;

use crate::extract::SiteStrategy;
use crate::markup::Document;
use harvest_scanner::{EndPredicate, LinkPredicate, ListingUrl};
use std::collections::BTreeMap;
use std::sync::Arc;

pub use cbre::Cbre;
pub use cushman::Cushman;
pub use jll::Jll;
pub use landpark::Landpark;
pub use lee::LeeAssociates;
pub use trinity::TrinityPartners;

/// Strategies by id.
#[derive(Default, Clone)]
pub struct StrategyRegistry {
    strategies: BTreeMap<&'static str, Arc<dyn SiteStrategy>>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every built-in site.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(Cbre));
        registry.register(Arc::new(Cushman));
        registry.register(Arc::new(Jll));
        registry.register(Arc::new(Landpark));
        registry.register(Arc::new(LeeAssociates));
        registry.register(Arc::new(TrinityPartners));
        registry
    }

    /// Adds a strategy, replacing any previous one with the same id.
    pub fn register(&mut self, strategy: Arc<dyn SiteStrategy>) {
        self.strategies.insert(strategy.id(), strategy);
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn SiteStrategy>> {
        self.strategies.get(id).cloned()
    }

    pub fn ids(&self) -> Vec<&'static str> {
        self.strategies.keys().copied().collect()
    }

    pub fn all(&self) -> Vec<Arc<dyn SiteStrategy>> {
        self.strategies.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

/// Script that just lets client-side rendering settle.
pub(crate) fn settle(ms: u64) -> String {
    format!("await new Promise(r => setTimeout(r, {}));", ms)
}

/// Links whose URL contains `marker`.
pub(crate) fn marker_links(marker: &'static str) -> LinkPredicate {
    Arc::new(move |url: &ListingUrl| url.contains(marker))
}

/// End predicate over the parsed page.
pub(crate) fn end_when(check: fn(&Document) -> bool) -> EndPredicate {
    Arc::new(move |markup: &str| check(&Document::parse(markup)))
}

/// True when the first element matching `css` carries `class`.
pub(crate) fn has_class(doc: &Document, css: &str, class: &str) -> bool {
    doc.select_first(css)
        .map(|el| el.value().classes().any(|c| c == class))
        .unwrap_or(false)
}
