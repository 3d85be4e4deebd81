pub mod dispatcher;
pub mod error;
pub mod http_client;
pub mod listing;
pub mod navigator;
pub mod pressure;
pub mod remote_client;
pub mod render;
pub mod result;

pub use dispatcher::{Dispatcher, DispatcherBudget, FetchConfig};
pub use error::{Result, ScanError};
pub use http_client::HttpRenderClient;
pub use listing::ListingUrl;
pub use navigator::{
    Advance, Discovery, DiscoveryPlan, EndPredicate, Entry, LinkPredicate, PageCallback,
    SessionNavigator, SessionState, Termination,
};
pub use pressure::{MemoryPressure, NoPressure, PressureGauge};
pub use remote_client::RemoteRenderClient;
pub use render::{RenderClient, RenderRequest, RenderedPage};
pub use result::FetchOutcome;
