pub mod config;
pub mod data;
pub mod extract;
pub mod markup;
pub mod model;
pub mod pipeline;
pub mod report;
pub mod sink;
pub mod sites;

pub use extract::{
    Extraction, LayoutAttempt, PropertyHeader, SiteStrategy, UnitFields, extract_records,
    extract_records_at,
};
pub use model::UnitRecord;
pub use pipeline::{Pipeline, PipelineError, RunStats, SiteReport, SiteRunResult};
pub use sink::{JsonFileSink, RecordSink, SinkError};
pub use sites::StrategyRegistry;
