// Include handlers module directly from handlers.rs
#[path = "handlers.rs"]
pub mod handlers;

pub use handlers::{
    RunOverrides, apply_overrides, build_render_client, build_sink, list_sites, load_config,
    select_strategies,
};
