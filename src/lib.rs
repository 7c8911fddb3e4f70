pub mod config;
pub mod models;
pub mod pipeline;
pub mod pipeline_config;

pub use pipeline::processor::{
    build_pipeline, build_pipeline_async, parse_document_type, DocumentInput, Pipeline, PipelineError,
};
pub use pipeline_config::PipelineConfig;

use tracing_subscriber::EnvFilter;

/// Install the fmt subscriber. `RUST_LOG` wins over the default filter.
///
/// Safe to call more than once; later calls leave the first subscriber in place.
pub fn init_tracing() {
    let installed = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init()
        .is_ok();

    if installed {
        tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);
    }
}
