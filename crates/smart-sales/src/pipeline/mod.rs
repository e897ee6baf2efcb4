//! Scrubbing pipeline orchestration.
//!
//! [`ScrubbingPipeline`] cleans one entity's dataset. The [`stages`] module
//! chains preparation, warehouse load, cubing and analysis over the files
//! of a [`PipelineConfig`](crate::config::PipelineConfig).

mod builder;
pub mod stages;

pub use builder::{ScrubbingPipeline, ScrubbingPipelineBuilder};
pub use stages::PreparedData;
