pub mod extractor;
pub mod generator;
pub mod object_store;
pub mod pipeline;
pub mod prompts;
pub mod quality;

pub use pipeline::{GenerationPolicy, IngestionPipeline, StepOutcome};
