pub mod pipeline;

pub use pipeline::{ExecutionPipeline, PipelineComponents};
