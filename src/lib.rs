pub mod analysis;
pub mod cache;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod pose;
pub mod telemetry;
pub mod video;

pub use error::{PipelineError, Result};
pub use pipeline::{AnalysisOutcome, CancelToken, SwingPipeline};
