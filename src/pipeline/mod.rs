pub mod orchestrator;
pub mod progress;

pub use orchestrator::{AnalysisOutcome, SwingPipeline};
pub use progress::{CancelToken, PipelineState, ProgressEvent};
