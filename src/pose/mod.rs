pub mod adapter;
pub mod backend;
pub mod landmark;
pub mod phase;

#[cfg(feature = "movenet")]
pub mod movenet;

pub use adapter::{FrameAnalysis, PoseDataAdapter};
pub use backend::PoseBackend;
pub use landmark::{Landmark, LandmarkFrame, LandmarkIndex};
pub use phase::{SwingPhase, SwingPhaseMap};

#[cfg(feature = "movenet")]
pub use movenet::MoveNetBackend;
