pub mod capabilities;
pub mod pipeline;

pub use capabilities::Capabilities;
pub use pipeline::{CancellationHandle, PipelineOrchestrator};
