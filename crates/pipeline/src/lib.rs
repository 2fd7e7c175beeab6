pub mod backends;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod plan;
pub mod provider;
pub mod session;
pub mod vad;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::{SessionConfig, VadSettings};
pub use error::{BackendError, DispatchError, PipelineError, SessionError};
pub use pipeline::{SegmentInput, SegmentResult, StageLatency, run_segment};
pub use plan::{Plan, PlanStore, load_plans};
pub use provider::{ProviderManager, Stage};
pub use session::{AudioChunk, ConfigUpdate, HybridSession, PartialTranscript, ProcessingMode, SessionEvent};
