//! Session orchestration for the detect-once/paint-many workflow.
//!
//! - [`selection`]: which detected walls are selected
//! - [`detection`]: lifecycle of the single detection round trip
//! - [`orchestrator`]: debounced single-flight paint coalescing
//! - [`coordinator`]: owns all of the above for one user session

pub mod coordinator;
pub mod detection;
pub mod orchestrator;
pub mod selection;

pub use coordinator::{DetectionReport, SessionCoordinator, SessionView};
pub use detection::{DetectionSession, DetectionState};
pub use orchestrator::{OrchestratorState, PaintOrchestrator, TriggerKind};
pub use selection::SelectionModel;
