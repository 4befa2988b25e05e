// Library interface for pitwall
// This allows integration tests and benches to access internal modules

pub mod engine;
pub mod errors;
pub mod live;
pub mod telemetry;

// Re-export commonly used types
pub use engine::{AxisExtent, SessionState, SharedSession, WindowMode, WindowSnapshot};
pub use errors::PitwallError;
pub use telemetry::{Frame, Sample, StreamEvent, StreamMessage};
