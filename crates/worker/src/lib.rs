//! Message pipeline and background sweeps for the bridge.
//!
//! - Change detection against the last written value
//! - Topic discovery (catch-all subscription)
//! - Retention sweeps
//! - The event loop tying bus events to storage

pub mod change;
pub mod discovery;
pub mod pipeline;
pub mod retention;
pub mod scheduler;

pub use change::ChangeDetector;
pub use discovery::DiscoveryTracker;
pub use pipeline::*;
pub use retention::*;
pub use scheduler::*;
