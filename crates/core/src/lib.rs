//! Core types, value extraction, and coercion for the MQTT to SQL bridge.

pub mod error;
pub mod retention;
pub mod topic;
pub mod value;

pub use error::{Error, ErrorEvent, FatalErrorCode, Result};
pub use retention::*;
pub use topic::*;
pub use value::{floats_equivalent, SampleValue, ValueQuery};
