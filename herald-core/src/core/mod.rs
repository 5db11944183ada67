//! Core alerting types
//!
//! - `Value` / `Fields`: closed value model for event and alert data
//! - `AlertEvent`: inbound signal from a producer
//! - `Alert`: outbound record created when a rule fires
//! - `AlertError` / `DeliveryError`: error taxonomy

pub mod errors;
pub mod types;
pub mod value;

pub use errors::{AlertError, DeliveryError, EngineState, EntityKind, QueueKind, Result};
pub use types::{Alert, AlertEvent, AlertSeverity};
pub use value::{Fields, Value};
