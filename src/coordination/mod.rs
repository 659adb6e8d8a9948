//! Cross-context coordination: envelopes, routing, shared state, and the
//! status broadcast bus

pub mod bus;
pub mod errors;
pub mod messages;
pub mod router;
pub mod state;

pub use bus::{
    BusMetrics, BusMetricsSnapshot, ShutdownReason, StatusBus, StatusEvent, ToastLevel,
};
pub use errors::CoordinationError;
pub use messages::{ContextId, Envelope, Response, kinds};
pub use router::{
    ChannelTransport, MessageHandler, MessageRouter, TAB_REQUEST_TIMEOUT, UI_REQUEST_TIMEOUT,
};
pub use state::{IngestOutcome, RunStatus, StateManager, lock_names};
