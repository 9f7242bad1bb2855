//! Connection supervisor
//!
//! - [`transitions`] - `ConnectionState` and the pure transition function
//! - [`backoff`] - reconnect delay policy
//! - [`lifecycle`] - the worker that owns the broker session

pub mod backoff;
pub mod lifecycle;
pub mod transitions;

pub use backoff::{Backoff, BackoffPolicy};
pub use lifecycle::{report_configuration_error, Supervisor, SupervisorHandle, SHUTDOWN_GRACE};
pub use transitions::{next_state, ConnectionEvent, ConnectionState, Transition};
