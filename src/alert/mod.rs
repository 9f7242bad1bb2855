//! Alert state machine
//!
//! Turns decoded sensor events into the display state consumed by the
//! presentation layer.

pub mod state_machine;

pub use state_machine::{
    transition, AlertStateMachine, DisplayState, Severity, SeverityTransition, StateChange,
};
