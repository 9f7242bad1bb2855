//! Testing utilities and mock implementations
//!
//! Lets the supervisor run against scripted transports without a broker.

pub mod mocks;

pub use mocks::*;
