//! Application-level orchestration.
//!
//! The controller owns the order registry and per-order polling; UI/CLI layers
//! send it commands and render the snapshots it publishes.

mod controller;
mod poller;

pub(crate) use controller::{run_controller, UiCommand};
