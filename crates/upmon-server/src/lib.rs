//! HTTP surface and background sweep for the monitor status engine.
//!
//! The server wires the pure engine to its collaborators: a SQLite unit
//! repository, an HTTP prober, and alert sinks. All writes funnel through
//! [`dispatch::EventDispatcher`], which owns the read, apply, save, retry
//! loop around the optimistic version check.

pub mod alert;
pub mod api;
pub mod app;
pub mod config;
pub mod dispatch;
pub mod state;
pub mod sweep;

#[cfg(test)]
mod tests;
