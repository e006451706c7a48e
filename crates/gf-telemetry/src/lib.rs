//! Logging and tracing setup for GhostFlow binaries and services.
//!
//! - **Logging**: human-readable or JSON output via `tracing-subscriber`,
//!   selected from the `[general]` config section.
//! - **Tracing**: OpenTelemetry-shaped trace/span ids and named spans that
//!   correlate every event of one phase execution.

pub mod logging;
pub mod tracing_setup;
