//! End-to-end tests driving the full command surface
//!
//! Each scenario builds a real workspace under a temp directory, runs the
//! driver the way the binary would, and inspects workspace and storage
//! state afterwards.

pub mod helpers;

mod cross_agent;
mod exports;
mod pipeline;
mod resume;
mod tamper;
mod tokens;
mod triggers;
