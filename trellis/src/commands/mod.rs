//! Top-level control flow driving the subsystems

pub mod run;
