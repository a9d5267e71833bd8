//! Livedoc Core Library
//!
//! Per-meeting engine that turns screen frames and transcript fragments into
//! living procedure and role-outcomes documents, plus the NDJSON host bridge
//! and telemetry bootstrap used by the `livedoc-core` binary.

pub mod bridge;
pub mod orchestrator;
pub mod telemetry;
