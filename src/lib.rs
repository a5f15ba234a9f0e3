//! KAIROS: two-tier betting market signal scanner
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod ingest;
pub mod signals;
pub mod llm;
pub mod engine;
