//! Airnalyzer bridge - serial sensor ingestion and real-time distribution.
//!
//! One dedicated thread owns the serial link (discovery, reads, reconnects)
//! and feeds the shared `BridgeContext`; the HTTP side only reads from it.

pub mod classifier;
pub mod config;
pub mod discovery;
pub mod health;
pub mod http;
pub mod hub;
pub mod ingest;
pub mod models;
pub mod parser;
pub mod predict;
pub mod raw_buffer;
pub mod snapshot;
pub mod state;
pub mod transport;

pub use state::BridgeContext;
