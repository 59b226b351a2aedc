//! hybrid-gateway - Hybrid Retrieval Gateway
//!
//! An HTTP service that answers top-K retrieval queries by fanning out to a
//! dense vector index, a lexical index and an optional graph store, fusing
//! their relevance signals, and optionally reranking the head of the list
//! with a cross-encoder.

pub mod backends;
pub mod cli;
pub mod config;
pub mod error;
pub mod http;
pub mod logging;
pub mod prometheus;
pub mod retrieval;
pub mod trust;

pub use error::{GatewayError, Result};
