//! HTTP surface of the gateway

mod server;
mod signals;
pub mod types;

pub use server::{router, run, AppState};
