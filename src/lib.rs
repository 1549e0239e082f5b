//! Library crate for lan-sweep: a concurrent LAN reachability and TCP port
//! scanning engine that streams results to a sink while it runs.
pub mod config;
pub mod engine;
pub mod error;
pub mod export;
pub mod netdetect;
mod pool;
pub mod ports;
pub mod probe;
pub mod resolve;
pub mod scanner;
pub mod server;
pub mod session;
pub mod sink;
pub mod types;
