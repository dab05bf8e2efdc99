//! SSH-signed HTTP client for the Graph Lineage-as-a-Service server
//! (§4.11).

mod client;
mod signing;

pub use client::GlaasClient;
pub use signing::compute_pubkey_fingerprint;
