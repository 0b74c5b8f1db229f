//! In-process datagram link with simulated latency, jitter, and loss.
//!
//! Two [`LinkEndpoint`]s created by [`link_pair`] exchange opaque byte
//! payloads. Time is supplied by the caller so runs are reproducible for a
//! given seed.

pub mod link;

pub use link::{LinkConfig, LinkEndpoint, LinkError, LinkStats, Reliability, link_pair};
