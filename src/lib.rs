//! iter-dns - iterative DNS resolver core
//!
//! This crate provides the concurrent heart of an iterative resolver:
//!
//! - A sharded in-memory record cache with per-shard reader/writer
//!   locking, seeded hashing against hash-flooding, and lazy TTL expiry
//! - An iterative resolution engine that walks delegations from the
//!   best cached nameserver down to an answer, caching everything it
//!   learns along the way
//! - A per-nameserver communication registry that builds exactly one
//!   request multiplexer per remote server, on demand, behind a
//!   pluggable [`Connect`] seam
//!
//! Wire formats and record types come from `hickory-proto`; the crate
//! treats record data as opaque values and interprets only A and NS
//! records while resolving.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use hickory_proto::rr::RecordType;
//! use iter_dns::{Resolver, UdpConnector};
//!
//! # async fn example() -> iter_dns::Result<()> {
//! let resolver = Resolver::new(Arc::new(UdpConnector::new()))?;
//!
//! let answers = resolver.query_lookup("example.com", RecordType::A).await;
//! for answer in &answers {
//!     println!("{} -> {:?}", answer.name, answer.data);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Tests install [`transport::mock::MockConnector`] instead of the UDP
//! connector and script each nameserver's replies.

mod cache;
mod comm;
mod config;
pub mod error;
mod resolver;
pub mod transport;

pub use cache::{normalize_name, CacheEntry, RecordCache};
pub use comm::{Connect, ServerComm, ServerRegistry, ServerRequest, REQUEST_QUEUE_DEPTH};
pub use config::ResolverConfig;
pub use error::{Error, Result};
pub use resolver::{Answer, Resolver};
pub use transport::UdpConnector;
