//! Per-nameserver communication registry
//!
//! Every remote nameserver gets exactly one long-lived request channel,
//! created on demand through the pluggable [`Connect`] seam and shared
//! by all resolution tasks targeting that server. The registry is
//! sharded the same way as the record cache, with a reader-lock fast
//! path and a double-checked writer-lock slow path so a burst of
//! first-contact queries still connects only once.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use hickory_proto::op::Message;
use hickory_proto::rr::RecordType;
use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot};

use crate::cache::{hash_seed, seeded_index};
use crate::error::{Error, Result};

/// Depth of each multiplexer's request queue. Submission blocks when a
/// server's queue is full.
pub const REQUEST_QUEUE_DEPTH: usize = 64;

/// One outstanding query handed to a server multiplexer.
pub struct ServerRequest {
    /// Normalized query name.
    pub name: String,
    /// Queried record type.
    pub qtype: RecordType,
    /// Reply channel. The waiting side may time out and drop the
    /// receiver; sends to it never block, so the multiplexer can always
    /// deposit a late reply and move on.
    pub response: oneshot::Sender<Message>,
}

/// Handle to the single multiplexer for one remote nameserver.
///
/// The multiplexer behind `requests` drains the queue for the rest of
/// the process lifetime; how it serializes or pipelines exchanges is its
/// own concern.
pub struct ServerComm {
    /// The remote server this channel leads to.
    pub remote: IpAddr,
    /// Queue of pending queries for that server.
    pub requests: mpsc::Sender<ServerRequest>,
}

/// Creates the multiplexer for a remote nameserver.
///
/// Production installs [`UdpConnector`](crate::transport::UdpConnector);
/// tests install [`MockConnector`](crate::transport::mock::MockConnector)
/// with scripted replies. `connect` runs under the registry shard's
/// writer lock and is invoked at most once per distinct address, so it
/// must return without blocking; any real I/O belongs in the task that
/// drains the queue.
pub trait Connect: Send + Sync {
    /// Build the channel for `addr` and start whatever drains it.
    fn connect(&self, addr: IpAddr) -> ServerComm;
}

struct CommShard {
    entries: RwLock<HashMap<IpAddr, Arc<ServerComm>>>,
}

/// Sharded, demand-created table of per-server multiplexers.
///
/// Shard selection hashes the server address with the same process-wide
/// seed the record cache hashes names with.
pub struct ServerRegistry {
    shards: Vec<CommShard>,
    connector: Arc<dyn Connect>,
}

impl ServerRegistry {
    /// Create a registry with `shards` partitions using `connector` for
    /// new servers.
    pub fn new(shards: usize, connector: Arc<dyn Connect>) -> Result<Self> {
        if shards == 0 {
            return Err(Error::Config("registry shard count must be nonzero".into()));
        }

        let shards = (0..shards)
            .map(|_| CommShard {
                entries: RwLock::new(HashMap::new()),
            })
            .collect();

        Ok(Self { shards, connector })
    }

    /// The multiplexer for `addr`, connecting it first if this is the
    /// address's first use. All callers get the same instance.
    pub fn get(&self, addr: IpAddr) -> Arc<ServerComm> {
        let shard = self.shard_for(addr);
        if let Some(comm) = shard.entries.read().get(&addr) {
            return comm.clone();
        }
        self.establish(addr)
    }

    fn establish(&self, addr: IpAddr) -> Arc<ServerComm> {
        let shard = self.shard_for(addr);
        let mut entries = shard.entries.write();

        // Another task may have connected between our reader and writer
        // acquisitions.
        if let Some(comm) = entries.get(&addr) {
            return comm.clone();
        }

        log::debug!("opening channel to nameserver {}", addr);
        let comm = Arc::new(self.connector.connect(addr));
        entries.insert(addr, comm.clone());
        comm
    }

    fn shard_for(&self, addr: IpAddr) -> &CommShard {
        let key = addr.to_string();
        &self.shards[seeded_index(key.as_bytes(), hash_seed(), self.shards.len())]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockConnector;
    use std::net::Ipv4Addr;

    #[test]
    fn test_zero_shards_rejected() {
        assert!(ServerRegistry::new(0, Arc::new(MockConnector::new())).is_err());
    }

    #[tokio::test]
    async fn test_registry_reuses_multiplexer() {
        let mock = Arc::new(MockConnector::new());
        let registry = ServerRegistry::new(4, mock.clone()).unwrap();
        let addr = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1));

        let first = registry.get(addr);
        let second = registry.get(addr);

        assert_eq!(first.remote, addr);
        assert!(first.requests.same_channel(&second.requests));
        assert_eq!(mock.connect_count(addr), 1);
    }

    #[tokio::test]
    async fn test_distinct_addresses_get_distinct_channels() {
        let mock = Arc::new(MockConnector::new());
        let registry = ServerRegistry::new(4, mock.clone()).unwrap();
        let one = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1));
        let two = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 2));

        let first = registry.get(one);
        let second = registry.get(two);

        assert!(!first.requests.same_channel(&second.requests));
        assert_eq!(mock.connect_count(one), 1);
        assert_eq!(mock.connect_count(two), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_get_connects_once() {
        let mock = Arc::new(MockConnector::new());
        let registry = Arc::new(ServerRegistry::new(4, mock.clone()).unwrap());
        let addr = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 3));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                registry.get(addr);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(mock.connect_count(addr), 1);
    }
}
