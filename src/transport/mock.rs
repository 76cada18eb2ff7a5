//! Scripted mock connector for testing
//!
//! [`MockConnector`] plays the role of any number of remote
//! nameservers: each scripted address answers queries from a closure,
//! optionally after a delay to simulate a slow or dead server. It also
//! records every `connect` call so tests can assert that the registry
//! reuses multiplexers instead of reconnecting.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use hickory_proto::op::Message;
use hickory_proto::rr::RecordType;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::comm::{Connect, ServerComm, ServerRequest, REQUEST_QUEUE_DEPTH};

type Responder = dyn Fn(&str, RecordType) -> Option<Message> + Send + Sync;

struct MockServer {
    delay: Duration,
    respond: Arc<Responder>,
}

/// Scripted [`Connect`] implementation.
///
/// Addresses without a script accept requests but never reply, which is
/// how an unreachable nameserver looks to the resolver.
#[derive(Default)]
pub struct MockConnector {
    servers: Mutex<HashMap<IpAddr, MockServer>>,
    connects: Mutex<HashMap<IpAddr, usize>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script `addr` to answer queries with `respond`. Returning `None`
    /// drops the request, like a server that swallows the query.
    pub fn script<F>(&self, addr: IpAddr, respond: F)
    where
        F: Fn(&str, RecordType) -> Option<Message> + Send + Sync + 'static,
    {
        self.script_with_delay(addr, Duration::ZERO, respond);
    }

    /// Script `addr` to answer after `delay`.
    pub fn script_with_delay<F>(&self, addr: IpAddr, delay: Duration, respond: F)
    where
        F: Fn(&str, RecordType) -> Option<Message> + Send + Sync + 'static,
    {
        self.servers.lock().insert(
            addr,
            MockServer {
                delay,
                respond: Arc::new(respond),
            },
        );
    }

    /// How many times `connect` ran for `addr`.
    pub fn connect_count(&self, addr: IpAddr) -> usize {
        self.connects.lock().get(&addr).copied().unwrap_or(0)
    }

    /// Total `connect` invocations across all addresses.
    pub fn total_connects(&self) -> usize {
        self.connects.lock().values().sum()
    }
}

impl Connect for MockConnector {
    fn connect(&self, addr: IpAddr) -> ServerComm {
        *self.connects.lock().entry(addr).or_insert(0) += 1;

        let script = self
            .servers
            .lock()
            .get(&addr)
            .map(|server| (server.delay, server.respond.clone()));

        let (tx, mut rx) = mpsc::channel::<ServerRequest>(REQUEST_QUEUE_DEPTH);
        tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                let Some((delay, respond)) = &script else {
                    // Unscripted server: swallow the query.
                    continue;
                };
                if !delay.is_zero() {
                    tokio::time::sleep(*delay).await;
                }
                if let Some(message) = respond(&request.name, request.qtype) {
                    let _ = request.response.send(message);
                }
            }
        });

        ServerComm {
            remote: addr,
            requests: tx,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_scripted_server_replies() {
        let mock = MockConnector::new();
        let addr = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1));
        mock.script(addr, |_, _| Some(Message::new()));

        let comm = mock.connect(addr);
        let (tx, rx) = oneshot::channel();
        comm.requests
            .send(ServerRequest {
                name: "example.com".into(),
                qtype: RecordType::A,
                response: tx,
            })
            .await
            .unwrap();

        assert!(rx.await.is_ok());
        assert_eq!(mock.connect_count(addr), 1);
    }

    #[tokio::test]
    async fn test_unscripted_server_never_replies() {
        let mock = MockConnector::new();
        let addr = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 9));

        let comm = mock.connect(addr);
        let (tx, rx) = oneshot::channel();
        comm.requests
            .send(ServerRequest {
                name: "example.com".into(),
                qtype: RecordType::A,
                response: tx,
            })
            .await
            .unwrap();

        // The request is swallowed, so the reply side closes unanswered.
        assert!(rx.await.is_err());
    }
}
