//! Transports behind the [`Connect`] seam
//!
//! The resolver core never touches sockets; it only submits requests to
//! whatever multiplexer the installed [`Connect`] implementation built.
//! This module provides the production UDP implementation, and [`mock`]
//! a scripted one for tests.

pub mod mock;

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use hickory_proto::op::{Message, MessageType, OpCode, Query};
use hickory_proto::rr::{Name, RecordType};
use rand::Rng;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

use crate::comm::{Connect, ServerComm, ServerRequest, REQUEST_QUEUE_DEPTH};
use crate::error::{Error, Result};

/// Wire-level timeout for a single exchange. The resolver applies its
/// own, shorter per-nameserver wait; this one only bounds the pump task
/// so an abandoned request cannot stall its queue forever.
const EXCHANGE_TIMEOUT: Duration = Duration::from_secs(5);

/// Maximum UDP DNS response size
const MAX_UDP_RESPONSE_SIZE: usize = 4096;

/// `Connect` implementation speaking plain UDP DNS.
///
/// Each connected server gets one pump task that drains its request
/// queue and performs the wire exchanges one at a time, so all traffic
/// to a given server is serialized through its multiplexer.
pub struct UdpConnector {
    port: u16,
}

impl UdpConnector {
    /// Connector targeting the standard DNS port.
    pub fn new() -> Self {
        Self { port: 53 }
    }

    /// Connector targeting a nonstandard port, for local test servers.
    pub fn with_port(port: u16) -> Self {
        Self { port }
    }
}

impl Default for UdpConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl Connect for UdpConnector {
    fn connect(&self, addr: IpAddr) -> ServerComm {
        let (tx, rx) = mpsc::channel(REQUEST_QUEUE_DEPTH);
        tokio::spawn(pump(SocketAddr::new(addr, self.port), rx));
        ServerComm {
            remote: addr,
            requests: tx,
        }
    }
}

async fn pump(remote: SocketAddr, mut requests: mpsc::Receiver<ServerRequest>) {
    while let Some(request) = requests.recv().await {
        match exchange(remote, &request.name, request.qtype).await {
            Ok(message) => {
                // The waiter may have timed out and gone away by now.
                let _ = request.response.send(message);
            }
            Err(e) => {
                log::debug!("query to {} for {} failed: {}", remote, request.name, e);
            }
        }
    }
    log::debug!("request queue for {} closed, pump exiting", remote);
}

/// Perform one query/response round trip over a fresh UDP socket.
async fn exchange(remote: SocketAddr, name: &str, qtype: RecordType) -> Result<Message> {
    let qname = Name::from_ascii(name)
        .map_err(|e| Error::Transport(format!("invalid query name '{}': {}", name, e)))?;

    let id: u16 = rand::rng().random();
    let mut query = Message::new();
    query.set_id(id);
    query.set_message_type(MessageType::Query);
    query.set_op_code(OpCode::Query);
    query.set_recursion_desired(false);
    query.add_query(Query::query(qname, qtype));
    let wire = query
        .to_vec()
        .map_err(|e| Error::Transport(format!("failed to encode query: {}", e)))?;

    let bind: SocketAddr = if remote.is_ipv6() {
        (IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0).into()
    } else {
        (IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0).into()
    };
    let socket = UdpSocket::bind(bind).await?;
    socket.send_to(&wire, remote).await?;

    let mut buf = vec![0u8; MAX_UDP_RESPONSE_SIZE];
    let deadline = tokio::time::Instant::now() + EXCHANGE_TIMEOUT;
    loop {
        let (len, _) = tokio::time::timeout_at(deadline, socket.recv_from(&mut buf))
            .await
            .map_err(|_| Error::Transport(format!("query to {} timed out", remote)))??;
        let message = Message::from_vec(&buf[..len])
            .map_err(|e| Error::Transport(format!("invalid response from {}: {}", remote, e)))?;
        if message.id() == id {
            return Ok(message);
        }
        // Mismatched id: not ours, keep reading until the deadline.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hickory_proto::rr::rdata::A;
    use hickory_proto::rr::{RData, Record};
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_udp_round_trip() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = server.local_addr().unwrap().port();

        tokio::spawn(async move {
            let mut buf = vec![0u8; 512];
            let (len, src) = server.recv_from(&mut buf).await.unwrap();
            let query = Message::from_vec(&buf[..len]).unwrap();

            let mut reply = Message::new();
            reply.set_id(query.id());
            reply.set_message_type(MessageType::Response);
            reply.set_op_code(OpCode::Query);
            if let Some(q) = query.queries().first() {
                reply.add_query(q.clone());
                reply.add_answer(Record::from_rdata(
                    q.name().clone(),
                    60,
                    RData::A(A(Ipv4Addr::new(1, 2, 3, 4))),
                ));
            }
            let wire = reply.to_vec().unwrap();
            server.send_to(&wire, src).await.unwrap();
        });

        let connector = UdpConnector::with_port(port);
        let comm = connector.connect(IpAddr::V4(Ipv4Addr::LOCALHOST));

        let (tx, rx) = oneshot::channel();
        comm.requests
            .send(ServerRequest {
                name: "example.com".into(),
                qtype: RecordType::A,
                response: tx,
            })
            .await
            .unwrap();

        let message = rx.await.unwrap();
        assert_eq!(message.answers().len(), 1);
        assert_eq!(message.answers()[0].record_type(), RecordType::A);
    }
}
