//! Receiver event loop.
//!
//! One socket serves any number of peers. Each peer address gets its own
//! [`ReceiverAdapter`] on its first data datagram; the entry is dropped when
//! the peer sends `fin`. Every data datagram is answered with one ack.
//!
//! A finished peer is remembered for [`FINISHED_LINGER`] so that data
//! retransmitted before its `fin` and arriving afterwards is dropped instead
//! of opening a second stream from offset zero.

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use crate::config::TransportConfig;
use crate::driver::sink::DeliverySink;
use crate::driver::{is_transient, RECV_BUFFER};
use crate::error::Result;
use crate::frame::Frame;
use crate::range::ByteRange;
use crate::receiver::{Delivery, FinishReport, ReceiverAdapter};

/// How long data and `fin` from a finished peer are treated as stale.
pub const FINISHED_LINGER: Duration = Duration::from_secs(30);

/// Cap on remembered finished peers; the oldest is forgotten first.
pub const MAX_FINISHED_PEERS: usize = 1024;

/// Counters accumulated over one `serve` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReceiveReport {
    pub datagrams: u64,
    /// Datagrams that did not decode or were not valid for a receiver.
    pub malformed: u64,
    /// Data messages that decoded but failed validation.
    pub rejected: u64,
    pub bytes_delivered: u64,
    pub streams_finished: u64,
    /// Data datagrams dropped because their peer had already finished.
    pub late_datagrams: u64,
    /// Finished streams that still had undelivered bytes.
    pub incomplete_streams: u64,
    /// Peers still mid-stream when the loop stopped.
    pub open_connections: usize,
}

/// Per-peer state and the sink; everything `serve` needs except the socket.
struct ConnectionTable<S> {
    connections: HashMap<SocketAddr, ReceiverAdapter>,
    /// Finished peers and the instant they may start a new stream.
    finished: HashMap<SocketAddr, Instant>,
    sink: S,
    max_payload: usize,
    report: ReceiveReport,
}

impl<S: DeliverySink> ConnectionTable<S> {
    /// Process one datagram and return the ack to send back, if any.
    fn on_datagram(
        &mut self,
        datagram: &[u8],
        peer: SocketAddr,
        now: Instant,
    ) -> Result<Option<Bytes>> {
        self.report.datagrams += 1;
        let frame = match Frame::decode(datagram) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(%peer, error = %e, "dropping undecodable datagram");
                self.report.malformed += 1;
                return Ok(None);
            }
        };

        match frame {
            Frame::Data { seq, id, payload } => self.on_data(peer, seq, id, payload, now),
            Frame::Fin => {
                self.on_fin(peer, now)?;
                Ok(None)
            }
            other => {
                warn!(%peer, kind = %other.frame_type(), "unexpected message");
                self.report.malformed += 1;
                Ok(None)
            }
        }
    }

    fn on_data(
        &mut self,
        peer: SocketAddr,
        seq: ByteRange,
        id: u64,
        payload: Bytes,
        now: Instant,
    ) -> Result<Option<Bytes>> {
        if self.is_finished(peer, now) {
            debug!(%peer, id, %seq, "dropping data for finished stream");
            self.report.late_datagrams += 1;
            return Ok(None);
        }
        self.finished.remove(&peer);
        let max_payload = self.max_payload;
        let adapter = self.connections.entry(peer).or_insert_with(|| {
            info!(%peer, "new connection");
            ReceiverAdapter::new(max_payload)
        });

        let outcome = match adapter.on_data(seq, payload) {
            Ok(outcome) => outcome,
            Err(e) if e.is_validation() => {
                warn!(%peer, id, error = %e, "rejecting data");
                self.report.rejected += 1;
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        if let Delivery::Delivered(bytes) = &outcome.delivery {
            self.sink.deliver(peer, bytes)?;
            self.report.bytes_delivered += bytes.len() as u64;
        }
        debug!(%peer, id, %seq, pending = outcome.acks.len() - 1, "data");

        let ack = Frame::Ack {
            sacks: outcome.acks,
            id,
        };
        Ok(Some(ack.encode()?))
    }

    fn on_fin(&mut self, peer: SocketAddr, now: Instant) -> Result<()> {
        let report = match self.connections.remove(&peer) {
            Some(adapter) => adapter.on_finish(),
            None if self.is_finished(peer, now) => {
                debug!(%peer, "duplicate fin");
                return Ok(());
            }
            // Empty stream: fin without any data.
            None => FinishReport {
                delivered: 0,
                first_gap: None,
                stranded_bytes: 0,
            },
        };

        if report.is_complete() {
            info!(%peer, bytes = report.delivered, "stream finished");
        } else {
            self.report.incomplete_streams += 1;
            warn!(
                %peer,
                delivered = report.delivered,
                gap = ?report.first_gap,
                stranded = report.stranded_bytes,
                "stream finished with undelivered data"
            );
        }
        self.sink.finish(peer, &report)?;
        self.remember_finished(peer, now);
        self.report.streams_finished += 1;
        Ok(())
    }

    fn is_finished(&self, peer: SocketAddr, now: Instant) -> bool {
        self.finished.get(&peer).is_some_and(|&until| now < until)
    }

    fn remember_finished(&mut self, peer: SocketAddr, now: Instant) {
        self.finished.retain(|_, until| *until > now);
        if self.finished.len() >= MAX_FINISHED_PEERS {
            let oldest = self
                .finished
                .iter()
                .min_by_key(|(_, until)| **until)
                .map(|(addr, _)| *addr);
            if let Some(oldest) = oldest {
                self.finished.remove(&oldest);
            }
        }
        self.finished.insert(peer, now + FINISHED_LINGER);
    }
}

/// A bound receiver serving every peer that sends to its address.
pub struct Receiver<S> {
    socket: UdpSocket,
    table: ConnectionTable<S>,
}

impl<S: DeliverySink> Receiver<S> {
    pub async fn bind(addr: SocketAddr, config: &TransportConfig, sink: S) -> Result<Self> {
        config.validate()?;
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self {
            socket,
            table: ConnectionTable {
                connections: HashMap::new(),
                finished: HashMap::new(),
                sink,
                max_payload: config.chunk_size,
                report: ReceiveReport::default(),
            },
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Serve until `shutdown` completes. Malformed input never stops the
    /// loop; sink failures and socket errors other than ICMP unreachables
    /// do.
    pub async fn serve(self, shutdown: impl Future<Output = ()>) -> Result<ReceiveReport> {
        let Receiver { socket, mut table } = self;
        let mut buf = vec![0u8; RECV_BUFFER];
        tokio::pin!(shutdown);

        info!(addr = ?socket.local_addr().ok(), "receiver listening");

        loop {
            let received = tokio::select! {
                _ = &mut shutdown => break,
                r = socket.recv_from(&mut buf) => r,
            };

            let (len, peer) = match received {
                Ok(r) => r,
                Err(e) if is_transient(&e) => {
                    debug!(error = %e, "peer unreachable");
                    continue;
                }
                Err(e) => {
                    warn!(error = %e, "receive failed");
                    return Err(e.into());
                }
            };

            if let Some(ack) = table.on_datagram(&buf[..len], peer, Instant::now())? {
                if let Err(e) = socket.send_to(&ack, peer).await {
                    debug!(%peer, error = %e, "failed to send ack");
                }
            }
        }

        let mut report = table.report;
        report.open_connections = table.connections.len();
        info!(
            finished = report.streams_finished,
            open = report.open_connections,
            bytes = report.bytes_delivered,
            "receiver stopped"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::sink::MemorySink;

    const FIN: &[u8] = br#"{"type":"fin"}"#;

    fn table() -> (ConnectionTable<MemorySink>, MemorySink) {
        let sink = MemorySink::new();
        let table = ConnectionTable {
            connections: HashMap::new(),
            finished: HashMap::new(),
            sink: sink.clone(),
            max_payload: 1200,
            report: ReceiveReport::default(),
        };
        (table, sink)
    }

    fn data(start: u64, payload: &'static [u8], id: u64) -> Vec<u8> {
        Frame::Data {
            seq: ByteRange::new(start, start + payload.len() as u64).unwrap(),
            id,
            payload: Bytes::from_static(payload),
        }
        .encode()
        .unwrap()
        .to_vec()
    }

    fn peer(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[test]
    fn peers_are_independent() {
        let (mut t, sink) = table();
        let now = Instant::now();
        let (a, b) = (peer(1000), peer(2000));

        t.on_datagram(&data(0, b"aa", 0), a, now).unwrap();
        t.on_datagram(&data(2, b"BB", 0), b, now).unwrap();
        t.on_datagram(&data(0, b"bb", 1), b, now).unwrap();

        assert_eq!(sink.stream(a).unwrap().data, b"aa");
        assert_eq!(sink.stream(b).unwrap().data, b"bbBB");
        assert_eq!(t.connections.len(), 2);
    }

    #[test]
    fn ack_echoes_id_and_ranges() {
        let (mut t, _) = table();
        let ack = t
            .on_datagram(&data(5, b"xyz", 9), peer(1000), Instant::now())
            .unwrap()
            .unwrap();
        let (sacks, id) = Frame::decode_ack(&ack).unwrap();
        assert_eq!(id, 9);
        assert_eq!(sacks, vec![ByteRange::new(0, 0).unwrap(), ByteRange::new(5, 8).unwrap()]);
    }

    #[test]
    fn garbage_and_invalid_data_are_counted_not_fatal() {
        let (mut t, _) = table();
        let now = Instant::now();
        let p = peer(1000);
        assert!(t.on_datagram(b"not json", p, now).unwrap().is_none());
        let bad = br#"{"type":"data","seq":[10,2],"id":1,"payload":""}"#;
        assert!(t.on_datagram(bad, p, now).unwrap().is_none());
        let ack = br#"{"type":"ack","sacks":[],"id":1}"#;
        assert!(t.on_datagram(ack, p, now).unwrap().is_none());
        assert_eq!(t.report.malformed, 2);
        assert_eq!(t.report.rejected, 1);
    }

    #[test]
    fn fin_closes_connection_once() {
        let (mut t, sink) = table();
        let now = Instant::now();
        let p = peer(1000);
        t.on_datagram(&data(0, b"hi", 0), p, now).unwrap();
        t.on_datagram(FIN, p, now).unwrap();
        t.on_datagram(FIN, p, now).unwrap();
        assert!(t.connections.is_empty());
        assert_eq!(t.report.streams_finished, 1);
        assert_eq!(sink.stream(p).unwrap().finish.unwrap().delivered, 2);
    }

    #[test]
    fn late_duplicate_after_fin_is_not_redelivered() {
        let (mut t, sink) = table();
        let now = Instant::now();
        let p = peer(1000);
        t.on_datagram(&data(0, b"hello", 0), p, now).unwrap();
        t.on_datagram(&data(5, b"world", 1), p, now).unwrap();
        t.on_datagram(FIN, p, now).unwrap();

        let later = now + Duration::from_millis(50);
        assert!(t.on_datagram(&data(0, b"hello", 2), p, later).unwrap().is_none());
        t.on_datagram(FIN, p, later).unwrap();

        assert_eq!(sink.stream(p).unwrap().data, b"helloworld");
        assert!(t.connections.is_empty());
        assert_eq!(t.report.late_datagrams, 1);
        assert_eq!(t.report.streams_finished, 1);
        assert_eq!(t.report.bytes_delivered, 10);
    }

    #[test]
    fn finished_peer_may_start_again_after_linger() {
        let (mut t, _) = table();
        let now = Instant::now();
        let p = peer(1000);
        t.on_datagram(&data(0, b"one", 0), p, now).unwrap();
        t.on_datagram(FIN, p, now).unwrap();

        let after = now + FINISHED_LINGER;
        assert!(t.on_datagram(&data(0, b"two", 0), p, after).unwrap().is_some());
        assert_eq!(t.connections.len(), 1);
        assert!(t.finished.is_empty());
        assert_eq!(t.report.late_datagrams, 0);
    }

    #[test]
    fn finished_peers_are_bounded() {
        let (mut t, _) = table();
        let now = Instant::now();
        for port in 0..MAX_FINISHED_PEERS as u16 + 10 {
            let at = now + Duration::from_micros(port as u64);
            t.on_datagram(FIN, peer(port), at).unwrap();
        }
        assert_eq!(t.finished.len(), MAX_FINISHED_PEERS);
        // The earliest finishers were forgotten first.
        assert!(!t.finished.contains_key(&peer(0)));
        assert!(t.finished.contains_key(&peer(MAX_FINISHED_PEERS as u16 + 9)));

        // Expired entries are swept on the next fin.
        t.on_datagram(FIN, peer(60_000), now + FINISHED_LINGER * 2).unwrap();
        assert_eq!(t.finished.len(), 1);
    }
}
