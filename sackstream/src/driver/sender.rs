//! Sender event loop.
//!
//! Alternates between two states: while the window has room, hand out ranges
//! and transmit them; otherwise wait for one ack until the retransmission
//! deadline. An expired deadline rewinds the window and resets the in-flight
//! count. Once every chunk is acknowledged, `fin` is sent and the loop ends.

use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use crate::config::TransportConfig;
use crate::driver::loss::LossSimulator;
use crate::driver::{is_transient, RECV_BUFFER};
use crate::error::Result;
use crate::frame::Frame;
use crate::sender::{SenderProtocol, Transmit};

/// Summary of one completed transfer.
#[derive(Debug, Clone, PartialEq)]
pub struct SendReport {
    /// Stream length.
    pub bytes_sent: u64,
    /// Payload bytes actually put on the wire, retransmissions included.
    pub payload_bytes_transmitted: u64,
    /// Data packets handed out, including ones the loss simulator dropped.
    pub packets_sent: u64,
    pub packets_dropped: u64,
    /// Data datagrams whose encoding exceeded `max_datagram`.
    pub oversized_datagrams: u64,
    pub timeouts: u64,
    pub elapsed: Duration,
    pub final_cwnd: u64,
}

impl SendReport {
    /// Stream bytes per second over the whole transfer.
    pub fn goodput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.bytes_sent as f64 / secs
        } else {
            0.0
        }
    }
}

/// What happened while waiting for an ack.
enum WaitOutcome {
    Acked,
    Dropped,
    TimedOut,
}

/// Transfer `data` over `socket`, which must already be connected to the
/// receiver. Returns once every byte is acknowledged and `fin` has been sent.
pub async fn run_sender(socket: &UdpSocket, data: Bytes, config: &TransportConfig) -> Result<SendReport> {
    let mut protocol = SenderProtocol::new(data.len() as u64, config)?;
    let mut loss = LossSimulator::new(config.loss_probability, config.loss_seed);
    let mut buf = vec![0u8; RECV_BUFFER];
    let mut payload_bytes_transmitted = 0u64;
    let mut oversized_datagrams = 0u64;
    let started = Instant::now();

    info!(
        peer = ?socket.peer_addr().ok(),
        bytes = data.len(),
        controller = protocol.controller_name(),
        "starting transfer"
    );

    loop {
        if protocol.can_send() || protocol.is_complete() {
            match protocol.poll_transmit(Instant::now()) {
                Transmit::Done => break,
                Transmit::WouldBlock => {}
                Transmit::Send { id, range } => {
                    if loss.should_drop() {
                        debug!(id, %range, "simulated loss of data packet");
                        continue;
                    }
                    let payload = data.slice(range.start as usize..range.end as usize);
                    let datagram = Frame::Data { seq: range, id, payload }.encode()?;
                    if datagram.len() > config.max_datagram {
                        oversized_datagrams += 1;
                        if oversized_datagrams == 1 {
                            warn!(
                                id,
                                len = datagram.len(),
                                max = config.max_datagram,
                                "encoded datagram exceeds max_datagram; further ones are logged at debug"
                            );
                        } else {
                            debug!(id, len = datagram.len(), "oversized datagram");
                        }
                    }
                    transmit(socket, &datagram).await?;
                    payload_bytes_transmitted += range.len();
                    debug!(
                        id,
                        %range,
                        cwnd = protocol.cwnd(),
                        in_flight = protocol.bytes_in_flight(),
                        "sent data"
                    );
                }
            }
            continue;
        }

        match wait_for_ack(socket, &mut protocol, &mut loss, &mut buf).await? {
            WaitOutcome::Acked | WaitOutcome::Dropped => {}
            WaitOutcome::TimedOut => {
                protocol.on_timeout();
                info!(
                    cwnd = protocol.cwnd(),
                    ssthresh = protocol.ssthresh(),
                    rto_ms = protocol.rto().as_millis() as u64,
                    "timeout"
                );
            }
        }
    }

    let fin = Frame::Fin.encode()?;
    for _ in 0..config.fin_repeats.max(1) {
        transmit(socket, &fin).await?;
    }

    let report = SendReport {
        bytes_sent: data.len() as u64,
        payload_bytes_transmitted,
        packets_sent: protocol.packets_sent(),
        packets_dropped: loss.dropped(),
        oversized_datagrams,
        timeouts: protocol.timeouts(),
        elapsed: started.elapsed(),
        final_cwnd: protocol.cwnd(),
    };
    info!(
        bytes = report.bytes_sent,
        packets = report.packets_sent,
        timeouts = report.timeouts,
        oversized = report.oversized_datagrams,
        elapsed_ms = report.elapsed.as_millis() as u64,
        goodput = report.goodput() as u64,
        "transfer complete"
    );
    Ok(report)
}

/// Wait for one usable ack, or until the retransmission deadline passes.
///
/// Undecodable datagrams and invalid acks are logged and skipped without
/// moving the deadline.
async fn wait_for_ack(
    socket: &UdpSocket,
    protocol: &mut SenderProtocol,
    loss: &mut LossSimulator,
    buf: &mut [u8],
) -> Result<WaitOutcome> {
    let deadline = protocol.arm_timer(Instant::now());
    loop {
        let received =
            match tokio::time::timeout_at(deadline.into(), socket.recv(buf)).await {
                Err(_elapsed) => return Ok(WaitOutcome::TimedOut),
                Ok(Err(e)) if is_transient(&e) => {
                    debug!(error = %e, "peer unreachable");
                    continue;
                }
                Ok(Err(e)) => return Err(e.into()),
                Ok(Ok(n)) => n,
            };

        let (sacks, id) = match Frame::decode_ack(&buf[..received]) {
            Ok(ack) => ack,
            Err(e) => {
                warn!(error = %e, "ignoring datagram");
                continue;
            }
        };

        if loss.should_drop() {
            debug!(id, "simulated loss of ack");
            return Ok(WaitOutcome::Dropped);
        }

        match protocol.on_ack(&sacks, id, Instant::now()) {
            Ok(outcome) => {
                debug!(
                    id,
                    freed = outcome.freed,
                    cwnd = protocol.cwnd(),
                    in_flight = protocol.bytes_in_flight(),
                    "ack"
                );
                return Ok(WaitOutcome::Acked);
            }
            Err(e) if e.is_validation() => {
                warn!(id, error = %e, "rejecting ack");
            }
            Err(e) => return Err(e),
        }
    }
}

async fn transmit(socket: &UdpSocket, datagram: &[u8]) -> Result<()> {
    match socket.send(datagram).await {
        Ok(_) => Ok(()),
        Err(e) if is_transient(&e) => {
            debug!(error = %e, "send failed, treating as lost");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
