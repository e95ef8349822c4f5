//! Full transfers over loopback UDP.

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use sackstream::driver::{self, sink::MemorySink};
use sackstream::{CongestionMode, ReceiveReport, Receiver, Result, TransportConfig, run_sender};

struct RunningReceiver {
    addr: SocketAddr,
    sink: MemorySink,
    stop: oneshot::Sender<()>,
    task: JoinHandle<Result<ReceiveReport>>,
}

impl RunningReceiver {
    async fn start() -> Self {
        let sink = MemorySink::new();
        let receiver = Receiver::bind(
            "127.0.0.1:0".parse().unwrap(),
            &TransportConfig::default(),
            sink.clone(),
        )
        .await
        .unwrap();
        let addr = receiver.local_addr().unwrap();
        let (stop, stopped) = oneshot::channel::<()>();
        let task = tokio::spawn(receiver.serve(async move {
            let _ = stopped.await;
        }));
        Self { addr, sink, stop, task }
    }

    /// Wait until `count` peers have sent `fin`.
    async fn wait_finished(&self, count: usize) {
        for _ in 0..500 {
            if self.sink.finished_count() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("only {} of {count} streams finished", self.sink.finished_count());
    }

    async fn shutdown(self) -> ReceiveReport {
        let _ = self.stop.send(());
        self.task.await.unwrap().unwrap()
    }
}

fn patterned(len: usize) -> Bytes {
    (0..len).map(|i| (i * 7 % 253) as u8).collect::<Vec<u8>>().into()
}

async fn send(addr: SocketAddr, data: Bytes, config: &TransportConfig) -> sackstream::SendReport {
    let socket = driver::connect(addr).await.unwrap();
    run_sender(&socket, data, config).await.unwrap()
}

#[tokio::test]
async fn text_file_arrives_intact() {
    let rx = RunningReceiver::start().await;
    let text = Bytes::from("the quick brown fox jumps over the lazy dog\n".repeat(500));

    let report = send(rx.addr, text.clone(), &TransportConfig::default()).await;
    assert_eq!(report.bytes_sent, text.len() as u64);
    assert!(report.payload_bytes_transmitted >= text.len() as u64);
    assert!(report.goodput() > 0.0);
    assert_eq!(report.oversized_datagrams, 0);

    rx.wait_finished(1).await;
    let (_, stream) = rx.sink.finished().remove(0);
    assert_eq!(stream.data, text);
    assert!(stream.finish.unwrap().is_complete());

    let summary = rx.shutdown().await;
    assert_eq!(summary.streams_finished, 1);
    assert_eq!(summary.open_connections, 0);
    assert_eq!(summary.malformed, 0);
}

#[tokio::test]
async fn binary_data_survives_simulated_loss() {
    let rx = RunningReceiver::start().await;
    let data = patterned(200_000);
    let config = TransportConfig {
        loss_probability: 0.1,
        loss_seed: Some(11),
        ..TransportConfig::default()
    };

    let report = send(rx.addr, data.clone(), &config).await;
    assert!(report.packets_dropped > 0);
    assert!(report.payload_bytes_transmitted >= data.len() as u64);
    // Control and high bytes grow under JSON escaping.
    assert!(report.oversized_datagrams > 0);

    rx.wait_finished(1).await;
    let (_, stream) = rx.sink.finished().remove(0);
    assert_eq!(stream.data, data);
    rx.shutdown().await;
}

#[tokio::test]
async fn empty_stream_only_sends_fin() {
    let rx = RunningReceiver::start().await;
    let report = send(rx.addr, Bytes::new(), &TransportConfig::default()).await;
    assert_eq!(report.packets_sent, 0);

    rx.wait_finished(1).await;
    let (_, stream) = rx.sink.finished().remove(0);
    assert!(stream.data.is_empty());
    assert_eq!(stream.finish.unwrap().delivered, 0);
    rx.shutdown().await;
}

#[tokio::test]
async fn concurrent_senders_get_separate_streams() {
    let rx = RunningReceiver::start().await;
    let a = patterned(30_000);
    let b = Bytes::from(vec![b'b'; 45_000]);

    let config = TransportConfig::default();
    let (ra, rb) = tokio::join!(
        send(rx.addr, a.clone(), &config),
        send(rx.addr, b.clone(), &config)
    );
    assert_eq!(ra.bytes_sent, 30_000);
    assert_eq!(rb.bytes_sent, 45_000);

    rx.wait_finished(2).await;
    let mut lengths: Vec<usize> = rx
        .sink
        .finished()
        .into_iter()
        .map(|(_, s)| {
            assert!(s.data == a || s.data == b);
            s.data.len()
        })
        .collect();
    lengths.sort_unstable();
    assert_eq!(lengths, vec![30_000, 45_000]);
    rx.shutdown().await;
}

#[tokio::test]
async fn fixed_window_mode_completes() {
    let rx = RunningReceiver::start().await;
    let data = patterned(100_000);
    let config = TransportConfig {
        congestion: CongestionMode::Fixed { packets: 20 },
        ..TransportConfig::default()
    };

    let report = send(rx.addr, data.clone(), &config).await;
    assert_eq!(report.final_cwnd, 24_000);

    rx.wait_finished(1).await;
    assert_eq!(rx.sink.finished().remove(0).1.data, data);
    rx.shutdown().await;
}

#[tokio::test]
async fn garbage_does_not_stop_receiver() {
    let rx = RunningReceiver::start().await;
    let socket = driver::connect(rx.addr).await.unwrap();
    socket.send(b"\xff\xfe not json").await.unwrap();
    socket.send(br#"{"type":"data","seq":[9,1],"id":0,"payload":""}"#).await.unwrap();

    let data = patterned(5_000);
    send(rx.addr, data.clone(), &TransportConfig::default()).await;
    rx.wait_finished(1).await;

    let summary = rx.shutdown().await;
    assert_eq!(summary.malformed, 1);
    assert_eq!(summary.rejected, 1);
    assert_eq!(summary.streams_finished, 1);
    // The peer that only sent garbage never finished.
    assert_eq!(summary.open_connections, 1);
}
