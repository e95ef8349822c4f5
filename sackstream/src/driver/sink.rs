//! Where delivered stream bytes go.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Result;
use crate::receiver::FinishReport;

/// Consumer of in-order stream bytes, keyed by peer.
pub trait DeliverySink: Send {
    /// `data` directly follows everything previously delivered for `peer`.
    fn deliver(&mut self, peer: SocketAddr, data: &[u8]) -> Result<()>;

    /// The peer sent `fin`; no more bytes will arrive for it.
    fn finish(&mut self, peer: SocketAddr, report: &FinishReport) -> Result<()>;
}

/// Writes each peer's stream to its own file in a directory.
///
/// Existing files are never truncated. A second stream from an address that
/// already has output gets a numbered name, `<ip>_<port>.<n>.recv`.
#[derive(Debug)]
pub struct FileSink {
    dir: PathBuf,
    open: HashMap<SocketAddr, BufWriter<File>>,
}

impl FileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            open: HashMap::new(),
        })
    }

    /// Output file used for the first stream from `peer`.
    pub fn path_for(&self, peer: SocketAddr) -> PathBuf {
        peer_path(&self.dir, peer)
    }
}

fn peer_path(dir: &Path, peer: SocketAddr) -> PathBuf {
    let host = peer.ip().to_string().replace(':', "-");
    dir.join(format!("{host}_{}.recv", peer.port()))
}

fn create_output(dir: &Path, peer: SocketAddr) -> Result<File> {
    let base = peer_path(dir, peer);
    let mut path = base.clone();
    let mut n = 0u32;
    loop {
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok(file),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                n += 1;
                path = base.with_extension(format!("{n}.recv"));
            }
            Err(e) => return Err(e.into()),
        }
    }
}

impl DeliverySink for FileSink {
    fn deliver(&mut self, peer: SocketAddr, data: &[u8]) -> Result<()> {
        let writer = match self.open.entry(peer) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => {
                let file = create_output(&self.dir, peer)?;
                e.insert(BufWriter::new(file))
            }
        };
        writer.write_all(data)?;
        Ok(())
    }

    fn finish(&mut self, peer: SocketAddr, _report: &FinishReport) -> Result<()> {
        match self.open.remove(&peer) {
            Some(mut writer) => writer.flush()?,
            // Empty stream: still leave a file behind.
            None => {
                create_output(&self.dir, peer)?;
            }
        }
        Ok(())
    }
}

/// One peer's stream as captured by [`MemorySink`].
#[derive(Debug, Clone, Default)]
pub struct CapturedStream {
    pub data: Vec<u8>,
    pub finish: Option<FinishReport>,
}

/// Keeps delivered bytes in memory. Clones share the same storage, so one
/// handle can be given to the receiver and another kept for inspection.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    streams: Arc<Mutex<HashMap<SocketAddr, CapturedStream>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stream(&self, peer: SocketAddr) -> Option<CapturedStream> {
        self.streams.lock().get(&peer).cloned()
    }

    /// Every stream whose peer has sent `fin`.
    pub fn finished(&self) -> Vec<(SocketAddr, CapturedStream)> {
        self.streams
            .lock()
            .iter()
            .filter(|(_, s)| s.finish.is_some())
            .map(|(peer, s)| (*peer, s.clone()))
            .collect()
    }

    pub fn finished_count(&self) -> usize {
        self.streams
            .lock()
            .values()
            .filter(|s| s.finish.is_some())
            .count()
    }
}

impl DeliverySink for MemorySink {
    fn deliver(&mut self, peer: SocketAddr, data: &[u8]) -> Result<()> {
        self.streams
            .lock()
            .entry(peer)
            .or_default()
            .data
            .extend_from_slice(data);
        Ok(())
    }

    fn finish(&mut self, peer: SocketAddr, report: &FinishReport) -> Result<()> {
        self.streams.lock().entry(peer).or_default().finish = Some(report.clone());
        Ok(())
    }
}
