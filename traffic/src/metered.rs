mod packet;
mod stream;

pub use packet::{MeteredPacketConn, RoutedPacketConn};
pub use stream::{MeteredStream, RoutedStream};

use crate::counter::{CounterPair, SharedCounter};

/// The counters a routed connection reports into.
///
/// Built once when the connection is routed and never changed afterwards.
#[derive(Debug, Clone, Default)]
pub struct Meters {
    upload: Vec<SharedCounter>,
    download: Vec<SharedCounter>,
}

impl Meters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            upload: Vec::with_capacity(capacity),
            download: Vec::with_capacity(capacity),
        }
    }

    pub fn attach(&mut self, pair: CounterPair) {
        self.upload.push(pair.upload);
        self.download.push(pair.download);
    }

    pub fn is_empty(&self) -> bool {
        self.upload.is_empty() && self.download.is_empty()
    }

    /// Number of buckets attached.
    pub fn len(&self) -> usize {
        self.upload.len()
    }

    pub(crate) fn record_upload(&self, bytes: usize) {
        if bytes == 0 {
            return;
        }
        let bytes = bytes as u64;
        self.upload.iter().for_each(|counter| counter.add(bytes));
    }

    pub(crate) fn record_download(&self, bytes: usize) {
        if bytes == 0 {
            return;
        }
        let bytes = bytes as u64;
        self.download.iter().for_each(|counter| counter.add(bytes));
    }
}
