use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// A monotonically increasing byte counter.
///
/// Writers only ever `fetch_add`; readers `load` without blocking them.
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

/// Shared reference to a [`Counter`]
pub type SharedCounter = Arc<Counter>;

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_shared() -> SharedCounter {
        Arc::new(Self::new())
    }

    pub fn add(&self, bytes: u64) {
        self.value.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn load(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Upload/download counters of one bucket.
#[derive(Debug, Clone, Default)]
pub struct CounterPair {
    pub upload: SharedCounter,
    pub download: SharedCounter,
}

impl CounterPair {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn usage(&self) -> Usage {
        Usage {
            uplink: self.upload.load(),
            downlink: self.download.load(),
        }
    }
}

/// Point-in-time totals of a bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub uplink: u64,
    pub downlink: u64,
}

impl Usage {
    pub fn new(uplink: u64, downlink: u64) -> Self {
        Self { uplink, downlink }
    }
}
