use crate::counter::{CounterPair, Usage};
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

/// Owns every counter pair handed out to connections.
///
/// The global pair is fixed at construction. User pairs are created on the
/// first metered connection of that user and are never removed, so a pair
/// handed to a live connection stays the one that later reads observe.
#[derive(Debug, Default)]
pub struct BucketRegistry {
    global: CounterPair,
    users: RwLock<HashMap<String, CounterPair>>,
}

impl BucketRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn global_pair(&self) -> CounterPair {
        self.global.clone()
    }

    /// Returns the pair of `user`, creating a zeroed one if none exists yet.
    pub fn counter_pair_for(&self, user: &str) -> CounterPair {
        if let Some(pair) = self.users.read().get(user) {
            return pair.clone();
        }

        // Re-checked under the write lock: another connection of the same
        // user may have inserted between the two acquisitions.
        let mut users = self.users.write();
        users
            .entry(user.to_owned())
            .or_insert_with(|| {
                debug!("Creating traffic counters for user {}", user);
                CounterPair::new()
            })
            .clone()
    }

    /// Totals of `user`, zero if the user never carried metered traffic.
    pub fn read_user(&self, user: &str) -> Usage {
        self.users
            .read()
            .get(user)
            .map(CounterPair::usage)
            .unwrap_or_default()
    }

    /// Totals for each entry of `users`, in the same order.
    pub fn read_users<S: AsRef<str>>(&self, users: &[S]) -> Vec<Usage> {
        let guard = self.users.read();
        users
            .iter()
            .map(|user| {
                guard
                    .get(user.as_ref())
                    .map(CounterPair::usage)
                    .unwrap_or_default()
            })
            .collect()
    }

    pub fn read_global(&self) -> Usage {
        self.global.usage()
    }

    /// Number of users holding a counter pair.
    pub fn user_count(&self) -> usize {
        self.users.read().len()
    }
}
