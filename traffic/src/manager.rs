use crate::counter::Usage;
use crate::membership::Membership;
use crate::metadata::InboundMetadata;
use crate::metered::{Meters, MeteredPacketConn, MeteredStream, RoutedPacketConn, RoutedStream};
use crate::registry::BucketRegistry;
use tracing::{debug, info};

/// Decides which buckets observe a connection and instruments it.
///
/// The decision is taken once, when the connection is routed. Later changes
/// to the metered user set only affect connections routed afterwards; a
/// live connection keeps reporting into the buckets it started with.
#[derive(Debug)]
pub struct TrafficManager {
    registry: BucketRegistry,
    membership: Membership,
}

impl TrafficManager {
    /// Creates a manager metering traffic of the given node tags.
    pub fn new<I, S>(node_tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let membership = Membership::new(node_tags);
        info!(
            "Traffic manager metering {} node(s)",
            membership.snapshot().node_count()
        );
        Self {
            registry: BucketRegistry::new(),
            membership,
        }
    }

    fn meters_for(&self, metadata: &InboundMetadata) -> Meters {
        let snapshot = self.membership.snapshot();
        let mut meters = Meters::with_capacity(2);
        if snapshot.is_node_metered(&metadata.inbound) {
            meters.attach(self.registry.global_pair());
        }
        if let Some(user) = metadata.user()
            && snapshot.is_user_metered(user)
        {
            meters.attach(self.registry.counter_pair_for(user));
        }
        meters
    }

    /// Wraps `conn` so its traffic is counted, or returns it untouched when
    /// neither its node nor its user is metered.
    pub fn route_connection<S>(&self, metadata: &InboundMetadata, conn: S) -> RoutedStream<S> {
        let meters = self.meters_for(metadata);
        if meters.is_empty() {
            return RoutedStream::Direct(conn);
        }
        debug!(
            inbound = %metadata.inbound,
            user = ?metadata.user(),
            buckets = meters.len(),
            "Metering connection"
        );
        RoutedStream::Metered(MeteredStream::new(conn, meters))
    }

    /// Datagram counterpart of [`route_connection`](Self::route_connection).
    pub fn route_packet_connection<P>(
        &self,
        metadata: &InboundMetadata,
        conn: P,
    ) -> RoutedPacketConn<P> {
        let meters = self.meters_for(metadata);
        if meters.is_empty() {
            return RoutedPacketConn::Direct(conn);
        }
        debug!(
            inbound = %metadata.inbound,
            user = ?metadata.user(),
            buckets = meters.len(),
            "Metering packet connection"
        );
        RoutedPacketConn::Metered(MeteredPacketConn::new(conn, meters))
    }

    /// Replaces the set of metered users. Existing counters are kept.
    pub fn update_metered_users<I, S>(&self, users: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.membership.replace_users(users);
        debug!(
            "Metered users updated, {} user(s)",
            self.membership.snapshot().users().len()
        );
    }

    pub fn is_node_metered(&self, tag: &str) -> bool {
        self.membership.is_node_metered(tag)
    }

    pub fn is_user_metered(&self, user: &str) -> bool {
        self.membership.is_user_metered(user)
    }

    pub fn read_user(&self, user: &str) -> Usage {
        self.registry.read_user(user)
    }

    pub fn read_users<S: AsRef<str>>(&self, users: &[S]) -> Vec<Usage> {
        self.registry.read_users(users)
    }

    pub fn read_global(&self) -> Usage {
        self.registry.read_global()
    }
}
