//! Traffic accounting for proxied connections.
//!
//! Bytes moving through a routed connection are attributed to a global
//! bucket (all metered nodes) and to a per-user bucket. Accounting happens
//! inside the connection wrappers with plain atomic additions, so the data
//! path never waits on a lock.

pub mod counter;
pub mod manager;
pub mod membership;
pub mod metadata;
pub mod metered;
pub mod packet;
pub mod registry;

pub use counter::{Counter, CounterPair, SharedCounter, Usage};
pub use manager::TrafficManager;
pub use membership::{Membership, MembershipSnapshot};
pub use metadata::InboundMetadata;
pub use metered::{Meters, MeteredPacketConn, MeteredStream, RoutedPacketConn, RoutedStream};
pub use packet::PacketConn;
pub use registry::BucketRegistry;
