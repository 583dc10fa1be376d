//! Tunnel inbounds.
//!
//! Every node relays what it accepts to its `forward` address. TCP clients
//! identify themselves with a one-line header before the payload; UDP
//! datagrams are anonymous and only count toward the node.

mod tcp;
mod udp;

pub use tcp::serve_tcp;
pub use udp::serve_udp;
