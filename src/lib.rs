//! A distance-vector routing daemon speaking the Routing Information
//! Protocol (RIP).
//!
//! The crate implements the protocol core of a single router: a routing
//! table learned from neighbor advertisements, periodic and triggered
//! redistribution with split horizon and poisoned reverse, route timeout
//! handling, and longest-prefix next-hop lookups for a forwarding plane.
//! Packet transport and interface discovery stay with the host, injected
//! through the [`Interfaces`] and [`Sender`] traits.

#![warn(clippy::pedantic)]
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

use std::net::Ipv4Addr;
use std::time::Duration;

mod clock;
pub use self::clock::{Clock, Millis};

mod codec;
pub use self::codec::{FromBytestream, IntoBytestream};

mod daemon;
pub use self::daemon::RipDaemon;

mod iface;
pub use self::iface::{InterfaceInfo, Interfaces, Sender};

mod pkt;
pub use self::pkt::*;

mod rmutex;
pub use self::rmutex::{Rmutex, RmutexGuard};

mod table;
pub use self::table::{NextHop, Route, RoutingTable};

/// The reserved metric signifying an unreachable destination.
pub const INFINITY: u32 = 16;

/// Multicast group advertisements are addressed to.
pub const RIP_MULTICAST: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 9);

/// Configuration for RIP routers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RipConfig {
    /// Interval between unconditional full-table advertisements.
    pub advert_interval: Duration,
    /// Idle time after which a refreshable route counts as dead.
    pub route_timeout: Duration,
    /// Lifetime of unreachable entries before a collection sweep.
    /// Reserved; the daemon currently keeps tombstones forever.
    pub garbage_lifetime: Duration,
    /// Sleep interval of the periodic timer thread.
    pub tick_interval: Duration,
}

impl Default for RipConfig {
    fn default() -> Self {
        Self {
            advert_interval: Duration::from_secs(10),
            route_timeout: Duration::from_secs(20),
            garbage_lifetime: Duration::from_secs(20),
            tick_interval: Duration::from_secs(1),
        }
    }
}
