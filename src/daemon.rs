use std::cell::RefCell;
use std::net::Ipv4Addr;
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

use crate::clock::{Clock, Millis};
use crate::iface::{Interfaces, Sender};
use crate::pkt::{entries_to_payload, payload_to_entries, RipEntry, AF_INET};
use crate::rmutex::Rmutex;
use crate::table::{NextHop, Route, RoutingTable};
use crate::{RipConfig, INFINITY, RIP_MULTICAST};

/// A routing daemon implementing RIP over a host-provided transport.
///
/// The daemon owns a routing table seeded from the host's interfaces. The
/// host delivers inbound advertisements through [`handle_packet`] and
/// interface events through [`handle_interface_changed`]; a timer thread
/// started by [`start`] drives timeouts and periodic re-advertisement; the
/// forwarding plane queries [`next_hop`]. All entries serialize on one
/// coarse re-entrant lock, so they may be called from any number of
/// threads.
///
/// [`start`]: RipDaemon::start
/// [`next_hop`]: RipDaemon::next_hop
/// [`handle_packet`]: RipDaemon::handle_packet
/// [`handle_interface_changed`]: RipDaemon::handle_interface_changed
#[derive(Clone)]
pub struct RipDaemon {
    inner: Arc<Inner>,
}

struct Inner {
    cfg: RipConfig,
    clock: Clock,
    interfaces: Box<dyn Interfaces>,
    sender: Box<dyn Sender>,
    core: Rmutex<RefCell<Core>>,
}

struct Core {
    table: RoutingTable,
    last_advert: Millis,
}

impl RipDaemon {
    /// Boots the daemon: seeds the routing table with one directly
    /// connected route per enabled interface and starts the periodic
    /// timer thread.
    ///
    /// The timer thread keeps running until the last clone of the returned
    /// handle is dropped.
    ///
    /// # Panics
    ///
    /// Panics if the timer thread cannot be spawned.
    pub fn start<I, S>(cfg: RipConfig, interfaces: I, sender: S) -> RipDaemon
    where
        I: Interfaces + 'static,
        S: Sender + 'static,
    {
        let mut table = RoutingTable::new();
        for i in 0..interfaces.count() {
            let info = interfaces.get(i);
            if info.enabled {
                table.insert(Route::new(
                    info.ip,
                    info.mask,
                    info.cost,
                    i,
                    Ipv4Addr::UNSPECIFIED,
                    None,
                ));
            }
        }
        tracing::debug!(target: "ripd", "seeded routing table\n{table}");

        // back-dated so that the very first tick advertises the seed table
        let last_advert = -(cfg.advert_interval.as_millis() as Millis);
        let tick = cfg.tick_interval;

        let inner = Arc::new(Inner {
            cfg,
            clock: Clock::new(),
            interfaces: Box::new(interfaces),
            sender: Box::new(sender),
            core: Rmutex::new(RefCell::new(Core { table, last_advert })),
        });

        let weak = Arc::downgrade(&inner);
        thread::Builder::new()
            .name("rip-periodic".into())
            .spawn(move || periodic_timer(&weak, tick))
            .expect("failed to spawn the periodic timer thread");

        RipDaemon { inner }
    }

    /// Longest-prefix route lookup for the forwarding plane.
    ///
    /// Returns [`NextHop::UNREACHABLE`] if no live route covers `dst`.
    #[must_use]
    pub fn next_hop(&self, dst: Ipv4Addr) -> NextHop {
        let core = self.inner.core.lock();
        let next_hop = core.borrow().table.lookup(dst);
        next_hop
    }

    /// Integrates the advertisement payload of a packet received from
    /// `src` on interface `iface`.
    pub fn handle_packet(&self, src: Ipv4Addr, iface: usize, payload: &[u8]) {
        self.inner.handle_packet(src, iface, payload);
    }

    /// Runs one pass of timeout handling and periodic re-advertisement.
    ///
    /// Invoked by the timer thread every tick; may also be called directly.
    pub fn handle_periodic(&self) {
        self.inner.handle_periodic();
    }

    /// Reacts to interface `iface` going up or down (`state_changed`) or
    /// to a change of its cost (`cost_changed`).
    pub fn handle_interface_changed(&self, iface: usize, state_changed: bool, cost_changed: bool) {
        self.inner
            .handle_interface_changed(iface, state_changed, cost_changed);
    }

    /// A snapshot of the current routing table, in insertion order.
    #[must_use]
    pub fn routes(&self) -> Vec<Route> {
        let core = self.inner.core.lock();
        let state = core.borrow();
        state.table.iter().cloned().collect()
    }
}

fn periodic_timer(daemon: &Weak<Inner>, tick: Duration) {
    loop {
        thread::sleep(tick);
        let Some(inner) = daemon.upgrade() else { break };
        inner.handle_periodic();
    }
}

impl Inner {
    fn handle_packet(&self, src: Ipv4Addr, iface: usize, payload: &[u8]) {
        let core = self.core.lock();

        let arrival = self.interfaces.get(iface);
        if !arrival.enabled {
            return;
        }

        let entries = payload_to_entries(payload);
        let now = self.clock.now_ms();

        let mut changed = false;
        {
            let mut state = core.borrow_mut();
            for entry in &entries {
                changed |= integrate(&mut state.table, entry, src, iface, arrival.cost, now);
            }
        }

        if changed {
            tracing::trace!(target: "ripd", "advertisement from {src} changed the table, sending triggered update");
            self.broadcast();
        }
    }

    fn handle_periodic(&self) {
        let core = self.core.lock();
        let timeout = self.cfg.route_timeout.as_millis() as Millis;
        let advert_interval = self.cfg.advert_interval.as_millis() as Millis;

        let mut send = false;
        {
            let mut state = core.borrow_mut();
            let now = self.clock.now_ms();

            for route in state.table.iter_mut() {
                if let Some(refreshed) = route.refreshed_at {
                    if now - refreshed > timeout {
                        if let Some(rescue) = self.covering_interface(route.subnet) {
                            // the subnet is still on a live link, re-home
                            // the route instead of poisoning it
                            tracing::info!(
                                target: "ripd",
                                "route to {} timed out, rescued onto interface {rescue}",
                                route.subnet
                            );
                            route.refreshed_at = None;
                            route.is_garbage = false;
                            route.iface = rescue;
                            route.next_hop = Ipv4Addr::UNSPECIFIED;
                        } else {
                            tracing::info!(target: "ripd", "route to {} timed out", route.subnet);
                            route.cost = INFINITY;
                            route.refreshed_at = Some(now);
                            send = true;
                        }
                    }
                }
                if route.cost == INFINITY {
                    route.is_garbage = true;
                }
            }

            let now = self.clock.now_ms();
            if now - state.last_advert > advert_interval {
                send = true;
                state.last_advert = now;
            }
        }

        if send {
            self.broadcast();
        }
    }

    fn handle_interface_changed(&self, iface: usize, state_changed: bool, cost_changed: bool) {
        let core = self.core.lock();
        let info = self.interfaces.get(iface);
        let now = self.clock.now_ms();

        let mut send = false;
        let mut append = true;
        {
            let mut state = core.borrow_mut();

            if state_changed {
                if info.enabled {
                    tracing::info!(target: "ripd", "interface {iface} up ({})", info.ip);
                    let mut promoted = None;
                    for route in state.table.iter_mut() {
                        if route.subnet != info.subnet() {
                            continue;
                        }
                        append = false;
                        // the direct link beats whatever path we had
                        if info.cost < route.cost {
                            route.iface = iface;
                            route.cost = info.cost;
                            route.next_hop = Ipv4Addr::UNSPECIFIED;
                            route.refreshed_at = Some(now);
                            route.is_garbage = false;
                            promoted = Some(route.mask);
                            send = true;
                            break;
                        }
                    }
                    // the mask is a key field, rewrite it through the table
                    if let Some(old_mask) = promoted {
                        state.table.rekey_mask(info.subnet(), old_mask, info.mask);
                    }
                } else {
                    tracing::info!(target: "ripd", "interface {iface} down ({})", info.ip);
                    append = false;
                    for route in state.table.iter_mut() {
                        if route.iface == iface {
                            route.cost = INFINITY;
                            route.is_garbage = true;
                            route.refreshed_at = Some(now);
                            send = true;
                        }
                    }
                }
            } else if cost_changed {
                // cost of our own subnet before the change, to shift
                // learned paths by the difference
                let old_cost = state
                    .table
                    .iter()
                    .find(|r| r.subnet == info.subnet())
                    .map(|r| r.cost);
                if old_cost.is_some() {
                    append = false;
                }
                let old_cost = old_cost.unwrap_or(0);
                tracing::info!(
                    target: "ripd",
                    "interface {iface} cost changed {old_cost} -> {}",
                    info.cost
                );

                for route in state.table.iter_mut() {
                    if route.iface != iface {
                        continue;
                    }
                    route.cost = if route.is_directly_connected() {
                        info.cost
                    } else {
                        (i64::from(route.cost) - i64::from(old_cost) + i64::from(info.cost))
                            .clamp(0, i64::from(INFINITY)) as u32
                    };
                    route.refreshed_at = Some(now);
                    send = true;
                    if route.cost >= INFINITY {
                        route.cost = INFINITY;
                        route.is_garbage = true;
                    }
                }

                // a cheaper live link always beats a learned path
                for i in 0..self.interfaces.count() {
                    let candidate = self.interfaces.get(i);
                    if !candidate.enabled {
                        continue;
                    }
                    for route in state.table.iter_mut() {
                        if route.subnet == candidate.subnet() && candidate.cost < route.cost {
                            route.next_hop = Ipv4Addr::UNSPECIFIED;
                            route.iface = i;
                            route.cost = candidate.cost;
                            route.refreshed_at = None;
                            route.is_garbage = false;
                            send = true;
                        }
                    }
                }
            }

            // no entry covered this interface's subnet yet
            if append {
                state.table.insert(Route::new(
                    info.ip,
                    info.mask,
                    info.cost,
                    iface,
                    Ipv4Addr::UNSPECIFIED,
                    Some(now),
                ));
                send = true;
            }
        }

        if send {
            self.broadcast();
        }
    }

    /// Advertises the full table on every enabled interface, applying
    /// split horizon with poisoned reverse per interface.
    ///
    /// Reached from the packet, periodic and interface-change paths, so it
    /// re-acquires the coarse lock.
    fn broadcast(&self) {
        let core = self.core.lock();
        let state = core.borrow();

        for j in 0..self.interfaces.count() {
            let info = self.interfaces.get(j);
            if !info.enabled {
                continue;
            }

            let mut entries = Vec::with_capacity(state.table.len());
            for route in state.table.iter() {
                let mut metric = route.cost.min(INFINITY);
                // poisoned reverse: learned routes go back out of their
                // own interface as unreachable
                if route.iface == j && !route.is_directly_connected() {
                    metric = INFINITY;
                }
                entries.push(RipEntry {
                    addr_fam: AF_INET,
                    target: route.subnet,
                    mask: route.mask,
                    next_hop: route.next_hop,
                    metric,
                });
            }

            match entries_to_payload(&entries) {
                Ok(payload) => {
                    self.sender
                        .send(RIP_MULTICAST, RIP_MULTICAST, j, &payload);
                }
                Err(e) => {
                    tracing::error!(target: "ripd", "failed to encode advertisement: {e}");
                }
            }
        }
    }

    /// The first enabled interface fronting `subnet` with a finite cost.
    fn covering_interface(&self, subnet: Ipv4Addr) -> Option<usize> {
        (0..self.interfaces.count()).find(|&i| {
            let info = self.interfaces.get(i);
            info.enabled && info.subnet() == subnet && info.cost < INFINITY
        })
    }
}

/// Folds one advertised entry into the table. Returns whether the table
/// changed in a way worth a triggered update.
fn integrate(
    table: &mut RoutingTable,
    entry: &RipEntry,
    src: Ipv4Addr,
    iface: usize,
    link_cost: u32,
    now: Millis,
) -> bool {
    let subnet = Ipv4Addr::from(u32::from(entry.target) & u32::from(entry.mask));
    let total = entry.metric.saturating_add(link_cost).min(INFINITY);

    let Some(route) = table.find_mut(subnet, entry.mask) else {
        // a new destination is only worth an entry while still reachable
        if total < INFINITY {
            tracing::trace!(target: "ripd", "new destination {subnet} via {src}, cost {total}");
            table.insert(Route::new(entry.target, entry.mask, total, iface, src, Some(now)));
            return true;
        }
        return false;
    };

    if route.iface == iface && !route.is_directly_connected() {
        // report from our current upstream, accept unconditionally
        let old_cost = route.cost;
        route.cost = total;
        route.is_garbage = route.cost == INFINITY;
        route.refreshed_at = Some(now);
        old_cost != route.cost
    } else if route.iface != iface {
        // alternative path, only worth taking if strictly cheaper
        if total < route.cost {
            route.cost = total;
            route.iface = iface;
            route.next_hop = src;
            route.refreshed_at = Some(now);
            route.is_garbage = false;
            return true;
        }
        false
    } else {
        // a neighbor advertising one of our directly connected subnets
        false
    }
}
