use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use educe::Educe;
use log::{debug, info, trace, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::concepts::interface::Interface;
use crate::concepts::link::{Link, LinkKey};
use crate::concepts::neighbour::Neighbour;
use crate::concepts::packet::{encode_packet, MessageBody, MessageHeader, OutboundPacket};
use crate::concepts::prefix::Prefix;
use crate::concepts::route::{KernelOp, NextHop, RouteEntry, RouteMetric};
use crate::duplicate::{DupStatus, DuplicateSet};
use crate::feedback::RouterError;
use crate::framework::{HnaSet, InterfaceConfig, ProtocolParams, RoutingSystem};
use crate::lsdb::Topology;
use crate::metric::{self, LinkMetric};
use crate::rib::RoutingTable;
use crate::timer::{Scheduler, TimerId};
use crate::util::{encode_vtime, increment, millis};
use crate::{mpr, spf};

/// Jitter applied to every periodic message generator
pub(crate) const MESSAGE_JITTER: u8 = 25;

#[derive(Educe)]
#[educe(Clone(bound()), Debug(bound()))]
pub enum TimerEvent<T: RoutingSystem + ?Sized> {
    Hello(T::InterfaceId),
    Tc,
    Mid,
    Hna,
    LqPeriod,
    DuplicateSweep,
    LinkLoss(LinkKey<T>),
    LinkSym(LinkKey<T>),
    LinkExpiry(LinkKey<T>),
    VertexExpiry(T::Address),
    EdgeGc(T::Address),
    MidExpiry(T::Address),
    HnaExpiry(T::Address),
    SpfBackoff,
    BufferFlush(T::InterfaceId),
}

/// Pending work collected while handling input, consumed by [`Router::process_changes`]
#[derive(Default, Clone, Copy, Debug)]
pub(crate) struct Changes {
    pub neighbourhood: bool,
    pub topology: bool,
}

/// What a message handler gets to see of a received message
pub struct InboundMessage<'a, T: RoutingSystem + ?Sized> {
    pub interface: &'a T::InterfaceId,
    /// source address of the datagram
    pub from: T::Address,
    pub header: &'a MessageHeader<T::Address>,
    /// decoded body for the built-in message types
    pub body: Option<&'a MessageBody<T::Address>>,
    /// the whole message, header included
    pub raw: &'a [u8],
    /// `New`, or `Reset` when the originator restarted its sequence numbers
    pub status: DupStatus,
}

pub trait MessageHandler<T: RoutingSystem + ?Sized> {
    fn handle(&mut self, message: &InboundMessage<'_, T>);
}

impl<T, F> MessageHandler<T> for F
where
    T: RoutingSystem + ?Sized,
    F: FnMut(&InboundMessage<'_, T>),
{
    fn handle(&mut self, message: &InboundMessage<'_, T>) {
        self(message)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageFilter {
    Type(u8),
    /// every message that passes validation and duplicate detection
    Promiscuous,
}

impl MessageFilter {
    fn matches(&self, msg_type: u8) -> bool {
        match self {
            MessageFilter::Type(t) => *t == msg_type,
            MessageFilter::Promiscuous => true,
        }
    }
}

#[derive(Serialize, Deserialize, Educe)]
#[educe(Clone(bound()), Debug(bound()))]
#[serde(bound = "")]
pub struct EdgeView<T: RoutingSystem + ?Sized> {
    pub from: T::Address,
    pub to: T::Address,
    pub cost: u32,
    pub is_virtual: bool,
}

/// A read-only copy of the router state, for display and tests
#[derive(Serialize, Deserialize, Educe)]
#[educe(Clone(bound()), Debug(bound()))]
#[serde(bound = "")]
pub struct RouterSnapshot<T: RoutingSystem + ?Sized> {
    pub router_id: Option<T::Address>,
    pub links: Vec<(LinkKey<T>, Link<T>)>,
    pub neighbours: Vec<Neighbour<T>>,
    pub edges: Vec<EdgeView<T>>,
    pub routes: Vec<RouteEntry<T>>,
}

pub struct Router<T: RoutingSystem + ?Sized> {
    pub params: ProtocolParams,
    router_id: Option<T::Address>,
    pinned_id: Option<T::Address>,
    pub interfaces: BTreeMap<T::InterfaceId, Interface<T>>,
    pub links: BTreeMap<LinkKey<T>, Link<T>>,
    pub neighbours: BTreeMap<T::Address, Neighbour<T>>,
    pub topology: Topology<T>,
    pub routes: RoutingTable<T>,
    pub(crate) duplicates: DuplicateSet<T>,
    /// datagrams ready to be sent, drained by the socket collaborator
    pub outbound_packets: Vec<OutboundPacket<T>>,
    /// route operations in the order they must be applied, drained by the kernel collaborator
    pub kernel_ops: Vec<KernelOp<T>>,
    pub(crate) hna: HnaSet<T>,
    pub(crate) metric: Box<dyn LinkMetric>,
    pub(crate) timers: Scheduler<TimerEvent<T>>,
    handlers: Vec<(MessageFilter, Box<dyn MessageHandler<T>>)>,
    pub(crate) msg_seqno: u16,
    pub(crate) ansn: u16,
    /// neighbours listed in the last TC we generated
    pub(crate) advertised: BTreeSet<T::Address>,
    pub(crate) tc_empty_until: Option<u64>,
    pub(crate) changes: Changes,
    spf_backoff_timer: Option<TimerId>,
    spf_pending: bool,
    global_timers: Vec<TimerId>,
    pub(crate) now: u64,
}

impl<T: RoutingSystem> Default for Router<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: RoutingSystem> Router<T> {
    pub fn new() -> Self {
        Self::with_config(T::config())
    }

    pub fn with_config(params: ProtocolParams) -> Self {
        let metric = metric::from_params(&params);
        debug!("using link quality engine {}", metric.name());
        Self {
            timers: Scheduler::new(params.jitter_seed),
            params,
            router_id: None,
            pinned_id: None,
            interfaces: BTreeMap::new(),
            links: BTreeMap::new(),
            neighbours: BTreeMap::new(),
            topology: Topology::new(),
            routes: RoutingTable::new(),
            duplicates: DuplicateSet::new(),
            outbound_packets: Vec::new(),
            kernel_ops: Vec::new(),
            hna: Vec::new(),
            metric,
            handlers: Vec::new(),
            msg_seqno: 0,
            ansn: 0,
            advertised: BTreeSet::new(),
            tc_empty_until: None,
            changes: Changes::default(),
            spf_backoff_timer: None,
            spf_pending: false,
            global_timers: Vec::new(),
            now: 0,
        }
    }

    pub fn router_id(&self) -> Option<T::Address> {
        self.router_id
    }

    pub fn metric(&self) -> &dyn LinkMetric {
        self.metric.as_ref()
    }

    /// When the next timer is due, the event loop should call [`Router::tick`] by then
    pub fn next_deadline(&self) -> Option<u64> {
        self.timers.next_deadline()
    }

    // region Interface

    pub fn add_interface(&mut self, now: u64, config: InterfaceConfig<T>) -> Result<(), RouterError<T>> {
        self.now = now;
        if self.interfaces.contains_key(&config.id) {
            return Err(RouterError::DuplicateInterface(config.id));
        }
        let id = config.id.clone();
        let mut interface = Interface::new(config);
        interface.hello_timer = Some(self.timers.start(
            now,
            millis(interface.config.hello_interval),
            MESSAGE_JITTER,
            true,
            TimerEvent::Hello(id.clone()),
        ));
        info!("added interface {:?} with address {}", id, interface.address());
        self.interfaces.insert(id, interface);

        self.start_global_timers();
        self.update_router_id();
        self.process_changes();
        Ok(())
    }

    /// Removes an interface together with every link sensed on it
    pub fn remove_interface(&mut self, now: u64, id: &T::InterfaceId) -> Result<InterfaceConfig<T>, RouterError<T>> {
        self.now = now;
        let Some(interface) = self.interfaces.remove(id) else {
            return Err(RouterError::UnknownInterface(id.clone()));
        };
        for timer in [interface.hello_timer, interface.buffer_timer].into_iter().flatten() {
            self.timers.stop(timer);
        }
        let keys: Vec<LinkKey<T>> = self
            .links
            .keys()
            .filter(|key| key.interface == *id)
            .cloned()
            .collect();
        for key in keys {
            self.delete_link(&key);
        }
        info!("removed interface {:?}", id);

        self.update_router_id();
        self.stop_orphaned_timers();
        self.process_changes();
        Ok(interface.config)
    }

    /// Pins the router id, `None` goes back to deriving it from the first interface
    pub fn set_router_id(&mut self, now: u64, id: Option<T::Address>) {
        self.now = now;
        self.pinned_id = id;
        self.update_router_id();
        self.stop_orphaned_timers();
        self.process_changes();
    }

    /// Addresses that identify this router: the router id and every interface address
    pub fn local_addresses(&self) -> BTreeSet<T::Address> {
        self.interfaces
            .values()
            .map(|i| i.address())
            .chain(self.router_id)
            .collect()
    }

    pub(crate) fn is_local_address(&self, addr: &T::Address) -> bool {
        self.router_id.as_ref() == Some(addr) || self.interfaces.values().any(|i| i.address() == *addr)
    }

    fn update_router_id(&mut self) {
        let id = match self.interfaces.values().next() {
            None => None,
            Some(first) => Some(self.pinned_id.unwrap_or_else(|| first.address())),
        };
        if id == self.router_id {
            return;
        }
        match id {
            Some(id) => info!("router id is now {}", json!(id)),
            None => info!("no usable address left, dropping the router id"),
        }
        self.router_id = id;
        self.topology.set_local(id);
        if let Some(local) = self.topology.local() {
            if let Some(vertex) = self.topology.vertex_mut(local) {
                vertex.ansn = self.ansn;
            }
        }
        let neighbours: Vec<T::Address> = self.neighbours.keys().copied().collect();
        for neighbour in neighbours {
            self.neighbour_cost_may_have_changed(&neighbour);
        }
        self.changes.topology = true;
        self.changes.neighbourhood = true;
    }

    // endregion

    // region Announcements

    /// Adds a network to the HNA announcements, returns false if it was already announced
    pub fn announce_prefix(&mut self, prefix: Prefix<T::Address>) -> bool {
        if self.hna.contains(&prefix) {
            return false;
        }
        info!("announcing {prefix}");
        self.hna.push(prefix);
        true
    }

    pub fn withdraw_prefix(&mut self, prefix: &Prefix<T::Address>) -> bool {
        let before = self.hna.len();
        self.hna.retain(|p| p != prefix);
        before != self.hna.len()
    }

    pub fn announced_prefixes(&self) -> &[Prefix<T::Address>] {
        &self.hna
    }

    // endregion

    // region Message handlers

    /// Registers a handler for received messages, called after the built-in processing
    pub fn register_handler(&mut self, filter: MessageFilter, handler: Box<dyn MessageHandler<T>>) {
        self.handlers.push((filter, handler));
    }

    pub(crate) fn dispatch(&mut self, message: &InboundMessage<'_, T>) {
        for (filter, handler) in &mut self.handlers {
            if filter.matches(message.header.msg_type) {
                handler.handle(message);
            }
        }
    }

    // endregion

    // region Timers

    fn start_global_timers(&mut self) {
        if !self.global_timers.is_empty() {
            return;
        }
        let now = self.now;
        let p = &self.params;
        let timers = [
            (millis(p.tc_interval), MESSAGE_JITTER, TimerEvent::Tc),
            (millis(p.mid_interval), MESSAGE_JITTER, TimerEvent::Mid),
            (millis(p.hna_interval), MESSAGE_JITTER, TimerEvent::Hna),
            (millis(p.lq_period), 0, TimerEvent::LqPeriod),
            (millis(p.dup_hold_time), 0, TimerEvent::DuplicateSweep),
        ];
        for (period, jitter, event) in timers {
            let id = self.timers.start(now, period.max(1), jitter, true, event);
            self.global_timers.push(id);
        }
    }

    /// Fires every timer due at `now` and processes the resulting changes
    pub fn tick(&mut self, now: u64) {
        self.now = now;
        while let Some((_, event)) = self.timers.pop_due(now) {
            trace!("timer {:?}", event);
            self.handle_timer(event);
            self.stop_orphaned_timers();
        }
        self.process_changes();
    }

    fn handle_timer(&mut self, event: TimerEvent<T>) {
        match event {
            TimerEvent::Hello(interface) => self.generate_hello(&interface),
            TimerEvent::Tc => self.generate_tc(),
            TimerEvent::Mid => self.generate_mid(),
            TimerEvent::Hna => self.generate_hna(),
            TimerEvent::LqPeriod => self.lq_period_elapsed(),
            TimerEvent::DuplicateSweep => {
                let hold = millis(self.params.dup_hold_time);
                self.duplicates.expire(self.now, hold);
            }
            TimerEvent::LinkLoss(key) => self.link_hello_lost(&key),
            TimerEvent::LinkSym(key) => self.link_sym_expired(&key),
            TimerEvent::LinkExpiry(key) => {
                if let Some(link) = self.links.get_mut(&key) {
                    link.link_timer = None;
                }
                info!("link {} on {:?} timed out", key.remote, key.interface);
                self.delete_link(&key);
            }
            TimerEvent::VertexExpiry(addr) => self.tc_expired(&addr),
            TimerEvent::EdgeGc(addr) => self.edge_gc(&addr),
            TimerEvent::MidExpiry(addr) => self.mid_expired(&addr),
            TimerEvent::HnaExpiry(addr) => self.hna_expired(&addr),
            TimerEvent::SpfBackoff => {
                self.spf_backoff_timer = None;
                if self.spf_pending {
                    self.calculate_routing_table(true);
                }
            }
            TimerEvent::BufferFlush(interface) => {
                if let Some(iface) = self.interfaces.get_mut(&interface) {
                    iface.buffer_timer = None;
                }
                self.flush_interface(&interface);
            }
        }
    }

    pub(crate) fn stop_orphaned_timers(&mut self) {
        for id in self.topology.take_orphaned_timers() {
            self.timers.stop(id);
        }
    }

    // endregion

    // region Outbound

    pub(crate) fn next_message_seqno(&mut self) -> u16 {
        let seqno = self.msg_seqno;
        increment(&mut self.msg_seqno);
        seqno
    }

    /// Builds a message originated by this router and queues it on `targets`
    pub(crate) fn originate(
        &mut self,
        body: MessageBody<T::Address>,
        validity: Duration,
        ttl: u8,
        targets: Vec<T::InterfaceId>,
    ) {
        let Some(originator) = self.router_id else {
            return;
        };
        let header = MessageHeader {
            msg_type: body.msg_type(),
            vtime: encode_vtime(validity),
            size: 0,
            originator,
            ttl,
            hop_count: 0,
            seqno: self.next_message_seqno(),
        };
        let data = match body.encode(&header, self.metric.as_ref()) {
            Ok(data) => data,
            Err(err) => {
                warn!("could not encode message type {}: {err}", header.msg_type);
                return;
            }
        };
        for target in targets {
            if let Err(err) = self.queue_message(&target, &data) {
                warn!("dropping message type {} on {:?}: {err}", header.msg_type, target);
            }
        }
    }

    /// Appends an encoded message to the outbound buffer of an interface. A full buffer is
    /// flushed first, the flush timer is armed for the rest.
    pub(crate) fn queue_message(&mut self, interface: &T::InterfaceId, message: &[u8]) -> Result<(), RouterError<T>> {
        let iface = self
            .interfaces
            .get_mut(interface)
            .ok_or_else(|| RouterError::UnknownInterface(interface.clone()))?;
        let capacity = iface.buffer.capacity();
        if message.len() > capacity {
            return Err(RouterError::MessageTooLarge {
                size: message.len(),
                capacity,
            });
        }
        if !iface.buffer.push(message) {
            self.flush_interface(interface);
            let iface = self
                .interfaces
                .get_mut(interface)
                .ok_or_else(|| RouterError::UnknownInterface(interface.clone()))?;
            iface.buffer.push(message);
        }
        let delay = millis(self.params.max_forward_delay);
        if let Some(iface) = self.interfaces.get_mut(interface) {
            if iface.buffer_timer.is_none() {
                iface.buffer_timer = Some(self.timers.start(
                    self.now,
                    delay,
                    0,
                    false,
                    TimerEvent::BufferFlush(interface.clone()),
                ));
            }
        }
        Ok(())
    }

    /// Frames the pending messages of an interface into a datagram
    pub(crate) fn flush_interface(&mut self, interface: &T::InterfaceId) {
        let Some(iface) = self.interfaces.get_mut(interface) else {
            return;
        };
        if let Some(timer) = iface.buffer_timer.take() {
            self.timers.stop(timer);
        }
        if !iface.buffer.has_pending() {
            return;
        }
        let messages = iface.buffer.take();
        let seqno = iface.packet_seqno;
        increment(&mut iface.packet_seqno);
        match encode_packet(seqno, &messages) {
            Ok(data) => self.outbound_packets.push(OutboundPacket {
                interface: interface.clone(),
                data,
            }),
            Err(err) => warn!("could not frame packet for {:?}: {err}", interface),
        }
    }

    // endregion

    // region Route calculation

    /// Runs the work collected while handling input: MPR selection after neighbourhood
    /// changes, route calculation after any change
    pub fn process_changes(&mut self) {
        let changes = std::mem::take(&mut self.changes);
        if changes.neighbourhood {
            self.update_mprs();
        }
        if changes.neighbourhood || changes.topology {
            self.calculate_routing_table(false);
        }
    }

    fn update_mprs(&mut self) {
        let selected = mpr::select_mprs(&self.neighbours, &self.local_addresses());
        for neighbour in self.neighbours.values_mut() {
            let is_mpr = selected.contains(&neighbour.addr);
            if neighbour.is_mpr != is_mpr {
                debug!("{} is {} an MPR", neighbour.addr, if is_mpr { "now" } else { "no longer" });
                neighbour.is_mpr = is_mpr;
            }
        }
    }

    fn spf_seeds(&self) -> Vec<(T::Address, NextHop<T>)> {
        self.neighbours
            .values()
            .filter(|n| n.is_sym)
            .filter_map(|n| {
                let key = n.best_link.as_ref()?;
                Some((
                    n.addr,
                    NextHop {
                        gateway: key.remote,
                        interface: key.interface.clone(),
                    },
                ))
            })
            .collect()
    }

    /// Recomputes shortest paths and queues the resulting kernel operations. Unless forced,
    /// a run within the backoff period of the previous one is postponed until it ends.
    pub fn calculate_routing_table(&mut self, force: bool) {
        if !force && self.spf_backoff_timer.is_some() {
            self.spf_pending = true;
            return;
        }
        self.spf_pending = false;

        let seeds = self.spf_seeds();
        let settled = spf::run_spf(&mut self.topology, &seeds);
        let local = self.topology.local();

        self.routes.begin();
        for id in settled {
            if Some(id) == local {
                continue;
            }
            let Some(vertex) = self.topology.vertex(id) else {
                continue;
            };
            let Some(next_hop) = &vertex.next_hop else {
                continue;
            };
            let metric = RouteMetric {
                cost: vertex.path_cost,
                hops: vertex.hops,
            };
            self.routes
                .insert_path(Prefix::host(vertex.addr), vertex.addr, metric, next_hop.clone());
            for (prefix, _) in &vertex.prefixes {
                self.routes
                    .insert_path(*prefix, vertex.addr, metric, next_hop.clone());
            }
        }

        let ops = self.routes.reconcile(self.params.fib_metric);
        for op in &ops {
            debug!(
                "{:?} {} via {} on {:?} metric {}",
                op.op, op.prefix, op.next_hop.gateway, op.next_hop.interface, op.metric
            );
        }
        self.kernel_ops.extend(ops);

        self.timers.set(
            self.now,
            &mut self.spf_backoff_timer,
            millis(self.params.spf_backoff),
            self.params.spf_backoff_jitter,
            false,
            TimerEvent::SpfBackoff,
        );
    }

    /// The kernel collaborator could not apply an operation. Nothing is retried.
    pub fn report_kernel_failure(&self, op: &KernelOp<T>, reason: &str) {
        warn!(
            "kernel refused {:?} of {} via {}: {reason}",
            op.op, op.prefix, op.next_hop.gateway
        );
    }

    // endregion

    pub fn snapshot(&self) -> RouterSnapshot<T> {
        let edges = self
            .topology
            .edges()
            .filter_map(|(id, edge)| {
                let owner = self.topology.vertex(edge.owner)?;
                Some(EdgeView {
                    from: owner.addr,
                    to: edge.dest,
                    cost: self.topology.effective_cost(id),
                    is_virtual: edge.is_virtual,
                })
            })
            .collect();
        RouterSnapshot {
            router_id: self.router_id,
            links: self
                .links
                .iter()
                .map(|(key, link)| (key.clone(), link.clone()))
                .collect(),
            neighbours: self.neighbours.values().cloned().collect(),
            edges,
            routes: self.routes.iter().map(|(_, entry)| entry.clone()).collect(),
        }
    }
}
