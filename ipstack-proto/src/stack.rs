//! `Stack` — the single owned value that wires the device registry,
//! dispatcher, IRQ controller, timer service, routing table, ARP cache, and
//! the UDP/TCP PCB tables together.
//!
//! Grounded in this repository's own DESIGN NOTES resolution of spec.md §9
//! ("Global mutable registries ... encapsulate as a single `Stack` value
//! that owns all tables and mutexes"): the teaching stack keeps every one
//! of these as a file-scope `static`/global, reached for directly by every
//! module (`drivers::net::{NET_DEVICES, IP_IFACES, ...}`). One owned value
//! built once by `ipstack-cli::main` and handed to driver threads as an
//! `Arc` gets the same "exactly one instance, reachable from everywhere it
//! needs to be" property without hiding that fact behind language-level
//! global state.

use std::sync::Arc;
use std::time::Duration;

use ipstack_core::{DeviceRegistry, Dispatcher, IrqController, IrqFlags, Iface, NetDevice, TimerService};
use ipstack_sync::{klog_debug, klog_info, Mutex};
use ipstack_types::{DevIndex, IpProtocol, Ipv4Addr, MacAddr, NetError, ETHERTYPE_ARP, ETHERTYPE_IPV4};

use crate::arp::ArpCache;
use crate::ip::new_ip_id_counter;
use crate::route::{Route, RouteTable};
use crate::tcp::TcpTable;
use crate::udp::UdpTable;

/// IRQ line the softirq worker drains protocol input queues on. Every
/// device's link-input callback raises this line after handing a frame to
/// the dispatcher (spec.md 4.4).
pub const IRQ_LINK_INPUT: u8 = 0;
/// IRQ line the one-second wall-clock tick raises to run due timers
/// (spec.md 4.5) — currently only ARP aging (spec.md 4.6) is registered.
pub const IRQ_TIMER_TICK: u8 = 1;

pub struct Stack {
    pub(crate) devices: DeviceRegistry,
    pub(crate) routes: RouteTable,
    pub(crate) arp: ArpCache,
    pub(crate) udp: UdpTable,
    pub(crate) tcp: TcpTable,
    pub(crate) ip_id: Mutex<u16>,
    dispatcher: Dispatcher,
    irq: Arc<IrqController>,
    timers: TimerService,
}

impl Stack {
    /// Construct a `Stack` with every table empty and every handler wired:
    /// ARP/IP protocol registration, the softirq drain binding, the timer
    /// tick binding, and the ARP aging timer. No devices are registered and
    /// nothing is opened yet — that is `register_device`/`add_iface` and
    /// `run`'s job.
    pub fn new() -> Arc<Self> {
        let stack = Arc::new(Self {
            devices: DeviceRegistry::new(),
            routes: RouteTable::new(),
            arp: ArpCache::new(),
            udp: UdpTable::new(),
            tcp: TcpTable::new(),
            ip_id: new_ip_id_counter(),
            dispatcher: Dispatcher::new(),
            irq: Arc::new(IrqController::new()),
            timers: TimerService::new(),
        });
        stack.init();
        stack
    }

    fn init(self: &Arc<Self>) {
        let arp_target = Arc::clone(self);
        self.dispatcher
            .protocol_register(ETHERTYPE_ARP, move |entry| arp_target.arp_input(entry.dev, &entry.bytes));

        let ip_target = Arc::clone(self);
        self.dispatcher
            .protocol_register(ETHERTYPE_IPV4, move |entry| ip_target.ip_input(entry.dev, &entry.bytes));

        let drain_target = Arc::clone(self);
        self.irq.request_irq(IRQ_LINK_INPUT, IrqFlags::empty(), "softirq-drain", move || {
            drain_target.dispatcher.drain()
        });

        let timer_target = Arc::clone(self);
        self.irq.request_irq(IRQ_TIMER_TICK, IrqFlags::empty(), "timer-tick", move || {
            timer_target.timers.tick()
        });

        let age_target = Arc::clone(self);
        self.timers.timer_register(1, "arp-age", move || age_target.arp.age());
    }

    /// Register a device, assigning it the next available [`DevIndex`].
    pub fn register_device(&self, dev: Arc<dyn NetDevice>) -> Option<DevIndex> {
        self.devices.register(dev)
    }

    /// Attach an IPv4 interface to `dev` and install the directly-connected
    /// route spec.md §3 describes ("Routes are added on interface
    /// registration").
    pub fn add_iface(&self, dev: DevIndex, unicast: Ipv4Addr, netmask: Ipv4Addr) -> Result<(), NetError> {
        let iface = Iface::new(unicast, netmask);
        self.devices.add_iface(dev, iface)?;
        self.routes.add(Route {
            network: Ipv4Addr::from_u32_be(unicast.to_u32_be() & netmask.to_u32_be()),
            netmask,
            nexthop: Ipv4Addr::UNSPECIFIED,
            dev,
        });
        klog_info!("ipstack-proto: {} attached to dev {dev}", iface.unicast);
        Ok(())
    }

    /// Install the default route `(0.0.0.0, 0.0.0.0, gw, dev)` (spec.md §3).
    pub fn set_default_gateway(&self, gw: Ipv4Addr, dev: DevIndex) {
        self.routes.add(Route {
            network: Ipv4Addr::UNSPECIFIED,
            netmask: Ipv4Addr::UNSPECIFIED,
            nexthop: gw,
            dev,
        });
        klog_info!("ipstack-proto: default gateway {gw} via dev {dev}");
    }

    pub fn routes(&self) -> Vec<Route> {
        self.routes.all()
    }

    /// Install a permanent, aging-exempt ARP entry (administrative static
    /// ARP — not exercised by spec.md's scenarios but a natural extension
    /// of the `STATIC` cache state it already defines).
    pub fn arp_insert_static(&self, pa: Ipv4Addr, ha: MacAddr, dev: DevIndex) {
        self.arp.insert_static(pa, ha, dev);
    }

    /// Link input path. Every device's own input thread invokes this from
    /// its ISR (spec.md §6, "device driver contract"): hand the frame to
    /// the dispatcher and, if a protocol accepted it, raise the softirq so
    /// it gets drained on the interrupt thread rather than the caller's.
    pub fn link_input(&self, dev: DevIndex, ethertype: u16, bytes: &[u8]) {
        if self.dispatcher.input_handler(ethertype, bytes, dev) {
            self.irq.raise_irq(IRQ_LINK_INPUT);
        }
    }

    /// `run()`: open every registered device, spawn the interrupt thread,
    /// and spawn the one-second wall-clock tick thread that drives the
    /// timer service. Idempotent only in the sense that a second call will
    /// fail at `open_all` (devices are already up) — matches spec.md 4.2's
    /// "`run()` opens all; neither is called by application code".
    pub fn run(self: &Arc<Self>) -> Result<(), NetError> {
        self.devices.open_all()?;
        self.irq.spawn();

        let tick_target = Arc::clone(self);
        std::thread::Builder::new()
            .name("ipstack-clock".into())
            .spawn(move || loop {
                std::thread::sleep(Duration::from_secs(1));
                tick_target.irq.raise_irq(IRQ_TIMER_TICK);
            })
            .expect("spawn clock thread");

        klog_info!("ipstack-proto: stack running");
        Ok(())
    }

    /// `shutdown()`: close every device and stop the interrupt thread.
    pub fn shutdown(&self) -> Result<(), NetError> {
        self.devices.close_all()?;
        self.irq.stop();
        klog_info!("ipstack-proto: stack shut down");
        Ok(())
    }

    /// Publish the global interrupt event (spec.md 4.9/4.10 "Event
    /// fan-out"): every live UDP and TCP PCB's context is interrupted,
    /// unblocking sleepers with `EINTR`. `ipstack-cli` wires this to SIGINT.
    pub fn interrupt_all(&self) {
        self.udp.interrupt_all();
        self.tcp.interrupt_all();
    }

    /// Dispatch a validated IP payload to the matching upper-layer
    /// protocol handler (spec.md 4.7, "Dispatch by protocol number").
    /// Unknown protocol numbers are a policy drop (spec.md §7), not logged
    /// above debug.
    pub(crate) fn dispatch_upper(&self, protocol: u8, payload: &[u8], src: Ipv4Addr, dst: Ipv4Addr, _dev: DevIndex) {
        match IpProtocol::from_u8(protocol) {
            Some(IpProtocol::Icmp) => self.icmp_input(payload, src, dst),
            Some(IpProtocol::Udp) => self.udp_input(payload, src, dst),
            Some(IpProtocol::Tcp) => self.tcp_input(payload, src, dst),
            None => klog_debug!("ipstack-proto: ip_input drop — unknown protocol {protocol}"),
        }
    }
}
