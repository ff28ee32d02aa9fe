//! Network device abstraction: the [`NetDevice`] trait, a fixed-capacity
//! registry, and per-device interface attachment.
//!
//! Grounded in the teaching stack's `drivers::net::netdev` module. The trait
//! shape — `&self` methods with interior mutability, so `tx`/`poll_rx` never
//! need `&mut` through a shared handle — is carried over unchanged; the
//! registry itself drops the raw-pointer `DeviceHandle` trick (that existed
//! to dodge the kernel's global-lock discipline) in favor of `Arc<dyn
//! NetDevice>`, since a userspace process pays nothing extra for atomic
//! refcounting and an `Arc` clone is exactly as "stable" as the teaching
//! stack's raw pointer without the `unsafe impl Send`/`Sync` it required.

use std::fmt;
use std::sync::Arc;

use ipstack_sync::Mutex;
use ipstack_types::{DevIndex, Ipv4Addr, MacAddr, NetError};

/// Maximum number of simultaneously registered network devices.
pub const MAX_DEVICES: usize = 8;

bitflags::bitflags! {
    /// Administrative/operational flags on a device, mirrored from the
    /// `drivers::net::netdev` feature-flag idiom.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct DeviceFlags: u32 {
        /// Device is administratively up. `open`/`close` toggle this;
        /// `output` rejects transmission when it is clear.
        const UP = 1 << 0;
        /// Device requires ARP resolution before transmission (Ethernet).
        /// Clear for devices like loopback that need no link-layer resolve.
        const NEEDS_ARP = 1 << 1;
        /// Device broadcasts are delivered to all interfaces sharing its
        /// hardware broadcast address (Ethernet); unused by loopback.
        const BROADCAST = 1 << 2;
    }
}

/// Abstraction for a network device (TAP, loopback, dummy sink).
///
/// All methods take `&self`; implementations use interior mutability for
/// mutable internal state. `transmit` may be called concurrently with
/// `poll_rx` running on the input thread.
pub trait NetDevice: Send + Sync {
    /// Device name, e.g. `net0`.
    fn name(&self) -> &str;

    /// Hardware (MAC) address, or [`MacAddr::ZERO`] for non-Ethernet links.
    fn mac(&self) -> MacAddr;

    /// Maximum transmission unit in bytes (payload only).
    fn mtu(&self) -> u16;

    /// Static capability/administrative flags this device was constructed
    /// with (`NEEDS_ARP`, `BROADCAST`). `UP` is tracked by the registry, not
    /// reported here.
    fn flags(&self) -> DeviceFlags;

    /// Open the device for I/O. Called once by `Stack::run`, never by
    /// application code directly.
    fn open(&self) -> Result<(), NetError>;

    /// Close the device. Called once by `Stack::shutdown`.
    fn close(&self) -> Result<(), NetError>;

    /// Transmit one frame/packet with the given link-layer destination
    /// address (already resolved by the caller, e.g. via ARP).
    fn transmit(&self, ethertype: u16, bytes: &[u8], dst: MacAddr) -> Result<(), NetError>;
}

impl fmt::Debug for dyn NetDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NetDevice({}, mac={})", self.name(), self.mac())
    }
}

/// An IPv4 interface attached to a device: unicast address, netmask, and the
/// derived directed-broadcast address.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Iface {
    pub unicast: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub broadcast: Ipv4Addr,
}

impl Iface {
    pub fn new(unicast: Ipv4Addr, netmask: Ipv4Addr) -> Self {
        Self {
            unicast,
            netmask,
            broadcast: Ipv4Addr::broadcast_of(unicast, netmask),
        }
    }
}

/// One registry slot: a device, its administrative flags, and its attached
/// IPv4 interface (at most one — `add_iface` rejects a second attachment for
/// the same family, per spec.md's "one family per device" rule).
struct Slot {
    dev: Arc<dyn NetDevice>,
    up: bool,
    iface: Option<Iface>,
}

/// Registry of registered network devices and their attached interfaces.
///
/// Mutation happens at startup (registration, interface attachment) from a
/// single thread and, for `open`/`close`, from `Stack::run`/`shutdown`.
/// Lookups (`output`, `get_iface`, `mac_of`) happen continuously from the
/// dispatch and timer threads — all under one mutex, matching spec.md's
/// description of the device list as process-wide state.
pub struct DeviceRegistry {
    slots: Mutex<Vec<Option<Slot>>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        let mut slots = Vec::with_capacity(MAX_DEVICES);
        slots.resize_with(MAX_DEVICES, || None);
        Self {
            slots: Mutex::new(slots),
        }
    }

    /// Register a device, assigning the next available index. Returns
    /// `None` if all `MAX_DEVICES` slots are occupied (spec.md's `alloc()`
    /// returning no free device).
    pub fn register(&self, dev: Arc<dyn NetDevice>) -> Option<DevIndex> {
        let mut slots = self.slots.lock();
        for (i, slot) in slots.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(Slot {
                    dev,
                    up: false,
                    iface: None,
                });
                return Some(DevIndex(i));
            }
        }
        None
    }

    /// Open every registered device, setting `UP`. Called once by
    /// `Stack::run`; never by application code.
    pub fn open_all(&self) -> Result<(), NetError> {
        let mut slots = self.slots.lock();
        for slot in slots.iter_mut().flatten() {
            slot.dev.open()?;
            slot.up = true;
        }
        Ok(())
    }

    /// Close every registered device, clearing `UP`. Called once by
    /// `Stack::shutdown`.
    pub fn close_all(&self) -> Result<(), NetError> {
        let mut slots = self.slots.lock();
        for slot in slots.iter_mut().flatten() {
            slot.dev.close()?;
            slot.up = false;
        }
        Ok(())
    }

    /// Attach an IPv4 interface to a device. Rejects a second attachment
    /// (duplicate family) for the same device.
    pub fn add_iface(&self, index: DevIndex, iface: Iface) -> Result<(), NetError> {
        let mut slots = self.slots.lock();
        let slot = slots
            .get_mut(index.0)
            .and_then(|s| s.as_mut())
            .ok_or(NetError::InvalidArgument)?;
        if slot.iface.is_some() {
            return Err(NetError::AddressInUse);
        }
        slot.iface = Some(iface);
        Ok(())
    }

    /// The IPv4 interface bound to a device, if any.
    pub fn get_iface(&self, index: DevIndex) -> Option<Iface> {
        self.slots.lock().get(index.0)?.as_ref()?.iface
    }

    /// All `(DevIndex, Iface)` pairs with an attached IPv4 interface, for
    /// route resolution and output source-address selection.
    pub fn ifaces(&self) -> Vec<(DevIndex, Iface)> {
        self.slots
            .lock()
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| {
                let slot = slot.as_ref()?;
                let iface = slot.iface?;
                Some((DevIndex(i), iface))
            })
            .collect()
    }

    pub fn mac_of(&self, index: DevIndex) -> Option<MacAddr> {
        Some(self.slots.lock().get(index.0)?.as_ref()?.dev.mac())
    }

    pub fn mtu_of(&self, index: DevIndex) -> Option<u16> {
        Some(self.slots.lock().get(index.0)?.as_ref()?.dev.mtu())
    }

    pub fn flags_of(&self, index: DevIndex) -> Option<DeviceFlags> {
        Some(self.slots.lock().get(index.0)?.as_ref()?.dev.flags())
    }

    /// Transmit a packet through a device identified by index.
    ///
    /// Rejects transmission if the device is down or the payload exceeds
    /// its MTU, matching spec.md 4.2's `output()` contract exactly.
    pub fn output(
        &self,
        index: DevIndex,
        ethertype: u16,
        bytes: &[u8],
        dst: MacAddr,
    ) -> Result<(), NetError> {
        let slots = self.slots.lock();
        let slot = slots
            .get(index.0)
            .and_then(|s| s.as_ref())
            .ok_or(NetError::DeviceDown)?;
        if !slot.up {
            return Err(NetError::DeviceDown);
        }
        if bytes.len() > slot.dev.mtu() as usize {
            return Err(NetError::MessageTooLong);
        }
        slot.dev.transmit(ethertype, bytes, dst)
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
