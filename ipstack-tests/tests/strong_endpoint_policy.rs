//! `ip_output` rejects a source address that doesn't match the egress
//! interface's own unicast address — spec.md §8's strong-endpoint policy
//! scenario.

use std::sync::Arc;

use ipstack_core::NetDevice;
use ipstack_drivers::DummyDevice;
use ipstack_proto::Stack;
use ipstack_types::{IpProtocol, Ipv4Addr, NetError};

#[test]
fn mismatched_source_address_is_rejected() {
    let stack = Stack::new();
    let dev = DummyDevice::new("dummy0");
    let dev_index = stack.register_device(Arc::clone(&dev) as Arc<dyn NetDevice>).unwrap();

    let our_addr = Ipv4Addr([10, 0, 0, 1]);
    stack.add_iface(dev_index, our_addr, Ipv4Addr([255, 255, 255, 0])).unwrap();
    stack.run().unwrap();

    let wrong_src = Ipv4Addr([10, 0, 0, 99]);
    let dst = Ipv4Addr([10, 0, 0, 2]);
    let err = stack.ip_output(IpProtocol::Udp.as_u8(), &[1, 2, 3], wrong_src, dst).unwrap_err();
    assert_eq!(err, NetError::UnableToOutputWithSource);

    // The correct source for this interface is accepted.
    stack.ip_output(IpProtocol::Udp.as_u8(), &[1, 2, 3], our_addr, dst).unwrap();

    // An unspecified source lets the stack pick the egress unicast address.
    stack.ip_output(IpProtocol::Udp.as_u8(), &[1, 2, 3], Ipv4Addr::UNSPECIFIED, dst).unwrap();

    assert_eq!(dev.take_captured().len(), 2);
    stack.shutdown().unwrap();
}
