//! End-to-end ARP request/reply through a running `Stack`, spec.md §8's
//! "a request for our address gets a reply" scenario.

use std::sync::Arc;
use std::time::Duration;

use ipstack_core::NetDevice;
use ipstack_drivers::DummyDevice;
use ipstack_proto::{build_request, Stack};
use ipstack_types::{Ipv4Addr, MacAddr, ETHERTYPE_ARP};

use ipstack_tests::wait_until;

#[test]
fn request_for_our_address_yields_a_reply_frame() {
    let stack = Stack::new();
    let dev = DummyDevice::new("dummy0");
    let dev_index = stack.register_device(Arc::clone(&dev) as Arc<dyn NetDevice>).unwrap();
    let stack_bind = Arc::clone(&stack);
    dev.bind(Arc::new(move |ethertype, bytes| stack_bind.link_input(dev_index, ethertype, bytes)));

    let our_addr = Ipv4Addr([10, 0, 0, 1]);
    let peer_addr = Ipv4Addr([10, 0, 0, 2]);
    let peer_mac = MacAddr([2, 0, 0, 0, 0, 2]);
    stack.add_iface(dev_index, our_addr, Ipv4Addr([255, 255, 255, 0])).unwrap();
    stack.run().unwrap();

    let request = build_request(peer_mac, peer_addr, our_addr);
    dev.inject(ETHERTYPE_ARP, &request);

    let frame = wait_until(Duration::from_secs(1), || dev.take_captured().into_iter().next());
    assert_eq!(frame.ethertype, ETHERTYPE_ARP);
    assert_eq!(frame.dst, peer_mac);

    let oper = u16::from_be_bytes([frame.bytes[6], frame.bytes[7]]);
    assert_eq!(oper, 2, "expected an ARP reply");
    let sender_pa = Ipv4Addr([frame.bytes[14], frame.bytes[15], frame.bytes[16], frame.bytes[17]]);
    let target_pa = Ipv4Addr([frame.bytes[24], frame.bytes[25], frame.bytes[26], frame.bytes[27]]);
    assert_eq!(sender_pa, our_addr);
    assert_eq!(target_pa, peer_addr);

    stack.shutdown().unwrap();
}
