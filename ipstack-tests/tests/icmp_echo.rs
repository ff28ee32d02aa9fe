//! End-to-end ICMP echo/echo-reply through a running `Stack`, spec.md §8's
//! loopback-ICMP-echo scenario (played here through a capturing dummy
//! device instead of a real loopback interface, since what's under test is
//! the protocol logic, not a particular device).

use std::sync::Arc;
use std::time::Duration;

use ipstack_core::NetDevice;
use ipstack_drivers::DummyDevice;
use ipstack_proto::Stack;
use ipstack_types::{IpProtocol, Ipv4Addr, ETHERTYPE_IPV4};

use ipstack_tests::{build_icmp_echo, build_ipv4, ip_payload, wait_until};

#[test]
fn echo_request_yields_echo_reply_with_same_payload() {
    let stack = Stack::new();
    let dev = DummyDevice::new("dummy0");
    let dev_index = stack.register_device(Arc::clone(&dev) as Arc<dyn NetDevice>).unwrap();
    let stack_bind = Arc::clone(&stack);
    dev.bind(Arc::new(move |ethertype, bytes| stack_bind.link_input(dev_index, ethertype, bytes)));

    let our_addr = Ipv4Addr([10, 0, 0, 1]);
    let peer_addr = Ipv4Addr([10, 0, 0, 2]);
    stack.add_iface(dev_index, our_addr, Ipv4Addr([255, 255, 255, 0])).unwrap();
    stack.run().unwrap();

    let echo = build_icmp_echo(0x1234, 1, b"ping-payload");
    let datagram = build_ipv4(IpProtocol::Icmp, peer_addr, our_addr, &echo);
    dev.inject(ETHERTYPE_IPV4, &datagram);

    let frame = wait_until(Duration::from_secs(1), || dev.take_captured().into_iter().next());
    assert_eq!(frame.ethertype, ETHERTYPE_IPV4);

    let reply_icmp = ip_payload(&frame.bytes);
    assert_eq!(reply_icmp[0], 0, "echo reply type");
    assert_eq!(reply_icmp[1], 0, "code copied verbatim");
    assert_eq!(&reply_icmp[4..6], &0x1234u16.to_be_bytes(), "identifier copied verbatim");
    assert_eq!(&reply_icmp[8..], b"ping-payload");

    // The reply's IP header must swap source and destination.
    assert_eq!(&frame.bytes[12..16], our_addr.as_bytes());
    assert_eq!(&frame.bytes[16..20], peer_addr.as_bytes());

    stack.shutdown().unwrap();
}

#[test]
fn malformed_checksum_is_dropped_silently() {
    let stack = Stack::new();
    let dev = DummyDevice::new("dummy0");
    let dev_index = stack.register_device(Arc::clone(&dev) as Arc<dyn NetDevice>).unwrap();
    let stack_bind = Arc::clone(&stack);
    dev.bind(Arc::new(move |ethertype, bytes| stack_bind.link_input(dev_index, ethertype, bytes)));

    let our_addr = Ipv4Addr([10, 0, 0, 1]);
    let peer_addr = Ipv4Addr([10, 0, 0, 2]);
    stack.add_iface(dev_index, our_addr, Ipv4Addr([255, 255, 255, 0])).unwrap();
    stack.run().unwrap();

    let mut echo = build_icmp_echo(1, 1, b"x");
    echo[2] ^= 0xff; // corrupt the checksum
    let datagram = build_ipv4(IpProtocol::Icmp, peer_addr, our_addr, &echo);
    dev.inject(ETHERTYPE_IPV4, &datagram);

    std::thread::sleep(Duration::from_millis(200));
    assert!(dev.take_captured().is_empty());

    stack.shutdown().unwrap();
}
