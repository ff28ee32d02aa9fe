//! UDP round trip between two PCBs on the same `Stack`, routed out and back
//! in through the loopback device — spec.md §8's UDP echo scenario.

use std::sync::Arc;

use ipstack_core::NetDevice;
use ipstack_drivers::LoopbackDevice;
use ipstack_proto::Stack;
use ipstack_types::{Endpoint, Ipv4Addr, Port};

#[test]
fn datagram_sent_to_a_bound_peer_is_delivered_and_echoed_back() {
    let stack = Stack::new();
    let dev = LoopbackDevice::new("lo");
    let dev_index = stack.register_device(Arc::clone(&dev) as Arc<dyn NetDevice>).unwrap();
    let stack_bind = Arc::clone(&stack);
    dev.bind(Arc::new(move |ethertype, bytes| stack_bind.link_input(dev_index, ethertype, bytes)));

    stack
        .add_iface(dev_index, Ipv4Addr::LOCALHOST, Ipv4Addr([255, 0, 0, 0]))
        .unwrap();
    stack.run().unwrap();

    let server = stack.udp_open().unwrap();
    let server_ep = Endpoint::new(Ipv4Addr::LOCALHOST, Port::new(9000));
    stack.udp_bind(server, server_ep).unwrap();

    let client = stack.udp_open().unwrap();
    stack
        .udp_bind(client, Endpoint::new(Ipv4Addr::LOCALHOST, Port::new(9001)))
        .unwrap();

    stack.udp_sendto(client, b"hello", server_ep).unwrap();

    let mut buf = [0u8; 64];
    let (n, from) = stack.udp_recvfrom(server, &mut buf).unwrap();
    assert_eq!(&buf[..n], b"hello");
    assert_eq!(from.port, Port::new(9001));

    stack.udp_sendto(server, b"hello back", from).unwrap();
    let (n, from2) = stack.udp_recvfrom(client, &mut buf).unwrap();
    assert_eq!(&buf[..n], b"hello back");
    assert_eq!(from2, server_ep);

    stack.udp_close(server);
    stack.udp_close(client);
    stack.shutdown().unwrap();
}

#[test]
fn sendto_without_bind_assigns_an_ephemeral_source_port() {
    let stack = Stack::new();
    let dev = LoopbackDevice::new("lo");
    let dev_index = stack.register_device(Arc::clone(&dev) as Arc<dyn NetDevice>).unwrap();
    let stack_bind = Arc::clone(&stack);
    dev.bind(Arc::new(move |ethertype, bytes| stack_bind.link_input(dev_index, ethertype, bytes)));

    stack
        .add_iface(dev_index, Ipv4Addr::LOCALHOST, Ipv4Addr([255, 0, 0, 0]))
        .unwrap();
    stack.run().unwrap();

    let server = stack.udp_open().unwrap();
    let server_ep = Endpoint::new(Ipv4Addr::LOCALHOST, Port::new(9100));
    stack.udp_bind(server, server_ep).unwrap();

    let client = stack.udp_open().unwrap();
    stack.udp_sendto(client, b"ping", server_ep).unwrap();

    let mut buf = [0u8; 64];
    let (n, from) = stack.udp_recvfrom(server, &mut buf).unwrap();
    assert_eq!(&buf[..n], b"ping");
    assert!(from.port.as_u16() >= Port::EPHEMERAL_START);

    stack.udp_close(server);
    stack.udp_close(client);
    stack.shutdown().unwrap();
}
