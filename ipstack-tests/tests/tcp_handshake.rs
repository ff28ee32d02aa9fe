//! Passive-open three-way handshake and a data transfer afterward, driven
//! by hand-crafted segments through a capturing dummy device — spec.md
//! §8's TCP passive-open scenario.

use std::sync::Arc;
use std::time::Duration;

use ipstack_core::NetDevice;
use ipstack_drivers::DummyDevice;
use ipstack_proto::Stack;
use ipstack_types::{Endpoint, Ipv4Addr, Port, ETHERTYPE_IPV4};

use ipstack_tests::{build_ipv4, build_tcp, ip_payload, wait_until, TcpView, TCP_FLAG_ACK, TCP_FLAG_SYN};

fn next_segment(dev: &Arc<DummyDevice>) -> Vec<u8> {
    let frame = wait_until(Duration::from_secs(1), || dev.take_captured().into_iter().next());
    assert_eq!(frame.ethertype, ETHERTYPE_IPV4);
    ip_payload(&frame.bytes).to_vec()
}

#[test]
fn passive_open_completes_and_carries_data() {
    let stack = Stack::new();
    let dev = DummyDevice::new("dummy0");
    let dev_index = stack.register_device(Arc::clone(&dev) as Arc<dyn NetDevice>).unwrap();
    let stack_bind = Arc::clone(&stack);
    dev.bind(Arc::new(move |ethertype, bytes| stack_bind.link_input(dev_index, ethertype, bytes)));

    let our_addr = Ipv4Addr([10, 0, 0, 1]);
    let peer_addr = Ipv4Addr([10, 0, 0, 2]);
    stack.add_iface(dev_index, our_addr, Ipv4Addr([255, 255, 255, 0])).unwrap();
    stack.run().unwrap();

    let local = Endpoint::new(our_addr, Port::new(7));
    let peer = Endpoint::new(peer_addr, Port::new(55000));

    let server_stack = Arc::clone(&stack);
    let server = std::thread::spawn(move || server_stack.tcp_open_rfc793(local, None, false).unwrap());
    // Give the listener PCB a moment to be allocated before a SYN for it
    // arrives — `tcp_open_rfc793` registers the LISTEN entry synchronously
    // at its start but runs on its own thread, so there is no other
    // observable signal to wait on here.
    std::thread::sleep(Duration::from_millis(50));

    // 1. peer -> SYN
    let syn = build_tcp(peer_addr, peer.port.as_u16(), our_addr, local.port.as_u16(), 1000, 0, TCP_FLAG_SYN, 4096, &[]);
    let datagram = build_ipv4(ipstack_types::IpProtocol::Tcp, peer_addr, our_addr, &syn);
    dev.inject(ETHERTYPE_IPV4, &datagram);

    // 2. our SYN-ACK
    let synack = next_segment(&dev);
    let view = TcpView(&synack);
    assert_eq!(view.flags(), TCP_FLAG_SYN | TCP_FLAG_ACK);
    assert_eq!(view.ack(), 1001);
    let our_iss = view.seq();

    // 3. peer -> ACK, completing the handshake
    let ack = build_tcp(
        peer_addr,
        peer.port.as_u16(),
        our_addr,
        local.port.as_u16(),
        1001,
        our_iss.wrapping_add(1),
        TCP_FLAG_ACK,
        4096,
        &[],
    );
    let datagram = build_ipv4(ipstack_types::IpProtocol::Tcp, peer_addr, our_addr, &ack);
    dev.inject(ETHERTYPE_IPV4, &datagram);

    let id = server.join().unwrap();

    // 4. peer sends data
    let data = build_tcp(
        peer_addr,
        peer.port.as_u16(),
        our_addr,
        local.port.as_u16(),
        1001,
        our_iss.wrapping_add(1),
        TCP_FLAG_ACK,
        4096,
        b"hi there",
    );
    let datagram = build_ipv4(ipstack_types::IpProtocol::Tcp, peer_addr, our_addr, &data);
    dev.inject(ETHERTYPE_IPV4, &datagram);

    // 5. our ACK of the data
    let data_ack = next_segment(&dev);
    assert_eq!(TcpView(&data_ack).flags(), TCP_FLAG_ACK);
    assert_eq!(TcpView(&data_ack).ack(), 1001 + 8);

    let mut buf = [0u8; 64];
    let n = stack.tcp_receive(id, &mut buf).unwrap();
    assert_eq!(&buf[..n], b"hi there");

    stack.tcp_close(id);
    stack.shutdown().unwrap();
}
