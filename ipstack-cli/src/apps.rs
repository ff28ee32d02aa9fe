//! Demo applications driving the socket API surface (spec.md §6 "Application
//! API"). Each runs on its own thread, blocking in the core's `recvfrom`/
//! `open_rfc793`/`receive` the same way a real application would.

use std::sync::Arc;

use ipstack_proto::Stack;
use ipstack_sync::{klog_info, klog_warn};
use ipstack_types::{Endpoint, Ipv4Addr, Port};

/// UDP echo service: replies with exactly the bytes it received, to the
/// sender that sent them.
pub fn spawn_udp_echo(stack: Arc<Stack>, port: u16) {
    std::thread::Builder::new()
        .name("udp-echo".into())
        .spawn(move || {
            let id = match stack.udp_open() {
                Ok(id) => id,
                Err(e) => {
                    klog_warn!("ipstack-cli: udp-echo: open failed: {e}");
                    return;
                }
            };
            let local = Endpoint::new(Ipv4Addr::UNSPECIFIED, Port::new(port));
            if let Err(e) = stack.udp_bind(id, local) {
                klog_warn!("ipstack-cli: udp-echo: bind {port} failed: {e}");
                return;
            }
            klog_info!("ipstack-cli: udp-echo listening on :{port}");
            let mut buf = [0u8; 2048];
            loop {
                match stack.udp_recvfrom(id, &mut buf) {
                    Ok((n, from)) => {
                        if let Err(e) = stack.udp_sendto(id, &buf[..n], from) {
                            klog_warn!("ipstack-cli: udp-echo: sendto {from} failed: {e}");
                        }
                    }
                    Err(_) => break,
                }
            }
            stack.udp_close(id);
        })
        .expect("spawn udp-echo");
}

/// UDP discard service: reads and drops every datagram it receives.
pub fn spawn_udp_discard(stack: Arc<Stack>, port: u16) {
    std::thread::Builder::new()
        .name("udp-discard".into())
        .spawn(move || {
            let id = match stack.udp_open() {
                Ok(id) => id,
                Err(e) => {
                    klog_warn!("ipstack-cli: udp-discard: open failed: {e}");
                    return;
                }
            };
            let local = Endpoint::new(Ipv4Addr::UNSPECIFIED, Port::new(port));
            if let Err(e) = stack.udp_bind(id, local) {
                klog_warn!("ipstack-cli: udp-discard: bind {port} failed: {e}");
                return;
            }
            klog_info!("ipstack-cli: udp-discard listening on :{port}");
            let mut buf = [0u8; 2048];
            while stack.udp_recvfrom(id, &mut buf).is_ok() {}
            stack.udp_close(id);
        })
        .expect("spawn udp-discard");
}

/// TCP echo service: accepts one passive connection at a time and echoes
/// back whatever it reads until the peer resets or the connection drops.
pub fn spawn_tcp_echo(stack: Arc<Stack>, port: u16) {
    std::thread::Builder::new()
        .name("tcp-echo".into())
        .spawn(move || loop {
            let local = Endpoint::new(Ipv4Addr::UNSPECIFIED, Port::new(port));
            let id = match stack.tcp_open_rfc793(local, None, false) {
                Ok(id) => id,
                Err(e) => {
                    klog_warn!("ipstack-cli: tcp-echo: open failed: {e}");
                    return;
                }
            };
            klog_info!("ipstack-cli: tcp-echo accepted connection on pcb {id}");
            let mut buf = [0u8; 4096];
            loop {
                match stack.tcp_receive(id, &mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if stack.tcp_send(id, &buf[..n]).is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
            stack.tcp_close(id);
        })
        .expect("spawn tcp-echo");
}

/// TCP discard service: accepts connections, reads and drops everything.
pub fn spawn_tcp_discard(stack: Arc<Stack>, port: u16) {
    std::thread::Builder::new()
        .name("tcp-discard".into())
        .spawn(move || loop {
            let local = Endpoint::new(Ipv4Addr::UNSPECIFIED, Port::new(port));
            let id = match stack.tcp_open_rfc793(local, None, false) {
                Ok(id) => id,
                Err(e) => {
                    klog_warn!("ipstack-cli: tcp-discard: open failed: {e}");
                    return;
                }
            };
            klog_info!("ipstack-cli: tcp-discard accepted connection on pcb {id}");
            let mut buf = [0u8; 4096];
            while matches!(stack.tcp_receive(id, &mut buf), Ok(n) if n > 0) {}
            stack.tcp_close(id);
        })
        .expect("spawn tcp-discard");
}
