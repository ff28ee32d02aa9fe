//! The loopback device's own contract, with no `Stack` involved at all:
//! whatever is handed to `transmit` comes back out the bound sink,
//! asynchronously, on the device's own worker thread.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use ipstack_core::NetDevice;
use ipstack_drivers::LoopbackDevice;
use ipstack_types::MacAddr;

use ipstack_tests::wait_until;

#[test]
fn transmitted_frame_is_replayed_into_the_bound_sink() {
    let dev = LoopbackDevice::new("lo-test");
    let received: Arc<Mutex<Vec<(u16, Vec<u8>)>>> = Arc::new(Mutex::new(Vec::new()));
    let received_sink = Arc::clone(&received);
    dev.bind(Arc::new(move |ethertype, bytes| {
        received_sink.lock().unwrap().push((ethertype, bytes.to_vec()));
    }));

    dev.open().expect("open loopback");
    dev.transmit(0x0800, &[1, 2, 3, 4], MacAddr::ZERO).expect("transmit");

    let frame = wait_until(Duration::from_secs(1), || received.lock().unwrap().pop());
    assert_eq!(frame, (0x0800, vec![1, 2, 3, 4]));

    dev.close().expect("close loopback");
}

#[test]
fn queue_limit_is_enforced() {
    let dev = LoopbackDevice::new("lo-full");
    // No sink bound, no worker running: the queue fills and the 17th
    // transmit must be rejected rather than silently dropped or blocking.
    for _ in 0..16 {
        dev.transmit(0x0800, &[0], MacAddr::ZERO).expect("queue has room");
    }
    assert!(dev.transmit(0x0800, &[0], MacAddr::ZERO).is_err());
}
