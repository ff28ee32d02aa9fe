//! `ipstackd` — brings up one network device, attaches an IPv4 interface,
//! optionally installs a default route, starts the stack, and runs a
//! handful of demo echo/discard services over it until interrupted.
//!
//! Grounded in the original `test/step*.c` harnesses' `net_init` /
//! `ip_addr_set` / `ip_route_set_default_gateway` / `net_run` sequence
//! (spec.md §6), generalized behind [`config::StackConfig`].

mod apps;
mod config;
mod error;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ipstack_core::NetDevice;
use ipstack_drivers::{DummyDevice, LoopbackDevice, TapDevice};
use ipstack_proto::Stack;
use ipstack_sync::{init_logging_with_default, klog_error, klog_info};

use config::{DeviceKind, StackConfig};
use error::CliError;

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

extern "C" fn on_sigint(_signum: libc::c_int) {
    SHUTDOWN.store(true, Ordering::Release);
}

fn install_sigint_handler() {
    unsafe {
        libc::signal(libc::SIGINT, on_sigint as libc::sighandler_t);
        libc::signal(libc::SIGTERM, on_sigint as libc::sighandler_t);
    }
}

/// Register `dev` with the stack, then bind its sink to the stack's
/// `link_input` for the index it was just assigned. `dev` is generic over
/// the concrete driver type so `.bind()` can be called directly — a device
/// can't be told its own `DevIndex` until after it is registered, and by
/// then it has already been upcast to `Arc<dyn NetDevice>` for the registry,
/// so the concrete handle must be kept alongside the trait object rather
/// than recovered from it.
fn register_and_bind<D>(stack: &Arc<Stack>, dev: &Arc<D>) -> Result<ipstack_types::DevIndex, CliError>
where
    D: NetDevice + 'static,
    Arc<D>: BindSink,
{
    let dev_index = stack
        .register_device(Arc::clone(dev) as Arc<dyn NetDevice>)
        .ok_or_else(|| CliError::InvalidConfig("device registry full".into()))?;
    let stack_bind = Arc::clone(stack);
    dev.bind_sink(Arc::new(move |ethertype, bytes| stack_bind.link_input(dev_index, ethertype, bytes)));
    Ok(dev_index)
}

/// Thin trait so `register_and_bind` can call `.bind()` generically across
/// the three driver types without their `bind` methods sharing a common
/// trait from `ipstack-core` (binding is driver-specific wiring, not part
/// of the `NetDevice` contract every device must implement).
trait BindSink {
    fn bind_sink(&self, sink: ipstack_drivers::LinkInput);
}

impl BindSink for Arc<TapDevice> {
    fn bind_sink(&self, sink: ipstack_drivers::LinkInput) {
        self.bind(sink);
    }
}

impl BindSink for Arc<LoopbackDevice> {
    fn bind_sink(&self, sink: ipstack_drivers::LinkInput) {
        self.bind(sink);
    }
}

impl BindSink for Arc<DummyDevice> {
    fn bind_sink(&self, sink: ipstack_drivers::LinkInput) {
        self.bind(sink);
    }
}

fn run(cfg: StackConfig) -> Result<(), CliError> {
    let stack = Stack::new();

    let dev_index = match cfg.device_kind {
        DeviceKind::Tap => {
            let dev = TapDevice::new(cfg.device_name.clone(), None);
            register_and_bind(&stack, &dev)?
        }
        DeviceKind::Loopback => {
            let dev = LoopbackDevice::new(cfg.device_name.clone());
            register_and_bind(&stack, &dev)?
        }
        DeviceKind::Dummy => {
            let dev = DummyDevice::new(cfg.device_name.clone());
            register_and_bind(&stack, &dev)?
        }
    };

    stack.add_iface(dev_index, cfg.unicast, cfg.netmask)?;
    if let Some(gw) = cfg.gateway {
        stack.set_default_gateway(gw, dev_index);
    }

    stack.run()?;
    klog_info!("ipstack-cli: {} up at {}/{}", cfg.device_name, cfg.unicast, cfg.netmask);

    apps::spawn_udp_echo(Arc::clone(&stack), 7);
    apps::spawn_udp_discard(Arc::clone(&stack), 9);
    apps::spawn_tcp_echo(Arc::clone(&stack), 7);
    apps::spawn_tcp_discard(Arc::clone(&stack), 9);

    install_sigint_handler();
    while !SHUTDOWN.load(Ordering::Acquire) {
        std::thread::sleep(std::time::Duration::from_millis(200));
    }

    klog_info!("ipstack-cli: shutting down");
    stack.interrupt_all();
    stack.shutdown()?;
    Ok(())
}

fn main() {
    let cfg = match StackConfig::from_args() {
        Ok(cfg) => cfg,
        Err(e) => {
            // Logging isn't configured yet — a config error means we never
            // learned the user's desired level, so report it straight to
            // stderr rather than guessing a filter first.
            eprintln!("ipstack-cli: configuration error: {e}");
            std::process::exit(2);
        }
    };
    init_logging_with_default(&cfg.log_level);
    if let Err(e) = run(cfg) {
        klog_error!("ipstack-cli: {e}");
        std::process::exit(1);
    }
}
