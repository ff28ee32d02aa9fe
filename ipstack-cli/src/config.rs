//! Startup configuration: command-line arguments, with an optional TOML
//! file providing defaults that CLI flags override.
//!
//! Grounded in the original `net.c` bring-up sequence and the `test/step*.c`
//! harnesses, which take `argv[1]`, `argv[2]`, ... as device/address/gateway
//! (spec.md §6 "Configuration"). This generalizes that into a `clap`-parsed
//! CLI with an optional backing file, matching SPEC_FULL.md 4.11.

use std::path::PathBuf;

use clap::Parser;
use ipstack_types::Ipv4Addr;
use serde::Deserialize;

use crate::error::CliError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Tap,
    Loopback,
    Dummy,
}

impl std::str::FromStr for DeviceKind {
    type Err = CliError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tap" => Ok(Self::Tap),
            "loopback" => Ok(Self::Loopback),
            "dummy" => Ok(Self::Dummy),
            other => Err(CliError::InvalidConfig(format!("unknown device kind '{other}'"))),
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "ipstackd", about = "Userspace TCP/IP stack process")]
struct Cli {
    /// Optional TOML config file; CLI flags below override its fields.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Device kind: tap, loopback, or dummy.
    #[arg(long)]
    device: Option<DeviceKind>,

    /// Device name (e.g. tap0).
    #[arg(long)]
    name: Option<String>,

    /// Interface address as `unicast/netmask`, e.g. `192.0.2.1/255.255.255.0`.
    #[arg(long = "addr")]
    addr: Option<String>,

    /// Default gateway address.
    #[arg(long)]
    gw: Option<String>,

    /// Log level: error, warn, info, debug, trace.
    #[arg(long)]
    log_level: Option<String>,
}

/// On-disk shape of the optional config file. Every field optional so a
/// partial file can be merged with CLI flags.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    device: Option<String>,
    name: Option<String>,
    addr: Option<String>,
    gw: Option<String>,
    log_level: Option<String>,
}

/// Fully resolved startup configuration.
#[derive(Debug, Clone)]
pub struct StackConfig {
    pub device_kind: DeviceKind,
    pub device_name: String,
    pub unicast: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub gateway: Option<Ipv4Addr>,
    pub log_level: String,
}

impl StackConfig {
    /// Parse CLI args (with `std::env::args`), read an optional config file,
    /// and merge the two (CLI flags win).
    pub fn from_args() -> Result<Self, CliError> {
        let cli = Cli::parse();
        Self::resolve(cli)
    }

    fn resolve(cli: Cli) -> Result<Self, CliError> {
        let file = match &cli.config {
            Some(path) => Some(load_file(path)?),
            None => None,
        };
        let file = file.unwrap_or_default();

        let device_kind_str = cli
            .device
            .map(|k| match k {
                DeviceKind::Tap => "tap".to_string(),
                DeviceKind::Loopback => "loopback".to_string(),
                DeviceKind::Dummy => "dummy".to_string(),
            })
            .or(file.device)
            .unwrap_or_else(|| "loopback".to_string());
        let device_kind: DeviceKind = device_kind_str.parse()?;

        let device_name = cli
            .name
            .or(file.name)
            .unwrap_or_else(|| default_name(device_kind));

        let addr = cli
            .addr
            .or(file.addr)
            .ok_or_else(|| CliError::InvalidConfig("missing --addr unicast/netmask".into()))?;
        let (unicast, netmask) = parse_addr_pair(&addr)?;

        let gateway = match cli.gw.or(file.gw) {
            Some(s) => Some(Ipv4Addr::parse(&s).ok_or_else(|| CliError::InvalidConfig(format!("bad gateway '{s}'")))?),
            None => None,
        };

        let log_level = cli.log_level.or(file.log_level).unwrap_or_else(|| "info".to_string());

        Ok(Self {
            device_kind,
            device_name,
            unicast,
            netmask,
            gateway,
            log_level,
        })
    }
}

fn default_name(kind: DeviceKind) -> String {
    match kind {
        DeviceKind::Tap => "tap0".to_string(),
        DeviceKind::Loopback => "lo".to_string(),
        DeviceKind::Dummy => "dummy0".to_string(),
    }
}

fn parse_addr_pair(s: &str) -> Result<(Ipv4Addr, Ipv4Addr), CliError> {
    let (unicast_str, mask_str) = s
        .split_once('/')
        .ok_or_else(|| CliError::InvalidConfig(format!("expected unicast/netmask, got '{s}'")))?;
    let unicast = Ipv4Addr::parse(unicast_str)
        .ok_or_else(|| CliError::InvalidConfig(format!("bad unicast address '{unicast_str}'")))?;
    let netmask = if let Ok(prefix) = mask_str.parse::<u32>() {
        if prefix > 32 {
            return Err(CliError::InvalidConfig(format!("prefix length out of range: {prefix}")));
        }
        let bits = if prefix == 0 { 0 } else { u32::MAX << (32 - prefix) };
        Ipv4Addr::from_u32_be(bits)
    } else {
        Ipv4Addr::parse(mask_str).ok_or_else(|| CliError::InvalidConfig(format!("bad netmask '{mask_str}'")))?
    };
    Ok((unicast, netmask))
}

fn load_file(path: &PathBuf) -> Result<FileConfig, CliError> {
    let text = std::fs::read_to_string(path).map_err(|source| CliError::ConfigRead {
        path: path.display().to_string(),
        source,
    })?;
    toml::from_str(&text).map_err(|source| CliError::ConfigParse {
        path: path.display().to_string(),
        source,
    })
}
