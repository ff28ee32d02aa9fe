//! `CliError` — wraps every failure mode `ipstackd` can hit before or while
//! running: bad config, an I/O failure opening a device, or a core
//! [`NetError`]. Config parsing is not part of the core's error taxonomy
//! (spec.md §7); it gates whether the stack ever starts, so it gets its own
//! variant here rather than being shoehorned into `NetError`.

use ipstack_types::NetError;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("reading config file {path}: {source}")]
    ConfigRead {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing config file {path}: {source}")]
    ConfigParse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Net(#[from] NetError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
