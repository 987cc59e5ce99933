use std::net::IpAddr;
use std::net::Ipv4Addr;
use std::path::PathBuf;

pub(crate) const APP_NAME: &str = env!("CARGO_PKG_NAME");
pub(crate) const APP_USER_AGENT: &str =
    concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

pub(crate) const DEFAULT_BIND_ADDRESS: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);
pub(crate) const DEFAULT_BIND_PORT: u16 = 8080;
pub(crate) const DEFAULT_MIRROR: &str = "http://archive.ubuntu.com/ubuntu";
pub(crate) const DEFAULT_SOURCES_LIST_PATH: &str = "/etc/apt/sources.list";

/// Process-wide snapshot parameters, fixed at startup.
#[derive(Debug)]
pub(crate) struct SnapshotConfig {
    /// The POSIX-second instant the snapshot view is pinned at.
    pub(crate) cutoff: i64,
    pub(crate) bind_addr: IpAddr,
    pub(crate) bind_port: u16,
    pub(crate) cache_file: Option<PathBuf>,
}
