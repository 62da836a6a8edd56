use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;

const HUB_BIND_ADDR: &str = "HUB_BIND_ADDR";

const DEFAULT_BIND_ADDR: SocketAddr = SocketAddr::new(std::net::IpAddr::V4(Ipv4Addr::UNSPECIFIED), 8000);

pub fn get_default_bind_addr() -> SocketAddr {
    DEFAULT_BIND_ADDR
}

/// API bind address from the environment, if set and valid
pub fn get_bind_addr() -> Option<SocketAddr> {
    let addr_from_env = std::env::var(HUB_BIND_ADDR);
    addr_from_env.ok().and_then(|res| res.parse().ok())
}

const HUB_DB_PATH: &str = "HUB_DB_PATH";

const DEFAULT_DB_PATH: &str = "./network_devices.db";

pub fn get_default_db_path() -> PathBuf {
    PathBuf::from(DEFAULT_DB_PATH)
}

pub fn get_db_path() -> Option<PathBuf> {
    let path_from_env = std::env::var(HUB_DB_PATH);
    path_from_env.ok().filter(|p| !p.is_empty()).map(PathBuf::from)
}
