pub mod apps;
pub mod cluster;
pub mod common;
pub mod pbs;
pub mod server;
pub mod workspace;

pub type Error = crate::common::error::AurigaError;
pub type Result<T> = std::result::Result<T, Error>;

pub const AURIGA_VERSION: &str = env!("CARGO_PKG_VERSION");
