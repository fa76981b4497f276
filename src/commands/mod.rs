//! CLI command implementations
//!
//! Every command opens a bus through [`transport::open_bus`], which maps the
//! interface name to a SocketCAN socket or to the module emulator, and then
//! drives the protocol engine from `pcanflash-core`.

pub mod flash;
mod list;
pub mod monitor;
pub mod query;
mod transport;

pub use list::list_hardware;
