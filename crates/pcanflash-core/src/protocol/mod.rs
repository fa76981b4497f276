//! CAN2Flash wire protocol
//!
//! Frame layout, command encoding and the parsers for the replies a module
//! can send (status, discovery, descriptor fragments).

mod commands;
mod describe;
mod frame;

pub use commands::*;
pub use describe::{describe, Decoded};
pub use frame::{Frame, MAX_DLC};
