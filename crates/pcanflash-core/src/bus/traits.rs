//! CAN transport trait
//!
//! The protocol engine talks to the bus exclusively through [`CanBus`].
//! Implementations exist for Linux SocketCAN (`pcanflash-socketcan`) and
//! for the in-memory module emulator (`pcanflash-dummy`).

use std::time::Duration;

use crate::error::Result;
use crate::protocol::Frame;

/// A classic CAN bus endpoint
///
/// Implementations only need to deliver frames on the protocol identifier;
/// the engine ignores anything else it receives.
///
/// ## Example
///
/// ```ignore
/// impl CanBus for MyAdapter {
///     fn send(&mut self, frame: &Frame) -> Result<()> {
///         self.hw.transmit(frame.id, &frame.data)
///             .map_err(|e| Error::Send(e.to_string()))
///     }
///
///     fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<Frame>> {
///         self.hw.receive(timeout).map_err(|e| Error::Receive(e.to_string()))
///     }
/// }
/// ```
pub trait CanBus {
    /// Queue a frame for transmission
    fn send(&mut self, frame: &Frame) -> Result<()>;

    /// Wait up to `timeout` for the next frame
    ///
    /// Returns `Ok(None)` when the timeout expires without a frame.
    fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<Frame>>;

    /// Length of the interface transmit queue, if it can be determined
    fn tx_queue_len(&self) -> Option<u32> {
        None
    }
}

impl<T: CanBus + ?Sized> CanBus for Box<T> {
    fn send(&mut self, frame: &Frame) -> Result<()> {
        (**self).send(frame)
    }

    fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<Frame>> {
        (**self).recv_timeout(timeout)
    }

    fn tx_queue_len(&self) -> Option<u32> {
        (**self).tx_queue_len()
    }
}

impl<T: CanBus + ?Sized> CanBus for &mut T {
    fn send(&mut self, frame: &Frame) -> Result<()> {
        (**self).send(frame)
    }

    fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<Frame>> {
        (**self).recv_timeout(timeout)
    }

    fn tx_queue_len(&self) -> Option<u32> {
        (**self).tx_queue_len()
    }
}
