//! Command/status exchange with a single module
//!
//! Every handshake step is "send one command, then poll for the status
//! byte". A poll sends a status request and waits a bounded time for the
//! matching reply. Expiry is fatal and never retried.

use std::time::{Duration, Instant};

use crate::bus::CanBus;
use crate::error::{Error, Result};
use crate::protocol::{Frame, Request, StatusBits, StatusFrame};

/// Command/status channel on top of a [`CanBus`]
pub struct StatusChannel<B> {
    bus: B,
    timeout: Duration,
}

impl<B: CanBus> StatusChannel<B> {
    /// Create a channel waiting at most `timeout` for each status reply
    pub fn new(bus: B, timeout: Duration) -> Self {
        Self { bus, timeout }
    }

    /// Status reply deadline
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Access the underlying bus
    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    /// Access the underlying bus
    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Release the underlying bus
    pub fn into_inner(self) -> B {
        self.bus
    }

    /// Send a raw frame
    pub fn send_frame(&mut self, frame: &Frame) -> Result<()> {
        log::trace!("tx {}", frame);
        self.bus.send(frame)
    }

    /// Send a command without waiting for a reply
    pub fn send(&mut self, module_id: u8, request: Request) -> Result<()> {
        log::trace!("[{}] {:?}", module_id, request);
        let frame = request.to_frame(module_id)?;
        self.send_frame(&frame)
    }

    /// Wait for the next frame until `deadline`
    pub fn recv_until(&mut self, deadline: Instant) -> Result<Option<Frame>> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Ok(None);
        }
        let frame = self.bus.recv_timeout(remaining)?;
        if let Some(frame) = &frame {
            log::trace!("rx {}", frame);
        }
        Ok(frame)
    }

    /// Wait for a status reply from `module_id`
    ///
    /// Frames that are not a status reply from this module are skipped;
    /// the deadline keeps running.
    pub fn await_status(&mut self, module_id: u8) -> Result<StatusFrame> {
        let deadline = Instant::now() + self.timeout;
        loop {
            match self.recv_until(deadline)? {
                Some(frame) => match StatusFrame::parse(&frame) {
                    Some(status) if status.module_id == module_id => return Ok(status),
                    _ => log::trace!("ignoring {} while waiting for status", frame),
                },
                None => {
                    return Err(Error::StatusTimeout {
                        module_id,
                        waited: self.timeout,
                    })
                }
            }
        }
    }

    /// Request and wait for a status reply
    pub fn poll(&mut self, module_id: u8) -> Result<StatusFrame> {
        self.send(module_id, Request::Status)?;
        self.await_status(module_id)
    }

    /// Send a command and poll the resulting status
    pub fn command(&mut self, module_id: u8, request: Request) -> Result<StatusFrame> {
        self.send(module_id, request)?;
        self.poll(module_id)
    }

    /// Send a command and require `required` bits in the resulting status
    ///
    /// `step` names the handshake step in the error message.
    pub fn expect(
        &mut self,
        module_id: u8,
        request: Request,
        step: &'static str,
        required: StatusBits,
    ) -> Result<StatusFrame> {
        let status = self.command(module_id, request)?;
        check_status(step, request, required, &status)?;
        Ok(status)
    }
}

/// Require `required` bits in a status reply
pub(crate) fn check_status(
    step: &'static str,
    request: Request,
    required: StatusBits,
    status: &StatusFrame,
) -> Result<()> {
    if status.status().contains(required) {
        log::debug!("{}: status {:#04X}", step, status.raw_status);
        Ok(())
    } else {
        Err(Error::UnexpectedStatus {
            step,
            command: request.command(),
            expected: required.bits(),
            got: status.raw_status,
        })
    }
}
