//! Scripted bus for engine-level tests

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use crate::bus::CanBus;
use crate::error::Result;
use crate::protocol::{Command, CommandFrame, Frame, StatusBits, CAN_ID};

type Responder = Box<dyn FnMut(&Frame) -> Vec<Frame>>;

/// Bus that answers each sent frame through a closure
pub(crate) struct MockBus {
    responder: Responder,
    rx: VecDeque<Frame>,
    sent: Vec<Frame>,
    tx_queue_len: Option<u32>,
}

impl MockBus {
    pub(crate) fn new(responder: impl FnMut(&Frame) -> Vec<Frame> + 'static) -> Self {
        Self {
            responder: Box::new(responder),
            rx: VecDeque::new(),
            sent: Vec::new(),
            tx_queue_len: None,
        }
    }

    pub(crate) fn sent(&self) -> &[Frame] {
        &self.sent
    }

    /// Commands sent so far, excluding status requests
    pub(crate) fn commands(&self) -> Vec<Command> {
        self.sent
            .iter()
            .filter_map(CommandFrame::parse)
            .filter_map(|c| c.command())
            .filter(|c| *c != Command::GetStatus)
            .collect()
    }

    pub(crate) fn push_rx(&mut self, frame: Frame) {
        self.rx.push_back(frame);
    }

    pub(crate) fn set_tx_queue_len(&mut self, len: Option<u32>) {
        self.tx_queue_len = len;
    }
}

impl CanBus for MockBus {
    fn send(&mut self, frame: &Frame) -> Result<()> {
        self.sent.push(frame.clone());
        let replies = (self.responder)(frame);
        self.rx.extend(replies);
        Ok(())
    }

    fn recv_timeout(&mut self, _timeout: Duration) -> Result<Option<Frame>> {
        Ok(self.rx.pop_front())
    }

    fn tx_queue_len(&self) -> Option<u32> {
        self.tx_queue_len
    }
}

/// Minimal bootloader state machine answering status polls
pub(crate) struct MockModule {
    pub(crate) id: u8,
    pub(crate) hw_type: u8,
    pub(crate) flash_type: u8,
    pub(crate) status: u8,
    pub(crate) six_byte: bool,
    pub(crate) invert: bool,
    /// Command after which the module reports no status bits
    pub(crate) fail_after: Option<Command>,
    /// Report no status bits once block data arrives
    pub(crate) fail_on_data: bool,
    pub(crate) received: Vec<u8>,
    pub(crate) data_frames: usize,
    block_len: usize,
}

impl MockModule {
    pub(crate) fn new(id: u8, hw_type: u8, flash_type: u8) -> Self {
        Self {
            id,
            hw_type,
            flash_type,
            status: 0,
            six_byte: false,
            invert: true,
            fail_after: None,
            fail_on_data: false,
            received: Vec::new(),
            data_frames: 0,
            block_len: 0,
        }
    }

    fn status_frame(&self) -> Frame {
        Frame::new(
            CAN_ID,
            &[0x7F, 0xFF, self.id, self.hw_type, self.flash_type, self.status],
        )
        .unwrap()
    }

    pub(crate) fn respond(&mut self, frame: &Frame) -> Vec<Frame> {
        if frame.dlc() == 8 {
            self.receive_data(frame);
            return vec![];
        }
        let Some(cmd) = CommandFrame::parse(frame) else {
            return vec![];
        };
        if cmd.module_id != self.id {
            return vec![];
        }
        let Some(command) = cmd.command() else {
            return vec![];
        };
        let ok = StatusBits::CHECKSUM_OK.bits();
        match command {
            Command::GetStatus => return vec![self.status_frame()],
            Command::SetStartAddress => {
                self.status = ok | StatusBits::STARTADDR.bits();
            }
            Command::SetBlockSize => {
                self.status |= StatusBits::LENGTH.bits();
                self.block_len = cmd.param24() as usize;
                self.received.clear();
                self.data_frames = 0;
            }
            Command::SetChecksum => {
                let len = self.block_len.min(self.received.len());
                let sum = self.received[..len]
                    .iter()
                    .fold(0u16, |acc, b| acc.wrapping_add(*b as u16));
                self.status |= StatusBits::CHECKSUM.bits();
                if sum == cmd.param16() && len == self.block_len {
                    self.status |= ok;
                } else {
                    self.status &= !ok;
                }
            }
            Command::EraseSector => self.status = ok | StatusBits::ERASE_OK.bits(),
            Command::StartProgramming => self.status = ok,
            Command::Verify => self.status |= StatusBits::VERIFY_OK.bits(),
            _ => {}
        }
        if self.fail_after == Some(command) {
            self.status = 0;
        }
        vec![]
    }

    fn receive_data(&mut self, frame: &Frame) {
        let mut payload: Vec<u8> = if self.six_byte {
            frame.data[2..].to_vec()
        } else {
            frame.data.to_vec()
        };
        if self.invert && self.data_frames % 2 == 1 {
            payload.iter_mut().for_each(|b| *b ^= 0xFF);
        }
        self.data_frames += 1;
        self.received.extend_from_slice(&payload);
        if self.fail_on_data {
            self.status = 0;
        }
    }
}

/// Bus wired to a single [`MockModule`]
pub(crate) fn module_bus(module: MockModule) -> (MockBus, Rc<RefCell<MockModule>>) {
    let module = Rc::new(RefCell::new(module));
    let handle = Rc::clone(&module);
    let bus = MockBus::new(move |frame: &Frame| module.borrow_mut().respond(frame));
    (bus, handle)
}
