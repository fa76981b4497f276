//! pcanflash-dummy - In-memory CAN2Flash module emulator
//!
//! This crate provides a bus with emulated bootloader modules behind it.
//! Each module answers the discovery query, keeps the bootloader status
//! byte, serves its JSON descriptor and erases/programs an in-memory flash.
//! It's useful for testing and development without real hardware.

use std::collections::VecDeque;
use std::time::Duration;

use pcanflash_core::bus::CanBus;
use pcanflash_core::descriptor::split_descriptor;
use pcanflash_core::error::{Error, Result};
use pcanflash_core::hardware::{DataLength, HardwareCatalog, HardwareProfile, HwFlags};
use pcanflash_core::protocol::{
    Command, CommandFrame, DiscoveryReply, Frame, StatusBits, CAN_ID, CMD_PREFIX, DEFERRED_ID,
};

/// Flash size of emulated modules without an erase layout
const DEFAULT_FLASH_SIZE: usize = 1024 * 1024;

/// Transmit queue length reported by the bus
const DEFAULT_TX_QUEUE_LEN: u32 = 1000;

/// Configuration of one emulated module
#[derive(Debug, Clone)]
pub struct ModuleConfig {
    /// Module id (0..15)
    pub id: u8,
    /// Hardware code in status replies
    pub hw_type: u8,
    /// Flash family code in status replies
    pub flash_type: u8,
    /// Bootloader date bytes (day, month, year), BCD
    pub date: [u8; 3],
    /// Bootloader version, major in the high nibble
    pub version: u8,
    /// Data frame layout the module expects
    pub data_len: DataLength,
    /// Whether odd data frames arrive inverted
    pub invert: bool,
    /// Bus address of the first flash byte
    pub flash_offset: u32,
    /// Flash size in bytes
    pub flash_size: usize,
    /// JSON descriptor served on request
    pub descriptor: Option<String>,
}

impl ModuleConfig {
    /// Configure a module the way the given hardware behaves
    ///
    /// Hardware without a fixed flash family identifies itself through a
    /// JSON descriptor.
    pub fn for_profile(id: u8, profile: &HardwareProfile) -> Self {
        let data_len = profile.default_data_len();
        let deferred = profile.is_deferred();
        let flash_size = profile
            .erase_regions
            .iter()
            .map(|r| r.end() as usize)
            .max()
            .unwrap_or(DEFAULT_FLASH_SIZE);

        Self {
            id,
            hw_type: if deferred { DEFERRED_ID } else { profile.hw_type },
            flash_type: profile.flash_id_type,
            date: [0x15, 0x03, 0x24],
            version: 0x21,
            data_len,
            invert: profile.has(HwFlags::FDATA_INVERT),
            flash_offset: profile.flash_offset,
            flash_size,
            descriptor: deferred.then(|| {
                format!(
                    r#"{{"hwType":"{}","bootloader":"2.1.0","firmware":"1.0.0","dataMode":"{}"}}"#,
                    profile.hw_type,
                    data_len.bytes()
                )
            }),
        }
    }
}

/// Misbehaviour injected into an emulated module
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Lose the n-th data frame of every block
    DropDataFrame(usize),
    /// Report an empty status after this command
    FailAfter(Command),
    /// Stop answering status requests after this command
    MuteAfter(Command),
    /// Answer the discovery query twice
    DuplicateReply,
}

/// One emulated bootloader
#[derive(Debug)]
pub struct EmulatedModule {
    config: ModuleConfig,
    faults: Vec<Fault>,
    status: u8,
    muted: bool,
    start: u32,
    block_len: usize,
    receiving: bool,
    frames: usize,
    buffer: Vec<u8>,
    memory: Vec<u8>,
    erases: usize,
    programs: usize,
    resets: usize,
}

impl EmulatedModule {
    /// Create a module with erased flash
    pub fn new(config: ModuleConfig) -> Self {
        let memory = vec![0xFF; config.flash_size];
        Self {
            config,
            faults: Vec::new(),
            status: 0,
            muted: false,
            start: 0,
            block_len: 0,
            receiving: false,
            frames: 0,
            buffer: Vec::new(),
            memory,
            erases: 0,
            programs: 0,
            resets: 0,
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &ModuleConfig {
        &self.config
    }

    /// Get a reference to the flash contents
    pub fn memory(&self) -> &[u8] {
        &self.memory
    }

    /// Current status byte
    pub fn status(&self) -> u8 {
        self.status
    }

    /// Number of erase commands executed
    pub fn erases(&self) -> usize {
        self.erases
    }

    /// Number of blocks programmed
    pub fn programs(&self) -> usize {
        self.programs
    }

    /// Number of reset commands received
    pub fn resets(&self) -> usize {
        self.resets
    }

    fn has_fault(&self, fault: Fault) -> bool {
        self.faults.contains(&fault)
    }

    fn status_frame(&self) -> Option<Frame> {
        Frame::new(
            CAN_ID,
            &[
                CMD_PREFIX[0],
                CMD_PREFIX[1],
                self.config.id,
                self.config.hw_type,
                self.config.flash_type,
                self.status,
            ],
        )
    }

    /// Memory range of `[start, start + len)` on the bus
    fn range(&self, len: usize) -> Option<std::ops::Range<usize>> {
        let from = self.start.checked_sub(self.config.flash_offset)? as usize;
        let to = from.checked_add(len)?;
        (to <= self.memory.len()).then_some(from..to)
    }

    fn handle_data(&mut self, frame: &Frame) {
        if !self.receiving {
            return;
        }
        let mut payload: Vec<u8> = match self.config.data_len {
            DataLength::Eight => frame.data.to_vec(),
            DataLength::Six => {
                if frame.data[..2] != [0x7F, self.config.id] {
                    return;
                }
                frame.data[2..].to_vec()
            }
        };
        let index = self.frames;
        self.frames += 1;
        if self.has_fault(Fault::DropDataFrame(index)) {
            log::debug!("module {}: dropping data frame {}", self.config.id, index);
            return;
        }
        if self.config.invert && index % 2 == 1 {
            payload.iter_mut().for_each(|b| *b ^= 0xFF);
        }
        self.buffer.extend_from_slice(&payload);
    }

    fn handle_command(&mut self, cmd: &CommandFrame, command: Command) -> Vec<Frame> {
        let ok = StatusBits::CHECKSUM_OK.bits();
        if command.is_destructive() && !cmd.is_keyed() {
            log::debug!("module {}: {} without key ignored", self.config.id, command);
            return vec![];
        }

        match command {
            Command::GetStatus => {
                if self.muted {
                    return vec![];
                }
                return self.status_frame().into_iter().collect();
            }
            Command::GetJson => {
                let Some(text) = &self.config.descriptor else {
                    return vec![];
                };
                return split_descriptor(text).iter().map(|f| f.to_frame()).collect();
            }
            Command::SetStartAddress => {
                self.start = cmd.param24();
                self.status = ok | StatusBits::STARTADDR.bits();
            }
            Command::SetBlockSize => {
                self.block_len = cmd.param24() as usize;
                self.receiving = true;
                self.frames = 0;
                self.buffer.clear();
                self.status |= StatusBits::LENGTH.bits();
            }
            Command::SetChecksum => {
                self.receiving = false;
                let complete = self.buffer.len() >= self.block_len;
                let sum = self.buffer[..self.block_len.min(self.buffer.len())]
                    .iter()
                    .fold(0u16, |acc, b| acc.wrapping_add(*b as u16));
                self.status |= StatusBits::CHECKSUM.bits();
                if complete && sum == cmd.param16() {
                    self.status |= ok;
                } else {
                    self.status &= !ok;
                }
            }
            Command::EraseSector => match self.range(self.block_len) {
                Some(range) => {
                    self.memory[range].fill(0xFF);
                    self.erases += 1;
                    self.status = ok | StatusBits::ERASE_OK.bits();
                }
                None => self.status = 0,
            },
            Command::StartProgramming => match self.range(self.block_len) {
                Some(range) if self.status & ok != 0 => {
                    for (cell, b) in self.memory[range].iter_mut().zip(&self.buffer) {
                        *cell &= *b;
                    }
                    self.programs += 1;
                    self.status = ok;
                }
                _ => self.status = 0,
            },
            Command::Verify => {
                let matches = self.buffer.len() >= self.block_len
                    && self
                        .range(self.block_len)
                        .is_some_and(|r| self.memory[r] == self.buffer[..self.block_len]);
                if matches {
                    self.status |= StatusBits::VERIFY_OK.bits();
                }
            }
            Command::Reset => self.resets += 1,
            Command::SwitchToBootloader | Command::EndProgramming => {}
        }

        if self.has_fault(Fault::FailAfter(command)) {
            self.status = 0;
        }
        if self.has_fault(Fault::MuteAfter(command)) {
            self.muted = true;
        }
        vec![]
    }
}

/// Bus with emulated modules attached
pub struct DummyBus {
    modules: Vec<EmulatedModule>,
    rx: VecDeque<Frame>,
    sent: Vec<Frame>,
    tx_queue_len: Option<u32>,
}

impl Default for DummyBus {
    fn default() -> Self {
        Self::new()
    }
}

impl DummyBus {
    /// Create an empty bus
    pub fn new() -> Self {
        Self {
            modules: Vec::new(),
            rx: VecDeque::new(),
            sent: Vec::new(),
            tx_queue_len: Some(DEFAULT_TX_QUEUE_LEN),
        }
    }

    /// Attach a module
    pub fn with_module(mut self, config: ModuleConfig) -> Self {
        self.add_module(config);
        self
    }

    /// Attach a module
    pub fn add_module(&mut self, config: ModuleConfig) {
        self.modules.push(EmulatedModule::new(config));
    }

    /// Inject a fault into module `id`
    pub fn inject(&mut self, id: u8, fault: Fault) {
        if let Some(module) = self.modules.iter_mut().find(|m| m.config.id == id) {
            module.faults.push(fault);
        }
    }

    /// Set the reported transmit queue length
    pub fn set_tx_queue_len(&mut self, len: Option<u32>) {
        self.tx_queue_len = len;
    }

    /// Look up an attached module
    pub fn module(&self, id: u8) -> Option<&EmulatedModule> {
        self.modules.iter().find(|m| m.config.id == id)
    }

    /// Every frame sent so far
    pub fn sent(&self) -> &[Frame] {
        &self.sent
    }

    /// Commands sent so far as `(module, command)`, status requests excluded
    pub fn command_log(&self) -> Vec<(u8, Command)> {
        self.sent
            .iter()
            .filter_map(CommandFrame::parse)
            .filter_map(|c| c.command().map(|cmd| (c.module_id, cmd)))
            .filter(|(_, cmd)| *cmd != Command::GetStatus)
            .collect()
    }

    fn answer_query(&mut self) {
        for module in &self.modules {
            let c = &module.config;
            let reply = DiscoveryReply::encode(c.id, c.date, c.version);
            if module.has_fault(Fault::DuplicateReply) {
                self.rx.push_back(reply.clone());
            }
            self.rx.push_back(reply);
        }
    }
}

impl CanBus for DummyBus {
    fn send(&mut self, frame: &Frame) -> Result<()> {
        if frame.id != CAN_ID {
            return Err(Error::Send(format!("unexpected identifier in {}", frame)));
        }
        self.sent.push(frame.clone());

        if *frame == Frame::discovery_query() {
            self.answer_query();
            return Ok(());
        }

        if frame.dlc() == 8 {
            for module in &mut self.modules {
                module.handle_data(frame);
            }
            return Ok(());
        }

        let Some(cmd) = CommandFrame::parse(frame) else {
            log::debug!("dummy bus: ignoring {}", frame);
            return Ok(());
        };
        let Some(command) = cmd.command() else {
            return Ok(());
        };
        for module in &mut self.modules {
            if module.config.id == cmd.module_id {
                let replies = module.handle_command(&cmd, command);
                self.rx.extend(replies);
            }
        }
        Ok(())
    }

    fn recv_timeout(&mut self, _timeout: Duration) -> Result<Option<Frame>> {
        Ok(self.rx.pop_front())
    }

    fn tx_queue_len(&self) -> Option<u32> {
        self.tx_queue_len
    }
}

/// Build a dummy bus from a hardware list and return it boxed
///
/// `hw_types` is a comma-separated list of hardware codes; the modules get
/// ids 0, 1, ... in order. An empty list attaches a single PCAN-Router.
pub fn open_dummy(
    hw_types: &str,
    catalog: &HardwareCatalog,
) -> std::result::Result<Box<dyn CanBus>, Box<dyn std::error::Error>> {
    let mut bus = DummyBus::new();
    let list = if hw_types.trim().is_empty() {
        "16"
    } else {
        hw_types
    };
    for (id, code) in list.split(',').enumerate() {
        let hw_type: u8 = code
            .trim()
            .parse()
            .map_err(|_| format!("invalid hardware code '{}'", code))?;
        let profile = catalog
            .lookup(hw_type)
            .ok_or(Error::UnknownHardware(hw_type))?;
        log::info!("dummy module {}: {}", id, profile.name);
        bus.add_module(ModuleConfig::for_profile(id as u8, profile));
    }
    Ok(Box::new(bus))
}
