//! CAN2Flash command codes, requests and reply parsing
//!
//! All protocol traffic uses the single identifier [`CAN_ID`]. Commands and
//! status replies share the `7F FF` prefix; the discovery exchange uses its
//! own `80 00 06` query.

use bitflags::bitflags;

use super::frame::Frame;
use crate::error::{Error, Result};

/// CAN identifier reserved for the bootloader protocol
pub const CAN_ID: u16 = 0x7E7;

/// Number of addressable modules on one bus
pub const MAX_MODULES: u8 = 16;

/// Prefix of every command, status and descriptor frame
pub const CMD_PREFIX: [u8; 2] = [0x7F, 0xFF];

/// Key byte required by destructive commands
pub const DESTRUCTIVE_KEY: u8 = 0x55;

/// Largest value of a 24-bit address or length parameter
pub const MAX_PARAM24: u32 = 0xFF_FFFF;

/// Hardware/flash code meaning "ask for the JSON descriptor"
pub const DEFERRED_ID: u8 = 0xFF;

/// Bootloader command codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    /// Status request
    GetStatus = 0x00,
    /// Set start address (24 bit)
    SetStartAddress = 0x01,
    /// Set block size (24 bit)
    SetBlockSize = 0x02,
    /// Set the additive checksum of the transferred block
    SetChecksum = 0x03,
    /// Program the transferred block
    StartProgramming = 0x04,
    /// Erase the addressed sector
    EraseSector = 0x05,
    /// Verify the programmed block
    Verify = 0x06,
    /// Leave the application and enter the bootloader
    SwitchToBootloader = 0x07,
    /// Reset the module
    Reset = 0x08,
    /// Terminate the programming session
    EndProgramming = 0x09,
    /// Request the JSON identity descriptor
    GetJson = 0x0A,
}

impl Command {
    /// Wire code
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Decode a wire code
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0x00 => Command::GetStatus,
            0x01 => Command::SetStartAddress,
            0x02 => Command::SetBlockSize,
            0x03 => Command::SetChecksum,
            0x04 => Command::StartProgramming,
            0x05 => Command::EraseSector,
            0x06 => Command::Verify,
            0x07 => Command::SwitchToBootloader,
            0x08 => Command::Reset,
            0x09 => Command::EndProgramming,
            0x0A => Command::GetJson,
            _ => return None,
        })
    }

    /// Whether the bootloader requires the `0x55` key in `p0`
    pub const fn is_destructive(self) -> bool {
        matches!(
            self,
            Command::EraseSector
                | Command::StartProgramming
                | Command::SwitchToBootloader
                | Command::Reset
        )
    }

    /// Display name used in logs and the bus monitor
    pub const fn name(self) -> &'static str {
        match self {
            Command::GetStatus => "GetStatus",
            Command::SetStartAddress => "SetStartAddr",
            Command::SetBlockSize => "SetBlockSize",
            Command::SetChecksum => "SetCheckSum",
            Command::StartProgramming => "StartProgramming",
            Command::EraseSector => "EraseSector",
            Command::Verify => "Verify",
            Command::SwitchToBootloader => "SwitchToBootloader",
            Command::Reset => "ResetModule",
            Command::EndProgramming => "EndProgramming",
            Command::GetJson => "GetJson",
        }
    }
}

impl core::fmt::Display for Command {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// A command together with its parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    /// Ask for a status reply
    Status,
    /// Set the start address of the next erase or write
    SetStartAddress(u32),
    /// Set the length of the next erase or write
    SetBlockSize(u32),
    /// Announce the checksum of the transferred block
    SetChecksum(u16),
    /// Erase the addressed range
    EraseSector,
    /// Program the transferred block
    StartProgramming,
    /// Verify the programmed block
    Verify,
    /// Enter the bootloader
    SwitchToBootloader,
    /// Reset the module
    Reset,
    /// End the programming session
    EndProgramming,
    /// Request the JSON descriptor; the module waits `pacing` ms between fragments
    GetJson {
        /// Inter-fragment delay hint in milliseconds
        pacing: u8,
    },
}

fn be24(command: Command, value: u32) -> Result<[u8; 3]> {
    if value > MAX_PARAM24 {
        return Err(Error::ParameterOutOfRange { command, value });
    }
    Ok([(value >> 16) as u8, (value >> 8) as u8, value as u8])
}

impl Request {
    /// Command code of the request
    pub const fn command(&self) -> Command {
        match self {
            Request::Status => Command::GetStatus,
            Request::SetStartAddress(_) => Command::SetStartAddress,
            Request::SetBlockSize(_) => Command::SetBlockSize,
            Request::SetChecksum(_) => Command::SetChecksum,
            Request::EraseSector => Command::EraseSector,
            Request::StartProgramming => Command::StartProgramming,
            Request::Verify => Command::Verify,
            Request::SwitchToBootloader => Command::SwitchToBootloader,
            Request::Reset => Command::Reset,
            Request::EndProgramming => Command::EndProgramming,
            Request::GetJson { .. } => Command::GetJson,
        }
    }

    /// Parameter bytes `p0..p2`
    ///
    /// Addresses and lengths above [`MAX_PARAM24`] are rejected.
    pub fn params(&self) -> Result<[u8; 3]> {
        let params = match *self {
            Request::SetStartAddress(addr) => be24(self.command(), addr)?,
            Request::SetBlockSize(size) => be24(self.command(), size)?,
            Request::SetChecksum(csum) => [(csum >> 8) as u8, csum as u8, 0],
            Request::GetJson { pacing } => [pacing, 0, 0],
            _ if self.command().is_destructive() => [DESTRUCTIVE_KEY, 0, 0],
            _ => [0, 0, 0],
        };
        Ok(params)
    }

    /// Encode as a command frame addressed to `module_id`
    pub fn to_frame(&self, module_id: u8) -> Result<Frame> {
        Ok(Frame::command(module_id, self.command(), self.params()?))
    }
}

/// A command frame observed on the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandFrame {
    /// Addressed module
    pub module_id: u8,
    /// Raw command code
    pub code: u8,
    /// Parameter bytes
    pub params: [u8; 3],
}

impl CommandFrame {
    /// Parse a 7-byte command frame
    pub fn parse(frame: &Frame) -> Option<Self> {
        if !frame.is_protocol() || frame.dlc() != 7 || !frame.has_cmd_prefix() {
            return None;
        }
        let d = &frame.data;
        Some(Self {
            module_id: d[2],
            code: d[3],
            params: [d[4], d[5], d[6]],
        })
    }

    /// Decoded command, if the code is known
    pub fn command(&self) -> Option<Command> {
        Command::from_code(self.code)
    }

    /// 24-bit big-endian parameter
    pub fn param24(&self) -> u32 {
        u32::from_be_bytes([0, self.params[0], self.params[1], self.params[2]])
    }

    /// 16-bit big-endian parameter
    pub fn param16(&self) -> u16 {
        u16::from_be_bytes([self.params[0], self.params[1]])
    }

    /// Whether a destructive command carries the `0x55` key
    pub fn is_keyed(&self) -> bool {
        self.params[0] == DESTRUCTIVE_KEY
    }
}

bitflags! {
    /// Bits of the bootloader status byte
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct StatusBits: u8 {
        /// Start address accepted
        const STARTADDR   = 1 << 0;
        /// Checksum received
        const CHECKSUM    = 1 << 1;
        /// Length accepted
        const LENGTH      = 1 << 2;
        /// Erase succeeded
        const ERASE_OK    = 1 << 5;
        /// Checksum matched the received data
        const CHECKSUM_OK = 1 << 6;
        /// Verify succeeded
        const VERIFY_OK   = 1 << 7;
    }
}

impl core::fmt::Display for StatusBits {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        const NAMES: [(StatusBits, &str); 6] = [
            (StatusBits::STARTADDR, "SET_STARTADDR"),
            (StatusBits::CHECKSUM, "SET_CHECKSUM"),
            (StatusBits::LENGTH, "SET_LENGTH"),
            (StatusBits::ERASE_OK, "SET_ERASE_OK"),
            (StatusBits::CHECKSUM_OK, "SET_CHECKSUM_OK"),
            (StatusBits::VERIFY_OK, "SET_VERIFY_OK"),
        ];
        let mut first = true;
        for (bit, name) in NAMES {
            if self.contains(bit) {
                if !first {
                    f.write_str(" ")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Status reply `7F FF <module> <hw type> <flash type> <status>`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusFrame {
    /// Replying module
    pub module_id: u8,
    /// Hardware code ([`DEFERRED_ID`] for descriptor-identified modules)
    pub hw_type: u8,
    /// Flash family code ([`DEFERRED_ID`] for descriptor-identified modules)
    pub flash_type: u8,
    /// Raw status byte
    pub raw_status: u8,
}

impl StatusFrame {
    /// Parse a status reply
    pub fn parse(frame: &Frame) -> Option<Self> {
        if !frame.is_protocol() || frame.dlc() < 6 || !frame.has_cmd_prefix() {
            return None;
        }
        let d = &frame.data;
        Some(Self {
            module_id: d[2],
            hw_type: d[3],
            flash_type: d[4],
            raw_status: d[5],
        })
    }

    /// Status bits (unknown bits dropped)
    pub fn status(&self) -> StatusBits {
        StatusBits::from_bits_truncate(self.raw_status)
    }

    /// Whether the module defers identification to the JSON descriptor
    pub fn is_deferred(&self) -> bool {
        self.hw_type == DEFERRED_ID || self.flash_type == DEFERRED_ID
    }
}

/// Reply to the discovery query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryReply {
    raw: [u8; 8],
}

impl DiscoveryReply {
    /// Parse a discovery reply
    ///
    /// Frames on other identifiers, and our own query, return `Ok(None)`.
    pub fn parse(frame: &Frame) -> Result<Option<Self>> {
        if !frame.is_protocol() {
            return Ok(None);
        }
        let d = &frame.data;
        if d[..] == Frame::discovery_query().data[..] {
            return Ok(None);
        }
        if d.len() != 8 || d[0] & 0xDF != 0xC6 || d[1] & 0xF0 != 0x40 || d[2] != 0x06 {
            return Err(Error::MalformedDiscoveryReply(d.to_vec()));
        }
        let mut raw = [0u8; 8];
        raw.copy_from_slice(d);
        Ok(Some(Self { raw }))
    }

    /// Build a reply (used by emulators)
    pub fn encode(module_id: u8, date: [u8; 3], version: u8) -> Frame {
        Frame::block_data([
            0xC6,
            0x40 | (module_id & 0x0F),
            0x06,
            date[0],
            date[1],
            date[2],
            version,
            0,
        ])
    }

    /// Module id (0..15)
    pub fn module_id(&self) -> u8 {
        self.raw[1] & 0x0F
    }

    /// Bootloader build date as `dd.mm.20yy` (fields shown as hex)
    pub fn bootloader_date(&self) -> String {
        format!("{:02X}.{:02X}.20{:02X}", self.raw[3], self.raw[4], self.raw[5])
    }

    /// Bootloader version as `(major, minor)`
    pub fn bootloader_version(&self) -> (u8, u8) {
        (self.raw[6] >> 5, self.raw[6] & 0x1F)
    }

    /// Raw reply bytes
    pub fn raw(&self) -> &[u8; 8] {
        &self.raw
    }
}

/// Fragment of the JSON descriptor `7F FF <seq> <5 text bytes>`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorFragment {
    /// Sequence byte
    pub seq: u8,
    /// Text bytes
    pub text: [u8; 5],
}

impl DescriptorFragment {
    /// Sequence byte of the terminal fragment
    pub const LAST: u8 = 0xFF;

    /// Parse a descriptor fragment
    pub fn parse(frame: &Frame) -> Option<Self> {
        if !frame.is_protocol() || frame.dlc() != 8 || !frame.has_cmd_prefix() {
            return None;
        }
        let d = &frame.data;
        Some(Self {
            seq: d[2],
            text: [d[3], d[4], d[5], d[6], d[7]],
        })
    }

    /// Encode as a frame
    pub fn to_frame(&self) -> Frame {
        let t = &self.text;
        Frame::block_data([
            CMD_PREFIX[0],
            CMD_PREFIX[1],
            self.seq,
            t[0],
            t[1],
            t[2],
            t[3],
            t[4],
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_params() {
        assert_eq!(
            Request::SetStartAddress(0x12_3456).params().unwrap(),
            [0x12, 0x34, 0x56]
        );
        assert_eq!(Request::SetBlockSize(0x200).params().unwrap(), [0x00, 0x02, 0x00]);
        assert_eq!(Request::SetChecksum(0xBEEF).params().unwrap(), [0xBE, 0xEF, 0x00]);
        assert_eq!(Request::EraseSector.params().unwrap(), [0x55, 0, 0]);
        assert_eq!(Request::Reset.params().unwrap(), [0x55, 0, 0]);
        assert_eq!(Request::Verify.params().unwrap(), [0, 0, 0]);
        assert_eq!(Request::EndProgramming.params().unwrap(), [0, 0, 0]);
        assert_eq!(Request::GetJson { pacing: 5 }.params().unwrap(), [5, 0, 0]);
    }

    #[test]
    fn test_request_params_reject_wide_values() {
        assert_eq!(
            Request::SetStartAddress(MAX_PARAM24).params().unwrap(),
            [0xFF, 0xFF, 0xFF]
        );
        assert!(matches!(
            Request::SetStartAddress(0x100_0000).params(),
            Err(Error::ParameterOutOfRange {
                command: Command::SetStartAddress,
                value: 0x100_0000
            })
        ));
        assert!(matches!(
            Request::SetBlockSize(0x100_0200).to_frame(0),
            Err(Error::ParameterOutOfRange { .. })
        ));
    }

    #[test]
    fn test_command_codes_roundtrip() {
        for code in 0..=0x0A {
            assert_eq!(Command::from_code(code).unwrap().code(), code);
        }
        assert!(Command::from_code(0x0B).is_none());
    }

    #[test]
    fn test_command_frame_parse() {
        let frame = Request::SetStartAddress(0x03DF00).to_frame(2).unwrap();
        let cmd = CommandFrame::parse(&frame).unwrap();
        assert_eq!(cmd.module_id, 2);
        assert_eq!(cmd.command(), Some(Command::SetStartAddress));
        assert_eq!(cmd.param24(), 0x03DF00);
    }

    #[test]
    fn test_status_parse() {
        let frame = Frame::new(CAN_ID, &[0x7F, 0xFF, 1, 16, 12, 0x45]).unwrap();
        let status = StatusFrame::parse(&frame).unwrap();
        assert_eq!(status.module_id, 1);
        assert_eq!(
            status.status(),
            StatusBits::STARTADDR | StatusBits::LENGTH | StatusBits::CHECKSUM_OK
        );
        assert!(!status.is_deferred());

        let short = Frame::new(CAN_ID, &[0x7F, 0xFF, 1, 16, 12]).unwrap();
        assert!(StatusFrame::parse(&short).is_none());
    }

    #[test]
    fn test_status_bits_display() {
        let bits = StatusBits::CHECKSUM_OK | StatusBits::VERIFY_OK;
        assert_eq!(bits.to_string(), "SET_CHECKSUM_OK SET_VERIFY_OK");
    }

    #[test]
    fn test_discovery_reply() {
        let frame = DiscoveryReply::encode(5, [0x21, 0x06, 0x19], (2 << 5) | 3);
        let reply = DiscoveryReply::parse(&frame).unwrap().unwrap();
        assert_eq!(reply.module_id(), 5);
        assert_eq!(reply.bootloader_date(), "21.06.2019");
        assert_eq!(reply.bootloader_version(), (2, 3));

        // Lower-case variant of the first byte is accepted
        let mut data = frame.data.clone();
        data[0] = 0xE6;
        let frame = Frame::new(CAN_ID, &data).unwrap();
        assert!(DiscoveryReply::parse(&frame).unwrap().is_some());
    }

    #[test]
    fn test_discovery_reply_malformed() {
        let frame = Frame::new(CAN_ID, &[0xC6, 0x45, 0x07, 0, 0, 0, 0, 0]).unwrap();
        assert!(matches!(
            DiscoveryReply::parse(&frame),
            Err(Error::MalformedDiscoveryReply(_))
        ));
        let short = Frame::new(CAN_ID, &[0xC6, 0x45, 0x06]).unwrap();
        assert!(DiscoveryReply::parse(&short).is_err());
        assert!(DiscoveryReply::parse(&Frame::discovery_query())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_descriptor_fragment() {
        let frag = DescriptorFragment {
            seq: 0xFE,
            text: *b"abcde",
        };
        assert_eq!(DescriptorFragment::parse(&frag.to_frame()), Some(frag));
        let status = Frame::new(CAN_ID, &[0x7F, 0xFF, 1, 16, 12, 0x45]).unwrap();
        assert!(DescriptorFragment::parse(&status).is_none());
    }
}
