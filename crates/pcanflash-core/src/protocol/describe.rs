//! Human-readable decoding of bus traffic for the monitor

use super::commands::{Command, CommandFrame, StatusFrame};
use super::frame::Frame;

/// Decoded protocol frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// Host to module command
    Command(String),
    /// Module to host status reply
    Status(String),
}

impl Decoded {
    /// Decoded text
    pub fn text(&self) -> &str {
        match self {
            Decoded::Command(s) | Decoded::Status(s) => s,
        }
    }
}

/// Decode a command or status frame
///
/// Only 6-byte (status) and 7-byte (command) frames with the `7F FF`
/// prefix are decoded; everything else returns `None`.
pub fn describe(frame: &Frame) -> Option<Decoded> {
    if !frame.is_protocol() || !frame.has_cmd_prefix() {
        return None;
    }
    match frame.dlc() {
        7 => CommandFrame::parse(frame).map(|c| Decoded::Command(describe_command(&c))),
        6 => StatusFrame::parse(frame).map(|s| Decoded::Status(describe_status(&s))),
        _ => None,
    }
}

fn describe_command(cmd: &CommandFrame) -> String {
    let text = match cmd.command() {
        Some(c @ (Command::SetStartAddress | Command::SetBlockSize)) => {
            format!("{} 0x{:06X}", c, cmd.param24())
        }
        Some(Command::SetChecksum) => format!("SetCheckSum 0x{:04X}", cmd.param16()),
        Some(Command::GetJson) => format!("GetJson (pacing {} ms)", cmd.params[0]),
        Some(c) if c.is_destructive() && !cmd.is_keyed() => format!("{} (unknown)", c),
        Some(c) => c.to_string(),
        None => format!("(unknown command) 0x{:02X}", cmd.code),
    };
    format!("[{}] {}", cmd.module_id, text)
}

fn describe_status(status: &StatusFrame) -> String {
    let bits = status.status();
    if bits.is_empty() {
        format!("[{}] (0x{:02X})", status.module_id, status.raw_status)
    } else {
        format!(
            "[{}] (0x{:02X}) {}",
            status.module_id, status.raw_status, bits
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Request, CAN_ID};

    fn text(frame: &Frame) -> String {
        describe(frame).unwrap().text().to_string()
    }

    #[test]
    fn test_describe_commands() {
        assert_eq!(text(&Request::Status.to_frame(1).unwrap()), "[1] GetStatus");
        assert_eq!(
            text(&Request::SetStartAddress(0x3DF00).to_frame(0).unwrap()),
            "[0] SetStartAddr 0x03DF00"
        );
        assert_eq!(
            text(&Request::SetBlockSize(0x200).to_frame(0).unwrap()),
            "[0] SetBlockSize 0x000200"
        );
        assert_eq!(
            text(&Request::SetChecksum(0xABCD).to_frame(3).unwrap()),
            "[3] SetCheckSum 0xABCD"
        );
        assert_eq!(text(&Request::EraseSector.to_frame(2).unwrap()), "[2] EraseSector");
        assert_eq!(text(&Request::Reset.to_frame(2).unwrap()), "[2] ResetModule");
    }

    #[test]
    fn test_describe_unkeyed_and_unknown() {
        let unkeyed = Frame::new(CAN_ID, &[0x7F, 0xFF, 4, 0x05, 0x00, 0, 0]).unwrap();
        assert_eq!(text(&unkeyed), "[4] EraseSector (unknown)");
        let unknown = Frame::new(CAN_ID, &[0x7F, 0xFF, 4, 0x3C, 0, 0, 0]).unwrap();
        assert_eq!(text(&unknown), "[4] (unknown command) 0x3C");
    }

    #[test]
    fn test_describe_status() {
        let frame = Frame::new(CAN_ID, &[0x7F, 0xFF, 1, 16, 12, 0x41]).unwrap();
        assert_eq!(
            describe(&frame),
            Some(Decoded::Status(
                "[1] (0x41) SET_STARTADDR SET_CHECKSUM_OK".into()
            ))
        );
    }

    #[test]
    fn test_describe_ignores_other_frames() {
        assert!(describe(&Frame::discovery_query()).is_none());
        let data = Frame::block_data([0x7F, 0xFF, 0, 1, 2, 3, 4, 5]);
        assert!(describe(&data).is_none());
        let other = Frame::new(0x123, &[0x7F, 0xFF, 1, 16, 12, 0x41]).unwrap();
        assert!(describe(&other).is_none());
    }
}
