//! JSON identity descriptor
//!
//! Modules with newer bootloaders report [`DEFERRED_ID`] as hardware or
//! flash code in their status reply. Their identity is then requested as a
//! small JSON text, sent in 5-byte fragments:
//!
//! ```text
//! seq 0x00        first fragment (resets the buffer)
//! seq prev + 1    following fragments, 0xFE wraps to 0x00
//! seq 0xFF        last fragment
//! ```
//!
//! Only a handful of fields are needed, so the text is scanned for tags
//! rather than parsed as a JSON document.
//!
//! [`DEFERRED_ID`]: crate::protocol::DEFERRED_ID

use std::time::Instant;

use crate::bus::CanBus;
use crate::error::{Error, Result};
use crate::hardware::DataLength;
use crate::protocol::{DescriptorFragment, Request};
use crate::status::StatusChannel;

/// Reassembly state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    AwaitingFirst,
    Accumulating { last_seq: u8 },
    Done,
}

/// Reassembles descriptor fragments into text
#[derive(Debug)]
pub struct DescriptorAssembler {
    module_id: u8,
    state: State,
    buf: Vec<u8>,
}

impl DescriptorAssembler {
    /// Create an assembler for `module_id`
    pub fn new(module_id: u8) -> Self {
        Self {
            module_id,
            state: State::AwaitingFirst,
            buf: Vec::new(),
        }
    }

    /// Feed the next fragment
    ///
    /// Returns `true` once the terminal fragment has been consumed.
    pub fn feed(&mut self, frag: &DescriptorFragment) -> Result<bool> {
        let expected = match self.state {
            State::AwaitingFirst => 0x00,
            State::Accumulating { last_seq: 0xFE } => 0x00,
            State::Accumulating { last_seq } => last_seq + 1,
            State::Done => return Ok(true),
        };

        match (self.state, frag.seq) {
            (State::AwaitingFirst, 0x00) => {
                self.buf.clear();
                self.buf.extend_from_slice(&frag.text);
                self.state = State::Accumulating { last_seq: 0x00 };
            }
            (State::Accumulating { .. }, DescriptorFragment::LAST) => {
                self.buf.extend_from_slice(&frag.text);
                self.state = State::Done;
            }
            (State::Accumulating { .. }, seq) if seq == expected => {
                self.buf.extend_from_slice(&frag.text);
                self.state = State::Accumulating { last_seq: seq };
            }
            (_, got) => {
                return Err(Error::DescriptorSequence {
                    module_id: self.module_id,
                    expected,
                    got,
                })
            }
        }

        Ok(self.state == State::Done)
    }

    /// Whether the terminal fragment has been received
    pub fn is_done(&self) -> bool {
        self.state == State::Done
    }

    /// Reassembled text, without trailing NUL padding
    pub fn text(&self) -> String {
        let end = self
            .buf
            .iter()
            .rposition(|b| *b != 0)
            .map_or(0, |pos| pos + 1);
        String::from_utf8_lossy(&self.buf[..end]).into_owned()
    }
}

/// Identity fields extracted from a descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorInfo {
    /// Hardware code
    pub hw_type: u8,
    /// Bootloader description
    pub bootloader: Option<String>,
    /// Firmware description
    pub firmware: Option<String>,
    /// Data bytes per frame requested by the module
    pub data_mode: Option<DataLength>,
}

/// Find every value of `tag` in `text`
///
/// The value is the first quoted string after the tag. A bare token
/// (e.g. an unquoted number) directly following the colon is accepted too.
fn scan_values<'a>(text: &'a str, tag: &str) -> Vec<&'a str> {
    let needle = format!("\"{}\"", tag);
    let mut values = Vec::new();
    let mut rest = text;

    while let Some(pos) = rest.find(&needle) {
        rest = &rest[pos + needle.len()..];
        let after = rest.trim_start().trim_start_matches(':').trim_start();

        let value = if let Some(quoted) = after.strip_prefix('"') {
            quoted.find('"').map(|end| &quoted[..end])
        } else {
            let end = after
                .find(|c: char| c == ',' || c == '}' || c.is_whitespace())
                .unwrap_or(after.len());
            let bare = &after[..end];
            if bare.is_empty() {
                // Fall back to the next quoted string
                rest.find('"').and_then(|start| {
                    let quoted = &rest[start + 1..];
                    quoted.find('"').map(|end| &quoted[..end])
                })
            } else {
                Some(bare)
            }
        };

        if let Some(v) = value {
            values.push(v);
        }
    }
    values
}

fn parse_number(value: &str) -> Option<u8> {
    let value = value.trim();
    match value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        Some(hex) => u8::from_str_radix(hex, 16).ok(),
        None => value.parse().ok(),
    }
}

impl DescriptorInfo {
    /// Extract identity fields from descriptor text
    pub fn parse(module_id: u8, text: &str) -> Result<Self> {
        let hw_value = scan_values(text, "hwType")
            .into_iter()
            .next()
            .ok_or(Error::MissingHwType(module_id))?;
        let hw_type = parse_number(hw_value).ok_or_else(|| Error::InvalidHwType {
            module_id,
            value: hw_value.to_string(),
        })?;

        let first = |tag: &str| scan_values(text, tag).first().map(|s| s.to_string());

        let data_mode = match scan_values(text, "dataMode").as_slice() {
            [] => None,
            [value] => Some(match parse_number(value) {
                Some(6) => DataLength::Six,
                Some(8) => DataLength::Eight,
                _ => {
                    return Err(Error::InvalidDataMode {
                        module_id,
                        value: value.to_string(),
                    })
                }
            }),
            _ => return Err(Error::DuplicateDataMode(module_id)),
        };

        Ok(Self {
            hw_type,
            bootloader: first("bootloader"),
            firmware: first("firmware"),
            data_mode,
        })
    }
}

/// Request and reassemble the descriptor of `module_id`
///
/// Each fragment must arrive within the channel's status deadline; frames
/// that are not descriptor fragments are skipped.
pub fn read_descriptor<B: CanBus>(
    channel: &mut StatusChannel<B>,
    module_id: u8,
    pacing: u8,
) -> Result<String> {
    let mut assembler = DescriptorAssembler::new(module_id);

    channel.send(module_id, Request::GetJson { pacing })?;

    let mut deadline = Instant::now() + channel.timeout();
    while !assembler.is_done() {
        let frame = channel
            .recv_until(deadline)?
            .ok_or(Error::DescriptorTimeout(module_id))?;
        let Some(frag) = DescriptorFragment::parse(&frame) else {
            continue;
        };
        assembler.feed(&frag)?;
        deadline = Instant::now() + channel.timeout();
    }

    let text = assembler.text();
    log::debug!("module {} descriptor: {}", module_id, text);
    Ok(text)
}

/// Split a descriptor into fragments, as a module sends it
///
/// A text that fits one fragment still gets a separate terminal fragment.
pub fn split_descriptor(text: &str) -> Vec<DescriptorFragment> {
    let mut chunks: Vec<&[u8]> = text.as_bytes().chunks(5).collect();
    while chunks.len() < 2 {
        chunks.push(&[]);
    }
    let last = chunks.len() - 1;
    let mut seq = 0u8;
    chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            let mut t = [0u8; 5];
            t[..chunk.len()].copy_from_slice(chunk);
            let frag = DescriptorFragment {
                seq: if i == last { DescriptorFragment::LAST } else { seq },
                text: t,
            };
            seq = if seq == 0xFE { 0 } else { seq + 1 };
            frag
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Frame;
    use crate::testing::MockBus;
    use std::time::Duration;

    fn frag(seq: u8, text: &[u8]) -> DescriptorFragment {
        let mut t = [0u8; 5];
        t[..text.len()].copy_from_slice(text);
        DescriptorFragment { seq, text: t }
    }

    #[test]
    fn test_assembler_basic() {
        let mut asm = DescriptorAssembler::new(1);
        assert!(!asm.feed(&frag(0x00, b"{\"hwT")).unwrap());
        assert!(!asm.feed(&frag(0x01, b"ype\":")).unwrap());
        assert!(asm.feed(&frag(0xFF, b"\"40\"}")).unwrap());
        assert_eq!(asm.text(), "{\"hwType\":\"40\"}");
    }

    #[test]
    fn test_assembler_strips_padding() {
        let mut asm = DescriptorAssembler::new(1);
        asm.feed(&frag(0x00, b"{\"a\":")).unwrap();
        asm.feed(&frag(0xFF, b"1}")).unwrap();
        assert_eq!(asm.text(), "{\"a\":1}");
    }

    #[test]
    fn test_assembler_wraps_sequence() {
        // 0x00..=0xFE, then 0x00 again, then the terminator
        let text: String = (0..257 * 5 + 3)
            .map(|i| char::from(b'a' + (i % 26) as u8))
            .collect();
        let frags = split_descriptor(&text);
        assert_eq!(frags.len(), 258);
        assert_eq!(frags[254].seq, 0xFE);
        assert_eq!(frags[255].seq, 0x00);
        assert_eq!(frags[256].seq, 0x01);
        assert_eq!(frags[257].seq, 0xFF);

        let mut asm = DescriptorAssembler::new(3);
        for f in &frags {
            asm.feed(f).unwrap();
        }
        assert!(asm.is_done());
        assert_eq!(asm.text(), text);
    }

    #[test]
    fn test_assembler_rejects_gaps() {
        let mut asm = DescriptorAssembler::new(2);
        asm.feed(&frag(0x00, b"abcde")).unwrap();
        asm.feed(&frag(0x01, b"abcde")).unwrap();
        let err = asm.feed(&frag(0x03, b"abcde")).unwrap_err();
        assert!(matches!(
            err,
            Error::DescriptorSequence {
                module_id: 2,
                expected: 0x02,
                got: 0x03
            }
        ));

        // A restart in the middle is a sequence error too
        let mut asm = DescriptorAssembler::new(2);
        asm.feed(&frag(0x00, b"abcde")).unwrap();
        asm.feed(&frag(0x01, b"abcde")).unwrap();
        assert!(asm.feed(&frag(0x00, b"abcde")).is_err());
    }

    #[test]
    fn test_assembler_must_start_at_zero() {
        let mut asm = DescriptorAssembler::new(0);
        assert!(asm.feed(&frag(0x05, b"abcde")).is_err());
        let mut asm = DescriptorAssembler::new(0);
        assert!(asm.feed(&frag(0xFF, b"abcde")).is_err());
    }

    #[test]
    fn test_parse_fields() {
        let text = r#"{"hwType": "44", "bootloader": "BL 2.1", "firmware": "FW 1.0.3", "dataMode": "8"}"#;
        let info = DescriptorInfo::parse(0, text).unwrap();
        assert_eq!(info.hw_type, 44);
        assert_eq!(info.bootloader.as_deref(), Some("BL 2.1"));
        assert_eq!(info.firmware.as_deref(), Some("FW 1.0.3"));
        assert_eq!(info.data_mode, Some(DataLength::Eight));
    }

    #[test]
    fn test_parse_bare_and_hex_numbers() {
        let info = DescriptorInfo::parse(0, r#"{"hwType":0x2B,"dataMode":6}"#).unwrap();
        assert_eq!(info.hw_type, 43);
        assert_eq!(info.data_mode, Some(DataLength::Six));
        assert!(info.bootloader.is_none());
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            DescriptorInfo::parse(4, r#"{"firmware":"x"}"#),
            Err(Error::MissingHwType(4))
        ));
        assert!(matches!(
            DescriptorInfo::parse(4, r#"{"hwType":"router"}"#),
            Err(Error::InvalidHwType { module_id: 4, .. })
        ));
        assert!(matches!(
            DescriptorInfo::parse(4, r#"{"hwType":"40","dataMode":"6","dataMode":"8"}"#),
            Err(Error::DuplicateDataMode(4))
        ));
        assert!(matches!(
            DescriptorInfo::parse(4, r#"{"hwType":"40","dataMode":"7"}"#),
            Err(Error::InvalidDataMode { module_id: 4, .. })
        ));
    }

    #[test]
    fn test_read_descriptor_over_bus() {
        let text = r#"{"hwType":"43","firmware":"1.2.3"}"#;
        let frames: Vec<Frame> = split_descriptor(text).iter().map(|f| f.to_frame()).collect();
        let bus = MockBus::new(move |frame: &Frame| {
            if frame.dlc() == 7 && frame.data[3] == 0x0A {
                // An unrelated status frame first, it must be skipped
                let mut replies =
                    vec![Frame::new(0x7E7, &[0x7F, 0xFF, 1, 0xFF, 0xFF, 0x40]).unwrap()];
                replies.extend(frames.iter().cloned());
                replies
            } else {
                vec![]
            }
        });
        let mut channel = StatusChannel::new(bus, Duration::from_secs(3));
        let got = read_descriptor(&mut channel, 1, 2).unwrap();
        assert_eq!(got, text);
        let request = &channel.bus().sent()[0];
        assert_eq!(&request.data[..], &[0x7F, 0xFF, 1, 0x0A, 2, 0, 0]);
    }

    #[test]
    fn test_read_descriptor_timeout() {
        let bus = MockBus::new(|_: &Frame| vec![frag(0x00, b"{\"hwT").to_frame()]);
        let mut channel = StatusChannel::new(bus, Duration::from_millis(5));
        assert!(matches!(
            read_descriptor(&mut channel, 6, 0),
            Err(Error::DescriptorTimeout(6))
        ));
    }

    #[test]
    fn test_split_short_text_gets_terminator() {
        let frags = split_descriptor("{}");
        assert_eq!(frags.len(), 2);
        assert_eq!(frags[0].seq, 0x00);
        assert_eq!(frags[1].seq, DescriptorFragment::LAST);
        assert_eq!(frags[1].text, [0; 5]);

        let mut asm = DescriptorAssembler::new(0);
        for f in &frags {
            asm.feed(f).unwrap();
        }
        assert_eq!(asm.text(), "{}");
    }
}
