//! Module discovery and per-module session state

use std::collections::BTreeMap;
use std::time::Duration;

use crate::bus::CanBus;
use crate::error::{Error, Result};
use crate::hardware::DataLength;
use crate::protocol::{DiscoveryReply, Frame};
use crate::status::StatusChannel;

/// A module found on the bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    /// Bus id (0..15)
    pub id: u8,
    /// Raw discovery reply
    pub identity: DiscoveryReply,
    /// Last observed status byte
    pub status: Option<u8>,
    /// Resolved hardware code
    pub hw_type: Option<u8>,
    /// Reported flash family code
    pub flash_type: Option<u8>,
    /// Negotiated data bytes per frame
    pub data_len: Option<DataLength>,
    /// Bootloader string from the JSON descriptor
    pub bootloader: Option<String>,
    /// Firmware string from the JSON descriptor
    pub firmware: Option<String>,
}

impl Module {
    /// Create an unidentified module from its discovery reply
    pub fn new(identity: DiscoveryReply) -> Self {
        Self {
            id: identity.module_id(),
            identity,
            status: None,
            hw_type: None,
            flash_type: None,
            data_len: None,
            bootloader: None,
            firmware: None,
        }
    }

    /// Whether the module identified itself through the JSON descriptor
    pub fn is_json_identified(&self) -> bool {
        self.bootloader.is_some() || self.firmware.is_some()
    }
}

/// Broadcast the module query and collect all replies
///
/// Polling stops at the first `quiet` interval without a frame. The map is
/// keyed by module id; a second reply with the same id is fatal.
pub fn discover<B: CanBus>(
    channel: &mut StatusChannel<B>,
    quiet: Duration,
) -> Result<BTreeMap<u8, DiscoveryReply>> {
    let mut modules = BTreeMap::new();

    channel.send_frame(&Frame::discovery_query())?;

    while let Some(frame) = channel.bus_mut().recv_timeout(quiet)? {
        log::trace!("rx {}", frame);
        let Some(reply) = DiscoveryReply::parse(&frame)? else {
            continue;
        };
        let id = reply.module_id();
        if modules.insert(id, reply).is_some() {
            return Err(Error::DuplicateModule(id));
        }
        log::debug!("module {} answered the query", id);
    }

    Ok(modules)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockBus;

    fn replies(ids: &'static [u8]) -> MockBus {
        MockBus::new(move |frame: &Frame| {
            if *frame == Frame::discovery_query() {
                ids.iter()
                    .map(|id| DiscoveryReply::encode(*id, [0x01, 0x02, 0x21], 0x21))
                    .collect()
            } else {
                vec![]
            }
        })
    }

    #[test]
    fn test_discover_collects_all() {
        let mut channel = StatusChannel::new(replies(&[7, 0, 15, 3]), Duration::from_secs(3));
        let modules = discover(&mut channel, Duration::from_millis(1)).unwrap();
        assert_eq!(modules.keys().copied().collect::<Vec<_>>(), vec![0, 3, 7, 15]);
        assert_eq!(channel.bus().sent(), &[Frame::discovery_query()]);
    }

    #[test]
    fn test_discover_empty() {
        let mut channel = StatusChannel::new(replies(&[]), Duration::from_secs(3));
        assert!(discover(&mut channel, Duration::from_millis(1))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_discover_duplicate_is_fatal() {
        let mut channel = StatusChannel::new(replies(&[2, 5, 2]), Duration::from_secs(3));
        assert!(matches!(
            discover(&mut channel, Duration::from_millis(1)),
            Err(Error::DuplicateModule(2))
        ));
    }

    #[test]
    fn test_discover_malformed_is_fatal() {
        let bus = MockBus::new(|_: &Frame| {
            vec![Frame::new(0x7E7, &[0xC6, 0x41, 0x06, 0, 0]).unwrap()]
        });
        let mut channel = StatusChannel::new(bus, Duration::from_secs(3));
        assert!(matches!(
            discover(&mut channel, Duration::from_millis(1)),
            Err(Error::MalformedDiscoveryReply(_))
        ));
    }

    #[test]
    fn test_module_new() {
        let frame = DiscoveryReply::encode(9, [0x15, 0x03, 0x22], 0x41);
        let reply = DiscoveryReply::parse(&frame).unwrap().unwrap();
        let module = Module::new(reply);
        assert_eq!(module.id, 9);
        assert!(module.hw_type.is_none());
        assert!(!module.is_json_identified());
    }
}
