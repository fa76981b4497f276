//! Interface name to transport mapping

use pcanflash_core::bus::CanBus;
use pcanflash_core::hardware::HardwareCatalog;

/// Interface name selecting the module emulator
const DUMMY: &str = "dummy";

/// Open the bus for an interface name
///
/// `dummy` and `dummy:<hw>,<hw>...` attach emulated modules; anything else
/// is taken as a SocketCAN interface.
pub fn open_bus(
    interface: &str,
    catalog: &HardwareCatalog,
) -> Result<Box<dyn CanBus>, Box<dyn std::error::Error>> {
    if let Some(rest) = interface.strip_prefix(DUMMY) {
        if rest.is_empty() || rest.starts_with(':') {
            return pcanflash_dummy::open_dummy(rest.trim_start_matches(':'), catalog);
        }
    }
    open_socketcan(interface)
}

#[cfg(feature = "socketcan")]
fn open_socketcan(interface: &str) -> Result<Box<dyn CanBus>, Box<dyn std::error::Error>> {
    pcanflash_socketcan::open_socketcan(interface)
}

#[cfg(not(feature = "socketcan"))]
fn open_socketcan(interface: &str) -> Result<Box<dyn CanBus>, Box<dyn std::error::Error>> {
    Err(format!(
        "cannot open '{}': built without SocketCAN support (enable the 'socketcan' feature)",
        interface
    )
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dummy_interfaces() {
        let catalog = HardwareCatalog::builtin();
        assert!(open_bus("dummy", catalog).is_ok());
        assert!(open_bus("dummy:16,43", catalog).is_ok());
        assert!(open_bus("dummy:77", catalog).is_err());
    }
}
